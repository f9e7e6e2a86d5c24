//! # CASE Simplification
//!
//! `Case` nodes lay their children out as `when1, then1, ..., whenN, thenN, else`.
//!
//! ## SimplifyCase
//!
//! Two independent simplifications, tried in order:
//!
//! 1. **Collapse**: when every `then` and the `else` are the same expression, the
//!    whole `Case` is that expression.
//! 2. **Elimination**: `when` clauses that are literally `false` are dropped. The
//!    first literal `true` turns its `then` into the new `else`, and every clause
//!    after it is unreachable. A `Case` left with no clauses is its `else`.
//!
//! ```text
//! Before: Case(false, X, Y)          After: Y
//! Before: Case(p, X, true, Z, W)     After: Case(p, X, Z)
//! ```
//!
//! Elimination leaves the node alone if any result is a `SoftCast`; removing the
//! branch that carried the widest static type would change the `Case` result type.
//!
//! ## FlattenCase
//!
//! An `else` that is itself a `Case` is spliced in:
//! `Case(w1, t1, Case(w2, t2, e))` becomes `Case(w1, t1, w2, t2, e)`.

use planc_core::expr::{Op, OpType};
use planc_core::{Command, NodeId, Rule, RuleResult, TransformationContext};

/// The `(when, then)` pairs and the `else` of a `Case` node.
fn clauses(cmd: &Command, node: NodeId) -> Option<(Vec<(NodeId, NodeId)>, NodeId)> {
    let children = cmd.children(node);
    let (&else_, pairs) = children.split_last()?;
    if pairs.len() % 2 != 0 {
        return None;
    }
    let pairs = pairs.chunks(2).map(|c| (c[0], c[1])).collect();
    Some((pairs, else_))
}

fn rebuild(cmd: &mut Command, pairs: &[(NodeId, NodeId)], else_: NodeId) -> NodeId {
    if pairs.is_empty() {
        return else_;
    }
    let mut children: Vec<NodeId> = pairs.iter().flat_map(|(w, t)| [*w, *t]).collect();
    children.push(else_);
    cmd.create_node(Op::Case, children)
}

pub struct SimplifyCaseRule;

impl SimplifyCaseRule {
    fn collapse(cmd: &Command, pairs: &[(NodeId, NodeId)], else_: NodeId) -> Option<NodeId> {
        let (_, first) = *pairs.first()?;
        let all_same = pairs.iter().all(|(_, t)| cmd.is_equivalent(*t, first))
            && cmd.is_equivalent(else_, first);
        all_same.then_some(first)
    }

    fn eliminate(
        cmd: &mut Command,
        pairs: &[(NodeId, NodeId)],
        else_: NodeId,
    ) -> Option<NodeId> {
        let soft_cast = |n: &NodeId| matches!(cmd.op(*n), Op::SoftCast(_));
        if pairs.iter().any(|(_, t)| soft_cast(t)) || soft_cast(&else_) {
            return None;
        }

        let mut kept = Vec::with_capacity(pairs.len());
        let mut new_else = else_;
        let mut changed = false;
        for &(when, then) in pairs {
            match cmd.op(when) {
                Op::ConstantPredicate(false) => changed = true,
                Op::ConstantPredicate(true) => {
                    new_else = then;
                    changed = true;
                    break;
                }
                _ => kept.push((when, then)),
            }
        }
        if !changed {
            return None;
        }
        Some(rebuild(cmd, &kept, new_else))
    }
}

impl Rule for SimplifyCaseRule {
    fn name(&self) -> &str {
        "SimplifyCase"
    }

    fn op_type(&self) -> OpType {
        OpType::Case
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((pairs, else_)) = clauses(ctx.command, node) else {
            return Ok(None);
        };
        if let Some(same) = Self::collapse(ctx.command, &pairs, else_) {
            return Ok(Some(same));
        }
        Ok(Self::eliminate(ctx.command, &pairs, else_))
    }
}

pub struct FlattenCaseRule;

impl Rule for FlattenCaseRule {
    fn name(&self) -> &str {
        "FlattenCase"
    }

    fn op_type(&self) -> OpType {
        OpType::Case
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some(else_) = ctx.command.last_child(node) else {
            return Ok(None);
        };
        if !matches!(ctx.command.op(else_), Op::Case) {
            return Ok(None);
        }
        let children = ctx.command.children(node);
        let mut flat = children[..children.len() - 1].to_vec();
        flat.extend_from_slice(ctx.command.children(else_));
        Ok(Some(ctx.command.create_node(Op::Case, flat)))
    }
}
