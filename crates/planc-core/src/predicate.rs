//! # Predicate Analysis
//!
//! Helpers that look at a boolean scalar tree as a conjunction of parts. Filter
//! pushdown splits a predicate into the conjuncts that only reference one input
//! and the rest; outer-join strength reduction asks whether a predicate can ever
//! be true for a row whose right side is null-extended.

use crate::expr::{CompareOp, Op};
use crate::tree::{Command, NodeId};
use crate::var::VarSet;

/// Flatten nested `And` nodes into their conjuncts, left to right.
pub fn conjuncts(cmd: &Command, pred: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![pred];
    while let Some(n) = stack.pop() {
        if matches!(cmd.op(n), Op::And) {
            stack.extend(cmd.children(n).iter().rev().copied());
        } else {
            out.push(n);
        }
    }
    out
}

/// Rebuild a left-deep conjunction. `None` for an empty list.
pub fn conjunction(cmd: &mut Command, parts: &[NodeId]) -> Option<NodeId> {
    let (first, rest) = parts.split_first()?;
    Some(rest.iter().fold(*first, |acc, p| cmd.and(acc, *p)))
}

/// Partition `parts` into those whose free Vars are all in `defs`, and the rest.
pub fn split_by_references(
    cmd: &Command,
    parts: &[NodeId],
    defs: &VarSet,
) -> (Vec<NodeId>, Vec<NodeId>) {
    parts
        .iter()
        .copied()
        .partition(|p| defs.subsumes(&cmd.info(*p).external_references))
}

/// Vars whose null-ness forces `node` to evaluate to null.
fn strict_vars(cmd: &Command, node: NodeId) -> VarSet {
    match cmd.op(node) {
        Op::VarRef(v) => [*v].into_iter().collect(),
        Op::Arithmetic(_) | Op::Cast(_) | Op::SoftCast(_) => {
            let mut out = VarSet::new();
            for c in cmd.children(node) {
                out.union_with(&strict_vars(cmd, *c));
            }
            out
        }
        _ => VarSet::new(),
    }
}

/// Vars that must be non-null for `pred` to be true: any conjunct that is null
/// (and so filters the row out) whenever one of these Vars is null.
pub fn null_rejected_vars(cmd: &Command, pred: NodeId) -> VarSet {
    let mut out = VarSet::new();
    for part in conjuncts(cmd, pred) {
        let children = cmd.children(part);
        match cmd.op(part) {
            Op::Comparison(_) => {
                for c in children {
                    out.union_with(&strict_vars(cmd, *c));
                }
            }
            Op::Like => {
                for c in children.iter().take(2) {
                    out.union_with(&strict_vars(cmd, *c));
                }
            }
            Op::Not => {
                if let Some(inner) = children.first() {
                    if matches!(cmd.op(*inner), Op::IsNull) {
                        if let Some(arg) = cmd.children(*inner).first() {
                            out.union_with(&strict_vars(cmd, *arg));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Whether `pred` may still be true when every Var in `vars` is null.
pub fn preserves_nulls(cmd: &Command, pred: NodeId, vars: &VarSet) -> bool {
    !null_rejected_vars(cmd, pred).overlaps(vars)
}

/// Whether `pred` pins every Var of `key` to a single value, using equality
/// conjuncts against expressions that do not depend on `defs`.
pub fn satisfies_key(cmd: &Command, pred: NodeId, key: &VarSet, defs: &VarSet) -> bool {
    if key.is_empty() {
        return false;
    }
    let mut pinned = VarSet::new();
    for part in conjuncts(cmd, pred) {
        if !matches!(cmd.op(part), Op::Comparison(CompareOp::Eq)) {
            continue;
        }
        let children = cmd.children(part);
        for (this, other) in [(0, 1), (1, 0)] {
            if let Op::VarRef(v) = cmd.op(children[this]) {
                if key.contains(*v) && !cmd.info(children[other]).external_references.overlaps(defs)
                {
                    pinned.insert(*v);
                }
            }
        }
    }
    pinned.subsumes(key)
}
