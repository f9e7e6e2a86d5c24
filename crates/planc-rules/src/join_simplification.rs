//! # Join Simplification
//!
//! Rules that lift projections and filters out of join inputs, and drop the
//! single-row table when it is a join input.
//!
//! ```text
//! Before: InnerJoin(Project(X, defs), R, c)     After: Project(InnerJoin(X, R, c'), defs)
//! Before: CrossJoin(Filter(X, p), R)            After: Filter(CrossJoin(X, R), p)
//! Before: CrossJoin(SingleRowTable, R)          After: R
//! ```
//!
//! Lifting brings related operators next to each other: two projections meet and
//! merge, filters meet and are pushed back down as join conditions.
//!
//! ## Left Outer Joins
//!
//! Only the preserved (left) input of a left outer join is lifted from. A
//! projection or filter on the null-extended side sees different rows than it
//! would above the join.
//!
//! A lifted filter is shielded from filter pushdown for the rest of the pass, so
//! that the two families do not move the same predicate back and forth.

use planc_core::expr::{Op, OpType};
use planc_core::pattern::Pattern;
use planc_core::predicate::conjunction;
use planc_core::{
    NodeId, Rule, RuleResult, RuleSignals, Suppression, TransformationContext, VarList,
};
use std::collections::HashMap;

fn join_arity(join: OpType) -> usize {
    if join.is_conditional_join() {
        3
    } else {
        2
    }
}

fn rule_name(join: OpType, over: &str, side: usize) -> String {
    let join = match join {
        OpType::CrossJoin => "CrossJoin",
        OpType::InnerJoin => "InnerJoin",
        _ => "LeftOuterJoin",
    };
    format!("{join}Over{over}{side}")
}

// ---------------------------------------------------------------------------
// Join over Project
// ---------------------------------------------------------------------------

/// Lifts the projection at `side` above the join. When both inputs of a cross or
/// inner join are projections, both are lifted into one.
pub struct JoinOverProjectRule {
    pub join: OpType,
    pub side: usize,
    name: String,
}

impl JoinOverProjectRule {
    pub fn new(join: OpType, side: usize) -> Self {
        Self {
            join,
            side,
            name: rule_name(join, "Project", side),
        }
    }
}

impl Rule for JoinOverProjectRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.join
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(
            self.join,
            join_arity(self.join),
            self.side,
            Pattern::op(OpType::Project),
        )
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let op = ctx.command.op(node).clone();
        let mut children = ctx.command.children(node).to_vec();
        let cond = children.get(2).copied();

        let mut ref_counts = HashMap::new();
        if let Some(cond) = cond {
            if ctx.is_scalar_op_tree(cond, &mut ref_counts).is_none() {
                return Ok(None);
            }
        }

        let lift_both = self.join != OpType::LeftOuterJoin
            && children[..2]
                .iter()
                .all(|c| matches!(ctx.command.op(*c), Op::Project { .. }));
        let lifted: Vec<usize> = if lift_both { vec![0, 1] } else { vec![self.side] };

        let mut outputs = VarList::new();
        let mut defs = Vec::new();
        let mut var_map = HashMap::new();
        for side in 0..2 {
            let child = children[side];
            if !lifted.contains(&side) {
                outputs.extend(ctx.command.info(child).definitions.iter());
                continue;
            }
            let Op::Project {
                outputs: project_outputs,
            } = ctx.command.op(child).clone()
            else {
                return Ok(None);
            };
            let def_list = ctx.command.child(child, 1);
            if cond.is_some() {
                let Some(map) = ctx.get_var_map(def_list, &ref_counts) else {
                    return Ok(None);
                };
                var_map.extend(map);
            }
            outputs.extend(project_outputs.iter());
            defs.extend_from_slice(ctx.command.children(def_list));
            children[side] = ctx.command.child(child, 0);
        }

        if let Some(cond) = cond {
            children[2] = ctx.remap(cond, &var_map);
        }
        let cmd = &mut *ctx.command;
        let join = cmd.create_node(op, children);
        let def_list = cmd.var_def_list(defs);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![join, def_list])))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// Join over Filter
// ---------------------------------------------------------------------------

/// Lifts filters out of the join inputs into a single filter above the join.
pub struct JoinOverFilterRule {
    pub join: OpType,
    pub side: usize,
    name: String,
}

impl JoinOverFilterRule {
    pub fn new(join: OpType, side: usize) -> Self {
        Self {
            join,
            side,
            name: rule_name(join, "Filter", side),
        }
    }
}

impl Rule for JoinOverFilterRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.join
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(
            self.join,
            join_arity(self.join),
            self.side,
            Pattern::op(OpType::Filter),
        )
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let op = cmd.op(node).clone();
        let mut children = cmd.children(node).to_vec();
        let liftable = if self.join == OpType::LeftOuterJoin { 1 } else { 2 };

        let mut preds = Vec::new();
        for child in children.iter_mut().take(liftable) {
            if matches!(cmd.op(*child), Op::Filter) {
                preds.push(cmd.child(*child, 1));
                *child = cmd.child(*child, 0);
            }
        }
        let Some(pred) = conjunction(cmd, &preds) else {
            return Ok(None);
        };
        let join = cmd.create_node(op, children);
        let filter = cmd.create_node(Op::Filter, vec![join, pred]);
        ctx.suppress(filter, Suppression::FilterPushdown);
        Ok(Some(filter))
    }
}

// ---------------------------------------------------------------------------
// Join over SingleRowTable
// ---------------------------------------------------------------------------

/// The single-row table contributes one row and no columns, so a cross join with
/// it, or a left outer join with it on the right, is the other input.
pub struct JoinOverSingleRowTableRule {
    pub join: OpType,
    pub side: usize,
    name: String,
}

impl JoinOverSingleRowTableRule {
    pub fn new(join: OpType, side: usize) -> Self {
        Self {
            join,
            side,
            name: rule_name(join, "SingleRowTable", side),
        }
    }
}

impl Rule for JoinOverSingleRowTableRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.join
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(
            self.join,
            join_arity(self.join),
            self.side,
            Pattern::op(OpType::SingleRowTable),
        )
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        Ok(Some(ctx.command.child(node, 1 - self.side)))
    }
}
