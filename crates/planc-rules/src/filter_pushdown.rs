//! # Filter Pushdown Rules
//!
//! Filters are moved as close to the data as their references allow. A predicate
//! is treated as a conjunction; each conjunct moves on its own, and whatever cannot
//! move stays in a residual filter above.
//!
//! ```text
//! Before: Filter(Filter(X, p1), p2)          After: Filter(X, And(p1, p2))
//! Before: Filter(Project(X, defs), p)        After: Project(Filter(X, p'), defs)
//! Before: Filter(Join(L, R, c), pL & pR & pLR)
//! After:  Join(Filter(L, pL), Filter(R, pR), c & pLR)
//! ```
//!
//! ## Substitution
//!
//! Moving a predicate below an operator that computes Vars (a projection, the key
//! list of a grouping, the output map of a set operator) substitutes the defining
//! expression for each reference. Only pure scalar definitions are substituted,
//! and expensive ones only while they are referenced rarely.
//!
//! ## Outer Joins
//!
//! A predicate above a left outer join that can never be true on a null-extended
//! row turns the join into an inner join. Conjuncts over the preserved side move
//! down; conjuncts over the null-extended side stay above.
//!
//! ## Interaction with Filter Pull-up
//!
//! Join simplification pulls filters out of join inputs and marks the pulled filter
//! so that this family leaves it alone for the rest of the pass.

use planc_core::expr::{DataType, Op, OpType};
use planc_core::pattern::Pattern;
use planc_core::predicate::{conjunction, conjuncts, preserves_nulls, split_by_references};
use planc_core::{
    Command, NodeId, Rule, RuleResult, RuleSignals, Suppression, TransformationContext, VarList,
    VarSet,
};
use std::collections::HashMap;
use tracing::trace;

/// Split `pred` into the conjunction of parts referencing only `defs` and the
/// conjunction of the rest.
fn split_predicate(
    cmd: &mut Command,
    pred: NodeId,
    defs: &VarSet,
) -> (Option<NodeId>, Option<NodeId>) {
    let parts = conjuncts(cmd, pred);
    let (inside, outside) = split_by_references(cmd, &parts, defs);
    (conjunction(cmd, &inside), conjunction(cmd, &outside))
}

/// `node` under an optional residual filter.
fn with_residual(cmd: &mut Command, node: NodeId, residual: Option<NodeId>) -> NodeId {
    match residual {
        Some(pred) => cmd.create_node(Op::Filter, vec![node, pred]),
        None => node,
    }
}

// ---------------------------------------------------------------------------
// Filter(X, true | false)
// ---------------------------------------------------------------------------

/// A literal predicate. `true` is dropped. `false` replaces the input by a single
/// empty row source whose columns are all null, so nothing above can observe the
/// input any more.
pub struct FilterWithConstantPredicateRule;

impl Rule for FilterWithConstantPredicateRule {
    fn name(&self) -> &str {
        "FilterWithConstantPredicate"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(OpType::Filter, 2, 1, Pattern::op(OpType::ConstantPredicate))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let input = ctx.command.child(node, 0);
        let pred = ctx.command.child(node, 1);
        let Op::ConstantPredicate(value) = *ctx.command.op(pred) else {
            return Ok(None);
        };
        if value {
            return Ok(Some(input));
        }

        let already_empty = match ctx.command.op(input) {
            Op::SingleRowTable => true,
            Op::Project { .. } => {
                matches!(ctx.command.op(ctx.command.child(input, 0)), Op::SingleRowTable)
            }
            _ => false,
        };
        if already_empty {
            return Ok(None);
        }

        let old_defs: Vec<_> = ctx.command.info(input).definitions.iter().collect();
        let mut defs = Vec::with_capacity(old_defs.len().max(1));
        let mut outputs = VarList::new();
        for old in old_defs {
            let data_type = ctx.command.var_type(old);
            let null = ctx.command.null(data_type);
            let (def, new) = ctx.command.create_var_def(null);
            ctx.add_var_mapping(old, new);
            defs.push(def);
            outputs.push(new);
        }
        if defs.is_empty() {
            let null = ctx.command.null(DataType::Bool);
            let (def, new) = ctx.command.create_var_def(null);
            defs.push(def);
            outputs.push(new);
        }

        let cmd = &mut *ctx.command;
        let srt = cmd.leaf(Op::SingleRowTable);
        let filter = cmd.create_node(Op::Filter, vec![srt, pred]);
        let defs = cmd.var_def_list(defs);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![filter, defs])))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// Filter(Filter(X, p1), p2)
// ---------------------------------------------------------------------------

pub struct FilterOverFilterRule;

impl Rule for FilterOverFilterRule {
    fn name(&self) -> &str {
        "FilterOverFilter"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, OpType::Filter)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let inner = cmd.child(node, 0);
        let outer_pred = cmd.child(node, 1);
        let input = cmd.child(inner, 0);
        let inner_pred = cmd.child(inner, 1);
        let pred = cmd.and(inner_pred, outer_pred);
        Ok(Some(cmd.create_node(Op::Filter, vec![input, pred])))
    }
}

// ---------------------------------------------------------------------------
// Filter(Project(X, defs), p)
// ---------------------------------------------------------------------------

pub struct FilterOverProjectRule;

impl Rule for FilterOverProjectRule {
    fn name(&self) -> &str {
        "FilterOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, OpType::Project)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let project = ctx.command.child(node, 0);
        let pred = ctx.command.child(node, 1);
        if matches!(ctx.command.op(pred), Op::ConstantPredicate(_)) {
            return Ok(None);
        }
        let Op::Project { outputs } = ctx.command.op(project).clone() else {
            return Ok(None);
        };
        let input = ctx.command.child(project, 0);
        let defs = ctx.command.child(project, 1);

        let mut ref_counts = HashMap::new();
        if ctx.is_scalar_op_tree(pred, &mut ref_counts).is_none() {
            return Ok(None);
        }
        let Some(var_map) = ctx.get_var_map(defs, &ref_counts) else {
            return Ok(None);
        };

        let pred = ctx.remap(pred, &var_map);
        let cmd = &mut *ctx.command;
        let filter = cmd.create_node(Op::Filter, vec![input, pred]);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![filter, defs])))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// Filter(SetOp(A, B), p)
// ---------------------------------------------------------------------------

/// Pushes the conjuncts over set-operator outputs into the branches, rewritten in
/// terms of each branch's own Vars. Only the left branch of an `Except` is
/// filtered; the right one is what gets subtracted.
pub struct FilterOverSetOpRule {
    pub set_op: OpType,
}

impl Rule for FilterOverSetOpRule {
    fn name(&self) -> &str {
        match self.set_op {
            OpType::UnionAll => "FilterOverUnionAll",
            OpType::Intersect => "FilterOverIntersect",
            _ => "FilterOverExcept",
        }
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, self.set_op)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let set_op = ctx.command.child(node, 0);
        let pred = ctx.command.child(node, 1);
        let op = ctx.command.op(set_op).clone();
        let Some(vars) = op.set_op_vars().cloned() else {
            return Ok(None);
        };

        let (pushed, residual) = split_predicate(ctx.command, pred, &vars.outputs);
        let Some(pushed) = pushed else {
            return Ok(None);
        };
        if ctx.is_scalar_op_tree(pushed, &mut HashMap::new()).is_none() {
            return Ok(None);
        }

        let branches = if self.set_op == OpType::Except { 1 } else { 2 };
        let mut children = ctx.command.children(set_op).to_vec();
        for (i, child) in children.iter_mut().enumerate().take(branches) {
            let mut var_map = HashMap::new();
            for (output, branch_var) in vars.var_maps[i].iter() {
                var_map.insert(output, ctx.command.var_ref(branch_var));
            }
            let copy = ctx.command.copy_subtree(pushed);
            let branch_pred = ctx.remap(copy, &var_map);
            *child = ctx.command.create_node(Op::Filter, vec![*child, branch_pred]);
        }

        let cmd = &mut *ctx.command;
        let new_set_op = cmd.create_node(op, children);
        Ok(Some(with_residual(cmd, new_set_op, residual)))
    }
}

// ---------------------------------------------------------------------------
// Filter(Distinct(X), p)
// ---------------------------------------------------------------------------

pub struct FilterOverDistinctRule;

impl Rule for FilterOverDistinctRule {
    fn name(&self) -> &str {
        "FilterOverDistinct"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, OpType::Distinct)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let distinct = cmd.child(node, 0);
        let pred = cmd.child(node, 1);
        let Op::Distinct { keys } = cmd.op(distinct).clone() else {
            return Ok(None);
        };
        let (pushed, residual) = split_predicate(cmd, pred, &keys.to_set());
        let Some(pushed) = pushed else {
            return Ok(None);
        };
        let input = cmd.child(distinct, 0);
        let filter = cmd.create_node(Op::Filter, vec![input, pushed]);
        let new_distinct = cmd.create_node(Op::Distinct { keys }, vec![filter]);
        Ok(Some(with_residual(cmd, new_distinct, residual)))
    }
}

// ---------------------------------------------------------------------------
// Filter(GroupBy(X, keys, aggs), p)
// ---------------------------------------------------------------------------

/// Conjuncts over grouping keys filter whole groups, so they can filter the input
/// rows instead. A grouping without keys always produces one row, even over an
/// empty input, and is left alone.
pub struct FilterOverGroupByRule;

impl Rule for FilterOverGroupByRule {
    fn name(&self) -> &str {
        "FilterOverGroupBy"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, OpType::GroupBy)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let group_by = ctx.command.child(node, 0);
        let pred = ctx.command.child(node, 1);
        let op = ctx.command.op(group_by).clone();
        let Op::GroupBy { keys, .. } = &op else {
            return Ok(None);
        };
        if keys.is_empty() {
            return Ok(None);
        }

        let mut ref_counts = HashMap::new();
        if ctx.is_scalar_op_tree(pred, &mut ref_counts).is_none() {
            return Ok(None);
        }
        let (pushed, residual) = split_predicate(ctx.command, pred, keys);
        let Some(pushed) = pushed else {
            return Ok(None);
        };
        let key_defs = ctx.command.child(group_by, 1);
        let Some(var_map) = ctx.get_var_map(key_defs, &ref_counts) else {
            return Ok(None);
        };
        let pushed = ctx.remap(pushed, &var_map);

        let cmd = &mut *ctx.command;
        let children = cmd.children(group_by).to_vec();
        let filter = cmd.create_node(Op::Filter, vec![children[0], pushed]);
        let new_group_by = cmd.create_node(op, vec![filter, children[1], children[2]]);
        Ok(Some(with_residual(cmd, new_group_by, residual)))
    }
}

// ---------------------------------------------------------------------------
// Filter(Join(L, R[, c]), p)
// ---------------------------------------------------------------------------

/// Distributes the conjuncts of a filter over a join.
///
/// | Conjunct references | Cross / Inner          | Left outer           |
/// |---------------------|------------------------|----------------------|
/// | left only           | filter on left         | filter on left       |
/// | right only          | filter on right        | stays above          |
/// | both sides          | join condition         | stays above          |
/// | outer Vars too      | stays above            | stays above          |
///
/// Base table scans are not wrapped in a filter of their own; their conjuncts go
/// into the join condition instead.
pub struct FilterOverJoinRule {
    pub join: OpType,
}

impl FilterOverJoinRule {
    fn is_outer(&self) -> bool {
        self.join == OpType::LeftOuterJoin
    }
}

impl Rule for FilterOverJoinRule {
    fn name(&self) -> &str {
        match self.join {
            OpType::CrossJoin => "FilterOverCrossJoin",
            OpType::InnerJoin => "FilterOverInnerJoin",
            _ => "FilterOverLeftOuterJoin",
        }
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, self.join)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        if ctx.is_suppressed(node, Suppression::FilterPushdown) {
            return Ok(None);
        }
        let cmd = &mut *ctx.command;
        let join = cmd.child(node, 0);
        let pred = cmd.child(node, 1);
        let left = cmd.child(join, 0);
        let right = cmd.child(join, 1);
        let cond = cmd.children(join).get(2).copied();
        let left_defs = cmd.info(left).definitions.clone();
        let right_defs = cmd.info(right).definitions.clone();

        if self.is_outer() && !preserves_nulls(cmd, pred, &right_defs) {
            trace!("Filter over left outer join at {} rejects nulls; using inner join", node);
            let Some(cond) = cond else {
                return Ok(None);
            };
            let inner = cmd.create_node(Op::InnerJoin, vec![left, right, cond]);
            return Ok(Some(cmd.create_node(Op::Filter, vec![inner, pred])));
        }

        let left_is_scan = matches!(cmd.op(left), Op::ScanTable { .. });
        let right_is_scan = matches!(cmd.op(right), Op::ScanTable { .. });
        let both_defs = left_defs.union(&right_defs);

        let mut to_left = Vec::new();
        let mut to_right = Vec::new();
        let mut to_cond = Vec::new();
        let mut residual = Vec::new();
        for part in conjuncts(cmd, pred) {
            let refs = &cmd.info(part).external_references;
            if left_defs.subsumes(refs) && !left_is_scan {
                to_left.push(part);
            } else if right_defs.subsumes(refs) && !right_is_scan && !self.is_outer() {
                to_right.push(part);
            } else if both_defs.subsumes(refs) && !self.is_outer() {
                to_cond.push(part);
            } else {
                residual.push(part);
            }
        }
        if to_left.is_empty() && to_right.is_empty() && to_cond.is_empty() {
            return Ok(None);
        }

        let new_left = match conjunction(cmd, &to_left) {
            Some(p) => cmd.create_node(Op::Filter, vec![left, p]),
            None => left,
        };
        let new_right = match conjunction(cmd, &to_right) {
            Some(p) => cmd.create_node(Op::Filter, vec![right, p]),
            None => right,
        };
        let extra = conjunction(cmd, &to_cond);
        let new_join = match (self.join, cond, extra) {
            (OpType::CrossJoin, _, Some(extra)) => {
                cmd.create_node(Op::InnerJoin, vec![new_left, new_right, extra])
            }
            (OpType::CrossJoin, _, None) => {
                cmd.create_node(Op::CrossJoin, vec![new_left, new_right])
            }
            (_, Some(cond), extra) => {
                let cond = match extra {
                    Some(extra) => cmd.and(cond, extra),
                    None => cond,
                };
                let op = cmd.op(join).clone();
                cmd.create_node(op, vec![new_left, new_right, cond])
            }
            (_, None, _) => return Ok(None),
        };
        let residual = conjunction(cmd, &residual);
        Ok(Some(with_residual(cmd, new_join, residual)))
    }

    fn signals(&self) -> RuleSignals {
        if self.is_outer() {
            RuleSignals::REAPPLY_NULLABILITY
        } else {
            RuleSignals::NONE
        }
    }
}

// ---------------------------------------------------------------------------
// Filter(OuterApply(L, R), p)
// ---------------------------------------------------------------------------

/// A predicate that rejects the null-extended rows of an outer apply makes it a
/// cross apply.
pub struct FilterOverOuterApplyRule;

impl Rule for FilterOverOuterApplyRule {
    fn name(&self) -> &str {
        "FilterOverOuterApply"
    }

    fn op_type(&self) -> OpType {
        OpType::Filter
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Filter, 2, OpType::OuterApply)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let apply = cmd.child(node, 0);
        let pred = cmd.child(node, 1);
        let left = cmd.child(apply, 0);
        let right = cmd.child(apply, 1);
        let right_defs = cmd.info(right).definitions.clone();
        if preserves_nulls(cmd, pred, &right_defs) {
            return Ok(None);
        }
        let cross = cmd.create_node(Op::CrossApply, vec![left, right]);
        Ok(Some(cmd.create_node(Op::Filter, vec![cross, pred])))
    }
}
