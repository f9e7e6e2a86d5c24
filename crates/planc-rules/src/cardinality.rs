//! # Cardinality-driven Rules
//!
//! Operators that become no-ops once the row-count bounds of their input are
//! known: sorting at most one row, limiting an empty input, asserting a single
//! row that is already guaranteed, set operations with an empty side.
//!
//! ```text
//! Before: Sort(X)                (X has at most one row)    After: X
//! Before: UnionAll(A, B)         (A is empty)               After: Project(B)
//! Before: Except(A, B)           (B is empty)               After: Distinct(A)
//! ```

use planc_core::expr::{Op, OpType};
use planc_core::node_info::RowCount;
use planc_core::pattern::Pattern;
use planc_core::predicate::satisfies_key;
use planc_core::{NodeId, Rule, RuleResult, TransformationContext, VarList};
use tracing::trace;

pub struct SortOverAtMostOneRowRule;

impl Rule for SortOverAtMostOneRowRule {
    fn name(&self) -> &str {
        "SortOverAtMostOneRow"
    }

    fn op_type(&self) -> OpType {
        OpType::Sort
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let input = ctx.command.child(node, 0);
        if ctx.command.info(input).max_rows > RowCount::One {
            return Ok(None);
        }
        Ok(Some(input))
    }
}

pub struct ConstrainedSortOverEmptySetRule;

impl Rule for ConstrainedSortOverEmptySetRule {
    fn name(&self) -> &str {
        "ConstrainedSortOverEmptySet"
    }

    fn op_type(&self) -> OpType {
        OpType::ConstrainedSort
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let input = ctx.command.child(node, 0);
        if ctx.command.info(input).max_rows != RowCount::Zero {
            return Ok(None);
        }
        Ok(Some(input))
    }
}

/// `SingleRow(X)` is `X` when `X` has at most one row, either by its bounds or
/// because it filters a keyed input down to a single key value.
pub struct SingleRowOverAnythingRule;

impl Rule for SingleRowOverAnythingRule {
    fn name(&self) -> &str {
        "SingleRowOverAnything"
    }

    fn op_type(&self) -> OpType {
        OpType::SingleRow
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &*ctx.command;
        let input = cmd.child(node, 0);
        if cmd.info(input).max_rows <= RowCount::One {
            return Ok(Some(input));
        }
        if !matches!(cmd.op(input), Op::Filter) {
            return Ok(None);
        }
        let filtered = cmd.child(input, 0);
        let pred = cmd.child(input, 1);
        let info = cmd.info(filtered);
        if info.keys.no_keys || !satisfies_key(cmd, pred, &info.keys.key_vars, &info.definitions) {
            return Ok(None);
        }
        Ok(Some(input))
    }
}

/// `SingleRow(Project(X, defs))` -> `Project(SingleRow(X), defs)`.
pub struct SingleRowOverProjectRule;

impl Rule for SingleRowOverProjectRule {
    fn name(&self) -> &str {
        "SingleRowOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::SingleRow
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::SingleRow, 1, OpType::Project)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let project = cmd.child(node, 0);
        let op = cmd.op(project).clone();
        let input = cmd.child(project, 0);
        let defs = cmd.child(project, 1);
        let single = cmd.create_node(Op::SingleRow, vec![input]);
        Ok(Some(cmd.create_node(op, vec![single, defs])))
    }
}

/// A set operation with an empty input is replaced by one of its inputs, with the
/// set operation's output Vars remapped to that input's Vars.
pub struct SetOpOverEmptySetRule {
    pub set_op: OpType,
}

impl Rule for SetOpOverEmptySetRule {
    fn name(&self) -> &str {
        match self.set_op {
            OpType::UnionAll => "UnionAllOverEmptySet",
            OpType::Intersect => "IntersectOverEmptySet",
            _ => "ExceptOverEmptySet",
        }
    }

    fn op_type(&self) -> OpType {
        self.set_op
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some(vars) = ctx.command.op(node).set_op_vars().cloned() else {
            return Ok(None);
        };
        let left = ctx.command.child(node, 0);
        let right = ctx.command.child(node, 1);
        let left_empty = ctx.command.info(left).max_rows == RowCount::Zero;
        let right_empty = ctx.command.info(right).max_rows == RowCount::Zero;
        if !left_empty && !right_empty {
            return Ok(None);
        }

        let keep = match self.set_op {
            OpType::UnionAll if left_empty && !right_empty => 1,
            OpType::Intersect if !left_empty => 1,
            _ => 0,
        };
        let branch = ctx.command.child(node, keep);
        trace!("Set operation {} has an empty input; keeping input {}", node, keep);

        let mut branch_vars = VarList::new();
        for (output, branch_var) in vars.var_maps[keep].iter() {
            ctx.add_var_mapping(output, branch_var);
            branch_vars.push(branch_var);
        }

        let cmd = &mut *ctx.command;
        if self.set_op == OpType::Except && right_empty && !left_empty {
            return Ok(Some(
                cmd.create_node(Op::Distinct { keys: branch_vars }, vec![branch]),
            ));
        }
        if cmd.info(branch).definitions == branch_vars.to_set() {
            return Ok(Some(branch));
        }
        let empty = cmd.var_def_list(vec![]);
        Ok(Some(cmd.create_node(
            Op::Project {
                outputs: branch_vars,
            },
            vec![branch, empty],
        )))
    }
}
