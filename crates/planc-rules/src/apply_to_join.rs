//! # Apply Elimination
//!
//! An apply evaluates its right input once per left row. Most of the time the
//! right input only depends on the left row through a filter predicate or a
//! projection, and the apply can become an ordinary join.
//!
//! ```text
//! Before: CrossApply(L, R)                 (R free of L)   After: CrossJoin(L, R)
//! Before: OuterApply(L, R)                 (R free of L)   After: LeftOuterJoin(L, R, true)
//! Before: CrossApply(L, Filter(R, p))      (R free of L)   After: InnerJoin(L, R, p)
//! Before: CrossApply(L, Project(X, defs))                  After: Project(CrossApply(L, X), defs)
//! ```
//!
//! ## Outer Apply over a Projection
//!
//! Pulling a projection above an outer apply changes what its definitions see on
//! null-extended rows: a constant defined under the apply is null on those rows,
//! above it is not. Each non-trivial definition is therefore guarded with a
//! non-null *sentinel* Var of the right input, `Case(IsNull(s), null, expr)`. When
//! the right input has no non-null Var, a one-column projection defining a
//! constant sentinel is inserted first.
//!
//! ## Scalar Subqueries
//!
//! An apply whose right side yields one column and at most one row is a scalar
//! subquery. It becomes a projection over the left input that defines the column
//! as `Element(R)`.

use planc_core::expr::{DataType, Op, OpType, ScalarValue};
use planc_core::node_info::RowCount;
use planc_core::pattern::Pattern;
use planc_core::remap::remap_op;
use planc_core::{
    Command, NodeId, Rule, RuleResult, RuleSignals, TransformationContext, Var, VarList, VarSet,
};
use tracing::trace;

fn apply_name(apply: OpType, suffix: &str) -> String {
    let prefix = match apply {
        OpType::CrossApply => "CrossApply",
        _ => "OuterApply",
    };
    format!("{prefix}{suffix}")
}

/// First non-null Var defined by `node`, preferring `Int64` ones when asked.
fn sentinel_of(cmd: &Command, node: NodeId, prefer_int: bool) -> Option<Var> {
    let non_nullable = &cmd.info(node).non_nullable_definitions;
    if prefer_int {
        if let Some(v) = non_nullable
            .iter()
            .find(|v| cmd.var_type(*v) == DataType::Int64)
        {
            return Some(v);
        }
    }
    non_nullable.first()
}

fn is_sentinel_like(op: &Op) -> bool {
    matches!(op, Op::InternalConstant(_) | Op::NullSentinel)
}

// ---------------------------------------------------------------------------
// Apply(L, R) with R free of L
// ---------------------------------------------------------------------------

/// An uncorrelated apply is a join. An outer apply whose right side always has a
/// row can never null-extend, so it is a cross apply whether correlated or not.
pub struct ApplyOverAnythingRule {
    pub apply: OpType,
    name: String,
}

impl ApplyOverAnythingRule {
    pub fn new(apply: OpType) -> Self {
        Self {
            apply,
            name: apply_name(apply, "OverAnything"),
        }
    }
}

impl Rule for ApplyOverAnythingRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.apply
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let left = cmd.child(node, 0);
        let right = cmd.child(node, 1);
        let always_matches =
            self.apply == OpType::OuterApply && cmd.info(right).min_rows >= RowCount::One;
        let correlated = cmd
            .info(right)
            .external_references
            .overlaps(&cmd.info(left).definitions);

        if correlated {
            if always_matches {
                return Ok(Some(cmd.create_node(Op::CrossApply, vec![left, right])));
            }
            return Ok(None);
        }
        if self.apply == OpType::CrossApply || always_matches {
            return Ok(Some(cmd.create_node(Op::CrossJoin, vec![left, right])));
        }
        let cond = cmd.constant_predicate(true);
        Ok(Some(cmd.create_node(Op::LeftOuterJoin, vec![left, right, cond])))
    }
}

// ---------------------------------------------------------------------------
// Apply(L, Filter(R, p)) with R free of L
// ---------------------------------------------------------------------------

/// The correlation lives only in the filter predicate, which becomes the join
/// condition.
pub struct ApplyOverFilterRule {
    pub apply: OpType,
    name: String,
}

impl ApplyOverFilterRule {
    pub fn new(apply: OpType) -> Self {
        Self {
            apply,
            name: apply_name(apply, "OverFilter"),
        }
    }
}

impl Rule for ApplyOverFilterRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.apply
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(self.apply, 2, 1, Pattern::op(OpType::Filter))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let left = cmd.child(node, 0);
        let filter = cmd.child(node, 1);
        let input = cmd.child(filter, 0);
        let pred = cmd.child(filter, 1);
        if cmd
            .info(input)
            .external_references
            .overlaps(&cmd.info(left).definitions)
        {
            return Ok(None);
        }
        let join = match self.apply {
            OpType::CrossApply => Op::InnerJoin,
            _ => Op::LeftOuterJoin,
        };
        Ok(Some(cmd.create_node(join, vec![left, input, pred])))
    }
}

// ---------------------------------------------------------------------------
// CrossApply(L, Project(X, defs))
// ---------------------------------------------------------------------------

pub struct CrossApplyOverProjectRule;

impl Rule for CrossApplyOverProjectRule {
    fn name(&self) -> &str {
        "CrossApplyOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::CrossApply
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(OpType::CrossApply, 2, 1, Pattern::op(OpType::Project))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let left = cmd.child(node, 0);
        let project = cmd.child(node, 1);
        let Op::Project { outputs } = cmd.op(project).clone() else {
            return Ok(None);
        };
        let input = cmd.child(project, 0);
        let defs = cmd.child(project, 1);

        let mut outputs = outputs;
        outputs.extend(cmd.info(left).definitions.iter());
        let apply = cmd.create_node(Op::CrossApply, vec![left, input]);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![apply, defs])))
    }
}

// ---------------------------------------------------------------------------
// OuterApply(L, Project(X, defs))
// ---------------------------------------------------------------------------

pub struct OuterApplyOverProjectRule;

impl Rule for OuterApplyOverProjectRule {
    fn name(&self) -> &str {
        "OuterApplyOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::OuterApply
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(OpType::OuterApply, 2, 1, Pattern::op(OpType::Project))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let left = ctx.command.child(node, 0);
        let project = ctx.command.child(node, 1);
        let Op::Project { outputs } = ctx.command.op(project).clone() else {
            return Ok(None);
        };
        let input = ctx.command.child(project, 0);
        let def_list = ctx.command.child(project, 1);
        let defs = ctx.command.children(def_list).to_vec();

        let existing = sentinel_of(ctx.command, input, false);
        if existing.is_none() {
            if let [only] = defs.as_slice() {
                let expr = ctx.command.child(*only, 0);
                if is_sentinel_like(ctx.command.op(expr)) {
                    // Already the shape a sentinel projection would produce.
                    return Ok(None);
                }
            }
        }

        let (sentinel, new_right, dummy) = match existing {
            Some(s) => (s, input, false),
            None => {
                let cmd = &mut *ctx.command;
                let one = cmd.leaf(Op::InternalConstant(ScalarValue::Int64(1)));
                let (def, s) = cmd.create_var_def(one);
                let def_list = cmd.var_def_list(vec![def]);
                let mut dummy_outputs: VarList = [s].into_iter().collect();
                dummy_outputs.extend(cmd.info(input).definitions.iter());
                let dummy = cmd.create_node(
                    Op::Project {
                        outputs: dummy_outputs,
                    },
                    vec![input, def_list],
                );
                (s, dummy, true)
            }
        };
        trace!("Outer apply {} guarded by sentinel {}", node, sentinel);

        let input_defs = ctx.command.info(input).definitions.clone();
        let mut new_defs = Vec::with_capacity(defs.len());
        for def in defs {
            let Op::VarDef(var) = *ctx.command.op(def) else {
                return Ok(None);
            };
            let expr = ctx.command.child(def, 0);
            let new_expr = match ctx.command.op(expr) {
                Op::VarRef(v) if input_defs.contains(*v) => {
                    new_defs.push(def);
                    continue;
                }
                Op::InternalConstant(ScalarValue::Int64(1)) | Op::NullSentinel if dummy => {
                    ctx.command.var_ref(sentinel)
                }
                _ => ctx.build_null_if_expression(sentinel, expr),
            };
            new_defs.push(ctx.command.var_def(var, new_expr));
        }

        let cmd = &mut *ctx.command;
        let mut outputs = outputs;
        outputs.extend(cmd.info(left).definitions.iter());
        let apply = cmd.create_node(Op::OuterApply, vec![left, new_right]);
        let def_list = cmd.var_def_list(new_defs);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![apply, def_list])))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// OuterApply(L, Project(Filter(X, p), [d := sentinel]))
// ---------------------------------------------------------------------------

/// The shape a correlated `EXISTS` leaves behind once its projection has been
/// given a sentinel: the filter predicate is the only correlation, so the apply
/// is a left outer join on it.
pub struct OuterApplyOverDummyProjectOverFilterRule;

impl Rule for OuterApplyOverDummyProjectOverFilterRule {
    fn name(&self) -> &str {
        "OuterApplyOverDummyProjectOverFilter"
    }

    fn op_type(&self) -> OpType {
        OpType::OuterApply
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(
            OpType::OuterApply,
            2,
            1,
            Pattern::over(OpType::Project, 2, OpType::Filter),
        )
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let left = ctx.command.child(node, 0);
        let project = ctx.command.child(node, 1);
        let Op::Project { outputs } = ctx.command.op(project).clone() else {
            return Ok(None);
        };
        let filter = ctx.command.child(project, 0);
        let def_list = ctx.command.child(project, 1);
        let &[def] = ctx.command.children(def_list) else {
            return Ok(None);
        };
        let Op::VarDef(var) = *ctx.command.op(def) else {
            return Ok(None);
        };
        let expr = ctx.command.child(def, 0);
        if !is_sentinel_like(ctx.command.op(expr)) {
            return Ok(None);
        }
        let input = ctx.command.child(filter, 0);
        let pred = ctx.command.child(filter, 1);

        let left_defs = ctx.command.info(left).definitions.clone();
        if outputs.to_set().overlaps(&left_defs)
            || ctx.command.info(input).external_references.overlaps(&left_defs)
        {
            return Ok(None);
        }

        match sentinel_of(ctx.command, input, true) {
            Some(sentinel) => {
                let int_sentinel = ctx.command.var_type(sentinel) == DataType::Int64;
                let new_expr = if matches!(ctx.command.op(expr), Op::NullSentinel)
                    && int_sentinel
                    && ctx.can_change_null_sentinel_value()
                {
                    ctx.command.var_ref(sentinel)
                } else {
                    ctx.build_null_if_expression(sentinel, expr)
                };
                let cmd = &mut *ctx.command;
                let new_def = cmd.var_def(var, new_expr);
                let join = cmd.create_node(Op::LeftOuterJoin, vec![left, input, pred]);
                let mut outputs = outputs;
                outputs.extend(cmd.info(join).definitions.iter());
                let def_list = cmd.var_def_list(vec![new_def]);
                Ok(Some(cmd.create_node(Op::Project { outputs }, vec![join, def_list])))
            }
            None => {
                let cmd = &mut *ctx.command;
                let needed: VarSet = cmd
                    .info(pred)
                    .external_references
                    .intersection(&cmd.info(input).definitions);
                let mut outputs = outputs;
                outputs.extend(needed.iter());
                let right = cmd.create_node(Op::Project { outputs }, vec![input, def_list]);
                Ok(Some(cmd.create_node(Op::LeftOuterJoin, vec![left, right, pred])))
            }
        }
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// CrossApply(L, LeftOuterJoin(SingleRowTable, R, true))
// ---------------------------------------------------------------------------

/// A left outer join of the single-row table with `R` yields `R`, or one null row
/// when `R` is empty: exactly what an outer apply adds per left row.
pub struct CrossApplyOverLeftOuterJoinOverSingleRowTableRule;

impl Rule for CrossApplyOverLeftOuterJoinOverSingleRowTableRule {
    fn name(&self) -> &str {
        "CrossApplyOverLeftOuterJoinOverSingleRowTable"
    }

    fn op_type(&self) -> OpType {
        OpType::CrossApply
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(
            OpType::CrossApply,
            2,
            1,
            Pattern::node(
                OpType::LeftOuterJoin,
                vec![
                    Pattern::op(OpType::SingleRowTable),
                    Pattern::Any,
                    Pattern::constant_predicate(true),
                ],
            ),
        )
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &mut *ctx.command;
        let left = cmd.child(node, 0);
        let join = cmd.child(node, 1);
        let right = cmd.child(join, 1);
        Ok(Some(cmd.create_node(Op::OuterApply, vec![left, right])))
    }
}

// ---------------------------------------------------------------------------
// Apply(L, R) where R is a scalar subquery
// ---------------------------------------------------------------------------

/// Rename `old` to `new` everywhere inside the subtree and refresh its NodeInfo.
fn rename_in_subtree(cmd: &mut Command, root: NodeId, old: Var, new: Var) {
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        let mut op = cmd.op(n).clone();
        remap_op(&mut op, |v| if v == old { new } else { v });
        if &op != cmd.op(n) {
            cmd.set_op(n, op);
        }
        stack.extend(cmd.children(n).iter().copied());
    }
    cmd.recompute_subtree(root);
}

pub struct ApplyIntoScalarSubqueryRule {
    pub apply: OpType,
    name: String,
}

impl ApplyIntoScalarSubqueryRule {
    pub fn new(apply: OpType) -> Self {
        Self {
            apply,
            name: apply_name(apply, "IntoScalarSubquery"),
        }
    }
}

impl Rule for ApplyIntoScalarSubqueryRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn op_type(&self) -> OpType {
        self.apply
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let left = ctx.command.child(node, 0);
        let right = ctx.command.child(node, 1);
        let info = ctx.command.info(right);
        if info.definitions.len() != 1 || info.max_rows > RowCount::One {
            return Ok(None);
        }
        if self.apply == OpType::CrossApply && info.min_rows < RowCount::One {
            return Ok(None);
        }
        let Some(old) = info.definitions.first() else {
            return Ok(None);
        };

        ctx.remap_subtree(right);
        let fresh_info = ctx.command.var_info(old)?.clone();
        let fresh = ctx.command.create_var(fresh_info);
        rename_in_subtree(ctx.command, right, old, fresh);

        let cmd = &mut *ctx.command;
        let element = cmd.create_node(Op::Element, vec![right]);
        let (def, new) = cmd.create_var_def(element);
        let mut outputs: VarList = cmd.info(left).definitions.iter().collect();
        outputs.push(new);
        let def_list = cmd.var_def_list(vec![def]);
        let project = cmd.create_node(Op::Project { outputs }, vec![left, def_list]);
        ctx.add_var_mapping(old, new);
        Ok(Some(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planc_core::expr::{AggFunc, CompareOp};
    use planc_core::RewriteConfig;

    fn scan(cmd: &mut Command, table: &str, cols: &[Var]) -> NodeId {
        cmd.leaf(Op::ScanTable {
            table: table.into(),
            columns: cols.iter().copied().collect(),
            keys: VarSet::new(),
        })
    }

    fn eq_vars(cmd: &mut Command, a: Var, b: Var) -> NodeId {
        let ar = cmd.var_ref(a);
        let br = cmd.var_ref(b);
        cmd.create_node(Op::Comparison(CompareOp::Eq), vec![ar, br])
    }

    fn run(rule: &dyn Rule, cmd: &mut Command, node: NodeId) -> Option<NodeId> {
        let config = RewriteConfig::default();
        let mut ctx = TransformationContext::new(cmd, &config);
        rule.apply(&mut ctx, node).unwrap()
    }

    #[test]
    fn test_uncorrelated_cross_apply_is_a_cross_join() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let apply = cmd.create_node(Op::CrossApply, vec![sa, sb]);
        let out = run(&ApplyOverAnythingRule::new(OpType::CrossApply), &mut cmd, apply)
            .expect("uncorrelated");
        assert_eq!(cmd.op(out), &Op::CrossJoin);
        assert_eq!(cmd.children(out), &[sa, sb]);
    }

    #[test]
    fn test_uncorrelated_outer_apply_is_a_left_outer_join() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let apply = cmd.create_node(Op::OuterApply, vec![sa, sb]);
        let out = run(&ApplyOverAnythingRule::new(OpType::OuterApply), &mut cmd, apply)
            .expect("uncorrelated");
        assert_eq!(cmd.op(out), &Op::LeftOuterJoin);
        assert_eq!(cmd.op(cmd.child(out, 2)), &Op::ConstantPredicate(true));
    }

    #[test]
    fn test_correlated_filter_becomes_the_join_condition() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let p = eq_vars(&mut cmd, a, b);
        let filter = cmd.create_node(Op::Filter, vec![sb, p]);
        let apply = cmd.create_node(Op::CrossApply, vec![sa, filter]);

        assert_eq!(
            run(&ApplyOverAnythingRule::new(OpType::CrossApply), &mut cmd, apply),
            None,
            "correlated"
        );
        let out = run(&ApplyOverFilterRule::new(OpType::CrossApply), &mut cmd, apply)
            .expect("correlation only in the predicate");
        assert_eq!(cmd.op(out), &Op::InnerJoin);
        assert_eq!(cmd.children(out), &[sa, sb, p]);
    }

    #[test]
    fn test_outer_apply_over_project_guards_constants() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, false);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let five = cmd.constant(ScalarValue::Int64(5));
        let (def, c) = cmd.create_var_def(five);
        let defs = cmd.var_def_list(vec![def]);
        let proj = cmd.create_node(
            Op::Project {
                outputs: [c].into_iter().collect(),
            },
            vec![sb, defs],
        );
        let apply = cmd.create_node(Op::OuterApply, vec![sa, proj]);
        let out = run(&OuterApplyOverProjectRule, &mut cmd, apply).expect("pulls up");
        assert_eq!(cmd.op_type(out), OpType::Project);
        assert_eq!(cmd.op_type(cmd.child(out, 0)), OpType::OuterApply);
        let new_def = cmd.child(cmd.child(out, 1), 0);
        let guarded = cmd.child(new_def, 0);
        assert_eq!(cmd.op(guarded), &Op::Case);
        assert!(cmd.referenced_vars(guarded).contains(b), "b is the sentinel");
    }

    #[test]
    fn test_outer_apply_over_project_adds_a_sentinel_when_none_exists() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let five = cmd.constant(ScalarValue::Int64(5));
        let (def, _) = cmd.create_var_def(five);
        let defs = cmd.var_def_list(vec![def]);
        let proj = cmd.create_node(
            Op::Project {
                outputs: VarList::new(),
            },
            vec![sb, defs],
        );
        let apply = cmd.create_node(Op::OuterApply, vec![sa, proj]);
        let out = run(&OuterApplyOverProjectRule, &mut cmd, apply).expect("pulls up");
        let new_apply = cmd.child(out, 0);
        let dummy = cmd.child(new_apply, 1);
        assert_eq!(cmd.op_type(dummy), OpType::Project);
        let sentinel_def = cmd.child(cmd.child(dummy, 1), 0);
        assert_eq!(
            cmd.op(cmd.child(sentinel_def, 0)),
            &Op::InternalConstant(ScalarValue::Int64(1))
        );

        assert_eq!(
            run(&OuterApplyOverProjectRule, &mut cmd, new_apply),
            None,
            "the sentinel projection is not pulled up again"
        );
    }

    #[test]
    fn test_exists_shape_becomes_left_outer_join() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, false);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let p = eq_vars(&mut cmd, a, b);
        let filter = cmd.create_node(Op::Filter, vec![sb, p]);
        let sentinel = cmd.leaf(Op::NullSentinel);
        let (def, s) = cmd.create_var_def(sentinel);
        let defs = cmd.var_def_list(vec![def]);
        let proj = cmd.create_node(
            Op::Project {
                outputs: [s].into_iter().collect(),
            },
            vec![filter, defs],
        );
        let apply = cmd.create_node(Op::OuterApply, vec![sa, proj]);
        cmd.set_root(apply);
        let out = run(&OuterApplyOverDummyProjectOverFilterRule, &mut cmd, apply)
            .expect("rewrites");
        assert_eq!(cmd.op_type(out), OpType::Project);
        let join = cmd.child(out, 0);
        assert_eq!(cmd.op(join), &Op::LeftOuterJoin);
        assert_eq!(cmd.children(join), &[sa, sb, p]);
        let new_def = cmd.child(cmd.child(out, 1), 0);
        assert_eq!(cmd.op(cmd.child(new_def, 0)), &Op::VarRef(b));
    }

    #[test]
    fn test_cross_apply_over_padded_right_is_outer_apply() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let srt = cmd.leaf(Op::SingleRowTable);
        let t = cmd.constant_predicate(true);
        let loj = cmd.create_node(Op::LeftOuterJoin, vec![srt, sb, t]);
        let apply = cmd.create_node(Op::CrossApply, vec![sa, loj]);
        let out = run(&CrossApplyOverLeftOuterJoinOverSingleRowTableRule, &mut cmd, apply)
            .expect("rewrites");
        assert_eq!(cmd.op(out), &Op::OuterApply);
        assert_eq!(cmd.children(out), &[sa, sb]);
    }

    #[test]
    fn test_scalar_subquery_is_projected_through_element() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("a", "id", DataType::Int64, true);
        let b = cmd.create_column_var("b", "id", DataType::Int64, true);
        let sa = scan(&mut cmd, "a", &[a]);
        let sb = scan(&mut cmd, "b", &[b]);
        let br = cmd.var_ref(b);
        let max = cmd.create_node(Op::Aggregate(AggFunc::Max), vec![br]);
        let (agg, m) = cmd.create_var_def(max);
        let keys = cmd.var_def_list(vec![]);
        let aggs = cmd.var_def_list(vec![agg]);
        let gb = cmd.create_node(
            Op::GroupBy {
                keys: VarSet::new(),
                outputs: [m].into_iter().collect(),
            },
            vec![sb, keys, aggs],
        );
        let apply = cmd.create_node(Op::CrossApply, vec![sa, gb]);

        let config = RewriteConfig::default();
        let mut ctx = TransformationContext::new(&mut cmd, &config);
        let rule = ApplyIntoScalarSubqueryRule::new(OpType::CrossApply);
        let out = rule.apply(&mut ctx, apply).unwrap().expect("one row, one column");
        let new_var = ctx.resolve_var(m);
        assert_ne!(new_var, m);
        let cmd = &*ctx.command;
        assert_eq!(cmd.op_type(out), OpType::Project);
        assert!(cmd.info(out).definitions.contains(new_var));
        assert!(
            !cmd.info(gb).definitions.contains(m),
            "the subquery no longer defines the replaced var"
        );
    }
}
