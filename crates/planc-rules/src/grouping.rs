//! # Grouping and Duplicate Elimination
//!
//! - `GroupByWithSimpleVarRedefinitions`: a grouping key that only renames an
//!   input Var groups on the input Var directly.
//! - `GroupByOverProject`: aggregate arguments absorb the projection below them.
//! - `GroupByWithNoAggregates`: a grouping that computes nothing is a duplicate
//!   elimination, or a plain projection when its keys are already unique.
//! - `DistinctOfKeys`: duplicate elimination over a set of columns that already
//!   contains a key of the input does nothing.
//! - `GroupByOnAllInputColumnsWithAggregate`: an aggregate grouped by every column
//!   of a keyed table, and exposed alone at the root, is computed per row through
//!   an outer apply correlated on the table key.
//!
//! ```text
//! Before: GroupBy{k}(X, [k := x], [])          After: Distinct{x}(Project{x}(X, []))
//! Before: Distinct{id, name}(Scan(T, key=id))  After: Project{id, name}(Scan(T), [])
//! ```

use planc_core::expr::{CompareOp, Op, OpType};
use planc_core::pattern::Pattern;
use planc_core::var::VarKind;
use planc_core::{
    Command, NodeId, Rule, RuleResult, RuleSignals, TransformationContext, Var, VarList, VarSet,
};
use std::collections::HashMap;
use tracing::trace;

/// `(keys, outputs)` of a `GroupBy` node.
fn group_by_vars(cmd: &Command, node: NodeId) -> Option<(VarSet, VarSet)> {
    match cmd.op(node) {
        Op::GroupBy { keys, outputs } => Some((keys.clone(), outputs.clone())),
        _ => None,
    }
}

/// Whether rows of `input` are already unique over `vars`.
fn unique_over(cmd: &Command, input: NodeId, vars: &VarSet) -> bool {
    let keys = &cmd.info(input).keys;
    !keys.no_keys && vars.subsumes(&keys.key_vars)
}

// ---------------------------------------------------------------------------
// Key renames
// ---------------------------------------------------------------------------

pub struct GroupByWithSimpleVarRedefinitionsRule;

impl Rule for GroupByWithSimpleVarRedefinitionsRule {
    fn name(&self) -> &str {
        "GroupByWithSimpleVarRedefinitions"
    }

    fn op_type(&self) -> OpType {
        OpType::GroupBy
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((mut keys, mut outputs)) = group_by_vars(ctx.command, node) else {
            return Ok(None);
        };
        let children = ctx.command.children(node).to_vec();
        let external = ctx.command.info(node).external_references.clone();

        let mut kept = Vec::new();
        let mut renames = Vec::new();
        for def in ctx.command.children(children[1]) {
            let (Op::VarDef(var), Some(expr)) =
                (ctx.command.op(*def), ctx.command.children(*def).first())
            else {
                kept.push(*def);
                continue;
            };
            match ctx.command.op(*expr) {
                Op::VarRef(x) if !external.contains(*x) => renames.push((*var, *x)),
                _ => kept.push(*def),
            }
        }
        if renames.is_empty() {
            return Ok(None);
        }
        for (var, x) in renames {
            for set in [&mut keys, &mut outputs] {
                if set.remove(var) {
                    set.insert(x);
                }
            }
            ctx.add_var_mapping(var, x);
        }

        let cmd = &mut *ctx.command;
        let key_defs = cmd.var_def_list(kept);
        Ok(Some(cmd.create_node(
            Op::GroupBy { keys, outputs },
            vec![children[0], key_defs, children[2]],
        )))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// GroupBy(Project(X, defs), [], aggs)
// ---------------------------------------------------------------------------

/// Substitutes projected definitions into the aggregate arguments and groups the
/// projection's input directly. Only applies when the grouping keys pass through
/// the projection unchanged and every substituted definition is used once.
pub struct GroupByOverProjectRule;

impl Rule for GroupByOverProjectRule {
    fn name(&self) -> &str {
        "GroupByOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::GroupBy
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::GroupBy, 3, OpType::Project)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((_, outputs)) = group_by_vars(ctx.command, node) else {
            return Ok(None);
        };
        let children = ctx.command.children(node).to_vec();
        let (project, key_defs, aggs) = (children[0], children[1], children[2]);
        if !ctx.command.children(key_defs).is_empty() {
            return Ok(None);
        }
        if outputs.overlaps(&ctx.command.info(project).local_definitions) {
            return Ok(None);
        }

        let mut ref_counts = HashMap::new();
        for def in ctx.command.children(aggs) {
            for arg in ctx.command.children(ctx.command.child(*def, 0)) {
                if ctx.is_scalar_op_tree(*arg, &mut ref_counts).is_none() {
                    return Ok(None);
                }
            }
        }

        let mut var_map = HashMap::new();
        let project_defs = ctx.command.child(project, 1);
        for def in ctx.command.children(project_defs) {
            let Op::VarDef(var) = *ctx.command.op(*def) else {
                return Ok(None);
            };
            let Some(&count) = ref_counts.get(&var) else {
                continue;
            };
            let expr = ctx.command.child(*def, 0);
            let literal = matches!(
                ctx.command.op(expr),
                Op::Constant(_) | Op::InternalConstant(_) | Op::NullSentinel | Op::Null(_)
            );
            if literal || count > 1 || ctx.is_scalar_op_tree(expr, &mut HashMap::new()).is_none() {
                return Ok(None);
            }
            var_map.insert(var, expr);
        }

        let agg_defs = ctx.command.children(aggs).to_vec();
        for def in agg_defs {
            let agg = ctx.command.child(def, 0);
            ctx.remap(agg, &var_map);
            ctx.command.recompute_node_info(def);
        }
        ctx.command.recompute_node_info(aggs);

        let op = ctx.command.op(node).clone();
        let input = ctx.command.child(project, 0);
        Ok(Some(ctx.command.create_node(op, vec![input, key_defs, aggs])))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}

// ---------------------------------------------------------------------------
// GroupBy(X, keyDefs, [])
// ---------------------------------------------------------------------------

pub struct GroupByWithNoAggregatesRule;

impl Rule for GroupByWithNoAggregatesRule {
    fn name(&self) -> &str {
        "GroupByWithNoAggregates"
    }

    fn op_type(&self) -> OpType {
        OpType::GroupBy
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((keys, _)) = group_by_vars(ctx.command, node) else {
            return Ok(None);
        };
        let children = ctx.command.children(node).to_vec();
        if keys.is_empty() || !ctx.command.children(children[2]).is_empty() {
            return Ok(None);
        }
        let (input, key_defs) = (children[0], children[1]);
        let already_unique = unique_over(ctx.command, input, &keys);

        let cmd = &mut *ctx.command;
        let key_list: VarList = keys.iter().collect();
        let project = cmd.create_node(
            Op::Project {
                outputs: key_list.clone(),
            },
            vec![input, key_defs],
        );
        if already_unique {
            return Ok(Some(project));
        }
        Ok(Some(cmd.create_node(Op::Distinct { keys: key_list }, vec![project])))
    }
}

// ---------------------------------------------------------------------------
// Distinct over a key
// ---------------------------------------------------------------------------

pub struct DistinctOfKeysRule;

impl Rule for DistinctOfKeysRule {
    fn name(&self) -> &str {
        "DistinctOfKeys"
    }

    fn op_type(&self) -> OpType {
        OpType::Distinct
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::Distinct { keys } = ctx.command.op(node).clone() else {
            return Ok(None);
        };
        let input = ctx.command.child(node, 0);
        if !unique_over(ctx.command, input, &keys.to_set()) {
            return Ok(None);
        }
        let cmd = &mut *ctx.command;
        let empty = cmd.var_def_list(vec![]);
        Ok(Some(cmd.create_node(Op::Project { outputs: keys }, vec![input, empty])))
    }
}

// ---------------------------------------------------------------------------
// GroupBy(Scan(T), [], aggs) grouped on every column of T
// ---------------------------------------------------------------------------

/// `GroupBy{cols(T), agg}(Scan(T), [], aggs)` under a root that exposes only `agg`
/// becomes `Project{agg}(OuterApply(Scan(T'), GroupBy{agg}(Filter(Scan(T),
/// key(T') = key(T)), [], aggs)), [])`.
///
/// Each group of the original holds exactly one row, so the table needs a key
/// whose columns are declared non-nullable.
pub struct GroupByOnAllInputColumnsWithAggregateRule;

impl Rule for GroupByOnAllInputColumnsWithAggregateRule {
    fn name(&self) -> &str {
        "GroupByOnAllInputColumnsWithAggregate"
    }

    fn op_type(&self) -> OpType {
        OpType::GroupBy
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::GroupBy, 3, OpType::ScanTable)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((keys, outputs)) = group_by_vars(ctx.command, node) else {
            return Ok(None);
        };
        let Some(exposed) = exposed_by_parent_root(ctx) else {
            return Ok(None);
        };
        let cmd = &mut *ctx.command;
        let children = cmd.children(node).to_vec();
        let (scan, key_defs, aggs) = (children[0], children[1], children[2]);
        let Op::ScanTable {
            table,
            columns,
            keys: table_keys,
        } = cmd.op(scan).clone()
        else {
            return Ok(None);
        };
        if !cmd.children(key_defs).is_empty() || table_keys.is_empty() {
            return Ok(None);
        }
        let column_set = columns.to_set();
        if !keys.subsumes(&column_set) {
            return Ok(None);
        }
        let aggregate_outputs = outputs.difference(&column_set);
        if !aggregate_outputs.contains(exposed) {
            return Ok(None);
        }
        let has_aggregate = cmd.children(aggs).iter().any(|def| {
            cmd.children(*def)
                .first()
                .is_some_and(|expr| cmd.op_type(*expr) == OpType::Aggregate)
        });
        if !has_aggregate {
            return Ok(None);
        }
        for key in table_keys.iter() {
            if cmd.var_info(key)?.nullable {
                return Ok(None);
            }
        }

        let mut fresh: HashMap<Var, Var> = HashMap::new();
        for column in columns.iter() {
            let info = cmd.var_info(column)?.clone();
            let VarKind::Column { table: source, column: name } = &info.kind else {
                return Ok(None);
            };
            let copy = cmd.create_column_var(source, name, info.data_type, info.nullable);
            fresh.insert(column, copy);
        }
        let rename = |v: Var| fresh.get(&v).copied().unwrap_or(v);
        let outer_scan = cmd.leaf(Op::ScanTable {
            table,
            columns: columns.iter().map(rename).collect(),
            keys: table_keys.iter().map(rename).collect(),
        });

        let mut condition = None;
        for key in table_keys.iter() {
            let outer = cmd.var_ref(rename(key));
            let inner = cmd.var_ref(key);
            let eq = cmd.create_node(Op::Comparison(CompareOp::Eq), vec![outer, inner]);
            condition = Some(match condition {
                Some(prev) => cmd.and(prev, eq),
                None => eq,
            });
        }
        let Some(condition) = condition else {
            return Ok(None);
        };

        trace!(
            "Grouping on every column of {} rewritten as a per-row outer apply",
            scan
        );
        let filter = cmd.create_node(Op::Filter, vec![scan, condition]);
        let per_row = cmd.create_node(
            Op::GroupBy {
                keys: VarSet::new(),
                outputs: aggregate_outputs,
            },
            vec![filter, key_defs, aggs],
        );
        let apply = cmd.create_node(Op::OuterApply, vec![outer_scan, per_row]);
        let no_defs = cmd.var_def_list(vec![]);
        Ok(Some(cmd.create_node(
            Op::Project {
                outputs: [exposed].into_iter().collect(),
            },
            vec![apply, no_defs],
        )))
    }
}

/// The single Var exposed by the root, when the root is a `PhysicalProject`
/// directly above the node being rewritten.
fn exposed_by_parent_root(ctx: &TransformationContext<'_>) -> Option<Var> {
    let ancestors = ctx.ancestors();
    let parent = *ancestors.len().checked_sub(2).and_then(|i| ancestors.get(i))?;
    if ctx.command.root() != Some(parent) {
        return None;
    }
    match ctx.command.op(parent) {
        Op::PhysicalProject { outputs } => match outputs.as_slice() {
            [only] => Some(*only),
            _ => None,
        },
        _ => None,
    }
}
