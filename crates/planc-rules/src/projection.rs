//! # Projection Rules
//!
//! Rules that shrink a `Project`: redundant null sentinels, definitions that only
//! rename an input Var, stacked projections and identity projections.
//!
//! Removing a definition never rewrites its references directly. The rule
//! registers `old -> new` with the context and the remapper rewrites every
//! reference before any other rule looks at it.

use planc_core::expr::{DataType, Op, OpType, ScalarValue};
use planc_core::pattern::Pattern;
use planc_core::{
    Command, NodeId, Rule, RuleResult, RuleSignals, TransformationContext, Var, VarList,
};
use std::collections::HashMap;
use tracing::trace;

/// `(var, expr)` for each definition in a `VarDefList`.
fn definitions(cmd: &Command, def_list: NodeId) -> Vec<(NodeId, Var, NodeId)> {
    cmd.children(def_list)
        .iter()
        .filter_map(|d| match cmd.op(*d) {
            Op::VarDef(v) => Some((*d, *v, cmd.child(*d, 0))),
            _ => None,
        })
        .collect()
}

fn project_parts(cmd: &Command, node: NodeId) -> Option<(VarList, NodeId, NodeId)> {
    let Op::Project { outputs } = cmd.op(node) else {
        return None;
    };
    Some((outputs.clone(), cmd.child(node, 0), cmd.child(node, 1)))
}

// ---------------------------------------------------------------------------
// Null sentinels
// ---------------------------------------------------------------------------

/// Null sentinels only promise to be non-null on real rows. A projection needs at
/// most one; where the sentinel's value may change, an existing non-null `Int64`
/// Var of the input serves as well.
pub struct ProjectWithNullSentinelRule;

impl Rule for ProjectWithNullSentinelRule {
    fn name(&self) -> &str {
        "ProjectWithNullSentinel"
    }

    fn op_type(&self) -> OpType {
        OpType::Project
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((outputs, input, def_list)) = project_parts(ctx.command, node) else {
            return Ok(None);
        };
        let defs = definitions(ctx.command, def_list);
        let sentinels: Vec<Var> = defs
            .iter()
            .filter(|(_, _, e)| matches!(ctx.command.op(*e), Op::NullSentinel))
            .map(|(_, v, _)| *v)
            .collect();
        if sentinels.is_empty() {
            return Ok(None);
        }
        let can_change = ctx.can_change_null_sentinel_value();

        let input_int = ctx
            .command
            .info(input)
            .non_nullable_definitions
            .iter()
            .find(|v| ctx.command.var_type(*v) == DataType::Int64);
        if let (true, Some(replacement)) = (can_change, input_int) {
            trace!("Sentinels of {} replaced by input var {}", node, replacement);
            let mut new_defs = Vec::with_capacity(defs.len());
            for (def, var, _) in &defs {
                if sentinels.contains(var) {
                    let var_ref = ctx.command.var_ref(replacement);
                    new_defs.push(ctx.command.var_def(*var, var_ref));
                } else {
                    new_defs.push(*def);
                }
            }
            let cmd = &mut *ctx.command;
            let def_list = cmd.var_def_list(new_defs);
            return Ok(Some(cmd.create_node(Op::Project { outputs }, vec![input, def_list])));
        }

        let reusable_constant = defs.iter().find_map(|(_, v, e)| match ctx.command.op(*e) {
            Op::Constant(ScalarValue::Int64(_)) | Op::InternalConstant(ScalarValue::Int64(_)) => {
                Some(*v)
            }
            _ => None,
        });
        let keep = match (can_change, reusable_constant) {
            (true, Some(v)) => v,
            _ => sentinels[0],
        };
        let removed: Vec<Var> = sentinels.into_iter().filter(|v| *v != keep).collect();
        if removed.is_empty() {
            return Ok(None);
        }

        let mut outputs = outputs;
        for old in &removed {
            if outputs.contains(*old) && !outputs.contains(keep) {
                outputs.push(keep);
            }
            outputs.remove(*old);
            ctx.add_var_mapping(*old, keep);
        }
        let new_defs = defs
            .iter()
            .filter(|(_, v, _)| !removed.contains(v))
            .map(|(d, _, _)| *d)
            .collect();
        let cmd = &mut *ctx.command;
        let def_list = cmd.var_def_list(new_defs);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![input, def_list])))
    }
}

// ---------------------------------------------------------------------------
// v := x
// ---------------------------------------------------------------------------

/// A definition that merely renames an input Var is dropped and its references
/// are redirected to the input Var.
pub struct ProjectWithSimpleVarRedefinitionsRule;

impl Rule for ProjectWithSimpleVarRedefinitionsRule {
    fn name(&self) -> &str {
        "ProjectWithSimpleVarRedefinitions"
    }

    fn op_type(&self) -> OpType {
        OpType::Project
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((mut outputs, input, def_list)) = project_parts(ctx.command, node) else {
            return Ok(None);
        };
        let external = ctx.command.info(node).external_references.clone();
        let mut kept = Vec::new();
        let mut renames = Vec::new();
        for (def, var, expr) in definitions(ctx.command, def_list) {
            match *ctx.command.op(expr) {
                Op::VarRef(x) if !external.contains(x) => renames.push((var, x)),
                _ => kept.push(def),
            }
        }
        if renames.is_empty() {
            return Ok(None);
        }
        for (var, x) in renames {
            outputs.replace(var, x);
            ctx.add_var_mapping(var, x);
        }
        let cmd = &mut *ctx.command;
        let def_list = cmd.var_def_list(kept);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![input, def_list])))
    }
}

// ---------------------------------------------------------------------------
// Project(Project(X, d2), d1)
// ---------------------------------------------------------------------------

/// Two stacked projections merge when the inner definitions may be substituted
/// into the outer ones.
pub struct ProjectOverProjectRule;

impl Rule for ProjectOverProjectRule {
    fn name(&self) -> &str {
        "ProjectOverProject"
    }

    fn op_type(&self) -> OpType {
        OpType::Project
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Project, 2, OpType::Project)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((outputs, inner, outer_defs)) = project_parts(ctx.command, node) else {
            return Ok(None);
        };
        let Some((_, input, inner_defs)) = project_parts(ctx.command, inner) else {
            return Ok(None);
        };

        let outer = definitions(ctx.command, outer_defs);
        let mut ref_counts = HashMap::new();
        for (_, _, expr) in &outer {
            if ctx.is_scalar_op_tree(*expr, &mut ref_counts).is_none() {
                return Ok(None);
            }
        }
        let Some(var_map) = ctx.get_var_map(inner_defs, &ref_counts) else {
            return Ok(None);
        };

        let mut new_defs = Vec::with_capacity(outer.len());
        for (_, var, expr) in outer {
            let expr = ctx.remap(expr, &var_map);
            new_defs.push(ctx.command.var_def(var, expr));
        }
        for (def, var, _) in definitions(ctx.command, inner_defs) {
            if outputs.contains(var) {
                new_defs.push(def);
            }
        }
        let cmd = &mut *ctx.command;
        let def_list = cmd.var_def_list(new_defs);
        Ok(Some(cmd.create_node(Op::Project { outputs }, vec![input, def_list])))
    }
}

// ---------------------------------------------------------------------------
// Identity projection
// ---------------------------------------------------------------------------

/// A projection that defines nothing, has no free external references and
/// outputs exactly its input's columns is its input. A projection that narrows the columns is kept: a scalar subquery
/// reads the first column of its input.
pub struct ProjectWithNoLocalDefinitionsRule;

impl Rule for ProjectWithNoLocalDefinitionsRule {
    fn name(&self) -> &str {
        "ProjectWithNoLocalDefinitions"
    }

    fn op_type(&self) -> OpType {
        OpType::Project
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Some((outputs, input, def_list)) = project_parts(ctx.command, node) else {
            return Ok(None);
        };
        if !ctx.command.children(def_list).is_empty() {
            return Ok(None);
        }
        if !ctx.command.info(node).external_references.is_empty() {
            return Ok(None);
        }
        if outputs.to_set() != ctx.command.info(input).definitions {
            return Ok(None);
        }
        Ok(Some(input))
    }

    fn signals(&self) -> RuleSignals {
        RuleSignals::PROJECTION_PRUNING
    }
}
