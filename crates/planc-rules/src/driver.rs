//! # Rewrite Driver
//!
//! Entry point of the rewrite engine: runs one rule group over a command to a
//! fixpoint and reports whether projection pruning should run next.
//!
//! When a pass turned a left outer join into an inner join, columns of the former
//! null-extended side became non-nullable. The nullability group is rerun right
//! away over the same tree so that `IsNull` tests over those columns fold.

use crate::groups::RuleGroup;
use planc_core::{Command, NodeId, Result, RewriteConfig, RuleProcessor, TransformationContext};
use tracing::debug;

/// Rewrite `command` with the rules of `group`.
///
/// Returns `true` when a rule that leaves unused columns behind fired, which
/// makes a projection-pruning pass worthwhile.
pub fn process(command: &mut Command, group: RuleGroup, config: &RewriteConfig) -> Result<bool> {
    let Some(root) = command.root() else {
        debug!("Command has no root; nothing to rewrite for group {}", group);
        return Ok(false);
    };

    let (pruning, reapply) = run_pass(command, root, group, config)?;
    if !reapply {
        return Ok(pruning);
    }

    debug!("Left outer joins were simplified; rerunning the nullability rules");
    let root = command.root().unwrap_or(root);
    let (nullability_pruning, _) = run_pass(command, root, RuleGroup::Nullability, config)?;
    Ok(pruning || nullability_pruning)
}

fn run_pass(
    command: &mut Command,
    root: NodeId,
    group: RuleGroup,
    config: &RewriteConfig,
) -> Result<(bool, bool)> {
    let mut ctx = TransformationContext::new(command, config);
    let mut processor = RuleProcessor::new(group.table());
    processor.apply_rules(&mut ctx, root)?;
    Ok((
        ctx.projection_pruning_required(),
        ctx.reapply_nullability_rules(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planc_core::expr::{CompareOp, DataType, ScalarValue};
    use planc_core::{Op, VarSet};

    #[test]
    fn test_empty_command_is_left_alone() {
        let mut cmd = Command::new();
        let pruning = process(&mut cmd, RuleGroup::All, &RewriteConfig::default()).unwrap();
        assert!(!pruning);
        assert_eq!(cmd.num_nodes(), 0);
    }

    #[test]
    fn test_constant_filter_requests_pruning() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Int64, true);
        let s = cmd.leaf(Op::ScanTable {
            table: "t".into(),
            columns: [x].into_iter().collect(),
            keys: VarSet::new(),
        });
        let one = cmd.constant(ScalarValue::Int64(1));
        let one_again = cmd.constant(ScalarValue::Int64(1));
        let eq = cmd.create_node(Op::Comparison(CompareOp::Eq), vec![one, one_again]);
        let f = cmd.create_node(Op::Filter, vec![s, eq]);
        cmd.set_root(f);

        let pruning = process(&mut cmd, RuleGroup::All, &RewriteConfig::default()).unwrap();
        assert!(pruning, "Filter(X, true) -> X is a pruning rule");
        assert_eq!(cmd.root(), Some(s));
    }

    #[test]
    fn test_project_group_ignores_filters() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Int64, true);
        let s = cmd.leaf(Op::ScanTable {
            table: "t".into(),
            columns: [x].into_iter().collect(),
            keys: VarSet::new(),
        });
        let t = cmd.constant_predicate(true);
        let f = cmd.create_node(Op::Filter, vec![s, t]);
        cmd.set_root(f);

        let pruning = process(&mut cmd, RuleGroup::Project, &RewriteConfig::default()).unwrap();
        assert!(!pruning);
        assert_eq!(cmd.root(), Some(f));
    }
}
