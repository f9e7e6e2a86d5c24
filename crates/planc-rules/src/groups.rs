//! # Rule Groups
//!
//! A rule group is a named subset of the catalog applied together in one pass.
//! Each group's `RuleTable` is built the first time it is asked for and shared by
//! every pass afterwards.
//!
//! Registration order matters: within an operator's bucket, rules are tried in the
//! order they were added here. Family order is scalar, filter, project, apply,
//! join, single-row, set-op, group-by, sort, constrained-sort, distinct.

use crate::apply_to_join::{
    ApplyIntoScalarSubqueryRule, ApplyOverAnythingRule, ApplyOverFilterRule,
    CrossApplyOverLeftOuterJoinOverSingleRowTableRule, CrossApplyOverProjectRule,
    OuterApplyOverDummyProjectOverFilterRule, OuterApplyOverProjectRule,
};
use crate::boolean_simplification::{
    AndOverConstantPredicateRule, IsNullOverConstantRule, IsNullOverNullRule,
    IsNullOverNullSentinelRule, IsNullOverVarRefRule, LiteralSide, NotOverConstantPredicateRule,
    NotOverNotRule, NullCastRule, OrOverConstantPredicateRule,
};
use crate::cardinality::{
    ConstrainedSortOverEmptySetRule, SetOpOverEmptySetRule, SingleRowOverAnythingRule,
    SingleRowOverProjectRule, SortOverAtMostOneRowRule,
};
use crate::case_simplification::{FlattenCaseRule, SimplifyCaseRule};
use crate::constant_folding::{ComparisonOverConstantsRule, LikeOverConstantsRule};
use crate::filter_pushdown::{
    FilterOverDistinctRule, FilterOverFilterRule, FilterOverGroupByRule, FilterOverJoinRule,
    FilterOverOuterApplyRule, FilterOverProjectRule, FilterOverSetOpRule,
    FilterWithConstantPredicateRule,
};
use crate::grouping::{
    DistinctOfKeysRule, GroupByOnAllInputColumnsWithAggregateRule, GroupByOverProjectRule,
    GroupByWithNoAggregatesRule, GroupByWithSimpleVarRedefinitionsRule,
};
use crate::join_simplification::{JoinOverFilterRule, JoinOverProjectRule, JoinOverSingleRowTableRule};
use crate::projection::{
    ProjectOverProjectRule, ProjectWithNoLocalDefinitionsRule, ProjectWithNullSentinelRule,
    ProjectWithSimpleVarRedefinitionsRule,
};
use planc_core::{OpType, Rule, RuleTable};
use std::fmt;
use std::sync::OnceLock;

/// The named rule groups a pass can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleGroup {
    /// Every rule in the catalog.
    All,
    /// Projection rules only.
    Project,
    /// Cleanup after join elimination: projection, distinct, filter, join and
    /// nullability rules.
    PostJoinElimination,
    /// The rules worth rerunning once a left outer join became an inner join.
    Nullability,
}

impl RuleGroup {
    pub fn name(self) -> &'static str {
        match self {
            RuleGroup::All => "All",
            RuleGroup::Project => "Project",
            RuleGroup::PostJoinElimination => "PostJoinElimination",
            RuleGroup::Nullability => "Nullability",
        }
    }

    /// The group's dispatch table, built on first use.
    pub fn table(self) -> &'static RuleTable {
        static ALL: OnceLock<RuleTable> = OnceLock::new();
        static PROJECT: OnceLock<RuleTable> = OnceLock::new();
        static POST_JOIN_ELIMINATION: OnceLock<RuleTable> = OnceLock::new();
        static NULLABILITY: OnceLock<RuleTable> = OnceLock::new();

        let cell = match self {
            RuleGroup::All => &ALL,
            RuleGroup::Project => &PROJECT,
            RuleGroup::PostJoinElimination => &POST_JOIN_ELIMINATION,
            RuleGroup::Nullability => &NULLABILITY,
        };
        cell.get_or_init(|| RuleTable::new(self.name(), self.rules()))
    }

    fn rules(self) -> Vec<Box<dyn Rule>> {
        match self {
            RuleGroup::All => {
                let mut rules = scalar_rules();
                rules.extend(filter_rules());
                rules.extend(project_rules());
                rules.extend(apply_rules());
                rules.extend(join_rules());
                rules.extend(single_row_rules());
                rules.extend(set_op_rules());
                rules.extend(group_by_rules());
                rules.extend(sort_rules());
                rules.extend(distinct_rules());
                rules
            }
            RuleGroup::Project => project_rules(),
            RuleGroup::PostJoinElimination => {
                let mut rules = project_rules();
                rules.extend(distinct_rules());
                rules.extend(filter_rules());
                rules.extend(join_rules());
                rules.extend(nullability_rules());
                rules
            }
            RuleGroup::Nullability => nullability_rules(),
        }
    }
}

impl fmt::Display for RuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

fn scalar_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(SimplifyCaseRule),
        Box::new(FlattenCaseRule),
        Box::new(LikeOverConstantsRule),
        Box::new(ComparisonOverConstantsRule),
        Box::new(AndOverConstantPredicateRule {
            side: LiteralSide::Right,
        }),
        Box::new(AndOverConstantPredicateRule {
            side: LiteralSide::Left,
        }),
        Box::new(OrOverConstantPredicateRule {
            side: LiteralSide::Right,
        }),
        Box::new(OrOverConstantPredicateRule {
            side: LiteralSide::Left,
        }),
        Box::new(NotOverConstantPredicateRule),
        Box::new(NotOverNotRule),
        Box::new(IsNullOverConstantRule),
        Box::new(IsNullOverNullSentinelRule),
        Box::new(IsNullOverNullRule),
        Box::new(NullCastRule),
        Box::new(IsNullOverVarRefRule),
    ]
}

fn filter_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(FilterWithConstantPredicateRule),
        Box::new(FilterOverJoinRule {
            join: OpType::CrossJoin,
        }),
        Box::new(FilterOverDistinctRule),
        Box::new(FilterOverSetOpRule {
            set_op: OpType::Except,
        }),
        Box::new(FilterOverFilterRule),
        Box::new(FilterOverGroupByRule),
        Box::new(FilterOverJoinRule {
            join: OpType::InnerJoin,
        }),
        Box::new(FilterOverSetOpRule {
            set_op: OpType::Intersect,
        }),
        Box::new(FilterOverJoinRule {
            join: OpType::LeftOuterJoin,
        }),
        Box::new(FilterOverProjectRule),
        Box::new(FilterOverSetOpRule {
            set_op: OpType::UnionAll,
        }),
        Box::new(FilterOverOuterApplyRule),
    ]
}

fn project_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ProjectWithNullSentinelRule),
        Box::new(ProjectWithSimpleVarRedefinitionsRule),
        Box::new(ProjectOverProjectRule),
        Box::new(ProjectWithNoLocalDefinitionsRule),
    ]
}

fn apply_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ApplyOverAnythingRule::new(OpType::CrossApply)),
        Box::new(ApplyOverFilterRule::new(OpType::CrossApply)),
        Box::new(CrossApplyOverProjectRule),
        Box::new(ApplyOverAnythingRule::new(OpType::OuterApply)),
        Box::new(OuterApplyOverDummyProjectOverFilterRule),
        Box::new(OuterApplyOverProjectRule),
        Box::new(ApplyOverFilterRule::new(OpType::OuterApply)),
        Box::new(CrossApplyOverLeftOuterJoinOverSingleRowTableRule),
        Box::new(ApplyIntoScalarSubqueryRule::new(OpType::CrossApply)),
        Box::new(ApplyIntoScalarSubqueryRule::new(OpType::OuterApply)),
    ]
}

fn join_rules() -> Vec<Box<dyn Rule>> {
    let shapes = [
        (OpType::CrossJoin, 1),
        (OpType::CrossJoin, 0),
        (OpType::InnerJoin, 1),
        (OpType::InnerJoin, 0),
        (OpType::LeftOuterJoin, 0),
    ];
    let mut rules: Vec<Box<dyn Rule>> = Vec::new();
    for (join, side) in shapes {
        rules.push(Box::new(JoinOverProjectRule::new(join, side)));
    }
    for (join, side) in shapes {
        rules.push(Box::new(JoinOverFilterRule::new(join, side)));
    }
    for (join, side) in [
        (OpType::CrossJoin, 0),
        (OpType::CrossJoin, 1),
        (OpType::LeftOuterJoin, 1),
    ] {
        rules.push(Box::new(JoinOverSingleRowTableRule::new(join, side)));
    }
    rules
}

fn single_row_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(SingleRowOverAnythingRule),
        Box::new(SingleRowOverProjectRule),
    ]
}

fn set_op_rules() -> Vec<Box<dyn Rule>> {
    [OpType::UnionAll, OpType::Intersect, OpType::Except]
        .into_iter()
        .map(|set_op| Box::new(SetOpOverEmptySetRule { set_op }) as Box<dyn Rule>)
        .collect()
}

fn group_by_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(GroupByWithSimpleVarRedefinitionsRule),
        Box::new(GroupByOverProjectRule),
        Box::new(GroupByWithNoAggregatesRule),
        Box::new(GroupByOnAllInputColumnsWithAggregateRule),
    ]
}

fn sort_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(SortOverAtMostOneRowRule),
        Box::new(ConstrainedSortOverEmptySetRule),
    ]
}

fn distinct_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(DistinctOfKeysRule)]
}

fn nullability_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(IsNullOverVarRefRule),
        Box::new(AndOverConstantPredicateRule {
            side: LiteralSide::Right,
        }),
        Box::new(AndOverConstantPredicateRule {
            side: LiteralSide::Left,
        }),
        Box::new(SimplifyCaseRule),
        Box::new(NotOverConstantPredicateRule),
    ]
}
