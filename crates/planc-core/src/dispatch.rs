//! # Rule Dispatch Table
//!
//! A `RuleTable` buckets the rules of one named group by the `OpType` they trigger
//! on. Buckets live in a dense vector indexed by `OpType::index`, so finding the
//! candidates for a node is a single index, no hashing. Within a bucket, rules keep
//! their registration order, which is the order the processor tries them in.
//!
//! Tables are built once and only read afterwards, so a process can share them
//! freely across threads.

use crate::expr::OpType;
use crate::pattern::Pattern;
use crate::rule::Rule;

/// A rule together with its pre-built pattern.
pub struct RuleEntry {
    pub rule: Box<dyn Rule>,
    pub pattern: Pattern,
}

pub struct RuleTable {
    name: String,
    buckets: Vec<Vec<RuleEntry>>,
}

impl RuleTable {
    pub fn new(name: impl Into<String>, rules: Vec<Box<dyn Rule>>) -> Self {
        let mut buckets: Vec<Vec<RuleEntry>> = (0..OpType::COUNT).map(|_| Vec::new()).collect();
        for rule in rules {
            let pattern = rule.pattern();
            debug_assert!(
                pattern
                    .root_op_type()
                    .map(|t| t == rule.op_type())
                    .unwrap_or(true),
                "rule {} pattern is rooted at a different operator",
                rule.name()
            );
            buckets[rule.op_type().index()].push(RuleEntry { rule, pattern });
        }
        Self {
            name: name.into(),
            buckets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate rules for a node of type `op_type`, in registration order.
    pub fn rules_for(&self, op_type: OpType) -> &[RuleEntry] {
        &self.buckets[op_type.index()]
    }

    /// Total number of rules in the table.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of every rule, bucket by bucket.
    pub fn rule_names(&self) -> Vec<&str> {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| e.rule.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformationContext;
    use crate::rule::RuleResult;
    use crate::tree::NodeId;

    struct Named(&'static str, OpType);

    impl Rule for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn op_type(&self) -> OpType {
            self.1
        }
        fn apply(&self, _ctx: &mut TransformationContext<'_>, _node: NodeId) -> RuleResult {
            Ok(None)
        }
    }

    #[test]
    fn test_buckets_keep_registration_order() {
        let table = RuleTable::new(
            "t",
            vec![
                Box::new(Named("a", OpType::Filter)),
                Box::new(Named("b", OpType::And)),
                Box::new(Named("c", OpType::Filter)),
            ],
        );
        let names: Vec<&str> = table
            .rules_for(OpType::Filter)
            .iter()
            .map(|e| e.rule.name())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(table.rules_for(OpType::Project).is_empty());
        assert_eq!(table.len(), 3);
        assert_eq!(table.name(), "t");
    }
}
