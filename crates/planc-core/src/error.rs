//! # Errors
//!
//! The rewrite engine distinguishes two failure classes:
//!
//! - **Invariant violations**: a tree-shape assumption that should hold by
//!   construction did not (e.g. a scalar child where a relational input was
//!   required). These point at a bug upstream or inside a rule and abort the
//!   compilation.
//! - **Unsupported input**: a construct that is deliberately not handled. This is
//!   a query limitation rather than a bug, and the message says so.
//!
//! Neither is recoverable locally. Rules never return an error to signal "does not
//! apply"; they return `Ok(None)` instead.

use crate::expr::OpType;
use crate::tree::NodeId;
use crate::var::Var;

/// Errors raised while building, rewriting or evaluating an IR tree.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A true-by-construction assumption about the tree failed.
    #[error("internal error: invariant violated at node {node} ({op:?}): {message}")]
    InvariantViolation {
        node: NodeId,
        op: OpType,
        message: String,
    },
    /// The input contains a construct this compiler does not handle.
    #[error("unsupported query construct {op:?}: {message}")]
    Unsupported { op: OpType, message: String },
    /// The tree is deeper than the configured recursion bound.
    #[error("tree depth exceeds the configured limit of {depth}")]
    DepthLimitExceeded { depth: usize },
    /// A Var handle that is not present in the command's Var table.
    #[error("unknown var {0}")]
    UnknownVar(Var),
    /// The reference evaluator could not evaluate a tree.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl PlanError {
    pub fn invariant(node: NodeId, op: OpType, message: impl Into<String>) -> Self {
        PlanError::InvariantViolation {
            node,
            op,
            message: message.into(),
        }
    }

    pub fn unsupported(op: OpType, message: impl Into<String>) -> Self {
        PlanError::Unsupported {
            op,
            message: message.into(),
        }
    }

    /// True for errors caused by an internal bug rather than by the query itself.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PlanError::InvariantViolation { .. } | PlanError::UnknownVar(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_distinguish_bug_from_limitation() {
        let bug = PlanError::invariant(NodeId(7), OpType::Filter, "expected a relational input");
        let limit = PlanError::unsupported(OpType::Property, "property access on a row value");
        assert!(bug.is_internal());
        assert!(!limit.is_internal());
        assert!(bug.to_string().starts_with("internal error"));
        assert!(bug.to_string().contains("n7"), "message should name the node: {bug}");
        assert!(limit.to_string().starts_with("unsupported"));
    }
}
