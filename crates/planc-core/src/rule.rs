//! # Rule System
//!
//! A rule pairs a trigger with a transform. The trigger is an `OpType` (the bucket
//! of the dispatch table the rule lives in), optionally narrowed by a structural
//! `Pattern`. The transform receives the transformation context and the matched
//! node, and either returns the replacement node or declines.
//!
//! ## Contract
//!
//! - A rule inspects one node's immediate shape. It never recurses into children to
//!   rewrite them; the processor takes care of bringing children to a fixpoint
//!   first.
//! - A rule either fully builds its replacement and returns `Ok(Some(new))`, or
//!   returns `Ok(None)` without having mutated anything observable. Nodes created
//!   and then abandoned are harmless; they stay detached in the arena.
//! - A rule must make progress (shrink the tree, reduce nesting or simplify a
//!   predicate). The processor does not detect rule cycles.
//! - Nodes a rule mutates in place (as opposed to creating them) must have their
//!   NodeInfo recomputed by the rule before it returns. The processor recomputes
//!   the returned node itself.
//!
//! ## Signals
//!
//! Some rules leave the tree in a state where another pass would pay off. They say
//! so through `signals()`, which the context folds into its two sticky flags when
//! the rule fires.

use crate::context::TransformationContext;
use crate::error::Result;
use crate::expr::OpType;
use crate::pattern::Pattern;
use crate::tree::NodeId;

/// What firing a rule suggests to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleSignals {
    /// Unused projected columns are likely; a projection-pruning pass is advisable.
    pub projection_pruning: bool,
    /// The nullability rules should run again over the tree.
    pub reapply_nullability: bool,
}

impl RuleSignals {
    pub const NONE: RuleSignals = RuleSignals {
        projection_pruning: false,
        reapply_nullability: false,
    };
    pub const PROJECTION_PRUNING: RuleSignals = RuleSignals {
        projection_pruning: true,
        reapply_nullability: false,
    };
    pub const REAPPLY_NULLABILITY: RuleSignals = RuleSignals {
        projection_pruning: false,
        reapply_nullability: true,
    };
}

/// Outcome of a transform: the replacement node, or `None` if the rule declined.
pub type RuleResult = Result<Option<NodeId>>;

/// A rewrite rule.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    /// The operator type this rule is dispatched on.
    fn op_type(&self) -> OpType;

    /// Structural shape the node must have before `apply` is tried.
    fn pattern(&self) -> Pattern {
        Pattern::op(self.op_type())
    }

    /// Rewrite `node`, or decline.
    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult;

    fn signals(&self) -> RuleSignals {
        RuleSignals::NONE
    }
}
