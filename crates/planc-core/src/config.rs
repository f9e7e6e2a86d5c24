//! # Rewrite Configuration
//!
//! Tunables of the rewrite engine. The expression-size thresholds were tuned
//! empirically; they stay named and overridable rather than baked into the rules.

use serde::{Deserialize, Serialize};

/// Configuration for a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// A defining expression with more non-leaf nodes than this is "expensive"...
    pub expensive_expr_non_leaf_threshold: usize,
    /// ...and is not substituted into a predicate that references it more than
    /// this many times.
    pub expensive_expr_ref_threshold: usize,
    /// Trees deeper than this are rejected instead of risking stack exhaustion.
    pub max_tree_depth: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            expensive_expr_non_leaf_threshold: 100,
            expensive_expr_ref_threshold: 2,
            max_tree_depth: 10_000,
        }
    }
}

impl RewriteConfig {
    /// Whether substituting a definition with `non_leaf_count` operators for
    /// `ref_count` references would blow up the tree.
    pub fn is_too_expensive(&self, non_leaf_count: usize, ref_count: usize) -> bool {
        non_leaf_count > self.expensive_expr_non_leaf_threshold
            && ref_count > self.expensive_expr_ref_threshold
    }
}
