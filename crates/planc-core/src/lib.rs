//! # planc-core: Rewrite Engine Core
//!
//! This crate implements the term-rewriting engine of a relational query compiler:
//! the intermediate tree it rewrites, the analyses rules depend on, and the
//! machinery that applies rules to a fixpoint. The concrete rules live in
//! `planc-rules`.
//!
//! ## Module Overview
//!
//! - **`expr`**: Operator definitions (`Op`, `OpType`), literals and types.
//! - **`var`**: Stable-identity Vars and the `VarSet` / `VarList` / `VarMap` collections.
//! - **`tree`**: The `Command`: node arena, Var table and root.
//! - **`node_info`**: Cached per-node analysis (definitions, free Vars, nullability,
//!   keys, cardinality bounds).
//! - **`predicate`**: Conjunct splitting and null-rejection analysis.
//! - **`remap`**: Uniform old-to-new Var substitution.
//! - **`pattern`**: Shallow structural patterns that pre-filter candidate rules.
//! - **`rule`**: The `Rule` trait.
//! - **`dispatch`**: `RuleTable`, the OpType-indexed rule buckets of one rule group.
//! - **`context`**: `TransformationContext`, the state rules share during a pass.
//! - **`processor`**: `RuleProcessor`, the bottom-up fixpoint traversal.
//! - **`config`**: `RewriteConfig`.
//! - **`error`**: `PlanError`.
//! - **`eval`**: A reference evaluator used to check that rewrites preserve results.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod expr;
pub mod node_info;
pub mod pattern;
pub mod predicate;
pub mod processor;
pub mod remap;
pub mod rule;
pub mod tree;
pub mod var;

pub use config::RewriteConfig;
pub use context::{Suppression, TransformationContext};
pub use dispatch::RuleTable;
pub use error::{PlanError, Result};
pub use expr::{Op, OpType};
pub use processor::RuleProcessor;
pub use rule::{Rule, RuleResult, RuleSignals};
pub use tree::{Command, NodeId};
pub use var::{Var, VarList, VarMap, VarSet};
