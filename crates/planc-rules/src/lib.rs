//! # Built-in Rewrite Rules
//!
//! The rule catalog of the rewrite engine, the named groups it is run in, and the
//! driver that runs a group over a command.
//!
//! Every rule is a local, semantics-preserving tree rewrite. Rules are grouped
//! into families by what they simplify:
//!
//! - **`constant_folding`**: comparisons and `LIKE` over two literals.
//! - **`boolean_simplification`**: `AND`/`OR`/`NOT` over literal predicates,
//!   `IS NULL` over literals, sentinels and non-nullable columns, null casts.
//! - **`case_simplification`**: dead `WHEN` clauses, uniform branches, nested
//!   `ELSE CASE`.
//! - **`filter_pushdown`**: filters merged, moved below projections, set
//!   operators, grouping and joins, and turned into join conditions.
//! - **`apply_to_join`**: correlated applies decorrelated into joins or scalar
//!   subqueries.
//! - **`join_simplification`**: projections and filters lifted out of join
//!   inputs, single-row-table inputs dropped.
//! - **`projection`**: redundant sentinels, renames, stacked and identity
//!   projections.
//! - **`grouping`**: group-by and distinct simplification.
//! - **`cardinality`**: operators made redundant by row-count bounds.
//!
//! ## Running
//!
//! ```text
//! let pruning_needed = planc_rules::process(&mut command, RuleGroup::All, &config)?;
//! ```
//!
//! `process` is the only entry point a compiler pipeline needs; the individual
//! rules are public so that tests and custom groups can use them directly.

pub mod apply_to_join;
pub mod boolean_simplification;
pub mod cardinality;
pub mod case_simplification;
pub mod constant_folding;
pub mod driver;
pub mod filter_pushdown;
pub mod groups;
pub mod grouping;
pub mod join_simplification;
pub mod projection;

pub use driver::process;
pub use groups::RuleGroup;
