//! # Constant Folding Rules
//!
//! Comparisons and pattern matches whose operands are both literals are decided at
//! compile time and replaced by a literal boolean.
//!
//! ```text
//! Before: Comparison(Eq, 'a', 'a')            After: true
//! Before: Like('abcdef', 'abc%', null)        After: true
//! ```
//!
//! ## What Is Left Alone
//!
//! Nulls, null sentinels and literals of different types are never folded: the
//! first two would need three-valued reasoning the rest of the pipeline does not
//! expect from a literal predicate, and the last has no well-defined answer here.
//! A `Like` pattern is only folded when it is a plain prefix followed by a single
//! trailing `%`; every other pattern shape stays as it is.

use planc_core::expr::{CompareOp, Op, OpType, ScalarValue};
use planc_core::pattern::Pattern;
use planc_core::{NodeId, Rule, RuleResult, TransformationContext};

/// The value of a literal that folding may inspect.
fn folding_literal(op: &Op) -> Option<ScalarValue> {
    match op {
        Op::Constant(v) | Op::InternalConstant(v) if !v.is_null() => Some(v.clone()),
        Op::ConstantPredicate(b) => Some(ScalarValue::Bool(*b)),
        _ => None,
    }
}

/// Decide an equality or inequality between two literals. `None` when the pair
/// cannot be decided.
pub fn fold_comparison(op: CompareOp, left: &Op, right: &Op) -> Option<bool> {
    let equal = match op {
        CompareOp::Eq => true,
        CompareOp::NotEq => false,
        _ => return None,
    };
    let l = folding_literal(left)?;
    let r = folding_literal(right)?;
    if l.data_type() != r.data_type() {
        return None;
    }
    Some((l == r) == equal)
}

/// Decide `s LIKE pattern` when `pattern` is a literal prefix followed by exactly
/// one trailing `%`.
pub fn fold_prefix_like(s: &str, pattern: &str, escape: Option<char>) -> Option<bool> {
    let prefix = pattern.strip_suffix('%')?;
    if prefix.contains(['%', '_', '[']) {
        return None;
    }
    if let Some(e) = escape {
        if e == '%' || prefix.contains(e) {
            return None;
        }
    }
    Some(s.starts_with(prefix))
}

/// `Eq` / `NotEq` over two literals.
pub struct ComparisonOverConstantsRule;

impl Rule for ComparisonOverConstantsRule {
    fn name(&self) -> &str {
        "ComparisonOverConstants"
    }

    fn op_type(&self) -> OpType {
        OpType::Comparison
    }

    fn pattern(&self) -> Pattern {
        Pattern::node(OpType::Comparison, vec![Pattern::Any, Pattern::Any])
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::Comparison(op) = *ctx.command.op(node) else {
            return Ok(None);
        };
        let left = ctx.command.child(node, 0);
        let right = ctx.command.child(node, 1);
        let Some(result) = fold_comparison(op, ctx.command.op(left), ctx.command.op(right)) else {
            return Ok(None);
        };
        Ok(Some(ctx.command.constant_predicate(result)))
    }
}

/// `Like` over a literal string and a literal prefix pattern.
pub struct LikeOverConstantsRule;

impl Rule for LikeOverConstantsRule {
    fn name(&self) -> &str {
        "LikeOverConstants"
    }

    fn op_type(&self) -> OpType {
        OpType::Like
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let cmd = &*ctx.command;
        let Some(ScalarValue::Utf8(s)) = folding_literal(cmd.op(cmd.child(node, 0))) else {
            return Ok(None);
        };
        let Some(ScalarValue::Utf8(pattern)) = folding_literal(cmd.op(cmd.child(node, 1))) else {
            return Ok(None);
        };
        let escape = match cmd.op(cmd.child(node, 2)) {
            Op::Null(_) => None,
            other => match folding_literal(other) {
                Some(ScalarValue::Utf8(e)) => e.chars().next(),
                _ => return Ok(None),
            },
        };
        let Some(matched) = fold_prefix_like(&s, &pattern, escape) else {
            return Ok(None);
        };
        Ok(Some(ctx.command.constant_predicate(matched)))
    }
}
