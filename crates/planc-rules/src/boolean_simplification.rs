//! # Boolean and Null-test Simplification
//!
//! Rules that shrink predicates once one of their operands is known.
//!
//! ## Connectives over a Literal
//!
//! The literal side of an `And`/`Or` decides the outcome on its own:
//!
//! | Shape            | Result      |
//! |------------------|-------------|
//! | `And(X, true)`   | `X`         |
//! | `And(X, false)`  | `false`     |
//! | `Or(X, true)`    | `true`      |
//! | `Or(X, false)`   | `X`         |
//!
//! These hold under three-valued logic as well: `null AND false` is `false` and
//! `null OR true` is `true`. Each connective is registered twice, once per operand
//! position of the literal.
//!
//! ## Null Tests
//!
//! `IsNull` collapses over literals, over null sentinels (never null on a real
//! row), over the null literal, and over a Var reference that the enclosing
//! relational operators prove non-nullable.

use planc_core::expr::{Op, OpType};
use planc_core::pattern::Pattern;
use planc_core::{NodeId, Rule, RuleResult, TransformationContext};

/// Which operand of a binary connective holds the literal predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralSide {
    Left,
    Right,
}

impl LiteralSide {
    fn index(self) -> usize {
        match self {
            LiteralSide::Left => 0,
            LiteralSide::Right => 1,
        }
    }
}

/// Shared body of the `And` / `Or` rules. `absorbing` is the literal that decides
/// the connective by itself (`false` for `And`, `true` for `Or`).
fn simplify_connective(
    ctx: &mut TransformationContext<'_>,
    node: NodeId,
    side: LiteralSide,
    absorbing: bool,
) -> RuleResult {
    let literal = ctx.command.child(node, side.index());
    let other = ctx.command.child(node, 1 - side.index());
    let Op::ConstantPredicate(value) = *ctx.command.op(literal) else {
        return Ok(None);
    };
    Ok(Some(if value == absorbing { literal } else { other }))
}

pub struct AndOverConstantPredicateRule {
    pub side: LiteralSide,
}

impl Rule for AndOverConstantPredicateRule {
    fn name(&self) -> &str {
        match self.side {
            LiteralSide::Left => "AndOverConstantPredicateLeft",
            LiteralSide::Right => "AndOverConstantPredicateRight",
        }
    }

    fn op_type(&self) -> OpType {
        OpType::And
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(OpType::And, 2, self.side.index(), Pattern::op(OpType::ConstantPredicate))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        simplify_connective(ctx, node, self.side, false)
    }
}

pub struct OrOverConstantPredicateRule {
    pub side: LiteralSide,
}

impl Rule for OrOverConstantPredicateRule {
    fn name(&self) -> &str {
        match self.side {
            LiteralSide::Left => "OrOverConstantPredicateLeft",
            LiteralSide::Right => "OrOverConstantPredicateRight",
        }
    }

    fn op_type(&self) -> OpType {
        OpType::Or
    }

    fn pattern(&self) -> Pattern {
        Pattern::with_child(OpType::Or, 2, self.side.index(), Pattern::op(OpType::ConstantPredicate))
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        simplify_connective(ctx, node, self.side, true)
    }
}

/// `Not(true)` -> `false`, `Not(false)` -> `true`.
pub struct NotOverConstantPredicateRule;

impl Rule for NotOverConstantPredicateRule {
    fn name(&self) -> &str {
        "NotOverConstantPredicate"
    }

    fn op_type(&self) -> OpType {
        OpType::Not
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Not, 1, OpType::ConstantPredicate)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::ConstantPredicate(value) = *ctx.command.op(ctx.command.child(node, 0)) else {
            return Ok(None);
        };
        Ok(Some(ctx.command.constant_predicate(!value)))
    }
}

/// `Not(Not(X))` -> `X`.
pub struct NotOverNotRule;

impl Rule for NotOverNotRule {
    fn name(&self) -> &str {
        "NotOverNot"
    }

    fn op_type(&self) -> OpType {
        OpType::Not
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Not, 1, OpType::Not)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let inner = ctx.command.child(node, 0);
        Ok(Some(ctx.command.child(inner, 0)))
    }
}

/// `IsNull` over a user or compiler literal.
pub struct IsNullOverConstantRule;

impl Rule for IsNullOverConstantRule {
    fn name(&self) -> &str {
        "IsNullOverConstant"
    }

    fn op_type(&self) -> OpType {
        OpType::IsNull
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let is_null = match ctx.command.op(ctx.command.child(node, 0)) {
            Op::Constant(v) | Op::InternalConstant(v) => v.is_null(),
            Op::ConstantPredicate(_) => false,
            _ => return Ok(None),
        };
        Ok(Some(ctx.command.constant_predicate(is_null)))
    }
}

/// `IsNull(NullSentinel)` -> `false`.
pub struct IsNullOverNullSentinelRule;

impl Rule for IsNullOverNullSentinelRule {
    fn name(&self) -> &str {
        "IsNullOverNullSentinel"
    }

    fn op_type(&self) -> OpType {
        OpType::IsNull
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::IsNull, 1, OpType::NullSentinel)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, _node: NodeId) -> RuleResult {
        Ok(Some(ctx.command.constant_predicate(false)))
    }
}

/// `IsNull(null)` -> `true`.
pub struct IsNullOverNullRule;

impl Rule for IsNullOverNullRule {
    fn name(&self) -> &str {
        "IsNullOverNull"
    }

    fn op_type(&self) -> OpType {
        OpType::IsNull
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::IsNull, 1, OpType::Null)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, _node: NodeId) -> RuleResult {
        Ok(Some(ctx.command.constant_predicate(true)))
    }
}

/// `Cast<T>(null)` -> `null:T`.
pub struct NullCastRule;

impl Rule for NullCastRule {
    fn name(&self) -> &str {
        "NullCast"
    }

    fn op_type(&self) -> OpType {
        OpType::Cast
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::Cast, 1, OpType::Null)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::Cast(data_type) = *ctx.command.op(node) else {
            return Ok(None);
        };
        Ok(Some(ctx.command.null(data_type)))
    }
}

/// `IsNull(v)` -> `false` when `v` is provably non-null where it is referenced.
pub struct IsNullOverVarRefRule;

impl Rule for IsNullOverVarRefRule {
    fn name(&self) -> &str {
        "IsNullOverVarRef"
    }

    fn op_type(&self) -> OpType {
        OpType::IsNull
    }

    fn pattern(&self) -> Pattern {
        Pattern::over(OpType::IsNull, 1, OpType::VarRef)
    }

    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::VarRef(var) = *ctx.command.op(ctx.command.child(node, 0)) else {
            return Ok(None);
        };
        if !ctx.is_non_nullable(var) {
            return Ok(None);
        }
        Ok(Some(ctx.command.constant_predicate(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planc_core::expr::{DataType, ScalarValue};
    use planc_core::{Command, RewriteConfig, VarSet};

    fn apply(rule: &dyn Rule, cmd: &mut Command, node: NodeId) -> Option<NodeId> {
        let config = RewriteConfig::default();
        let mut ctx = TransformationContext::new(cmd, &config);
        rule.apply(&mut ctx, node).unwrap()
    }

    #[test]
    fn test_and_keeps_the_other_side_for_true() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Bool, true);
        let xr = cmd.var_ref(x);
        let t = cmd.constant_predicate(true);
        let and = cmd.and(xr, t);
        let rule = AndOverConstantPredicateRule {
            side: LiteralSide::Right,
        };
        assert_eq!(apply(&rule, &mut cmd, and), Some(xr));
    }

    #[test]
    fn test_or_returns_the_absorbing_literal() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Bool, true);
        let t = cmd.constant_predicate(true);
        let xr = cmd.var_ref(x);
        let or = cmd.create_node(Op::Or, vec![t, xr]);
        let rule = OrOverConstantPredicateRule {
            side: LiteralSide::Left,
        };
        assert_eq!(apply(&rule, &mut cmd, or), Some(t));
    }

    #[test]
    fn test_not_not_unwraps() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Bool, true);
        let xr = cmd.var_ref(x);
        let n1 = cmd.create_node(Op::Not, vec![xr]);
        let n2 = cmd.create_node(Op::Not, vec![n1]);
        assert_eq!(apply(&NotOverNotRule, &mut cmd, n2), Some(xr));
    }

    #[test]
    fn test_is_null_over_literals() {
        let mut cmd = Command::new();
        let null_const = cmd.leaf(Op::Constant(ScalarValue::Null));
        let is_null = cmd.create_node(Op::IsNull, vec![null_const]);
        let out = apply(&IsNullOverConstantRule, &mut cmd, is_null).expect("folds");
        assert_eq!(cmd.op(out), &Op::ConstantPredicate(true));

        let sentinel = cmd.leaf(Op::NullSentinel);
        let is_null = cmd.create_node(Op::IsNull, vec![sentinel]);
        let out = apply(&IsNullOverNullSentinelRule, &mut cmd, is_null).expect("folds");
        assert_eq!(cmd.op(out), &Op::ConstantPredicate(false));
    }

    #[test]
    fn test_null_cast_takes_the_target_type() {
        let mut cmd = Command::new();
        let null = cmd.null(DataType::Int64);
        let cast = cmd.create_node(Op::Cast(DataType::Utf8), vec![null]);
        let out = apply(&NullCastRule, &mut cmd, cast).expect("folds");
        assert_eq!(cmd.op(out), &Op::Null(DataType::Utf8));
    }

    #[test]
    fn test_is_null_over_var_ref_needs_an_enclosing_guarantee() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Int64, false);
        let scan = cmd.leaf(Op::ScanTable {
            table: "t".into(),
            columns: [x].into_iter().collect(),
            keys: VarSet::new(),
        });
        let xr = cmd.var_ref(x);
        let is_null = cmd.create_node(Op::IsNull, vec![xr]);
        let filter = cmd.create_node(Op::Filter, vec![scan, is_null]);

        let config = RewriteConfig::default();
        let mut ctx = TransformationContext::new(&mut cmd, &config);
        assert!(
            IsNullOverVarRefRule.apply(&mut ctx, is_null).unwrap().is_none(),
            "outside any relational operator nothing is known"
        );
        ctx.pre_process_subtree(filter);
        let out = IsNullOverVarRefRule
            .apply(&mut ctx, is_null)
            .unwrap()
            .expect("x is declared non-nullable");
        assert_eq!(ctx.command.op(out), &Op::ConstantPredicate(false));
    }
}
