//! # Declarative Pattern Matching for Rewrite Rules
//!
//! Each rule declares a `Pattern` describing the shape of the nodes it can rewrite.
//! Before calling `apply`, the rule processor checks the pattern so that rules whose
//! shape obviously does not fit are rejected without running their real
//! precondition logic.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(matcher, children)`: matches a node whose operator satisfies
//!   `matcher` and whose children match the child patterns position by position. An
//!   empty child list places no constraint on the children, which is what
//!   variable-arity operators such as `Case` need.
//! - `Pattern::Any`: matches any subtree.
//!
//! Matching is purely structural and shallow (one or two levels in practice). It
//! never looks at Var identity; preconditions such as "the right side does not
//! reference the left side" belong inside the rule's `apply`.

use crate::expr::{Op, OpType};
use crate::tree::{Command, NodeId};

/// Pattern for matching a node and its immediate descendants.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match an operator with child patterns.
    Operator(OpMatcher, Vec<Pattern>),
    /// Match any subtree.
    Any,
}

/// Matcher for a single operator.
#[derive(Debug, Clone)]
pub enum OpMatcher {
    /// Any operator of this type, whatever its payload.
    Op(OpType),
    /// Exactly this operator, payload included (e.g. the literal `true`).
    Literal(Op),
    /// Any relational operator.
    AnyRelational,
}

impl OpMatcher {
    fn accepts(&self, op: &Op) -> bool {
        match self {
            OpMatcher::Op(t) => op.op_type() == *t,
            OpMatcher::Literal(expected) => op == expected,
            OpMatcher::AnyRelational => op.is_relational(),
        }
    }
}

impl Pattern {
    /// Match an operator type, ignoring its children.
    pub fn op(op_type: OpType) -> Self {
        Pattern::Operator(OpMatcher::Op(op_type), vec![])
    }

    /// Match an operator type with the given child patterns.
    pub fn node(op_type: OpType, children: Vec<Pattern>) -> Self {
        Pattern::Operator(OpMatcher::Op(op_type), children)
    }

    /// Match exactly this leaf operator.
    pub fn literal(op: Op) -> Self {
        Pattern::Operator(OpMatcher::Literal(op), vec![])
    }

    pub fn constant_predicate(value: bool) -> Self {
        Pattern::literal(Op::ConstantPredicate(value))
    }

    /// Match `op_type` whose child at `index` is `child`, all other children of an
    /// `arity`-child node being wildcards.
    pub fn with_child(op_type: OpType, arity: usize, index: usize, child: Pattern) -> Self {
        let children = (0..arity)
            .map(|i| if i == index { child.clone() } else { Pattern::Any })
            .collect();
        Pattern::node(op_type, children)
    }

    /// Match `outer` over `inner` in the first child position.
    pub fn over(outer: OpType, outer_arity: usize, inner: OpType) -> Self {
        Pattern::with_child(outer, outer_arity, 0, Pattern::op(inner))
    }

    /// The operator type at the root of the pattern, if pinned.
    pub fn root_op_type(&self) -> Option<OpType> {
        match self {
            Pattern::Operator(OpMatcher::Op(t), _) => Some(*t),
            Pattern::Operator(OpMatcher::Literal(op), _) => Some(op.op_type()),
            _ => None,
        }
    }
}

/// Check if the subtree rooted at `node` matches `pattern`.
pub fn matches(cmd: &Command, node: NodeId, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.accepts(cmd.op(node)) {
                return false;
            }
            if child_patterns.is_empty() {
                return true;
            }
            let children = cmd.children(node);
            if children.len() != child_patterns.len() {
                return false;
            }
            children
                .iter()
                .zip(child_patterns.iter())
                .all(|(c, p)| matches(cmd, *c, p))
        }
    }
}
