//! # Operator Types
//!
//! This module defines the closed operator family of the intermediate tree. Every
//! node of a `Command` owns exactly one `Op`; the node's children are stored in the
//! arena (see `tree`), not inside the operator.
//!
//! ## Families
//!
//! - **Relational** operators produce a row set: scans, filters, projections,
//!   joins, applies, set operators, grouping, sorting, distinct and the single-row
//!   operators.
//! - **Scalar** operators produce one value per row: literals, Var references,
//!   comparisons, boolean connectives, case, casts, aggregates and scalar
//!   subqueries (`Element`).
//! - **Ancillary** operators carry Var definitions (`VarDefList`, `VarDef`).
//! - **Physical** operators only appear at the root (`PhysicalProject`).
//!
//! ## `OpType`
//!
//! `OpType` strips an operator down to its discriminant. It indexes the dense rule
//! dispatch table, so it has to stay a fieldless enum with a contiguous
//! `0..OpType::COUNT` range.

use crate::var::{Var, VarList, VarMap, VarSet};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Literal value.
///
/// Uses `OrderedFloat` for `f64` so that literals take part in `Eq`/`Hash`, which
/// operator equivalence and the subtree hash depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL.
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
        }
    }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Type of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Bool(_) => Some(DataType::Bool),
            ScalarValue::Int64(_) => Some(DataType::Int64),
            ScalarValue::Float64(_) => Some(DataType::Float64),
            ScalarValue::Utf8(_) => Some(DataType::Utf8),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int64(i) => write!(f, "{i}"),
            ScalarValue::Float64(x) => write!(f, "{}", x.0),
            ScalarValue::Utf8(s) => write!(f, "'{s}'"),
        }
    }
}

/// Result type of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int64,
    Float64,
    Utf8,
    /// A row set (every relational operator).
    Relation,
    /// Ancillary operators produce no value.
    Unit,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
}

/// Sort key over a Var.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub var: Var,
    pub ascending: bool,
}

/// Output bookkeeping of a set operator.
///
/// `var_maps[i]` maps each output Var to the Var produced by branch `i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetOpVars {
    pub outputs: VarSet,
    pub var_maps: [VarMap; 2],
}

impl SetOpVars {
    pub fn new(var_maps: [VarMap; 2]) -> Self {
        let outputs = var_maps[0].keys();
        Self { outputs, var_maps }
    }
}

/// Every operator of the intermediate tree.
///
/// Child layout (fixed by `OpType::arity`):
///
/// - `Filter`: input, predicate
/// - `Project`: input, `VarDefList`
/// - `InnerJoin` / `LeftOuterJoin` / `FullOuterJoin`: left, right, condition
/// - `CrossJoin`, `CrossApply`, `OuterApply`, set operators: left, right
/// - `GroupBy`: input, key `VarDefList`, aggregate `VarDefList`
/// - `ConstrainedSort`: input, skip, limit
/// - `Like`: string, pattern, escape
/// - `Case`: when1, then1, ..., whenN, thenN, else
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // ---- relational ----
    /// Base table scan. `keys` is a uniqueness key of the table, if known.
    ScanTable {
        table: String,
        columns: VarList,
        keys: VarSet,
    },
    Filter,
    Project {
        outputs: VarList,
    },
    InnerJoin,
    LeftOuterJoin,
    FullOuterJoin,
    CrossJoin,
    /// Correlated join: the right side is evaluated once per left row.
    CrossApply,
    /// Correlated left-outer join.
    OuterApply,
    UnionAll(SetOpVars),
    Intersect(SetOpVars),
    Except(SetOpVars),
    /// Grouping. `keys` are the grouping Vars, `outputs` are keys plus aggregates.
    GroupBy {
        keys: VarSet,
        outputs: VarSet,
    },
    Distinct {
        keys: VarList,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    /// Sort with skip/limit children.
    ConstrainedSort {
        keys: Vec<SortKey>,
    },
    /// Asserts that its input produces at most one row.
    SingleRow,
    /// A table with exactly one row and no columns.
    SingleRowTable,

    // ---- scalar ----
    /// User-supplied literal.
    Constant(ScalarValue),
    /// Literal introduced by the compiler itself.
    InternalConstant(ScalarValue),
    /// Placeholder column whose only purpose is to be non-null on real rows.
    /// Its value is the `Int64` literal `1`.
    NullSentinel,
    /// Typed null literal.
    Null(DataType),
    /// Literal boolean predicate.
    ConstantPredicate(bool),
    VarRef(Var),
    Comparison(CompareOp),
    Like,
    And,
    Or,
    Not,
    IsNull,
    Arithmetic(ArithOp),
    Case,
    Cast(DataType),
    /// Cast that only widens the static type; never changes the value.
    SoftCast(DataType),
    Property(String),
    /// Scalar subquery: the single value of a one-column, at-most-one-row input.
    Element,
    Aggregate(AggFunc),

    // ---- ancillary ----
    VarDefList,
    VarDef(Var),

    // ---- physical ----
    PhysicalProject {
        outputs: VarList,
    },
}

/// Operator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Relational,
    Scalar,
    Ancillary,
    Physical,
}

/// Number of children an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Fixed(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

/// Discriminant of `Op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpType {
    ScanTable,
    Filter,
    Project,
    InnerJoin,
    LeftOuterJoin,
    FullOuterJoin,
    CrossJoin,
    CrossApply,
    OuterApply,
    UnionAll,
    Intersect,
    Except,
    GroupBy,
    Distinct,
    Sort,
    ConstrainedSort,
    SingleRow,
    SingleRowTable,
    Constant,
    InternalConstant,
    NullSentinel,
    Null,
    ConstantPredicate,
    VarRef,
    Comparison,
    Like,
    And,
    Or,
    Not,
    IsNull,
    Arithmetic,
    Case,
    Cast,
    SoftCast,
    Property,
    Element,
    Aggregate,
    VarDefList,
    VarDef,
    PhysicalProject,
}

impl OpType {
    /// Number of operator types; the length of a dispatch table.
    pub const COUNT: usize = OpType::PhysicalProject as usize + 1;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn family(self) -> OpFamily {
        use OpType::*;
        match self {
            ScanTable | Filter | Project | InnerJoin | LeftOuterJoin | FullOuterJoin
            | CrossJoin | CrossApply | OuterApply | UnionAll | Intersect | Except | GroupBy
            | Distinct | Sort | ConstrainedSort | SingleRow | SingleRowTable => {
                OpFamily::Relational
            }
            VarDefList | VarDef => OpFamily::Ancillary,
            PhysicalProject => OpFamily::Physical,
            _ => OpFamily::Scalar,
        }
    }

    pub fn is_relational(self) -> bool {
        self.family() == OpFamily::Relational
    }

    pub fn is_scalar(self) -> bool {
        self.family() == OpFamily::Scalar
    }

    /// Joins with a condition child.
    pub fn is_conditional_join(self) -> bool {
        matches!(
            self,
            OpType::InnerJoin | OpType::LeftOuterJoin | OpType::FullOuterJoin
        )
    }

    pub fn is_join(self) -> bool {
        self.is_conditional_join() || self == OpType::CrossJoin
    }

    pub fn is_apply(self) -> bool {
        matches!(self, OpType::CrossApply | OpType::OuterApply)
    }

    pub fn is_set_op(self) -> bool {
        matches!(self, OpType::UnionAll | OpType::Intersect | OpType::Except)
    }

    /// Operators whose output depends on the value (not just the null-ness) of
    /// every column they see, because they compare rows for duplicates.
    pub fn is_duplicate_sensitive(self) -> bool {
        matches!(
            self,
            OpType::Distinct | OpType::GroupBy | OpType::Intersect | OpType::Except
        )
    }

    pub fn arity(self) -> Arity {
        use OpType::*;
        match self {
            ScanTable | SingleRowTable | Constant | InternalConstant | NullSentinel | Null
            | ConstantPredicate | VarRef => Arity::Fixed(0),
            Distinct | Sort | SingleRow | Not | IsNull | Cast | SoftCast | Property | Element
            | VarDef | PhysicalProject => Arity::Fixed(1),
            Filter | Project | CrossJoin | CrossApply | OuterApply | UnionAll | Intersect
            | Except | Comparison | And | Or | Arithmetic => Arity::Fixed(2),
            InnerJoin | LeftOuterJoin | FullOuterJoin | GroupBy | ConstrainedSort | Like => {
                Arity::Fixed(3)
            }
            Case => Arity::AtLeast(3),
            Aggregate | VarDefList => Arity::AtLeast(0),
        }
    }
}

impl Op {
    pub fn op_type(&self) -> OpType {
        match self {
            Op::ScanTable { .. } => OpType::ScanTable,
            Op::Filter => OpType::Filter,
            Op::Project { .. } => OpType::Project,
            Op::InnerJoin => OpType::InnerJoin,
            Op::LeftOuterJoin => OpType::LeftOuterJoin,
            Op::FullOuterJoin => OpType::FullOuterJoin,
            Op::CrossJoin => OpType::CrossJoin,
            Op::CrossApply => OpType::CrossApply,
            Op::OuterApply => OpType::OuterApply,
            Op::UnionAll(_) => OpType::UnionAll,
            Op::Intersect(_) => OpType::Intersect,
            Op::Except(_) => OpType::Except,
            Op::GroupBy { .. } => OpType::GroupBy,
            Op::Distinct { .. } => OpType::Distinct,
            Op::Sort { .. } => OpType::Sort,
            Op::ConstrainedSort { .. } => OpType::ConstrainedSort,
            Op::SingleRow => OpType::SingleRow,
            Op::SingleRowTable => OpType::SingleRowTable,
            Op::Constant(_) => OpType::Constant,
            Op::InternalConstant(_) => OpType::InternalConstant,
            Op::NullSentinel => OpType::NullSentinel,
            Op::Null(_) => OpType::Null,
            Op::ConstantPredicate(_) => OpType::ConstantPredicate,
            Op::VarRef(_) => OpType::VarRef,
            Op::Comparison(_) => OpType::Comparison,
            Op::Like => OpType::Like,
            Op::And => OpType::And,
            Op::Or => OpType::Or,
            Op::Not => OpType::Not,
            Op::IsNull => OpType::IsNull,
            Op::Arithmetic(_) => OpType::Arithmetic,
            Op::Case => OpType::Case,
            Op::Cast(_) => OpType::Cast,
            Op::SoftCast(_) => OpType::SoftCast,
            Op::Property(_) => OpType::Property,
            Op::Element => OpType::Element,
            Op::Aggregate(_) => OpType::Aggregate,
            Op::VarDefList => OpType::VarDefList,
            Op::VarDef(_) => OpType::VarDef,
            Op::PhysicalProject { .. } => OpType::PhysicalProject,
        }
    }

    pub fn is_relational(&self) -> bool {
        self.op_type().is_relational()
    }

    pub fn is_scalar(&self) -> bool {
        self.op_type().is_scalar()
    }

    /// The literal value of a constant-like operator.
    pub fn literal(&self) -> Option<ScalarValue> {
        match self {
            Op::Constant(v) | Op::InternalConstant(v) => Some(v.clone()),
            Op::NullSentinel => Some(ScalarValue::Int64(1)),
            Op::Null(_) => Some(ScalarValue::Null),
            Op::ConstantPredicate(b) => Some(ScalarValue::Bool(*b)),
            _ => None,
        }
    }

    /// Set-operator bookkeeping, for the three set operators.
    pub fn set_op_vars(&self) -> Option<&SetOpVars> {
        match self {
            Op::UnionAll(s) | Op::Intersect(s) | Op::Except(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_op_vars_mut(&mut self) -> Option<&mut SetOpVars> {
        match self {
            Op::UnionAll(s) | Op::Intersect(s) | Op::Except(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::ScanTable { table, columns, .. } => {
                write!(f, "ScanTable({table}")?;
                for c in columns.iter() {
                    write!(f, " {c}")?;
                }
                write!(f, ")")
            }
            Op::Project { outputs } | Op::PhysicalProject { outputs } => {
                write!(f, "{:?}[", self.op_type())?;
                for (i, v) in outputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Op::Constant(v) | Op::InternalConstant(v) => write!(f, "{v}"),
            Op::ConstantPredicate(b) => write!(f, "{b}"),
            Op::Null(t) => write!(f, "null:{t:?}"),
            Op::VarRef(v) => write!(f, "{v}"),
            Op::VarDef(v) => write!(f, "{v} :="),
            Op::Comparison(c) => write!(f, "{c:?}"),
            Op::Arithmetic(a) => write!(f, "{a:?}"),
            Op::Aggregate(a) => write!(f, "{a:?}"),
            Op::Cast(t) => write!(f, "Cast<{t:?}>"),
            Op::SoftCast(t) => write!(f, "SoftCast<{t:?}>"),
            Op::Property(p) => write!(f, ".{p}"),
            other => write!(f, "{:?}", other.op_type()),
        }
    }
}
