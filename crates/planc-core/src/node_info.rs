//! # Node Analysis (NodeInfo)
//!
//! Every node caches a `NodeInfo` describing what the subtree below it defines
//! and needs. Rules rely on it for their identity-sensitive preconditions
//! ("does the right side of this apply reference anything the left side
//! defines?", "is this input known to produce at most one row?").
//!
//! ## Properties
//!
//! - **`definitions`**: Vars visible in the node's output.
//! - **`local_definitions`**: Vars this node itself defines (scan columns, project
//!   and group-by `VarDef`s, set-operator outputs).
//! - **`external_references`**: Vars referenced in the subtree but defined outside
//!   it. For a scalar tree, every referenced Var.
//! - **`non_nullable_definitions`**: output Vars provably never null.
//! - **`non_nullable_visible_definitions`**: Vars provably non-null *as seen by this
//!   node's own scalar children*. For a left outer join this includes the right
//!   side's non-nullable columns (the condition only sees matched pairs) even
//!   though the join's output does not.
//! - **`keys`**: a known uniqueness key. The empty key means "at most one row".
//! - **`min_rows` / `max_rows`**: cardinality bounds.
//! - **`hash_value`**: structural hash of the subtree.
//!
//! ## Recomputation Discipline
//!
//! `compute` derives a node's info from its operator and its children's *cached*
//! info; it never recurses. After any mutation, the mutated node and every
//! ancestor whose info is read afterwards must be recomputed explicitly.

use crate::expr::{AggFunc, Op, OpType, ScalarValue};
use crate::predicate;
use crate::tree::{Command, NodeId};
use crate::var::VarSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Cardinality bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowCount {
    Zero,
    One,
    Unbounded,
}

impl RowCount {
    fn product(a: RowCount, b: RowCount) -> RowCount {
        use RowCount::*;
        match (a, b) {
            (Zero, _) | (_, Zero) => Zero,
            (One, One) => One,
            _ => Unbounded,
        }
    }

    fn sum(a: RowCount, b: RowCount) -> RowCount {
        use RowCount::*;
        match (a, b) {
            (Zero, x) | (x, Zero) => x,
            _ => Unbounded,
        }
    }

    fn at_least_one(self) -> bool {
        self >= RowCount::One
    }
}

/// A known uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_vars: VarSet,
    /// No key is known. `key_vars` is meaningless when set.
    pub no_keys: bool,
}

impl KeyInfo {
    pub fn none() -> Self {
        Self {
            key_vars: VarSet::new(),
            no_keys: true,
        }
    }

    pub fn of(key_vars: VarSet) -> Self {
        Self {
            key_vars,
            no_keys: false,
        }
    }
}

impl Default for KeyInfo {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub external_references: VarSet,
    pub definitions: VarSet,
    pub local_definitions: VarSet,
    pub non_nullable_definitions: VarSet,
    pub non_nullable_visible_definitions: VarSet,
    pub keys: KeyInfo,
    pub min_rows: RowCount,
    pub max_rows: RowCount,
    pub hash_value: u64,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            external_references: VarSet::new(),
            definitions: VarSet::new(),
            local_definitions: VarSet::new(),
            non_nullable_definitions: VarSet::new(),
            non_nullable_visible_definitions: VarSet::new(),
            keys: KeyInfo::none(),
            min_rows: RowCount::Zero,
            max_rows: RowCount::Unbounded,
            hash_value: 0,
        }
    }
}

fn structural_hash(cmd: &Command, op: &Op, children: &[NodeId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    op.hash(&mut hasher);
    for c in children {
        cmd.info(*c).hash_value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Derive the NodeInfo of a node with operator `op` over `children`.
pub(crate) fn compute(cmd: &Command, op: &Op, children: &[NodeId]) -> NodeInfo {
    let mut info = NodeInfo {
        hash_value: structural_hash(cmd, op, children),
        ..NodeInfo::default()
    };

    if !op.is_relational() && op.op_type() != OpType::PhysicalProject {
        if let Op::VarRef(v) = op {
            info.external_references.insert(*v);
        }
        for c in children {
            info.external_references
                .union_with(&cmd.info(*c).external_references);
        }
        return info;
    }

    // Relational children feed rows; the rest (predicates, VarDefLists, limits)
    // are evaluated against those rows.
    let mut rel_defs = VarSet::new();
    let mut rel_external = VarSet::new();
    let mut other_external = VarSet::new();
    for c in children {
        let ci = cmd.info(*c);
        if cmd.op(*c).is_relational() {
            rel_defs.union_with(&ci.definitions);
            rel_external.union_with(&ci.external_references);
            info.non_nullable_visible_definitions
                .union_with(&ci.non_nullable_definitions);
        } else {
            other_external.union_with(&ci.external_references);
        }
    }

    let child = |i: usize| children.get(i).map(|c| cmd.info(*c));

    match op {
        Op::ScanTable { columns, keys, .. } => {
            info.definitions = columns.to_set();
            info.local_definitions = columns.to_set();
            info.non_nullable_definitions = columns
                .iter()
                .filter(|v| cmd.var_info(*v).map(|vi| !vi.nullable).unwrap_or(false))
                .collect();
            if !keys.is_empty() {
                info.keys = KeyInfo::of(keys.clone());
            }
        }
        Op::SingleRowTable => {
            info.min_rows = RowCount::One;
            info.max_rows = RowCount::One;
        }
        Op::Filter => {
            if let (Some(input), Some(pred)) = (child(0), children.get(1)) {
                info.definitions = input.definitions.clone();
                info.keys = input.keys.clone();
                info.non_nullable_definitions = input.non_nullable_definitions.union(
                    &predicate::null_rejected_vars(cmd, *pred).intersection(&input.definitions),
                );
                info.max_rows = input.max_rows;
                match cmd.op(*pred) {
                    Op::ConstantPredicate(false) => info.max_rows = RowCount::Zero,
                    Op::ConstantPredicate(true) => info.min_rows = input.min_rows,
                    _ => {}
                }
            }
        }
        Op::Project { outputs } | Op::PhysicalProject { outputs } => {
            let outputs = outputs.to_set();
            if let Some(input) = child(0) {
                info.non_nullable_definitions =
                    input.non_nullable_definitions.intersection(&outputs);
                if !input.keys.no_keys && outputs.subsumes(&input.keys.key_vars) {
                    info.keys = input.keys.clone();
                }
                info.min_rows = input.min_rows;
                info.max_rows = input.max_rows;
            }
            if let (Op::Project { .. }, Some(defs)) = (op, children.get(1)) {
                info.local_definitions = cmd.defined_vars(*defs).to_set();
                for d in cmd.children(*defs) {
                    if let (Op::VarDef(v), Some(e)) = (cmd.op(*d), cmd.children(*d).first()) {
                        if outputs.contains(*v)
                            && is_non_null_expr(cmd, *e, &info.non_nullable_visible_definitions)
                        {
                            info.non_nullable_definitions.insert(*v);
                        }
                    }
                }
            }
            info.definitions = outputs;
        }
        Op::InnerJoin | Op::CrossJoin | Op::CrossApply => {
            if let (Some(l), Some(r)) = (child(0), child(1)) {
                info.definitions = rel_defs.clone();
                info.non_nullable_definitions =
                    l.non_nullable_definitions.union(&r.non_nullable_definitions);
                info.keys = combined_keys(&l.keys, &r.keys);
                info.max_rows = RowCount::product(l.max_rows, r.max_rows);
                if op.op_type() != OpType::InnerJoin
                    && l.min_rows.at_least_one()
                    && r.min_rows.at_least_one()
                {
                    info.min_rows = RowCount::One;
                }
                if let (Op::InnerJoin, Some(cond)) = (op, children.get(2)) {
                    if matches!(cmd.op(*cond), Op::ConstantPredicate(true))
                        && l.min_rows.at_least_one()
                        && r.min_rows.at_least_one()
                    {
                        info.min_rows = RowCount::One;
                    }
                }
            }
        }
        Op::LeftOuterJoin | Op::OuterApply => {
            if let (Some(l), Some(r)) = (child(0), child(1)) {
                info.definitions = rel_defs.clone();
                info.non_nullable_definitions = l.non_nullable_definitions.clone();
                info.keys = combined_keys(&l.keys, &r.keys);
                info.min_rows = l.min_rows;
                info.max_rows = if l.max_rows == RowCount::Zero {
                    RowCount::Zero
                } else if r.max_rows <= RowCount::One {
                    l.max_rows
                } else {
                    RowCount::Unbounded
                };
            }
        }
        Op::FullOuterJoin => {
            if let (Some(l), Some(r)) = (child(0), child(1)) {
                info.definitions = rel_defs.clone();
                info.keys = combined_keys(&l.keys, &r.keys);
                info.min_rows = l.min_rows.max(r.min_rows);
                if l.max_rows == RowCount::Zero && r.max_rows == RowCount::Zero {
                    info.max_rows = RowCount::Zero;
                }
            }
        }
        Op::UnionAll(s) | Op::Intersect(s) | Op::Except(s) => {
            info.definitions = s.outputs.clone();
            info.local_definitions = s.outputs.clone();
            if let (Some(l), Some(r)) = (child(0), child(1)) {
                let nn = |side: &NodeInfo, i: usize, v| {
                    s.var_maps[i]
                        .get(v)
                        .map(|b| side.non_nullable_definitions.contains(b))
                        .unwrap_or(false)
                };
                for v in s.outputs.iter() {
                    let keep = match op.op_type() {
                        OpType::UnionAll => nn(l, 0, v) && nn(r, 1, v),
                        OpType::Intersect => nn(l, 0, v) || nn(r, 1, v),
                        _ => nn(l, 0, v),
                    };
                    if keep {
                        info.non_nullable_definitions.insert(v);
                    }
                }
                match op.op_type() {
                    OpType::UnionAll => {
                        info.min_rows = l.min_rows.max(r.min_rows);
                        info.max_rows = RowCount::sum(l.max_rows, r.max_rows);
                    }
                    OpType::Intersect => {
                        info.keys = KeyInfo::of(s.outputs.clone());
                        info.max_rows = l.max_rows.min(r.max_rows);
                    }
                    _ => {
                        info.keys = KeyInfo::of(s.outputs.clone());
                        info.max_rows = l.max_rows;
                    }
                }
            }
        }
        Op::GroupBy { keys, outputs } => {
            info.definitions = outputs.clone();
            info.keys = KeyInfo::of(keys.clone());
            for list in children.iter().skip(1) {
                info.local_definitions
                    .union_with(&cmd.defined_vars(*list).to_set());
            }
            if let Some(input) = child(0) {
                info.non_nullable_definitions =
                    input.non_nullable_definitions.intersection(keys);
                if keys.is_empty() {
                    info.min_rows = RowCount::One;
                    info.max_rows = RowCount::One;
                } else {
                    info.min_rows = input.min_rows.min(RowCount::One);
                    info.max_rows = input.max_rows;
                }
            }
            if let Some(aggs) = children.get(2) {
                for d in cmd.children(*aggs) {
                    if let (Op::VarDef(v), Some(e)) = (cmd.op(*d), cmd.children(*d).first()) {
                        if matches!(cmd.op(*e), Op::Aggregate(AggFunc::Count)) {
                            info.non_nullable_definitions.insert(*v);
                        }
                    }
                }
            }
        }
        Op::Distinct { keys } => {
            info.definitions = keys.to_set();
            info.keys = KeyInfo::of(keys.to_set());
            if let Some(input) = child(0) {
                info.non_nullable_definitions =
                    input.non_nullable_definitions.intersection(&info.definitions);
                info.min_rows = input.min_rows;
                info.max_rows = input.max_rows;
            }
        }
        Op::Sort { .. } | Op::SingleRow => {
            if let Some(input) = child(0) {
                info.definitions = input.definitions.clone();
                info.non_nullable_definitions = input.non_nullable_definitions.clone();
                info.keys = input.keys.clone();
                info.min_rows = input.min_rows;
                info.max_rows = input.max_rows;
            }
            if op.op_type() == OpType::SingleRow {
                info.max_rows = RowCount::One;
            }
        }
        Op::ConstrainedSort { .. } => {
            if let Some(input) = child(0) {
                info.definitions = input.definitions.clone();
                info.non_nullable_definitions = input.non_nullable_definitions.clone();
                info.keys = input.keys.clone();
                info.max_rows = input.max_rows;
            }
            if let Some(limit) = children.get(2) {
                match cmd.op(*limit).literal() {
                    Some(ScalarValue::Int64(0)) => info.max_rows = RowCount::Zero,
                    Some(ScalarValue::Int64(1)) => {
                        info.max_rows = info.max_rows.min(RowCount::One)
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    info.external_references = rel_external.union(&other_external.difference(&rel_defs));
    if op.op_type().is_apply() {
        if let (Some(l), Some(r)) = (child(0), child(1)) {
            info.external_references = l
                .external_references
                .union(&r.external_references.difference(&l.definitions));
        }
    }
    if info.max_rows <= RowCount::One {
        info.keys = KeyInfo::of(VarSet::new());
    }
    info
}

fn combined_keys(l: &KeyInfo, r: &KeyInfo) -> KeyInfo {
    if l.no_keys || r.no_keys {
        KeyInfo::none()
    } else {
        KeyInfo::of(l.key_vars.union(&r.key_vars))
    }
}

/// A defining expression that can never produce null, given the Vars known to be
/// non-null at that point.
fn is_non_null_expr(cmd: &Command, expr: NodeId, non_null_vars: &VarSet) -> bool {
    match cmd.op(expr) {
        Op::Constant(v) | Op::InternalConstant(v) => !v.is_null(),
        Op::NullSentinel | Op::ConstantPredicate(_) => true,
        Op::VarRef(v) => non_null_vars.contains(*v),
        _ => false,
    }
}
