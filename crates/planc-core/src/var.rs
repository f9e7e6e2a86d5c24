//! # Vars and Var Collections
//!
//! A `Var` is a stable-identity logical variable: a table column, a parameter, or
//! a value computed by a `VarDef`. It is a small `Copy` handle; everything known
//! about it lives in the command's Var table and is resolved through the handle.
//! Vars are never copied or mutated by rewrites. When a rule changes what a Var
//! means, it registers a remapping instead (see `remap`).
//!
//! ## Collections
//!
//! - **`VarSet`**: deduplicated, unordered set. Iteration is deterministic (by
//!   handle) so rewrites and test output are stable.
//! - **`VarList`**: order-preserving, deduplicated list (projection outputs,
//!   distinct keys).
//! - **`VarMap`**: one side of a set operator's output mapping, from the set
//!   operator's output Var to the branch Var that feeds it.

use crate::expr::DataType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque handle to a logical variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Var(pub u32);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a Var stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// A column of a base table.
    Column { table: String, column: String },
    /// A query parameter.
    Parameter { name: String },
    /// A value computed by a `VarDef` (projection, aggregate, set-operator output).
    Computed,
}

/// Side-table entry for a Var.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    pub kind: VarKind,
    pub data_type: DataType,
    /// Declared nullability. Only meaningful for columns; computed Vars are
    /// considered nullable unless an analysis proves otherwise.
    pub nullable: bool,
}

/// Deduplicated set of Vars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarSet(BTreeSet<Var>);

impl VarSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, v: Var) -> bool {
        self.0.insert(v)
    }

    pub fn remove(&mut self, v: Var) -> bool {
        self.0.remove(&v)
    }

    pub fn contains(&self, v: Var) -> bool {
        self.0.contains(&v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.iter().copied()
    }

    /// Smallest Var in the set.
    pub fn first(&self) -> Option<Var> {
        self.0.iter().next().copied()
    }

    pub fn overlaps(&self, other: &VarSet) -> bool {
        if self.len() <= other.len() {
            self.iter().any(|v| other.contains(v))
        } else {
            other.iter().any(|v| self.contains(v))
        }
    }

    /// True if every Var of `other` is also in `self`.
    pub fn subsumes(&self, other: &VarSet) -> bool {
        other.iter().all(|v| self.contains(v))
    }

    pub fn union_with(&mut self, other: &VarSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn union(&self, other: &VarSet) -> VarSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    pub fn intersection(&self, other: &VarSet) -> VarSet {
        self.iter().filter(|v| other.contains(*v)).collect()
    }

    pub fn difference(&self, other: &VarSet) -> VarSet {
        self.iter().filter(|v| !other.contains(*v)).collect()
    }
}

impl FromIterator<Var> for VarSet {
    fn from_iter<I: IntoIterator<Item = Var>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Var> for VarSet {
    fn extend<I: IntoIterator<Item = Var>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl<'a> IntoIterator for &'a VarSet {
    type Item = Var;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, Var>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl From<&VarList> for VarSet {
    fn from(list: &VarList) -> Self {
        list.iter().collect()
    }
}

/// Order-preserving list of distinct Vars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarList(Vec<Var>);

impl VarList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append `v` unless it is already present.
    pub fn push(&mut self, v: Var) -> bool {
        if self.0.contains(&v) {
            return false;
        }
        self.0.push(v);
        true
    }

    pub fn remove(&mut self, v: Var) -> bool {
        let before = self.0.len();
        self.0.retain(|x| *x != v);
        before != self.0.len()
    }

    /// Replace `old` in place with `new`, keeping its position. If `new` is
    /// already present, `old` is simply dropped.
    pub fn replace(&mut self, old: Var, new: Var) {
        if old == new {
            return;
        }
        if self.contains(new) {
            self.remove(old);
        } else if let Some(slot) = self.0.iter_mut().find(|x| **x == old) {
            *slot = new;
        }
    }

    pub fn contains(&self, v: Var) -> bool {
        self.0.contains(&v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Var] {
        &self.0
    }

    pub fn to_set(&self) -> VarSet {
        self.into()
    }
}

impl FromIterator<Var> for VarList {
    fn from_iter<I: IntoIterator<Item = Var>>(iter: I) -> Self {
        let mut list = VarList::new();
        for v in iter {
            list.push(v);
        }
        list
    }
}

impl Extend<Var> for VarList {
    fn extend<I: IntoIterator<Item = Var>>(&mut self, iter: I) {
        for v in iter {
            self.push(v);
        }
    }
}

/// Mapping from a set operator's output Var to the Var of one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarMap(BTreeMap<Var, Var>);

impl VarMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, output: Var, branch: Var) {
        self.0.insert(output, branch);
    }

    pub fn get(&self, output: Var) -> Option<Var> {
        self.0.get(&output).copied()
    }

    pub fn remove(&mut self, output: Var) -> Option<Var> {
        self.0.remove(&output)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, Var)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn keys(&self) -> VarSet {
        self.0.keys().copied().collect()
    }

    /// Apply `f` to every key and value, re-inserting under the mapped key.
    pub fn map_vars(&mut self, mut f: impl FnMut(Var) -> Var) {
        let entries: Vec<(Var, Var)> = self.iter().collect();
        self.0.clear();
        for (k, v) in entries {
            self.0.insert(f(k), f(v));
        }
    }
}

impl FromIterator<(Var, Var)> for VarMap {
    fn from_iter<I: IntoIterator<Item = (Var, Var)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
