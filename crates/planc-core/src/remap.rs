//! # Var Remapping
//!
//! Rules that erase a redundant Var (a computed Var that merely renames another
//! one) cannot chase down every reference themselves: references may sit anywhere
//! above or beside the rewritten node. Instead they register `old -> new` with the
//! transformation context, and the `VarRemapper` substitutes the mapping uniformly
//! wherever a Var appears: `VarRef`/`VarDef` nodes and the Var lists carried by
//! projections, grouping, sorting, distinct and set operators.
//!
//! Mappings chain: after `a -> b` and `b -> c`, a reference to `a` resolves to `c`.

use crate::expr::Op;
use crate::tree::{Command, NodeId};
use crate::var::{Var, VarList, VarSet};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct VarRemapper {
    mappings: HashMap<Var, Var>,
}

impl VarRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mapping(&mut self, old: Var, new: Var) {
        if old != new {
            self.mappings.insert(old, new);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Every Var that currently has a replacement.
    pub fn domain(&self) -> VarSet {
        self.mappings.keys().copied().collect()
    }

    /// Follow the mapping chain from `var` to its final replacement.
    pub fn resolve(&self, var: Var) -> Var {
        let mut current = var;
        // A chain can be at most as long as the table; anything longer is a cycle.
        for _ in 0..=self.mappings.len() {
            match self.mappings.get(&current) {
                Some(next) => current = *next,
                None => return current,
            }
        }
        current
    }

    /// Substitute mapped Vars in one node's operator. Returns whether anything
    /// changed. Does not recompute NodeInfo.
    pub fn remap_node(&self, cmd: &mut Command, id: NodeId) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut op = cmd.op(id).clone();
        remap_op(&mut op, |v| self.resolve(v));
        if &op == cmd.op(id) {
            return false;
        }
        cmd.set_op(id, op);
        true
    }

    /// Substitute mapped Vars throughout a subtree, recomputing NodeInfo on the way
    /// back up.
    pub fn remap_subtree(&self, cmd: &mut Command, id: NodeId) {
        let children = cmd.children(id).to_vec();
        for c in children {
            self.remap_subtree(cmd, c);
        }
        self.remap_node(cmd, id);
        cmd.recompute_node_info(id);
    }
}

fn remap_list(list: &mut VarList, f: &impl Fn(Var) -> Var) {
    *list = list.iter().map(f).collect();
}

fn remap_set(set: &mut VarSet, f: &impl Fn(Var) -> Var) {
    *set = set.iter().map(f).collect();
}

/// Apply `f` to every Var an operator carries.
pub fn remap_op(op: &mut Op, f: impl Fn(Var) -> Var) {
    match op {
        Op::VarRef(v) | Op::VarDef(v) => *v = f(*v),
        Op::ScanTable { columns, keys, .. } => {
            remap_list(columns, &f);
            remap_set(keys, &f);
        }
        Op::Project { outputs } | Op::PhysicalProject { outputs } => remap_list(outputs, &f),
        Op::Distinct { keys } => remap_list(keys, &f),
        Op::GroupBy { keys, outputs } => {
            remap_set(keys, &f);
            remap_set(outputs, &f);
        }
        Op::Sort { keys } | Op::ConstrainedSort { keys } => {
            for k in keys.iter_mut() {
                k.var = f(k.var);
            }
        }
        Op::UnionAll(s) | Op::Intersect(s) | Op::Except(s) => {
            remap_set(&mut s.outputs, &f);
            for m in s.var_maps.iter_mut() {
                m.map_vars(&f);
            }
        }
        _ => {}
    }
}
