//! # The Command: Node Arena and Var Table
//!
//! A `Command` owns one compilation's intermediate tree. Nodes live in an
//! index-addressed arena and are referred to by `NodeId`; a node owns its `Op` and
//! an ordered list of child ids. The tree is strict (no node has two parents) but
//! Vars are shared: many `VarRef` nodes name the same `Var`, whose attributes live
//! once in the Var table.
//!
//! ## Mutation and NodeInfo
//!
//! Rules may replace a node's operator or children in place. Every node carries a
//! cached `NodeInfo`, computed when the node is created. Mutations do **not**
//! refresh it: whoever mutates a node calls `recompute_node_info` on it afterwards
//! (the rule processor does so for every node a rule returns, and the context does
//! so for ancestors it inspects). Detached nodes simply stay in the arena until the
//! command is dropped.

use crate::error::{PlanError, Result};
use crate::expr::{DataType, Op, OpType, ScalarValue};
use crate::node_info::{self, NodeInfo};
use crate::var::{Var, VarInfo, VarKind, VarList, VarSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in its command's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub children: Vec<NodeId>,
    info: NodeInfo,
}

/// A single compilation's tree, Var table and root.
#[derive(Debug, Clone, Default)]
pub struct Command {
    nodes: Vec<Node>,
    vars: Vec<VarInfo>,
    root: Option<NodeId>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- vars ----

    pub fn create_var(&mut self, info: VarInfo) -> Var {
        let var = Var(self.vars.len() as u32);
        self.vars.push(info);
        var
    }

    pub fn create_column_var(
        &mut self,
        table: &str,
        column: &str,
        data_type: DataType,
        nullable: bool,
    ) -> Var {
        self.create_var(VarInfo {
            kind: VarKind::Column {
                table: table.into(),
                column: column.into(),
            },
            data_type,
            nullable,
        })
    }

    pub fn create_computed_var(&mut self, data_type: DataType) -> Var {
        self.create_var(VarInfo {
            kind: VarKind::Computed,
            data_type,
            nullable: true,
        })
    }

    pub fn create_parameter_var(&mut self, name: &str, data_type: DataType) -> Var {
        self.create_var(VarInfo {
            kind: VarKind::Parameter { name: name.into() },
            data_type,
            nullable: true,
        })
    }

    pub fn var_info(&self, var: Var) -> Result<&VarInfo> {
        self.vars
            .get(var.0 as usize)
            .ok_or(PlanError::UnknownVar(var))
    }

    /// Declared type of `var`, or `DataType::Unit` for an unknown handle.
    pub fn var_type(&self, var: Var) -> DataType {
        self.vars
            .get(var.0 as usize)
            .map(|v| v.data_type)
            .unwrap_or(DataType::Unit)
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    // ---- nodes ----

    /// Create a node and compute its NodeInfo from its children's cached info.
    pub fn create_node(&mut self, op: Op, children: Vec<NodeId>) -> NodeId {
        let info = node_info::compute(self, &op, &children);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { op, children, info });
        id
    }

    pub fn leaf(&mut self, op: Op) -> NodeId {
        self.create_node(op, Vec::new())
    }

    pub fn var_ref(&mut self, var: Var) -> NodeId {
        self.leaf(Op::VarRef(var))
    }

    pub fn constant(&mut self, value: ScalarValue) -> NodeId {
        self.leaf(Op::Constant(value))
    }

    pub fn constant_predicate(&mut self, value: bool) -> NodeId {
        self.leaf(Op::ConstantPredicate(value))
    }

    pub fn null(&mut self, data_type: DataType) -> NodeId {
        self.leaf(Op::Null(data_type))
    }

    pub fn and(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.create_node(Op::And, vec![left, right])
    }

    pub fn var_def(&mut self, var: Var, expr: NodeId) -> NodeId {
        self.create_node(Op::VarDef(var), vec![expr])
    }

    /// Define a fresh computed Var as `expr`, typed by the expression.
    pub fn create_var_def(&mut self, expr: NodeId) -> (NodeId, Var) {
        let data_type = self.result_type(expr);
        let var = self.create_computed_var(data_type);
        (self.var_def(var, expr), var)
    }

    pub fn var_def_list(&mut self, defs: Vec<NodeId>) -> NodeId {
        self.create_node(Op::VarDefList, defs)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn op(&self, id: NodeId) -> &Op {
        &self.node(id).op
    }

    pub fn op_type(&self, id: NodeId) -> OpType {
        self.op(id).op_type()
    }

    pub fn op_mut(&mut self, id: NodeId) -> &mut Op {
        &mut self.nodes[id.0 as usize].op
    }

    pub fn set_op(&mut self, id: NodeId, op: Op) {
        self.nodes[id.0 as usize].op = op;
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// The `i`-th child. Arity is validated before rules see a node, so rules index
    /// children of a matched shape directly.
    pub fn child(&self, id: NodeId, i: usize) -> NodeId {
        self.node(id).children[i]
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).children.last().copied()
    }

    pub fn set_child(&mut self, id: NodeId, i: usize, child: NodeId) {
        self.nodes[id.0 as usize].children[i] = child;
    }

    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        self.nodes[id.0 as usize].children = children;
    }

    pub fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        &mut self.nodes[id.0 as usize].children
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    // ---- node info ----

    /// Cached analysis of a node. May be stale if the node was mutated and not
    /// recomputed yet.
    pub fn info(&self, id: NodeId) -> &NodeInfo {
        &self.node(id).info
    }

    /// Recompute one node's NodeInfo from its children's cached info.
    pub fn recompute_node_info(&mut self, id: NodeId) {
        let node = self.node(id);
        let info = node_info::compute(self, &node.op, &node.children);
        self.nodes[id.0 as usize].info = info;
    }

    /// Recompute NodeInfo for a whole subtree, children first.
    pub fn recompute_subtree(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for c in children {
            self.recompute_subtree(c);
        }
        self.recompute_node_info(id);
    }

    /// Check that `id` has the number of children its operator requires.
    pub fn check_arity(&self, id: NodeId) -> Result<()> {
        let op_type = self.op_type(id);
        let n = self.children(id).len();
        if !op_type.arity().accepts(n) {
            return Err(PlanError::invariant(
                id,
                op_type,
                format!("operator does not accept {n} children"),
            ));
        }
        if op_type == OpType::Case && n % 2 == 0 {
            return Err(PlanError::invariant(
                id,
                op_type,
                "case needs when/then pairs plus an else",
            ));
        }
        Ok(())
    }

    // ---- structural helpers ----

    /// Deep copy of a subtree. Vars are shared, not copied, so this is only meaningful
    /// for subtrees that do not define Vars (scalar trees without subqueries).
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let op = self.op(id).clone();
        let children = self.children(id).to_vec();
        let copies = children.into_iter().map(|c| self.copy_subtree(c)).collect();
        self.create_node(op, copies)
    }

    /// Structural equivalence: equal operators and pairwise-equivalent children.
    pub fn is_equivalent(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (na, nb) = (self.node(a), self.node(b));
        na.op == nb.op
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(nb.children.iter())
                .all(|(x, y)| self.is_equivalent(*x, *y))
    }

    /// True if any operator in the subtree satisfies `pred`.
    pub fn any_in_subtree(&self, id: NodeId, mut pred: impl FnMut(&Op) -> bool) -> bool {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if pred(self.op(n)) {
                return true;
            }
            stack.extend(self.children(n).iter().copied());
        }
        false
    }

    /// Result type of the value a node produces.
    pub fn result_type(&self, id: NodeId) -> DataType {
        let op = self.op(id);
        if op.is_relational() {
            return DataType::Relation;
        }
        match op {
            Op::Constant(v) | Op::InternalConstant(v) => v.data_type().unwrap_or(DataType::Unit),
            Op::NullSentinel => DataType::Int64,
            Op::Null(t) | Op::Cast(t) | Op::SoftCast(t) => *t,
            Op::ConstantPredicate(_)
            | Op::Comparison(_)
            | Op::Like
            | Op::And
            | Op::Or
            | Op::Not
            | Op::IsNull => DataType::Bool,
            Op::VarRef(v) => self.var_type(*v),
            Op::Arithmetic(_) => self
                .children(id)
                .first()
                .map(|c| self.result_type(*c))
                .unwrap_or(DataType::Unit),
            Op::Case => self
                .children(id)
                .get(1)
                .map(|c| self.result_type(*c))
                .unwrap_or(DataType::Unit),
            Op::Element => self
                .children(id)
                .first()
                .and_then(|c| self.info(*c).definitions.first())
                .map(|v| self.var_type(v))
                .unwrap_or(DataType::Unit),
            Op::Aggregate(crate::expr::AggFunc::Count) => DataType::Int64,
            Op::Aggregate(_) => self
                .children(id)
                .first()
                .map(|c| self.result_type(*c))
                .unwrap_or(DataType::Int64),
            Op::Property(_) => DataType::Unit,
            Op::VarDef(v) => self.var_type(*v),
            _ => DataType::Unit,
        }
    }

    /// The Vars defined by the `VarDef` children of a `VarDefList`.
    pub fn defined_vars(&self, var_def_list: NodeId) -> VarList {
        self.children(var_def_list)
            .iter()
            .filter_map(|d| match self.op(*d) {
                Op::VarDef(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Vars referenced by `VarRef` nodes anywhere in the subtree.
    pub fn referenced_vars(&self, id: NodeId) -> VarSet {
        let mut out = VarSet::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Op::VarRef(v) = self.op(n) {
                out.insert(*v);
            }
            stack.extend(self.children(n).iter().copied());
        }
        out
    }

    /// Indented, one-operator-per-line rendering of a subtree.
    pub fn display(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.display_into(id, 0, &mut out);
        out
    }

    fn display_into(&self, id: NodeId, indent: usize, out: &mut String) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(&self.op(id).to_string());
        out.push('\n');
        for c in self.children(id) {
            self.display_into(*c, indent + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;

    #[test]
    fn test_copy_is_equivalent_but_distinct() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Int64, true);
        let xr = cmd.var_ref(x);
        let one = cmd.constant(ScalarValue::Int64(1));
        let eq = cmd.create_node(Op::Comparison(CompareOp::Eq), vec![xr, one]);
        let copy = cmd.copy_subtree(eq);
        assert_ne!(copy, eq);
        assert!(cmd.is_equivalent(copy, eq));
        assert_eq!(cmd.result_type(copy), DataType::Bool);
    }

    #[test]
    fn test_check_arity_names_the_node() {
        let mut cmd = Command::new();
        let t = cmd.constant_predicate(true);
        let bad = cmd.create_node(Op::Filter, vec![t]);
        let err = cmd.check_arity(bad).unwrap_err();
        assert!(matches!(err, PlanError::InvariantViolation { op: OpType::Filter, .. }));
    }

    #[test]
    fn test_create_var_def_types_the_var() {
        let mut cmd = Command::new();
        let s = cmd.constant(ScalarValue::Utf8("a".into()));
        let (def, var) = cmd.create_var_def(s);
        assert_eq!(cmd.var_type(var), DataType::Utf8);
        assert_eq!(cmd.op(def), &Op::VarDef(var));
        let list = cmd.var_def_list(vec![def]);
        assert_eq!(cmd.defined_vars(list).as_slice(), &[var]);
    }

    #[test]
    fn test_display_indents_children() {
        let mut cmd = Command::new();
        let t = cmd.constant_predicate(true);
        let f = cmd.constant_predicate(false);
        let and = cmd.and(t, f);
        assert_eq!(cmd.display(and), "And\n  true\n  false\n");
    }
}
