//! # Transformation Context
//!
//! The state a rule can see beyond the node it was handed. One context lives for
//! one rule-processor pass over one command.
//!
//! ## Ancestor Stack
//!
//! The processor pushes every relational node on the way down and pops it on the
//! way back up, so a rule always sees the chain of enclosing relational operators
//! (innermost last). Non-local safety checks walk this chain.
//!
//! ## Deferred Var Remapping
//!
//! Rules that erase a Var redefinition register `old -> new`. The mapping is
//! applied to a subtree before the processor descends into it if the subtree
//! references any remapped Var, and to every node right before rules are tried on
//! it. No rule ever observes a stale Var.
//!
//! ## Suppression
//!
//! A rule can mark a node as off-limits for one other rule family. This breaks
//! rule pairs that would otherwise undo each other forever (pulling a filter out of
//! a join and pushing it right back in).
//!
//! ## Sticky Flags
//!
//! `projection_pruning_required` and `reapply_nullability_rules` are raised when a
//! rule whose signals ask for them fires, and are read by the driver after the
//! pass.

use crate::config::RewriteConfig;
use crate::expr::{DataType, Op, OpType};
use crate::remap::VarRemapper;
use crate::rule::Rule;
use crate::tree::{Command, NodeId};
use crate::var::{Var, VarSet};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Rule families a node can be shielded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suppression {
    /// Do not push this filter's predicate into the join below it.
    FilterPushdown,
}

pub struct TransformationContext<'a> {
    /// The command being rewritten.
    pub command: &'a mut Command,
    config: &'a RewriteConfig,
    ancestors: Vec<NodeId>,
    remapper: VarRemapper,
    remapped_vars: VarSet,
    suppressed: HashSet<(NodeId, Suppression)>,
    projection_pruning_required: bool,
    reapply_nullability_rules: bool,
    sorts_on_null_sentinels: Option<bool>,
}

impl<'a> TransformationContext<'a> {
    pub fn new(command: &'a mut Command, config: &'a RewriteConfig) -> Self {
        Self {
            command,
            config,
            ancestors: Vec::new(),
            remapper: VarRemapper::new(),
            remapped_vars: VarSet::new(),
            suppressed: HashSet::new(),
            projection_pruning_required: false,
            reapply_nullability_rules: false,
            sorts_on_null_sentinels: None,
        }
    }

    pub fn config(&self) -> &RewriteConfig {
        self.config
    }

    /// Enclosing relational operators, outermost first.
    pub fn ancestors(&self) -> &[NodeId] {
        &self.ancestors
    }

    pub fn projection_pruning_required(&self) -> bool {
        self.projection_pruning_required
    }

    pub fn reapply_nullability_rules(&self) -> bool {
        self.reapply_nullability_rules
    }

    // ---- processor hooks ----

    /// Called before the processor descends into `node`.
    pub fn pre_process_subtree(&mut self, node: NodeId) {
        if self.command.op(node).is_relational() {
            self.ancestors.push(node);
        }
        if self.remapped_vars.is_empty() {
            return;
        }
        if self
            .command
            .info(node)
            .external_references
            .overlaps(&self.remapped_vars)
        {
            trace!("Remapping subtree {} ({} vars remapped)", node, self.remapped_vars.len());
            self.remapper.remap_subtree(self.command, node);
        }
    }

    /// Called when the processor is done with `node` (or is about to replace it).
    pub fn post_process_subtree(&mut self, node: NodeId) {
        if self.ancestors.last() == Some(&node) {
            self.ancestors.pop();
        }
    }

    /// Called before rules are tried on `node`.
    pub fn pre_process(&mut self, node: NodeId) {
        self.remapper.remap_node(self.command, node);
        self.command.recompute_node_info(node);
    }

    /// Called after `rule` produced `node`.
    pub fn post_process(&mut self, node: NodeId, rule: &dyn Rule) {
        let signals = rule.signals();
        self.projection_pruning_required |= signals.projection_pruning;
        self.reapply_nullability_rules |= signals.reapply_nullability;
        self.command.recompute_node_info(node);
    }

    // ---- remapping ----

    /// Register that every reference to `old` must become a reference to `new`.
    pub fn add_var_mapping(&mut self, old: Var, new: Var) {
        trace!("Registering var mapping {} -> {}", old, new);
        self.remapper.add_mapping(old, new);
        self.remapped_vars.insert(old);
    }

    /// Apply all registered mappings to a subtree right away.
    pub fn remap_subtree(&mut self, node: NodeId) {
        self.remapper.remap_subtree(self.command, node);
    }

    /// Final replacement of `var` under the registered mappings.
    pub fn resolve_var(&self, var: Var) -> Var {
        self.remapper.resolve(var)
    }

    // ---- suppression ----

    pub fn suppress(&mut self, node: NodeId, what: Suppression) {
        self.suppressed.insert((node, what));
    }

    pub fn is_suppressed(&self, node: NodeId, what: Suppression) -> bool {
        self.suppressed.contains(&(node, what))
    }

    // ---- nullability ----

    /// Whether `var` is provably non-null at the current position, judged by the
    /// innermost enclosing relational operator that either guarantees it or
    /// defines it.
    pub fn is_non_nullable(&mut self, var: Var) -> bool {
        for i in (0..self.ancestors.len()).rev() {
            let a = self.ancestors[i];
            self.command.recompute_node_info(a);
            let info = self.command.info(a);
            if info.non_nullable_visible_definitions.contains(var) {
                return true;
            }
            if info.local_definitions.contains(var) {
                return false;
            }
        }
        false
    }

    /// Whether the value of a null sentinel may be replaced by another non-null
    /// value at the current position.
    ///
    /// Sentinels only promise to be non-null on real rows, so any operator that
    /// looks at their value rather than their null-ness pins them: a sort anywhere
    /// in the tree ordering by a sentinel, a duplicate-sensitive ancestor, or a
    /// duplicate-sensitive operator on the correlated side of an enclosing apply.
    pub fn can_change_null_sentinel_value(&mut self) -> bool {
        if self.sorts_on_null_sentinels() {
            return false;
        }
        for (i, a) in self.ancestors.iter().enumerate() {
            let op_type = self.command.op_type(*a);
            if op_type.is_duplicate_sensitive() {
                return false;
            }
            if op_type.is_apply() {
                let right = self.command.child(*a, 1);
                let in_right = self.ancestors.get(i + 1) == Some(&right);
                if !in_right
                    && self
                        .command
                        .any_in_subtree(right, |op| op.op_type().is_duplicate_sensitive())
                {
                    return false;
                }
            }
        }
        true
    }

    fn sorts_on_null_sentinels(&mut self) -> bool {
        if let Some(cached) = self.sorts_on_null_sentinels {
            return cached;
        }
        let found = match self.command.root() {
            Some(root) => {
                let cmd = &*self.command;
                let mut sentinels = VarSet::new();
                let mut sort_keys = VarSet::new();
                let mut stack = vec![root];
                while let Some(n) = stack.pop() {
                    match cmd.op(n) {
                        Op::VarDef(v) => {
                            if matches!(cmd.op(cmd.child(n, 0)), Op::NullSentinel) {
                                sentinels.insert(*v);
                            }
                        }
                        Op::Sort { keys } | Op::ConstrainedSort { keys } => {
                            sort_keys.extend(keys.iter().map(|k| k.var));
                        }
                        _ => {}
                    }
                    stack.extend(cmd.children(n).iter().copied());
                }
                sentinels.overlaps(&sort_keys)
            }
            None => false,
        };
        self.sorts_on_null_sentinels = Some(found);
        found
    }

    // ---- substitution ----

    /// If `node` is a pure scalar tree (no subqueries, no aggregates), the number of
    /// non-leaf operators in it. References are tallied into `ref_counts`.
    pub fn is_scalar_op_tree(&self, node: NodeId, ref_counts: &mut HashMap<Var, usize>) -> Option<usize> {
        let op = self.command.op(node);
        if !op.is_scalar() || matches!(op, Op::Element | Op::Aggregate(_) | Op::Property(_)) {
            return None;
        }
        if let Op::VarRef(v) = op {
            *ref_counts.entry(*v).or_insert(0) += 1;
        }
        let children = self.command.children(node);
        if children.is_empty() {
            return Some(0);
        }
        let mut non_leaf = 1;
        for c in children {
            non_leaf += self.is_scalar_op_tree(*c, ref_counts)?;
        }
        Some(non_leaf)
    }

    /// Map each Var defined by `var_def_list` to its defining expression, if every
    /// definition may be substituted for its references. Declines when a definition
    /// is not a pure scalar tree, or is expensive and referenced too often according
    /// to `ref_counts`.
    pub fn get_var_map(
        &self,
        var_def_list: NodeId,
        ref_counts: &HashMap<Var, usize>,
    ) -> Option<HashMap<Var, NodeId>> {
        let mut map = HashMap::new();
        for def in self.command.children(var_def_list) {
            let Op::VarDef(v) = self.command.op(*def) else {
                return None;
            };
            let expr = self.command.child(*def, 0);
            let non_leaf = self.is_scalar_op_tree(expr, &mut HashMap::new())?;
            let refs = ref_counts.get(v).copied().unwrap_or(0);
            if self.config.is_too_expensive(non_leaf, refs) {
                return None;
            }
            map.insert(*v, expr);
        }
        Some(map)
    }

    /// Replace every reference to a Var in `map` within the scalar tree `node` by a
    /// fresh copy of its definition. Returns the (possibly new) root.
    pub fn remap(&mut self, node: NodeId, map: &HashMap<Var, NodeId>) -> NodeId {
        if let Op::VarRef(v) = self.command.op(node) {
            if let Some(def) = map.get(v) {
                return self.command.copy_subtree(*def);
            }
        }
        let children = self.command.children(node).to_vec();
        for (i, c) in children.into_iter().enumerate() {
            let new_child = self.remap(c, map);
            if new_child != c {
                self.command.set_child(node, i, new_child);
            }
        }
        self.command.recompute_node_info(node);
        node
    }

    /// `CASE WHEN var IS NULL THEN NULL ELSE expr END`.
    pub fn build_null_if_expression(&mut self, var: Var, expr: NodeId) -> NodeId {
        let cmd = &mut *self.command;
        let data_type = match cmd.result_type(expr) {
            DataType::Unit | DataType::Relation => DataType::Int64,
            t => t,
        };
        let var_ref = cmd.var_ref(var);
        let is_null = cmd.create_node(Op::IsNull, vec![var_ref]);
        let null = cmd.null(data_type);
        cmd.create_node(Op::Case, vec![is_null, null, expr])
    }

    /// True if `node` is a relational operator; rules use it to guard invariants.
    pub fn is_relational(&self, node: NodeId) -> bool {
        self.command.op(node).is_relational()
    }

    /// Operator type of the innermost enclosing relational operator.
    pub fn parent_relop_type(&self) -> Option<OpType> {
        self.ancestors.last().map(|a| self.command.op_type(*a))
    }
}
