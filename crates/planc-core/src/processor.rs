//! # Rule Processor
//!
//! Applies the rules of one `RuleTable` to a command until nothing changes.
//!
//! ## Traversal
//!
//! The traversal is strictly post-order: every child subtree reaches its own
//! fixpoint before rules are tried on the parent. At each node:
//!
//! 1. The context's subtree pre-hook runs (ancestor push, eager remapping).
//! 2. Children are processed recursively and replaced if they changed.
//! 3. The node's bucket is scanned in registration order; the first rule whose
//!    pattern matches and whose transform accepts the node fires. The scan then
//!    restarts from the top of the bucket for the *new* node, whose operator type
//!    may differ.
//! 4. If any rule fired, the new subtree goes around the loop again, since its
//!    children may be fresh nodes that were never processed.
//!
//! ## Processed-subtree Memo
//!
//! A subtree is identified by its parent, its position under that parent, its
//! root id and its structural hash. Once a subtree reached a fixpoint it is
//! recorded and skipped on later visits, unless something inside it changed
//! (which changes the hash) or a rule moved it under another parent, where
//! ancestor-dependent rules may now apply. The same identity seen twice while
//! processing one node means the rules went around in a circle; the processor logs
//! it and stops there instead of spinning.

use crate::context::TransformationContext;
use crate::dispatch::RuleTable;
use crate::error::{PlanError, Result};
use crate::pattern;
use crate::tree::NodeId;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Position of a subtree: its parent and child index, `None` for the pass root.
type Slot = Option<(NodeId, usize)>;

type SubtreeId = (Slot, NodeId, u64);

pub struct RuleProcessor<'t> {
    table: &'t RuleTable,
    processed: HashSet<SubtreeId>,
    rules_fired: usize,
}

impl<'t> RuleProcessor<'t> {
    pub fn new(table: &'t RuleTable) -> Self {
        Self {
            table,
            processed: HashSet::new(),
            rules_fired: 0,
        }
    }

    /// Number of successful rule applications so far.
    pub fn rules_fired(&self) -> usize {
        self.rules_fired
    }

    /// Rewrite the tree rooted at `root` to a fixpoint and return the new root. If
    /// `root` is the command's root, the command's root is updated too.
    pub fn apply_rules(&mut self, ctx: &mut TransformationContext<'_>, root: NodeId) -> Result<NodeId> {
        debug!(
            "Starting rewrite pass: group={}, rules={}, nodes={}",
            self.table.name(),
            self.table.len(),
            ctx.command.num_nodes()
        );
        let new_root = self.apply_rules_to_subtree(ctx, root, None, 0)?;
        if ctx.command.root() == Some(root) {
            ctx.command.set_root(new_root);
        }
        debug!(
            "Rewrite pass complete: group={}, rules_fired={}, projection_pruning={}, reapply_nullability={}",
            self.table.name(),
            self.rules_fired,
            ctx.projection_pruning_required(),
            ctx.reapply_nullability_rules()
        );
        Ok(new_root)
    }

    fn apply_rules_to_subtree(
        &mut self,
        ctx: &mut TransformationContext<'_>,
        node: NodeId,
        slot: Slot,
        depth: usize,
    ) -> Result<NodeId> {
        if depth > ctx.config().max_tree_depth {
            return Err(PlanError::DepthLimitExceeded {
                depth: ctx.config().max_tree_depth,
            });
        }

        let mut node = node;
        let mut seen_here: HashSet<SubtreeId> = HashSet::new();
        loop {
            ctx.pre_process_subtree(node);

            let id = (slot, node, ctx.command.info(node).hash_value);
            if self.processed.contains(&id) {
                break;
            }
            if !seen_here.insert(id) {
                warn!("Rule cycle detected at node {}; leaving it as is", node);
                self.processed.insert(id);
                break;
            }

            let children = ctx.command.children(node).to_vec();
            for (i, child) in children.into_iter().enumerate() {
                let new_child =
                    self.apply_rules_to_subtree(ctx, child, Some((node, i)), depth + 1)?;
                if new_child != child {
                    ctx.command.set_child(node, i, new_child);
                }
            }
            ctx.command.recompute_node_info(node);

            match self.apply_rules_to_node(ctx, node)? {
                None => {
                    self.processed
                        .insert((slot, node, ctx.command.info(node).hash_value));
                    break;
                }
                Some(new_node) => {
                    ctx.post_process_subtree(node);
                    node = new_node;
                }
            }
        }
        ctx.post_process_subtree(node);
        Ok(node)
    }

    /// Try the node's bucket until a full scan changes nothing. Returns the
    /// replacement if any rule fired.
    fn apply_rules_to_node(
        &mut self,
        ctx: &mut TransformationContext<'_>,
        node: NodeId,
    ) -> Result<Option<NodeId>> {
        let table = self.table;
        let mut current = node;
        let mut changed = false;

        'scan: loop {
            ctx.command.check_arity(current)?;
            ctx.pre_process(current);
            let op_type = ctx.command.op_type(current);
            for entry in table.rules_for(op_type) {
                if !pattern::matches(ctx.command, current, &entry.pattern) {
                    continue;
                }
                let Some(new_node) = entry.rule.apply(ctx, current)? else {
                    continue;
                };
                trace!(
                    "Rule '{}' rewrote node {} into {}",
                    entry.rule.name(),
                    current,
                    new_node
                );
                ctx.post_process(new_node, entry.rule.as_ref());
                self.rules_fired += 1;
                current = new_node;
                changed = true;
                continue 'scan;
            }
            break;
        }

        Ok(changed.then_some(current))
    }
}
