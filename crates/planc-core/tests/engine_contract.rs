//! Rule processor contract tests, driven by small purpose-built rules.
//!
//! These check the engine rather than any real rewrite: post-order traversal,
//! re-dispatch after a rule changes a node's operator type, deferred Var remapping
//! reaching references the firing rule never saw, ancestor visibility, suppression,
//! and the processed-subtree memo.
//!
//! Set `RUST_LOG=planc_core=trace` to see every rule firing.

use planc_core::expr::{CompareOp, DataType, ScalarValue};
use planc_core::pattern::Pattern;
use planc_core::{
    Command, NodeId, Op, OpType, RewriteConfig, Rule, RuleProcessor, RuleResult, RuleTable,
    Suppression, TransformationContext, Var, VarList, VarSet,
};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scan(cmd: &mut Command, table: &str, cols: &[Var]) -> NodeId {
    cmd.leaf(Op::ScanTable {
        table: table.into(),
        columns: cols.iter().copied().collect(),
        keys: VarSet::new(),
    })
}

fn run(cmd: &mut Command, table: &RuleTable) -> (NodeId, usize) {
    init_tracing();
    let root = cmd.root().expect("test trees set a root");
    let config = RewriteConfig::default();
    let mut ctx = TransformationContext::new(cmd, &config);
    let mut processor = RuleProcessor::new(table);
    let new_root = processor.apply_rules(&mut ctx, root).expect("rewrite succeeds");
    (new_root, processor.rules_fired())
}

// ---------------------------------------------------------------------------
// Toy rules
// ---------------------------------------------------------------------------

/// `Or(a, b)` -> `And(a, b)`. Not sound; only changes the operator type.
struct OrToAnd;

impl Rule for OrToAnd {
    fn name(&self) -> &str {
        "OrToAnd"
    }
    fn op_type(&self) -> OpType {
        OpType::Or
    }
    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let children = ctx.command.children(node).to_vec();
        Ok(Some(ctx.command.create_node(Op::And, children)))
    }
}

/// `And(true, true)` -> `true`.
struct AndOfTrue;

impl Rule for AndOfTrue {
    fn name(&self) -> &str {
        "AndOfTrue"
    }
    fn op_type(&self) -> OpType {
        OpType::And
    }
    fn pattern(&self) -> Pattern {
        Pattern::node(
            OpType::And,
            vec![Pattern::constant_predicate(true), Pattern::constant_predicate(true)],
        )
    }
    fn apply(&self, ctx: &mut TransformationContext<'_>, _node: NodeId) -> RuleResult {
        Ok(Some(ctx.command.constant_predicate(true)))
    }
}

/// Drops a projection definition that merely renames an input Var.
struct DropRename;

impl Rule for DropRename {
    fn name(&self) -> &str {
        "DropRename"
    }
    fn op_type(&self) -> OpType {
        OpType::Project
    }
    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        let Op::Project { outputs } = ctx.command.op(node).clone() else {
            return Ok(None);
        };
        let defs = ctx.command.child(node, 1);
        let Some(&def) = ctx.command.children(defs).first() else {
            return Ok(None);
        };
        let Op::VarDef(new_var) = *ctx.command.op(def) else {
            return Ok(None);
        };
        let Op::VarRef(old) = *ctx.command.op(ctx.command.child(def, 0)) else {
            return Ok(None);
        };
        let mut outputs: VarList = outputs;
        outputs.replace(new_var, old);
        let input = ctx.command.child(node, 0);
        let empty = ctx.command.var_def_list(vec![]);
        ctx.add_var_mapping(new_var, old);
        Ok(Some(
            ctx.command
                .create_node(Op::Project { outputs }, vec![input, empty]),
        ))
    }
}

/// Records the innermost relational ancestor of every `IsNull` it sees.
#[derive(Default, Clone)]
struct RecordParent(Arc<Mutex<Vec<Option<OpType>>>>);

impl Rule for RecordParent {
    fn name(&self) -> &str {
        "RecordParent"
    }
    fn op_type(&self) -> OpType {
        OpType::IsNull
    }
    fn apply(&self, ctx: &mut TransformationContext<'_>, _node: NodeId) -> RuleResult {
        if let Ok(mut seen) = self.0.lock() {
            seen.push(ctx.parent_relop_type());
        }
        Ok(None)
    }
}

/// Re-creates a filter once and marks the copy so it is never re-created again.
struct CopyFilterOnce;

impl Rule for CopyFilterOnce {
    fn name(&self) -> &str {
        "CopyFilterOnce"
    }
    fn op_type(&self) -> OpType {
        OpType::Filter
    }
    fn apply(&self, ctx: &mut TransformationContext<'_>, node: NodeId) -> RuleResult {
        if ctx.is_suppressed(node, Suppression::FilterPushdown) {
            return Ok(None);
        }
        let children = ctx.command.children(node).to_vec();
        let copy = ctx.command.create_node(Op::Filter, children);
        ctx.suppress(copy, Suppression::FilterPushdown);
        Ok(Some(copy))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_rescan_uses_the_new_operator_bucket() {
    let mut cmd = Command::new();
    let t1 = cmd.constant_predicate(true);
    let t2 = cmd.constant_predicate(true);
    let or = cmd.create_node(Op::Or, vec![t1, t2]);
    cmd.set_root(or);

    let table = RuleTable::new("toy", vec![Box::new(OrToAnd), Box::new(AndOfTrue)]);
    let (root, fired) = run(&mut cmd, &table);
    assert_eq!(cmd.op(root), &Op::ConstantPredicate(true));
    assert_eq!(fired, 2, "Or->And, then And(true,true)->true");
}

#[test]
fn test_remapping_reaches_references_above_the_rewrite() {
    let mut cmd = Command::new();
    let x = cmd.create_column_var("t", "x", DataType::Int64, true);
    let s = scan(&mut cmd, "t", &[x]);
    let xr = cmd.var_ref(x);
    let (def, y) = cmd.create_var_def(xr);
    let defs = cmd.var_def_list(vec![def]);
    let proj = cmd.create_node(
        Op::Project {
            outputs: [y].into_iter().collect(),
        },
        vec![s, defs],
    );
    let yr = cmd.var_ref(y);
    let one = cmd.constant(ScalarValue::Int64(1));
    let gt = cmd.create_node(Op::Comparison(CompareOp::Gt), vec![yr, one]);
    let filter = cmd.create_node(Op::Filter, vec![proj, gt]);
    cmd.set_root(filter);

    let table = RuleTable::new("toy", vec![Box::new(DropRename)]);
    let (root, fired) = run(&mut cmd, &table);
    assert_eq!(fired, 1);
    assert!(
        !cmd.referenced_vars(root).contains(y),
        "no reference to the erased var may survive"
    );
    assert!(cmd.referenced_vars(root).contains(x));
    assert!(cmd.info(root).external_references.is_empty());
}

#[test]
fn test_rules_see_their_relational_ancestors() {
    let mut cmd = Command::new();
    let x = cmd.create_column_var("t", "x", DataType::Int64, true);
    let s = scan(&mut cmd, "t", &[x]);
    let xr = cmd.var_ref(x);
    let is_null = cmd.create_node(Op::IsNull, vec![xr]);
    let filter = cmd.create_node(Op::Filter, vec![s, is_null]);
    cmd.set_root(filter);

    let recorder = RecordParent::default();
    let table = RuleTable::new("toy", vec![Box::new(recorder.clone())]);
    let (_, fired) = run(&mut cmd, &table);
    assert_eq!(fired, 0);
    let seen = recorder.0.lock().expect("not poisoned").clone();
    assert_eq!(seen, vec![Some(OpType::Filter)]);
}

#[test]
fn test_ancestor_is_the_enclosing_filter() {
    let recorder = RecordParent::default();
    let mut cmd = Command::new();
    let x = cmd.create_column_var("t", "x", DataType::Int64, true);
    let s = scan(&mut cmd, "t", &[x]);
    let xr = cmd.var_ref(x);
    let is_null = cmd.create_node(Op::IsNull, vec![xr]);
    let filter = cmd.create_node(Op::Filter, vec![s, is_null]);

    let config = RewriteConfig::default();
    let mut ctx = TransformationContext::new(&mut cmd, &config);
    ctx.pre_process_subtree(filter);
    recorder.apply(&mut ctx, is_null).expect("recording never fails");
    ctx.post_process_subtree(filter);
    recorder.apply(&mut ctx, is_null).expect("recording never fails");

    let seen = recorder.0.lock().expect("not poisoned").clone();
    assert_eq!(seen, vec![Some(OpType::Filter), None]);
}

#[test]
fn test_suppression_stops_a_self_reproducing_rule() {
    let mut cmd = Command::new();
    let x = cmd.create_column_var("t", "x", DataType::Int64, true);
    let s = scan(&mut cmd, "t", &[x]);
    let p = cmd.constant_predicate(true);
    let filter = cmd.create_node(Op::Filter, vec![s, p]);
    cmd.set_root(filter);

    let table = RuleTable::new("toy", vec![Box::new(CopyFilterOnce)]);
    let (root, fired) = run(&mut cmd, &table);
    assert_eq!(fired, 1);
    assert_ne!(root, filter);
}

#[test]
fn test_second_pass_over_a_fixpoint_fires_nothing() {
    let mut cmd = Command::new();
    let t1 = cmd.constant_predicate(true);
    let t2 = cmd.constant_predicate(true);
    let or = cmd.create_node(Op::Or, vec![t1, t2]);
    let t3 = cmd.constant_predicate(true);
    let and = cmd.create_node(Op::And, vec![or, t3]);
    cmd.set_root(and);

    let table = RuleTable::new("toy", vec![Box::new(OrToAnd), Box::new(AndOfTrue)]);
    let (first_root, first) = run(&mut cmd, &table);
    assert!(first > 0);
    let (second_root, second) = run(&mut cmd, &table);
    assert_eq!(second, 0);
    assert_eq!(first_root, second_root);
}
