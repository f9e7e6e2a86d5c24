//! Rewrites must not change query results.
//!
//! Every test here evaluates a tree over small in-memory tables, runs the driver,
//! evaluates the rewritten tree again and compares the two results as multisets.
//! The tables include null columns and join keys without a partner, so that
//! three-valued logic and null-extended outer join rows are exercised.

use planc_core::eval::{canonical_rows, Database, Evaluator};
use planc_core::expr::{AggFunc, ArithOp, CompareOp, DataType, ScalarValue};
use planc_core::{Command, NodeId, Op, RewriteConfig, Var, VarSet};
use planc_rules::{process, RuleGroup};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int(v: i64) -> ScalarValue {
    ScalarValue::Int64(v)
}

/// Columns of `t`: `a` (non-null key), `x` (nullable int), `flag` (nullable bool).
/// Columns of `u`: `b` (non-null), `y` (nullable int).
struct Fixture {
    cmd: Command,
    db: Database,
    a: Var,
    x: Var,
    flag: Var,
    b: Var,
    y: Var,
}

impl Fixture {
    fn new() -> Self {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("t", "a", DataType::Int64, false);
        let x = cmd.create_column_var("t", "x", DataType::Int64, true);
        let flag = cmd.create_column_var("t", "flag", DataType::Bool, true);
        let b = cmd.create_column_var("u", "b", DataType::Int64, false);
        let y = cmd.create_column_var("u", "y", DataType::Int64, true);

        let mut db = Database::new();
        db.add_table(
            "t",
            vec![
                vec![int(1), int(0), ScalarValue::Bool(true)],
                vec![int(2), int(3), ScalarValue::Bool(false)],
                vec![int(3), ScalarValue::Null, ScalarValue::Null],
                vec![int(4), int(7), ScalarValue::Bool(true)],
            ],
        );
        db.add_table(
            "u",
            vec![
                vec![int(1), int(5)],
                vec![int(2), ScalarValue::Null],
                vec![int(2), int(6)],
                vec![int(9), int(5)],
            ],
        );
        Self {
            cmd,
            db,
            a,
            x,
            flag,
            b,
            y,
        }
    }

    fn t(&mut self) -> NodeId {
        self.cmd.leaf(Op::ScanTable {
            table: "t".into(),
            columns: [self.a, self.x, self.flag].into_iter().collect(),
            keys: VarSet::new(),
        })
    }

    fn u(&mut self) -> NodeId {
        self.cmd.leaf(Op::ScanTable {
            table: "u".into(),
            columns: [self.b, self.y].into_iter().collect(),
            keys: VarSet::new(),
        })
    }

    fn compare(&mut self, op: CompareOp, left: Var, right: Var) -> NodeId {
        let l = self.cmd.var_ref(left);
        let r = self.cmd.var_ref(right);
        self.cmd.create_node(Op::Comparison(op), vec![l, r])
    }

    fn compare_const(&mut self, op: CompareOp, var: Var, value: i64) -> NodeId {
        let l = self.cmd.var_ref(var);
        let r = self.cmd.constant(int(value));
        self.cmd.create_node(Op::Comparison(op), vec![l, r])
    }

    /// `PhysicalProject{outputs}(input)` as the command's root.
    fn expose(&mut self, input: NodeId, outputs: &[Var]) {
        let top = self.cmd.create_node(
            Op::PhysicalProject {
                outputs: outputs.iter().copied().collect(),
            },
            vec![input],
        );
        self.cmd.set_root(top);
    }

    /// Result of the current root, rendered over its exposed outputs.
    fn evaluate(&self) -> Vec<String> {
        let root = self.cmd.root().expect("fixture trees set a root");
        let Op::PhysicalProject { outputs } = self.cmd.op(root) else {
            panic!("fixture trees are rooted at the exposed projection");
        };
        let rows = Evaluator::new(&self.cmd, &self.db)
            .eval(root)
            .expect("evaluation succeeds");
        canonical_rows(&rows, outputs.as_slice())
    }

    /// Rewrite with `group` and check the result did not change.
    fn assert_rewrite_preserves_results(&mut self, group: RuleGroup) -> NodeId {
        init_tracing();
        let before = self.evaluate();
        let root = self.cmd.root().unwrap();
        let plan_before = self.cmd.display(root);
        process(&mut self.cmd, group, &RewriteConfig::default()).expect("rewrite succeeds");
        let after = self.evaluate();
        let root = self.cmd.root().unwrap();
        assert_eq!(
            before,
            after,
            "results differ\nbefore:\n{}after:\n{}",
            plan_before,
            self.cmd.display(root)
        );
        root
    }
}

/// A scalar expression under test, built over the fixture's columns.
type ScalarCase = fn(&mut Fixture) -> NodeId;

/// Project `expr` as a new column over `t` and check the rewrite preserves it.
fn check_scalar(build: ScalarCase) {
    let mut f = Fixture::new();
    let t = f.t();
    let expr = build(&mut f);
    let (def, v) = f.cmd.create_var_def(expr);
    let defs = f.cmd.var_def_list(vec![def]);
    let project = f.cmd.create_node(
        Op::Project {
            outputs: [f.a, v].into_iter().collect(),
        },
        vec![t, defs],
    );
    f.expose(project, &[f.a, v]);
    f.assert_rewrite_preserves_results(RuleGroup::All);
}

/// Filter `t` by `pred` and check the rewrite keeps the same rows.
fn check_predicate(build: ScalarCase) {
    let mut f = Fixture::new();
    let t = f.t();
    let pred = build(&mut f);
    let filter = f.cmd.create_node(Op::Filter, vec![t, pred]);
    f.expose(filter, &[f.a, f.x]);
    f.assert_rewrite_preserves_results(RuleGroup::All);
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

#[test]
fn test_folded_comparisons_agree_with_evaluation() {
    let cases: Vec<ScalarCase> = vec![
        |f: &mut Fixture| {
            let l = f.cmd.constant(ScalarValue::Utf8("a".into()));
            let r = f.cmd.constant(ScalarValue::Utf8("a".into()));
            f.cmd.create_node(Op::Comparison(CompareOp::Eq), vec![l, r])
        },
        |f: &mut Fixture| {
            let l = f.cmd.constant(int(1));
            let r = f.cmd.constant(int(2));
            f.cmd.create_node(Op::Comparison(CompareOp::NotEq), vec![l, r])
        },
        |f: &mut Fixture| {
            let l = f.cmd.constant(int(1));
            let r = f.cmd.null(DataType::Int64);
            f.cmd.create_node(Op::Comparison(CompareOp::Eq), vec![l, r])
        },
        |f: &mut Fixture| {
            let s = f.cmd.constant(ScalarValue::Utf8("abcdef".into()));
            let p = f.cmd.constant(ScalarValue::Utf8("abc%".into()));
            let e = f.cmd.null(DataType::Utf8);
            f.cmd.create_node(Op::Like, vec![s, p, e])
        },
        |f: &mut Fixture| {
            let s = f.cmd.constant(ScalarValue::Utf8("xbcdef".into()));
            let p = f.cmd.constant(ScalarValue::Utf8("abc%".into()));
            let e = f.cmd.null(DataType::Utf8);
            f.cmd.create_node(Op::Like, vec![s, p, e])
        },
    ];
    for case in cases {
        check_scalar(case);
        check_predicate(case);
    }
}

// ---------------------------------------------------------------------------
// Boolean laws
// ---------------------------------------------------------------------------

#[test]
fn test_boolean_simplifications_agree_with_three_valued_logic() {
    let cases: Vec<ScalarCase> = vec![
        // true AND p
        |f: &mut Fixture| {
            let t = f.cmd.constant_predicate(true);
            let p = f.cmd.var_ref(f.flag);
            f.cmd.create_node(Op::And, vec![t, p])
        },
        // p AND false
        |f: &mut Fixture| {
            let p = f.cmd.var_ref(f.flag);
            let no = f.cmd.constant_predicate(false);
            f.cmd.create_node(Op::And, vec![p, no])
        },
        // false OR x > 1
        |f: &mut Fixture| {
            let no = f.cmd.constant_predicate(false);
            let p = f.compare_const(CompareOp::Gt, f.x, 1);
            f.cmd.create_node(Op::Or, vec![no, p])
        },
        // x > 1 OR true
        |f: &mut Fixture| {
            let p = f.compare_const(CompareOp::Gt, f.x, 1);
            let yes = f.cmd.constant_predicate(true);
            f.cmd.create_node(Op::Or, vec![p, yes])
        },
        // NOT true
        |f: &mut Fixture| {
            let yes = f.cmd.constant_predicate(true);
            f.cmd.create_node(Op::Not, vec![yes])
        },
        // NOT NOT flag
        |f: &mut Fixture| {
            let p = f.cmd.var_ref(f.flag);
            let n = f.cmd.create_node(Op::Not, vec![p]);
            f.cmd.create_node(Op::Not, vec![n])
        },
        // 1 IS NULL
        |f: &mut Fixture| {
            let one = f.cmd.constant(int(1));
            f.cmd.create_node(Op::IsNull, vec![one])
        },
        // null IS NULL
        |f: &mut Fixture| {
            let null = f.cmd.null(DataType::Int64);
            f.cmd.create_node(Op::IsNull, vec![null])
        },
        // CAST(null AS int) IS NULL
        |f: &mut Fixture| {
            let null = f.cmd.null(DataType::Utf8);
            let cast = f.cmd.create_node(Op::Cast(DataType::Int64), vec![null]);
            f.cmd.create_node(Op::IsNull, vec![cast])
        },
        // a IS NULL, a is declared non-null
        |f: &mut Fixture| {
            let a = f.cmd.var_ref(f.a);
            f.cmd.create_node(Op::IsNull, vec![a])
        },
        // x IS NULL must stay
        |f: &mut Fixture| {
            let x = f.cmd.var_ref(f.x);
            f.cmd.create_node(Op::IsNull, vec![x])
        },
    ];
    for case in cases {
        check_scalar(case);
        check_predicate(case);
    }
}

#[test]
fn test_case_simplifications_agree_with_evaluation() {
    let cases: Vec<ScalarCase> = vec![
        // CASE WHEN false THEN flag ELSE NOT flag END
        |f: &mut Fixture| {
            let no = f.cmd.constant_predicate(false);
            let p = f.cmd.var_ref(f.flag);
            let q = f.cmd.var_ref(f.flag);
            let not_q = f.cmd.create_node(Op::Not, vec![q]);
            f.cmd.create_node(Op::Case, vec![no, p, not_q])
        },
        // CASE WHEN x > 1 THEN flag WHEN true THEN x IS NULL ELSE false END
        |f: &mut Fixture| {
            let w1 = f.compare_const(CompareOp::Gt, f.x, 1);
            let t1 = f.cmd.var_ref(f.flag);
            let w2 = f.cmd.constant_predicate(true);
            let x = f.cmd.var_ref(f.x);
            let t2 = f.cmd.create_node(Op::IsNull, vec![x]);
            let e = f.cmd.constant_predicate(false);
            f.cmd.create_node(Op::Case, vec![w1, t1, w2, t2, e])
        },
        // CASE WHEN x > 1 THEN flag ELSE CASE WHEN x < 5 THEN NOT flag ELSE flag END END
        |f: &mut Fixture| {
            let w1 = f.compare_const(CompareOp::Gt, f.x, 1);
            let t1 = f.cmd.var_ref(f.flag);
            let w2 = f.compare_const(CompareOp::Lt, f.x, 5);
            let q = f.cmd.var_ref(f.flag);
            let t2 = f.cmd.create_node(Op::Not, vec![q]);
            let e2 = f.cmd.var_ref(f.flag);
            let inner = f.cmd.create_node(Op::Case, vec![w2, t2, e2]);
            f.cmd.create_node(Op::Case, vec![w1, t1, inner])
        },
        // CASE WHEN x > 1 THEN flag ELSE flag END
        |f: &mut Fixture| {
            let w = f.compare_const(CompareOp::Gt, f.x, 1);
            let t = f.cmd.var_ref(f.flag);
            let e = f.cmd.var_ref(f.flag);
            f.cmd.create_node(Op::Case, vec![w, t, e])
        },
    ];
    for case in cases {
        check_scalar(case);
        check_predicate(case);
    }
}

// ---------------------------------------------------------------------------
// Filter pushdown
// ---------------------------------------------------------------------------

/// `Filter(join(t, u, a = b), pred)` for each join kind.
fn check_filter_over_join(join: Op, pred: ScalarCase) {
    let mut f = Fixture::new();
    let t = f.t();
    let u = f.u();
    let joined = match join {
        Op::CrossJoin => f.cmd.create_node(Op::CrossJoin, vec![t, u]),
        op => {
            let on = f.compare(CompareOp::Eq, f.a, f.b);
            f.cmd.create_node(op, vec![t, u, on])
        }
    };
    let p = pred(&mut f);
    let filter = f.cmd.create_node(Op::Filter, vec![joined, p]);
    f.expose(filter, &[f.a, f.x, f.b, f.y]);
    f.assert_rewrite_preserves_results(RuleGroup::All);
}

fn join_predicates() -> Vec<ScalarCase> {
    vec![
        // left only
        |f: &mut Fixture| f.compare_const(CompareOp::Gt, f.x, 1),
        // right only, rejects nulls
        |f: &mut Fixture| f.compare_const(CompareOp::Eq, f.y, 5),
        // right only, keeps null-extended rows
        |f: &mut Fixture| {
            let y = f.cmd.var_ref(f.y);
            f.cmd.create_node(Op::IsNull, vec![y])
        },
        // both sides
        |f: &mut Fixture| f.compare(CompareOp::LtEq, f.x, f.y),
        // left AND right
        |f: &mut Fixture| {
            let l = f.compare_const(CompareOp::Gt, f.x, 1);
            let r = f.compare_const(CompareOp::GtEq, f.y, 5);
            f.cmd.and(l, r)
        },
        // a literal conjunct along the way
        |f: &mut Fixture| {
            let l = f.compare(CompareOp::Eq, f.a, f.b);
            let yes = f.cmd.constant_predicate(true);
            f.cmd.and(yes, l)
        },
    ]
}

#[test]
fn test_filter_over_cross_join_preserves_results() {
    for pred in join_predicates() {
        check_filter_over_join(Op::CrossJoin, pred);
    }
}

#[test]
fn test_filter_over_inner_join_preserves_results() {
    for pred in join_predicates() {
        check_filter_over_join(Op::InnerJoin, pred);
    }
}

#[test]
fn test_filter_over_left_outer_join_preserves_null_extended_rows() {
    for pred in join_predicates() {
        check_filter_over_join(Op::LeftOuterJoin, pred);
    }
}

#[test]
fn test_filter_over_projection_preserves_results() {
    let mut f = Fixture::new();
    let t = f.t();
    let xr = f.cmd.var_ref(f.x);
    let two = f.cmd.constant(int(2));
    let times = f.cmd.create_node(
        Op::Arithmetic(ArithOp::Mul),
        vec![xr, two],
    );
    let (def, doubled) = f.cmd.create_var_def(times);
    let defs = f.cmd.var_def_list(vec![def]);
    let project = f.cmd.create_node(
        Op::Project {
            outputs: [f.a, doubled].into_iter().collect(),
        },
        vec![t, defs],
    );
    let pred = f.compare_const(CompareOp::Gt, doubled, 4);
    let filter = f.cmd.create_node(Op::Filter, vec![project, pred]);
    f.expose(filter, &[f.a, doubled]);

    let root = f.assert_rewrite_preserves_results(RuleGroup::All);
    let below = f.cmd.child(root, 0);
    assert!(
        matches!(f.cmd.op(below), Op::Project { .. }),
        "the filter moved below the projection:\n{}",
        f.cmd.display(root)
    );
}

// ---------------------------------------------------------------------------
// Decorrelation
// ---------------------------------------------------------------------------

#[test]
fn test_outer_apply_over_filter_keeps_unmatched_rows() {
    let mut f = Fixture::new();
    let t = f.t();
    let u = f.u();
    let corr = f.compare(CompareOp::Eq, f.b, f.a);
    let filter = f.cmd.create_node(Op::Filter, vec![u, corr]);
    let apply = f.cmd.create_node(Op::OuterApply, vec![t, filter]);
    f.expose(apply, &[f.a, f.x, f.b, f.y]);

    let root = f.assert_rewrite_preserves_results(RuleGroup::All);
    assert_eq!(f.cmd.op(f.cmd.child(root, 0)), &Op::LeftOuterJoin);
}

#[test]
fn test_uncorrelated_applies_preserve_results() {
    for apply in [Op::CrossApply, Op::OuterApply] {
        let mut f = Fixture::new();
        let t = f.t();
        let u = f.u();
        let pred = f.compare_const(CompareOp::Eq, f.y, 5);
        let filtered = f.cmd.create_node(Op::Filter, vec![u, pred]);
        let node = f.cmd.create_node(apply, vec![t, filtered]);
        f.expose(node, &[f.a, f.b]);
        let root = f.assert_rewrite_preserves_results(RuleGroup::All);
        assert!(
            !f.cmd
                .any_in_subtree(root, |op| matches!(op, Op::CrossApply | Op::OuterApply)),
            "{}",
            f.cmd.display(root)
        );
    }
}

#[test]
fn test_aggregate_grouped_on_every_column_is_computed_per_row() {
    let mut f = Fixture::new();
    let keyed = f.cmd.leaf(Op::ScanTable {
        table: "t".into(),
        columns: [f.a, f.x, f.flag].into_iter().collect(),
        keys: [f.a].into_iter().collect(),
    });
    let xr = f.cmd.var_ref(f.x);
    let count = f.cmd.create_node(Op::Aggregate(AggFunc::Count), vec![xr]);
    let (def, c) = f.cmd.create_var_def(count);
    let key_defs = f.cmd.var_def_list(vec![]);
    let aggs = f.cmd.var_def_list(vec![def]);
    let group_by = f.cmd.create_node(
        Op::GroupBy {
            keys: [f.a, f.x, f.flag].into_iter().collect(),
            outputs: [f.a, f.x, f.flag, c].into_iter().collect(),
        },
        vec![keyed, key_defs, aggs],
    );
    f.expose(group_by, &[c]);

    let root = f.assert_rewrite_preserves_results(RuleGroup::All);
    assert!(
        f.cmd.any_in_subtree(root, |op| matches!(op, Op::OuterApply)),
        "{}",
        f.cmd.display(root)
    );
}

// ---------------------------------------------------------------------------
// Redundancy elimination
// ---------------------------------------------------------------------------

#[test]
fn test_renamed_column_is_remapped_everywhere() {
    let mut f = Fixture::new();
    let t = f.t();
    let xr = f.cmd.var_ref(f.x);
    let (def, alias) = f.cmd.create_var_def(xr);
    let defs = f.cmd.var_def_list(vec![def]);
    let project = f.cmd.create_node(
        Op::Project {
            outputs: [f.a, alias].into_iter().collect(),
        },
        vec![t, defs],
    );
    let pred = f.compare_const(CompareOp::Gt, alias, 1);
    let filter = f.cmd.create_node(Op::Filter, vec![project, pred]);
    f.expose(filter, &[f.a, alias]);

    let root = f.assert_rewrite_preserves_results(RuleGroup::All);
    let refs_alias = f
        .cmd
        .any_in_subtree(root, |op| matches!(op, Op::VarRef(v) | Op::VarDef(v) if *v == alias));
    assert!(!refs_alias, "alias survived:\n{}", f.cmd.display(root));
    let Op::PhysicalProject { outputs } = f.cmd.op(root) else {
        panic!("the exposed projection stays on top");
    };
    assert_eq!(outputs.as_slice(), &[f.a, f.x]);
}

#[test]
fn test_redundant_sentinels_preserve_results() {
    let mut f = Fixture::new();
    let t = f.t();
    let s1 = f.cmd.leaf(Op::NullSentinel);
    let (d1, v1) = f.cmd.create_var_def(s1);
    let s2 = f.cmd.leaf(Op::NullSentinel);
    let (d2, v2) = f.cmd.create_var_def(s2);
    let defs = f.cmd.var_def_list(vec![d1, d2]);
    let project = f.cmd.create_node(
        Op::Project {
            outputs: [f.a, v1, v2].into_iter().collect(),
        },
        vec![t, defs],
    );
    f.expose(project, &[f.a]);
    f.assert_rewrite_preserves_results(RuleGroup::All);
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn test_second_pass_changes_nothing() {
    let builders: Vec<fn(&mut Fixture)> = vec![
        |f: &mut Fixture| {
            let t = f.t();
            let xr = f.cmd.var_ref(f.x);
            let one = f.cmd.constant(int(1));
            let plus = f.cmd.create_node(
                Op::Arithmetic(ArithOp::Add),
                vec![xr, one],
            );
            let (def, v) = f.cmd.create_var_def(plus);
            let defs = f.cmd.var_def_list(vec![def]);
            let project = f.cmd.create_node(
                Op::Project {
                    outputs: [f.x, v].into_iter().collect(),
                },
                vec![t, defs],
            );
            let yes = f.cmd.constant_predicate(true);
            let gt = f.compare_const(CompareOp::Gt, v, 3);
            let pred = f.cmd.create_node(Op::And, vec![yes, gt]);
            let filter = f.cmd.create_node(Op::Filter, vec![project, pred]);
            f.expose(filter, &[f.x, v]);
        },
        |f: &mut Fixture| {
            let t = f.t();
            let u = f.u();
            let cross = f.cmd.create_node(Op::CrossJoin, vec![t, u]);
            let eq = f.compare(CompareOp::Eq, f.a, f.b);
            let gt = f.compare_const(CompareOp::Gt, f.x, 1);
            let pred = f.cmd.and(eq, gt);
            let filter = f.cmd.create_node(Op::Filter, vec![cross, pred]);
            f.expose(filter, &[f.a, f.y]);
        },
        |f: &mut Fixture| {
            let t = f.t();
            let u = f.u();
            let on = f.compare(CompareOp::Eq, f.a, f.b);
            let loj = f.cmd.create_node(Op::LeftOuterJoin, vec![t, u, on]);
            let y = f.cmd.var_ref(f.y);
            let pred = f.cmd.create_node(Op::IsNull, vec![y]);
            let filter = f.cmd.create_node(Op::Filter, vec![loj, pred]);
            f.expose(filter, &[f.a, f.y]);
        },
    ];

    init_tracing();
    let config = RewriteConfig::default();
    for build in builders {
        let mut f = Fixture::new();
        build(&mut f);
        process(&mut f.cmd, RuleGroup::All, &config).unwrap();
        let first = f.cmd.display(f.cmd.root().unwrap());
        process(&mut f.cmd, RuleGroup::All, &config).unwrap();
        let second = f.cmd.display(f.cmd.root().unwrap());
        assert_eq!(first, second);
    }
}
