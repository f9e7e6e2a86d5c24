//! # Reference Evaluator
//!
//! A deliberately naive interpreter for IR trees over in-memory tables. It exists to
//! check rewrites: evaluate a tree before and after the rule processor ran, and
//! compare the results. Nothing here is tuned for speed.
//!
//! ## Semantics
//!
//! - Scalars follow SQL three-valued logic. A predicate keeps a row only when it
//!   evaluates to `true`; `false` and null both drop it.
//! - Joins are nested loops. Outer joins extend unmatched rows with nulls for every
//!   Var the other side defines.
//! - Apply operators evaluate the right side once per left row, with the left row
//!   visible as outer bindings.
//! - `Intersect` and `Except` have set semantics and treat nulls as equal.
//! - A `GroupBy` without keys yields exactly one row, even over empty input.

use crate::error::{PlanError, Result};
use crate::expr::{AggFunc, ArithOp, CompareOp, DataType, Op, ScalarValue, SortKey};
use crate::tree::{Command, NodeId};
use crate::var::{Var, VarSet};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Var bindings of one row.
pub type Row = BTreeMap<Var, ScalarValue>;

/// In-memory base tables. Each stored row lists values in the order of the
/// scanning operator's columns.
#[derive(Debug, Clone, Default)]
pub struct Database {
    tables: HashMap<String, Vec<Vec<ScalarValue>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: &str, rows: Vec<Vec<ScalarValue>>) {
        self.tables.insert(name.to_string(), rows);
    }
}

pub struct Evaluator<'a> {
    cmd: &'a Command,
    db: &'a Database,
    params: Row,
}

fn err(msg: impl Into<String>) -> PlanError {
    PlanError::Evaluation(msg.into())
}

impl<'a> Evaluator<'a> {
    pub fn new(cmd: &'a Command, db: &'a Database) -> Self {
        Self {
            cmd,
            db,
            params: Row::new(),
        }
    }

    /// Bind parameter (or otherwise free) Vars.
    pub fn with_params(mut self, params: Row) -> Self {
        self.params = params;
        self
    }

    /// Evaluate a relational subtree at the top level.
    pub fn eval(&self, node: NodeId) -> Result<Vec<Row>> {
        self.eval_relation(node, &self.params)
    }

    /// Evaluate a relational subtree with `outer` visible to correlated references.
    pub fn eval_relation(&self, node: NodeId, outer: &Row) -> Result<Vec<Row>> {
        let cmd = self.cmd;
        let child = |i: usize| cmd.child(node, i);
        match cmd.op(node) {
            Op::ScanTable { table, columns, .. } => {
                let rows = self
                    .db
                    .tables
                    .get(table)
                    .ok_or_else(|| err(format!("no table named {table}")))?;
                rows.iter()
                    .map(|values| {
                        if values.len() != columns.len() {
                            return Err(err(format!("row width mismatch in {table}")));
                        }
                        Ok(columns.iter().zip(values.iter().cloned()).collect())
                    })
                    .collect()
            }
            Op::SingleRowTable => Ok(vec![Row::new()]),
            Op::Filter => {
                let mut out = Vec::new();
                for row in self.eval_relation(child(0), outer)? {
                    if self.is_true(child(1), &merged(outer, &row))? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            Op::Project { outputs } | Op::PhysicalProject { outputs } => {
                let input = self.eval_relation(child(0), outer)?;
                let defs = match cmd.op(node) {
                    Op::Project { .. } => Some(child(1)),
                    _ => None,
                };
                let mut out = Vec::with_capacity(input.len());
                for mut row in input {
                    if let Some(defs) = defs {
                        self.bind_defs(defs, &mut row, outer)?;
                    }
                    out.push(restrict(&row, outputs.iter()));
                }
                Ok(out)
            }
            Op::CrossJoin | Op::InnerJoin | Op::LeftOuterJoin | Op::FullOuterJoin => {
                let op = cmd.op(node).clone();
                let left = self.eval_relation(child(0), outer)?;
                let right = self.eval_relation(child(1), outer)?;
                let cond = cmd.children(node).get(2).copied();
                let mut out = Vec::new();
                let mut right_matched = vec![false; right.len()];
                for l in &left {
                    let mut matched = false;
                    for (j, r) in right.iter().enumerate() {
                        let combined = merged(l, r);
                        let keep = match cond {
                            Some(c) => self.is_true(c, &merged(outer, &combined))?,
                            None => true,
                        };
                        if keep {
                            matched = true;
                            right_matched[j] = true;
                            out.push(combined);
                        }
                    }
                    if !matched && matches!(op, Op::LeftOuterJoin | Op::FullOuterJoin) {
                        out.push(null_extend(l, &cmd.info(child(1)).definitions));
                    }
                }
                if matches!(op, Op::FullOuterJoin) {
                    for (j, r) in right.iter().enumerate() {
                        if !right_matched[j] {
                            out.push(null_extend(r, &cmd.info(child(0)).definitions));
                        }
                    }
                }
                Ok(out)
            }
            Op::CrossApply | Op::OuterApply => {
                let outer_apply = matches!(cmd.op(node), Op::OuterApply);
                let mut out = Vec::new();
                for l in self.eval_relation(child(0), outer)? {
                    let rights = self.eval_relation(child(1), &merged(outer, &l))?;
                    if rights.is_empty() && outer_apply {
                        out.push(null_extend(&l, &cmd.info(child(1)).definitions));
                    }
                    for r in rights {
                        out.push(merged(&l, &r));
                    }
                }
                Ok(out)
            }
            Op::UnionAll(s) | Op::Intersect(s) | Op::Except(s) => {
                let mut branches = Vec::with_capacity(2);
                for (i, map) in s.var_maps.iter().enumerate() {
                    let rows = self.eval_relation(child(i), outer)?;
                    let mapped: Vec<Row> = rows
                        .iter()
                        .map(|r| {
                            s.outputs
                                .iter()
                                .map(|o| {
                                    let v = map.get(o).and_then(|b| r.get(&b).cloned());
                                    (o, v.unwrap_or(ScalarValue::Null))
                                })
                                .collect()
                        })
                        .collect();
                    branches.push(mapped);
                }
                let right = branches.pop().unwrap_or_default();
                let left = branches.pop().unwrap_or_default();
                Ok(match cmd.op(node) {
                    Op::UnionAll(_) => left.into_iter().chain(right).collect(),
                    Op::Intersect(_) => dedup(left)
                        .into_iter()
                        .filter(|r| right.contains(r))
                        .collect(),
                    _ => dedup(left)
                        .into_iter()
                        .filter(|r| !right.contains(r))
                        .collect(),
                })
            }
            Op::GroupBy { keys, outputs } => self.eval_group_by(node, keys, outputs, outer),
            Op::Distinct { keys } => {
                let rows = self.eval_relation(child(0), outer)?;
                Ok(dedup(rows.iter().map(|r| restrict(r, keys.iter())).collect()))
            }
            Op::Sort { keys } => {
                let mut rows = self.eval_relation(child(0), outer)?;
                sort_rows(&mut rows, keys);
                Ok(rows)
            }
            Op::ConstrainedSort { keys } => {
                let mut rows = self.eval_relation(child(0), outer)?;
                sort_rows(&mut rows, keys);
                let skip = self.eval_count(child(1), outer)?.unwrap_or(0);
                let limit = self.eval_count(child(2), outer)?;
                let it = rows.into_iter().skip(skip);
                Ok(match limit {
                    Some(n) => it.take(n).collect(),
                    None => it.collect(),
                })
            }
            Op::SingleRow => {
                let rows = self.eval_relation(child(0), outer)?;
                if rows.len() > 1 {
                    return Err(err("single-row operator saw more than one row"));
                }
                Ok(rows)
            }
            other => Err(err(format!("{other} is not a relational operator"))),
        }
    }

    fn eval_count(&self, node: NodeId, outer: &Row) -> Result<Option<usize>> {
        match self.eval_scalar(node, outer)? {
            ScalarValue::Null => Ok(None),
            ScalarValue::Int64(n) if n >= 0 => Ok(Some(n as usize)),
            other => Err(err(format!("bad skip/limit value {other}"))),
        }
    }

    fn bind_defs(&self, var_def_list: NodeId, row: &mut Row, outer: &Row) -> Result<()> {
        for def in self.cmd.children(var_def_list) {
            let Op::VarDef(v) = self.cmd.op(*def) else {
                return Err(err("var def list holds a non-definition"));
            };
            let value = self.eval_scalar(self.cmd.child(*def, 0), &merged(outer, row))?;
            row.insert(*v, value);
        }
        Ok(())
    }

    fn eval_group_by(
        &self,
        node: NodeId,
        keys: &VarSet,
        outputs: &VarSet,
        outer: &Row,
    ) -> Result<Vec<Row>> {
        let cmd = self.cmd;
        let input = self.eval_relation(cmd.child(node, 0), outer)?;
        let mut groups: Vec<(Row, Vec<Row>)> = Vec::new();
        for mut row in input {
            self.bind_defs(cmd.child(node, 1), &mut row, outer)?;
            let key = restrict(&row, keys.iter());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        if keys.is_empty() && groups.is_empty() {
            groups.push((Row::new(), Vec::new()));
        }

        let mut out = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row = key;
            for def in cmd.children(cmd.child(node, 2)) {
                let Op::VarDef(v) = cmd.op(*def) else {
                    return Err(err("aggregate list holds a non-definition"));
                };
                let agg = cmd.child(*def, 0);
                let Op::Aggregate(func) = cmd.op(agg) else {
                    return Err(err("aggregate definition is not an aggregate"));
                };
                let arg = cmd.children(agg).first().copied();
                let mut values = Vec::new();
                for m in &members {
                    match arg {
                        Some(a) => {
                            let v = self.eval_scalar(a, &merged(outer, m))?;
                            if !v.is_null() {
                                values.push(v);
                            }
                        }
                        None => values.push(ScalarValue::Int64(1)),
                    }
                }
                row.insert(*v, aggregate(*func, values)?);
            }
            out.push(restrict(&row, outputs.iter()));
        }
        Ok(out)
    }

    fn is_true(&self, pred: NodeId, row: &Row) -> Result<bool> {
        Ok(matches!(self.eval_scalar(pred, row)?, ScalarValue::Bool(true)))
    }

    /// Evaluate a scalar subtree against one row's bindings.
    pub fn eval_scalar(&self, node: NodeId, row: &Row) -> Result<ScalarValue> {
        let cmd = self.cmd;
        let child = |i: usize| cmd.child(node, i);
        let op = cmd.op(node);
        if let Some(v) = op.literal() {
            return Ok(v);
        }
        match op {
            Op::VarRef(v) => row
                .get(v)
                .or_else(|| self.params.get(v))
                .cloned()
                .ok_or_else(|| err(format!("unbound var {v}"))),
            Op::Comparison(c) => {
                let l = self.eval_scalar(child(0), row)?;
                let r = self.eval_scalar(child(1), row)?;
                compare(*c, &l, &r)
            }
            Op::Like => {
                let s = self.eval_scalar(child(0), row)?;
                let p = self.eval_scalar(child(1), row)?;
                let e = self.eval_scalar(child(2), row)?;
                match (s.as_str(), p.as_str()) {
                    (Some(s), Some(p)) => {
                        let escape = e.as_str().and_then(|e| e.chars().next());
                        let s: Vec<char> = s.chars().collect();
                        let p: Vec<char> = p.chars().collect();
                        Ok(ScalarValue::Bool(like(&s, &p, escape)))
                    }
                    _ if s.is_null() || p.is_null() => Ok(ScalarValue::Null),
                    _ => Err(err("like over non-string operands")),
                }
            }
            Op::And | Op::Or => {
                let l = to_bool(&self.eval_scalar(child(0), row)?)?;
                let r = to_bool(&self.eval_scalar(child(1), row)?)?;
                let v = if matches!(op, Op::And) {
                    match (l, r) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    }
                } else {
                    match (l, r) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    }
                };
                Ok(from_bool(v))
            }
            Op::Not => {
                let v = to_bool(&self.eval_scalar(child(0), row)?)?;
                Ok(from_bool(v.map(|b| !b)))
            }
            Op::IsNull => Ok(ScalarValue::Bool(self.eval_scalar(child(0), row)?.is_null())),
            Op::Arithmetic(a) => {
                let l = self.eval_scalar(child(0), row)?;
                let r = self.eval_scalar(child(1), row)?;
                arithmetic(*a, &l, &r)
            }
            Op::Case => {
                let children = cmd.children(node);
                let pairs = children.len() / 2;
                for i in 0..pairs {
                    if self.is_true(children[2 * i], row)? {
                        return self.eval_scalar(children[2 * i + 1], row);
                    }
                }
                self.eval_scalar(children[children.len() - 1], row)
            }
            Op::Cast(t) => cast(self.eval_scalar(child(0), row)?, *t),
            Op::SoftCast(_) => self.eval_scalar(child(0), row),
            Op::Element => {
                let input = child(0);
                let rows = self.eval_relation(input, row)?;
                let Some(var) = cmd.info(input).definitions.first() else {
                    return Err(err("scalar subquery without an output"));
                };
                match rows.as_slice() {
                    [] => Ok(ScalarValue::Null),
                    [only] => Ok(only.get(&var).cloned().unwrap_or(ScalarValue::Null)),
                    _ => Err(err("scalar subquery returned more than one row")),
                }
            }
            Op::Aggregate(_) => Err(err("aggregate outside of a group-by")),
            other => Err(err(format!("{other} is not a scalar operator"))),
        }
    }
}

/// Canonical, order-insensitive rendering of a result over `vars`, for comparing
/// two evaluations as multisets.
pub fn canonical_rows(rows: &[Row], vars: &[Var]) -> Vec<String> {
    let mut out: Vec<String> = rows
        .iter()
        .map(|r| {
            vars.iter()
                .map(|v| r.get(v).map(|x| x.to_string()).unwrap_or_else(|| "?".into()))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();
    out.sort();
    out
}

fn merged(a: &Row, b: &Row) -> Row {
    let mut out = a.clone();
    out.extend(b.iter().map(|(k, v)| (*k, v.clone())));
    out
}

fn restrict(row: &Row, vars: impl Iterator<Item = Var>) -> Row {
    vars.map(|v| (v, row.get(&v).cloned().unwrap_or(ScalarValue::Null)))
        .collect()
}

fn null_extend(row: &Row, vars: &VarSet) -> Row {
    let mut out = row.clone();
    for v in vars.iter() {
        out.insert(v, ScalarValue::Null);
    }
    out
}

fn dedup(rows: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for r in rows {
        if !out.contains(&r) {
            out.push(r);
        }
    }
    out
}

/// Total order used for sorting: nulls first, then by value.
fn order(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    match (a, b) {
        (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
        (ScalarValue::Null, _) => Ordering::Less,
        (_, ScalarValue::Null) => Ordering::Greater,
        _ => partial_order(a, b).unwrap_or(Ordering::Equal),
    }
}

fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        for k in keys {
            let null = ScalarValue::Null;
            let o = order(a.get(&k.var).unwrap_or(&null), b.get(&k.var).unwrap_or(&null));
            let o = if k.ascending { o } else { o.reverse() };
            if o != Ordering::Equal {
                return o;
            }
        }
        Ordering::Equal
    });
}

fn partial_order(a: &ScalarValue, b: &ScalarValue) -> Option<Ordering> {
    use ScalarValue::*;
    match (a, b) {
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (Int64(x), Int64(y)) => Some(x.cmp(y)),
        (Float64(x), Float64(y)) => Some(x.cmp(y)),
        (Int64(x), Float64(y)) => Some(OrderedFloat(*x as f64).cmp(y)),
        (Float64(x), Int64(y)) => Some(x.cmp(&OrderedFloat(*y as f64))),
        (Utf8(x), Utf8(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(op: CompareOp, l: &ScalarValue, r: &ScalarValue) -> Result<ScalarValue> {
    if l.is_null() || r.is_null() {
        return Ok(ScalarValue::Null);
    }
    let o = partial_order(l, r).ok_or_else(|| err(format!("cannot compare {l} with {r}")))?;
    let b = match op {
        CompareOp::Eq => o == Ordering::Equal,
        CompareOp::NotEq => o != Ordering::Equal,
        CompareOp::Lt => o == Ordering::Less,
        CompareOp::LtEq => o != Ordering::Greater,
        CompareOp::Gt => o == Ordering::Greater,
        CompareOp::GtEq => o != Ordering::Less,
    };
    Ok(ScalarValue::Bool(b))
}

fn to_bool(v: &ScalarValue) -> Result<Option<bool>> {
    match v {
        ScalarValue::Null => Ok(None),
        ScalarValue::Bool(b) => Ok(Some(*b)),
        other => Err(err(format!("expected a boolean, got {other}"))),
    }
}

fn from_bool(v: Option<bool>) -> ScalarValue {
    v.map(ScalarValue::Bool).unwrap_or(ScalarValue::Null)
}

fn arithmetic(op: ArithOp, l: &ScalarValue, r: &ScalarValue) -> Result<ScalarValue> {
    use ScalarValue::*;
    match (l, r) {
        (Null, _) | (_, Null) => Ok(Null),
        (Int64(a), Int64(b)) => {
            let v = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => a.checked_div(*b),
            };
            v.map(Int64)
                .ok_or_else(|| err(format!("integer overflow or division by zero in {a} {op:?} {b}")))
        }
        (Float64(_) | Int64(_), Float64(_) | Int64(_)) => {
            let a = as_f64(l);
            let b = as_f64(r);
            let v = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            };
            Ok(Float64(OrderedFloat(v)))
        }
        _ => Err(err(format!("bad arithmetic operands {l}, {r}"))),
    }
}

fn as_f64(v: &ScalarValue) -> f64 {
    match v {
        ScalarValue::Int64(i) => *i as f64,
        ScalarValue::Float64(f) => f.0,
        _ => f64::NAN,
    }
}

fn cast(v: ScalarValue, to: DataType) -> Result<ScalarValue> {
    use ScalarValue::*;
    Ok(match (v, to) {
        (Null, _) => Null,
        (Int64(i), DataType::Float64) => Float64(OrderedFloat(i as f64)),
        (Float64(f), DataType::Int64) => Int64(f.0 as i64),
        (Int64(i), DataType::Utf8) => Utf8(i.to_string()),
        (Bool(b), DataType::Utf8) => Utf8(b.to_string()),
        (Utf8(s), DataType::Int64) => Int64(
            s.trim()
                .parse()
                .map_err(|_| err(format!("cannot cast '{s}' to Int64")))?,
        ),
        (v, t) if v.data_type() == Some(t) => v,
        (v, t) => return Err(err(format!("cannot cast {v} to {t:?}"))),
    })
}

fn aggregate(func: AggFunc, values: Vec<ScalarValue>) -> Result<ScalarValue> {
    if func == AggFunc::Count {
        return Ok(ScalarValue::Int64(values.len() as i64));
    }
    let mut it = values.into_iter();
    let Some(first) = it.next() else {
        return Ok(ScalarValue::Null);
    };
    it.try_fold(first, |acc, v| match func {
        AggFunc::Sum => arithmetic(ArithOp::Add, &acc, &v),
        AggFunc::Min => Ok(if order(&v, &acc) == Ordering::Less { v } else { acc }),
        _ => Ok(if order(&v, &acc) == Ordering::Greater { v } else { acc }),
    })
}

/// SQL LIKE: `%` matches any run, `_` any single character, `escape` quotes the
/// next pattern character.
fn like(s: &[char], p: &[char], escape: Option<char>) -> bool {
    match p.split_first() {
        None => s.is_empty(),
        Some((c, rest)) if Some(*c) == escape => match (rest.split_first(), s.split_first()) {
            (Some((lit, rest)), Some((sc, s_rest))) => lit == sc && like(s_rest, rest, escape),
            _ => false,
        },
        Some(('%', rest)) => (0..=s.len()).any(|i| like(&s[i..], rest, escape)),
        Some(('_', rest)) => !s.is_empty() && like(&s[1..], rest, escape),
        Some((c, rest)) => s.first() == Some(c) && like(&s[1..], rest, escape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::VarList;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_like() {
        assert!(like(&chars("abcdef"), &chars("abc%"), None));
        assert!(!like(&chars("abx"), &chars("abc%"), None));
        assert!(like(&chars("a_c"), &chars("a!_c"), Some('!')));
        assert!(!like(&chars("abc"), &chars("a!_c"), Some('!')));
        assert!(like(&chars("abc"), &chars("_b%"), None));
    }

    #[test]
    fn test_three_valued_and() {
        let mut cmd = Command::new();
        let n = cmd.null(DataType::Bool);
        let f = cmd.constant_predicate(false);
        let t = cmd.constant_predicate(true);
        let n_and_f = cmd.and(n, f);
        let n2 = cmd.null(DataType::Bool);
        let n_and_t = cmd.and(n2, t);
        let db = Database::new();
        let ev = Evaluator::new(&cmd, &db);
        assert_eq!(ev.eval_scalar(n_and_f, &Row::new()).unwrap(), ScalarValue::Bool(false));
        assert_eq!(ev.eval_scalar(n_and_t, &Row::new()).unwrap(), ScalarValue::Null);
    }

    #[test]
    fn test_left_outer_join_null_extends() {
        let mut cmd = Command::new();
        let a = cmd.create_column_var("l", "a", DataType::Int64, false);
        let b = cmd.create_column_var("r", "b", DataType::Int64, false);
        let l = cmd.leaf(Op::ScanTable {
            table: "l".into(),
            columns: [a].into_iter().collect::<VarList>(),
            keys: VarSet::new(),
        });
        let r = cmd.leaf(Op::ScanTable {
            table: "r".into(),
            columns: [b].into_iter().collect::<VarList>(),
            keys: VarSet::new(),
        });
        let ar = cmd.var_ref(a);
        let br = cmd.var_ref(b);
        let eq = cmd.create_node(Op::Comparison(CompareOp::Eq), vec![ar, br]);
        let loj = cmd.create_node(Op::LeftOuterJoin, vec![l, r, eq]);

        let mut db = Database::new();
        db.add_table("l", vec![vec![ScalarValue::Int64(1)], vec![ScalarValue::Int64(2)]]);
        db.add_table("r", vec![vec![ScalarValue::Int64(1)]]);
        let rows = Evaluator::new(&cmd, &db).eval(loj).unwrap();
        assert_eq!(canonical_rows(&rows, &[a, b]), vec!["1,1", "2,null"]);
    }

    #[test]
    fn test_scalar_group_by_over_empty_input() {
        let mut cmd = Command::new();
        let x = cmd.create_column_var("t", "x", DataType::Int64, true);
        let s = cmd.leaf(Op::ScanTable {
            table: "t".into(),
            columns: [x].into_iter().collect::<VarList>(),
            keys: VarSet::new(),
        });
        let keys = cmd.var_def_list(vec![]);
        let xr = cmd.var_ref(x);
        let count = cmd.create_node(Op::Aggregate(AggFunc::Count), vec![xr]);
        let (def, c) = cmd.create_var_def(count);
        let aggs = cmd.var_def_list(vec![def]);
        let gb = cmd.create_node(
            Op::GroupBy {
                keys: VarSet::new(),
                outputs: [c].into_iter().collect(),
            },
            vec![s, keys, aggs],
        );
        let mut db = Database::new();
        db.add_table("t", vec![]);
        let rows = Evaluator::new(&cmd, &db).eval(gb).unwrap();
        assert_eq!(canonical_rows(&rows, &[c]), vec!["0"]);
    }
}
