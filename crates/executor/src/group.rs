//! GROUP BY with aggregate evaluation.

use crate::eval::{apply_binary, apply_unary, eval};
use crate::{ExecutionContext, Executor};
use ahash::RandomState;
use common::{DbResult, Row};
use expr::AggFunc;
use hashbrown::HashMap;
use planner::ResolvedExpr;
use types::Value;

const SINGLE_GROUP_KEY: &str = "all_rows";

/// Blocking operator: drains its child on the first `next`, buckets rows
/// by a pipe-joined string key over the group expressions, then emits
/// one row per group.
///
/// Aggregate select expressions are computed over the group's rows; any
/// non-aggregate expression is evaluated against the group's first row.
/// An empty group list makes one group of everything, which is how bare
/// aggregates work.
pub struct GroupByExec {
    input: Box<dyn Executor>,
    group_exprs: Vec<ResolvedExpr>,
    select_exprs: Vec<ResolvedExpr>,
    schema: Vec<String>,
    output: Option<Vec<Row>>,
    cursor: usize,
}

impl GroupByExec {
    pub fn new(
        input: Box<dyn Executor>,
        group_exprs: Vec<ResolvedExpr>,
        select_exprs: Vec<(String, ResolvedExpr)>,
    ) -> Self {
        let (schema, select_exprs) = select_exprs.into_iter().unzip();
        Self {
            input,
            group_exprs,
            select_exprs,
            schema,
            output: None,
            cursor: 0,
        }
    }

    fn group_key(&self, row: &Row) -> DbResult<String> {
        if self.group_exprs.is_empty() {
            return Ok(SINGLE_GROUP_KEY.to_string());
        }
        let mut parts = Vec::with_capacity(self.group_exprs.len());
        for expr in &self.group_exprs {
            parts.push(eval(expr, row)?.to_string());
        }
        Ok(parts.join("|"))
    }

    fn build_groups(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        // Insertion-ordered buckets: group emission order follows first
        // appearance, which keeps results deterministic.
        let mut order: Vec<Vec<Row>> = Vec::new();
        let mut lookup: HashMap<String, usize, RandomState> = HashMap::default();

        while let Some(row) = self.input.next(ctx)? {
            let key = self.group_key(&row)?;
            match lookup.get(&key) {
                Some(idx) => order[*idx].push(row),
                None => {
                    lookup.insert(key, order.len());
                    order.push(vec![row]);
                }
            }
        }

        // Bare aggregates over an empty input still produce one group,
        // so COUNT(*) on an empty table reports 0.
        if order.is_empty() && self.group_exprs.is_empty() {
            order.push(Vec::new());
        }

        let mut output = Vec::with_capacity(order.len());
        for rows in &order {
            let mut values = Vec::with_capacity(self.select_exprs.len());
            for expr in &self.select_exprs {
                values.push(eval_grouped(expr, rows)?);
            }
            output.push(Row::new(values));
        }
        self.output = Some(output);
        self.cursor = 0;
        Ok(())
    }
}

impl Executor for GroupByExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output = None;
        self.cursor = 0;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.output.is_none() {
            self.build_groups(ctx)?;
        }
        let output = self.output.as_ref().expect("groups built above");
        if self.cursor >= output.len() {
            return Ok(None);
        }
        let row = output[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.output = None;
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Evaluate a select expression over a whole group: aggregates collapse
/// the group, everything else sees the representative (first) row.
fn eval_grouped(expr: &ResolvedExpr, rows: &[Row]) -> DbResult<Value> {
    match expr {
        ResolvedExpr::Aggregate { func, arg } => aggregate(*func, arg.as_deref(), rows),
        ResolvedExpr::Literal(v) => Ok(v.clone()),
        ResolvedExpr::Column(_) => match rows.first() {
            Some(representative) => eval(expr, representative),
            None => Ok(Value::Null),
        },
        ResolvedExpr::Unary { op, expr } => {
            let v = eval_grouped(expr, rows)?;
            apply_unary(*op, v)
        }
        ResolvedExpr::Binary { left, op, right } => {
            let l = eval_grouped(left, rows)?;
            let r = eval_grouped(right, rows)?;
            apply_binary(*op, l, r)
        }
    }
}

fn aggregate(func: AggFunc, arg: Option<&ResolvedExpr>, rows: &[Row]) -> DbResult<Value> {
    match func {
        // COUNT(*) and COUNT(col) both report the group size.
        AggFunc::Count => Ok(Value::Int(rows.len() as i64)),
        AggFunc::Sum => numeric_fold(arg, rows).map(|(sum, all_int)| {
            if all_int {
                Value::Int(sum as i64)
            } else {
                Value::Double(sum)
            }
        }),
        // The denominator is the whole group, NULL and non-numeric rows
        // included; only the addends skip them.
        AggFunc::Avg => numeric_fold(arg, rows).map(|(sum, _)| {
            if rows.is_empty() {
                Value::Double(0.0)
            } else {
                Value::Double(sum / rows.len() as f64)
            }
        }),
        AggFunc::Max => extremum(arg, rows, std::cmp::Ordering::Greater),
        AggFunc::Min => extremum(arg, rows, std::cmp::Ordering::Less),
    }
}

/// Sum the argument over the group, skipping non-numeric values.
/// Returns `(sum, saw_only_ints)`.
fn numeric_fold(arg: Option<&ResolvedExpr>, rows: &[Row]) -> DbResult<(f64, bool)> {
    let arg = match arg {
        Some(arg) => arg,
        None => return Ok((rows.len() as f64, true)),
    };

    let mut sum = 0.0;
    let mut all_int = true;
    for row in rows {
        match eval(arg, row)? {
            Value::Int(v) => sum += v as f64,
            Value::Double(v) => {
                sum += v;
                all_int = false;
            }
            _ => {}
        }
    }
    Ok((sum, all_int))
}

/// Best value under within-type comparison; incomparable values are
/// skipped. An empty group yields NULL.
fn extremum(
    arg: Option<&ResolvedExpr>,
    rows: &[Row],
    keep: std::cmp::Ordering,
) -> DbResult<Value> {
    let arg = match arg {
        Some(arg) => arg,
        None => return Ok(Value::Int(rows.len() as i64)),
    };

    let mut best: Option<Value> = None;
    for row in rows {
        let candidate = eval(arg, row)?;
        if matches!(candidate, Value::Null) {
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) => match candidate.cmp_same_type(&current) {
                Some(ord) if ord == keep => Some(candidate),
                _ => Some(current),
            },
        };
    }
    Ok(best.unwrap_or(Value::Null))
}
