//! ORDER BY: materialize, key, and stable-sort.

use crate::eval::eval;
use crate::{ExecutionContext, Executor};
use common::{DbResult, Row};
use planner::{ResolvedExpr, SortDirection};
use std::cmp::Ordering;
use types::Value;

/// Blocking sort. Sort keys are evaluated up front (evaluation can
/// fail; the comparator cannot), then rows are stable-sorted by the
/// `(expr, direction)` list, comparing lexicographically across items.
pub struct OrderByExec {
    input: Box<dyn Executor>,
    items: Vec<(ResolvedExpr, SortDirection)>,
    sorted: Option<Vec<Row>>,
    cursor: usize,
}

impl OrderByExec {
    pub fn new(input: Box<dyn Executor>, items: Vec<(ResolvedExpr, SortDirection)>) -> Self {
        Self {
            input,
            items,
            sorted: None,
            cursor: 0,
        }
    }

    fn materialize_and_sort(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::new();
        while let Some(row) = self.input.next(ctx)? {
            let mut key = Vec::with_capacity(self.items.len());
            for (expr, _) in &self.items {
                key.push(eval(expr, &row)?);
            }
            keyed.push((key, row));
        }

        let items = &self.items;
        keyed.sort_by(|(a, _), (b, _)| {
            for (idx, (_, direction)) in items.iter().enumerate() {
                let ord = compare_values(&a[idx], &b[idx]);
                let ord = match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        self.sorted = Some(keyed.into_iter().map(|(_, row)| row).collect());
        self.cursor = 0;
        Ok(())
    }
}

impl Executor for OrderByExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.sorted = None;
        self.cursor = 0;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.sorted.is_none() {
            self.materialize_and_sort(ctx)?;
        }
        let rows = self.sorted.as_ref().expect("sorted above");
        if self.cursor >= rows.len() {
            return Ok(None);
        }
        let row = rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.sorted = None;
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }
}

/// Total, deterministic order for sorting: NULL first, then within-type
/// comparison, with a fixed type rank (numerics < text) stabilizing
/// cross-type orderings.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match a.cmp_same_type(b) {
            Some(ord) => ord,
            None => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Int(_) | Value::Double(_) => 0,
        Value::Text(_) => 1,
        Value::Null => 2,
    }
}
