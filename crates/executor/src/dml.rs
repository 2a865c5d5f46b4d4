//! DML operators: Insert, Update, Delete. Each produces a single row
//! holding the affected-row count.

use crate::eval::eval;
use crate::{ExecutionContext, Executor};
use common::{DbError, DbResult, RecordId, Row};
use planner::ResolvedExpr;
use types::Value;

fn count_schema() -> Vec<String> {
    vec!["count".to_string()]
}

/// Evaluates each VALUES tuple and inserts through the storage engine.
/// Tuples apply in order; an error on a later tuple reports how many
/// rows had already been applied (there is no statement rollback).
pub struct InsertExec {
    table: String,
    rows: Vec<Vec<ResolvedExpr>>,
    schema: Vec<String>,
    done: bool,
}

impl InsertExec {
    pub fn new(table: String, rows: Vec<Vec<ResolvedExpr>>) -> Self {
        Self {
            table,
            rows,
            schema: count_schema(),
            done: false,
        }
    }
}

impl Executor for InsertExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let empty = Row::new(Vec::new());
        let mut inserted = 0usize;
        for exprs in &self.rows {
            let mut values = Vec::with_capacity(exprs.len());
            for expr in exprs {
                values.push(eval(expr, &empty)?);
            }
            match ctx.storage.insert_row(&self.table, &Row::new(values)) {
                Ok(_) => inserted += 1,
                Err(err) if inserted == 0 => return Err(err),
                Err(err) => {
                    return Err(DbError::Executor(format!(
                        "inserted {inserted} of {} rows, then: {err}",
                        self.rows.len()
                    )))
                }
            }
        }
        Ok(Some(Row::new(vec![Value::Int(inserted as i64)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Collects the matching rows first, then applies every assignment over
/// each row's original values. Record ids are stable across updates, so
/// the work list is keyed by rid.
pub struct UpdateExec {
    table: String,
    assignments: Vec<(usize, ResolvedExpr)>,
    predicate: Option<ResolvedExpr>,
    schema: Vec<String>,
    done: bool,
}

impl UpdateExec {
    pub fn new(
        table: String,
        assignments: Vec<(usize, ResolvedExpr)>,
        predicate: Option<ResolvedExpr>,
    ) -> Self {
        Self {
            table,
            assignments,
            predicate,
            schema: count_schema(),
            done: false,
        }
    }
}

impl Executor for UpdateExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let work: Vec<(RecordId, Row)> = collect_matches(ctx, &self.table, &self.predicate)?;

        let mut updated = 0usize;
        for (rid, original) in work {
            let mut values = original.values.clone();
            for (ordinal, expr) in &self.assignments {
                // Every assignment sees the original row, not earlier
                // assignments' results.
                values[*ordinal] = eval(expr, &original)?;
            }
            ctx.storage.update_row(&self.table, rid, &Row::new(values))?;
            updated += 1;
        }
        Ok(Some(Row::new(vec![Value::Int(updated as i64)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Collects the matching record ids first, then deletes them; the scan
/// is never repeated.
pub struct DeleteExec {
    table: String,
    predicate: Option<ResolvedExpr>,
    schema: Vec<String>,
    done: bool,
}

impl DeleteExec {
    pub fn new(table: String, predicate: Option<ResolvedExpr>) -> Self {
        Self {
            table,
            predicate,
            schema: count_schema(),
            done: false,
        }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let work = collect_matches(ctx, &self.table, &self.predicate)?;
        let mut deleted = 0usize;
        for (rid, _) in work {
            ctx.storage.delete_row(&self.table, rid)?;
            deleted += 1;
        }
        Ok(Some(Row::new(vec![Value::Int(deleted as i64)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

fn collect_matches(
    ctx: &mut ExecutionContext,
    table: &str,
    predicate: &Option<ResolvedExpr>,
) -> DbResult<Vec<(RecordId, Row)>> {
    let mut out = Vec::new();
    for (rid, row) in ctx.storage.scan(table)? {
        let keep = match predicate {
            Some(pred) => eval(pred, &row)?.is_truthy(),
            None => true,
        };
        if keep {
            out.push((rid, row));
        }
    }
    Ok(out)
}
