//! Nested-loop join with INNER, LEFT, and RIGHT variants.

use crate::eval::eval;
use crate::{ExecutionContext, Executor};
use common::{DbResult, Row};
use planner::{JoinType, ResolvedExpr};
use types::Value;

/// For each left row, pairs against the right side (materialized at
/// `open`). LEFT emits unmatched left rows padded with NULLs on the
/// right; RIGHT is the mirror image, emitting unmatched right rows once
/// the left side is exhausted.
pub struct NestedLoopJoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    join_type: JoinType,
    condition: ResolvedExpr,
    schema: Vec<String>,

    right_rows: Vec<Row>,
    right_matched: Vec<bool>,
    current_left: Option<Row>,
    current_left_matched: bool,
    right_cursor: usize,
    leftover_cursor: usize,
}

impl NestedLoopJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        join_type: JoinType,
        condition: ResolvedExpr,
        schema: Vec<String>,
    ) -> Self {
        Self {
            left,
            right,
            join_type,
            condition,
            schema,
            right_rows: Vec::new(),
            right_matched: Vec::new(),
            current_left: None,
            current_left_matched: false,
            right_cursor: 0,
            leftover_cursor: 0,
        }
    }

    fn left_arity(&self) -> usize {
        self.left.schema().len()
    }

    fn right_arity(&self) -> usize {
        self.right.schema().len()
    }

    fn combine(left: &Row, right: &Row) -> Row {
        let mut values = left.values.clone();
        values.extend(right.values.iter().cloned());
        Row::new(values)
    }

    fn null_padding(arity: usize) -> Row {
        Row::new(vec![Value::Null; arity])
    }

    fn advance_left(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.current_left = self.left.next(ctx)?;
        self.current_left_matched = false;
        self.right_cursor = 0;
        Ok(())
    }
}

impl Executor for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;

        self.right_rows.clear();
        while let Some(row) = self.right.next(ctx)? {
            self.right_rows.push(row);
        }
        self.right_matched = vec![false; self.right_rows.len()];
        self.leftover_cursor = 0;
        self.advance_left(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        loop {
            let left_row = match &self.current_left {
                Some(row) => row.clone(),
                None => break,
            };

            while self.right_cursor < self.right_rows.len() {
                let idx = self.right_cursor;
                self.right_cursor += 1;

                let combined = Self::combine(&left_row, &self.right_rows[idx]);
                if eval(&self.condition, &combined)?.is_truthy() {
                    self.current_left_matched = true;
                    self.right_matched[idx] = true;
                    return Ok(Some(combined));
                }
            }

            // Right side exhausted for this left row.
            let emit_padded = self.join_type == JoinType::Left && !self.current_left_matched;
            let padded = if emit_padded {
                Some(Self::combine(
                    &left_row,
                    &Self::null_padding(self.right_arity()),
                ))
            } else {
                None
            };
            self.advance_left(ctx)?;
            if let Some(row) = padded {
                return Ok(Some(row));
            }
        }

        // Left side exhausted; a RIGHT join still owes the unmatched
        // right rows, padded with NULLs on the left.
        if self.join_type == JoinType::Right {
            while self.leftover_cursor < self.right_rows.len() {
                let idx = self.leftover_cursor;
                self.leftover_cursor += 1;
                if !self.right_matched[idx] {
                    return Ok(Some(Self::combine(
                        &Self::null_padding(self.left_arity()),
                        &self.right_rows[idx],
                    )));
                }
            }
        }
        Ok(None)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.right_rows.clear();
        self.right_matched.clear();
        self.current_left = None;
        self.left.close(ctx)?;
        self.right.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
