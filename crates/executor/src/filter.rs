use crate::eval::eval;
use crate::{ExecutionContext, Executor};
use common::{DbResult, Row};
use planner::ResolvedExpr;

/// Emits only the child rows for which the predicate evaluates truthy.
pub struct FilterExec {
    input: Box<dyn Executor>,
    predicate: ResolvedExpr,
}

impl FilterExec {
    pub fn new(input: Box<dyn Executor>, predicate: ResolvedExpr) -> Self {
        Self { input, predicate }
    }
}

impl Executor for FilterExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        while let Some(row) = self.input.next(ctx)? {
            if eval(&self.predicate, &row)?.is_truthy() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }
}
