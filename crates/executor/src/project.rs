use crate::eval::eval;
use crate::{ExecutionContext, Executor};
use common::{DbResult, Row};
use planner::ResolvedExpr;

/// Computes one output value per expression, in select-list order. The
/// planner has already expanded `*` into plain column references.
pub struct ProjectExec {
    input: Box<dyn Executor>,
    exprs: Vec<ResolvedExpr>,
    schema: Vec<String>,
}

impl ProjectExec {
    pub fn new(input: Box<dyn Executor>, exprs: Vec<(String, ResolvedExpr)>) -> Self {
        let (schema, exprs) = exprs.into_iter().unzip();
        Self {
            input,
            exprs,
            schema,
        }
    }
}

impl Executor for ProjectExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        match self.input.next(ctx)? {
            Some(row) => {
                let mut values = Vec::with_capacity(self.exprs.len());
                for expr in &self.exprs {
                    values.push(eval(expr, &row)?);
                }
                Ok(Some(Row::new(values)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
