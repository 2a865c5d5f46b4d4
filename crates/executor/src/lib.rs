//! Query executor: a pull-based Volcano iterator tree over the storage
//! engine.
//!
//! Each operator implements [`Executor`]: `open` initializes state,
//! `next` produces one row at a time, `close` releases buffers. The
//! driver in [`ExecutionEngine`] builds the operator tree from an
//! optimized plan and pulls the root until end-of-data.
//!
//! Every operator that inspects expressions goes through the single
//! evaluator in [`eval`]; there are no per-operator comparison rules to
//! drift apart.

mod builder;
mod ddl;
mod dml;
pub mod eval;
mod exec_engine;
mod filter;
mod group;
mod join;
mod project;
mod scan;
mod sort;


pub use builder::build_executor;
pub use exec_engine::{ExecutionEngine, StatementResult};

use common::{DbResult, Row};
use engine::StorageEngine;

/// Volcano iterator interface.
pub trait Executor {
    /// Initialize the operator (collect record ids, open children).
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Fetch the next row, or `None` once exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>>;

    /// Release per-statement state.
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Column labels of the rows this operator produces.
    fn schema(&self) -> &[String];
}

/// Per-statement context handed to every operator.
pub struct ExecutionContext<'a> {
    pub storage: &'a mut StorageEngine,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(storage: &'a mut StorageEngine) -> Self {
        Self { storage }
    }
}

/// Drive an operator to completion, accumulating every row it yields.
pub fn drain(executor: &mut dyn Executor, ctx: &mut ExecutionContext) -> DbResult<Vec<Row>> {
    executor.open(ctx)?;
    let mut rows = Vec::new();
    loop {
        match executor.next(ctx) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break,
            Err(err) => {
                // Give the operator a chance to clean up, then surface
                // the original failure.
                let _ = executor.close(ctx);
                return Err(err);
            }
        }
    }
    executor.close(ctx)?;
    Ok(rows)
}
