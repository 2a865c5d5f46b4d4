//! Statement-level driver: semantic checks, planning, optimization, and
//! execution.

use crate::{build_executor, drain, ExecutionContext};
use common::{DbResult, RecordBatch};
use engine::StorageEngine;
use parser::Statement;
use planner::{Optimizer, Plan, Planner};
use types::Value;

/// Outcome of one executed statement.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementResult {
    /// SELECT output.
    Rows(RecordBatch),
    /// INSERT/UPDATE/DELETE affected-row count.
    Affected(u64),
    /// DDL acknowledgement.
    Ddl(String),
}

/// Maps a parsed statement to an operator tree and drives it. Owns the
/// optimizer; per-statement state lives in the `ExecutionContext` and is
/// dropped when the statement finishes, so an error leaves the engine
/// ready for the next statement.
pub struct ExecutionEngine {
    optimizer: Optimizer,
    optimize_enabled: bool,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            optimizer: Optimizer::new(),
            optimize_enabled: true,
        }
    }

    /// Disable plan rewriting (used to compare index and scan paths).
    pub fn with_optimizer_disabled() -> Self {
        Self {
            optimizer: Optimizer::new(),
            optimize_enabled: false,
        }
    }

    pub fn execute(
        &self,
        stmt: Statement,
        storage: &mut StorageEngine,
    ) -> DbResult<StatementResult> {
        // CREATE TABLE is validated by its dedicated check; everything
        // else runs the full analysis against the current catalog.
        analyzer::analyze(&stmt, storage.catalog())?;

        let plan = Planner::plan(stmt, storage.catalog())?;
        let plan = if self.optimize_enabled && !plan.is_dml() && !plan.is_ddl() {
            self.optimizer.optimize(plan, storage.catalog())
        } else {
            plan
        };

        self.run(plan, storage)
    }

    fn run(&self, plan: Plan, storage: &mut StorageEngine) -> DbResult<StatementResult> {
        let is_dml = plan.is_dml();
        let ddl_message = ddl_message(&plan);
        let columns = plan.output_schema();

        let mut executor = build_executor(plan)?;
        let mut ctx = ExecutionContext::new(storage);
        let rows = drain(executor.as_mut(), &mut ctx)?;

        if let Some(message) = ddl_message {
            return Ok(StatementResult::Ddl(message));
        }
        if is_dml {
            let count = rows
                .first()
                .and_then(|row| row.values.first())
                .and_then(|v| match v {
                    Value::Int(n) => Some(*n as u64),
                    _ => None,
                })
                .ok_or_else(|| {
                    common::DbError::Executor("DML operator produced no count".into())
                })?;
            return Ok(StatementResult::Affected(count));
        }
        Ok(StatementResult::Rows(RecordBatch { columns, rows }))
    }
}

fn ddl_message(plan: &Plan) -> Option<String> {
    match plan {
        Plan::CreateTable { name, .. } => Some(format!("Created table '{name}'.")),
        Plan::DropTable { name, .. } => Some(format!("Dropped table '{name}'.")),
        Plan::CreateIndex { name, table, .. } => {
            Some(format!("Created index '{name}' on '{table}'."))
        }
        Plan::DropIndex { name } => Some(format!("Dropped index '{name}'.")),
        _ => None,
    }
}
