//! Top-level database facade: one handle that parses SQL, runs each
//! statement through the execution engine, and persists state on
//! demand.
//!
//! Errors surface at the statement boundary; the handle stays usable
//! for the next statement regardless (applied writes from earlier
//! statements in the same script stay applied; there is no
//! cross-statement transaction).

use buffer::BufferPoolStats;
use catalog::Catalog;
use common::{Config, DbResult};
use engine::StorageEngine;
use executor::{ExecutionEngine, StatementResult};
use parser::parse_sql;

pub use executor::StatementResult as Output;

pub struct Database {
    storage: StorageEngine,
    engine: ExecutionEngine,
}

impl Database {
    /// Open (or create) the database under `config.data_dir`.
    pub fn open(config: Config) -> DbResult<Self> {
        Ok(Self {
            storage: StorageEngine::open(config)?,
            engine: ExecutionEngine::new(),
        })
    }

    /// Parse and execute a script, one statement at a time. Execution
    /// stops at the first failing statement; anything already applied
    /// stays applied.
    pub fn execute(&mut self, sql: &str) -> DbResult<Vec<StatementResult>> {
        let statements = parse_sql(sql)?;
        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            results.push(self.engine.execute(stmt, &mut self.storage)?);
        }
        Ok(results)
    }

    /// Execute with plan rewriting disabled. Index-versus-scan parity
    /// tests run the same query through both paths.
    pub fn execute_unoptimized(&mut self, sql: &str) -> DbResult<Vec<StatementResult>> {
        let plain = ExecutionEngine::with_optimizer_disabled();
        let statements = parse_sql(sql)?;
        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            results.push(plain.execute(stmt, &mut self.storage)?);
        }
        Ok(results)
    }

    /// Write metadata, table snapshots, and index snapshots to disk.
    pub fn persist(&mut self) -> DbResult<()> {
        self.storage.save()
    }

    pub fn catalog(&self) -> &Catalog {
        self.storage.catalog()
    }

    pub fn pool_stats(&self) -> BufferPoolStats {
        self.storage.pool_stats()
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageEngine {
        &mut self.storage
    }
}
