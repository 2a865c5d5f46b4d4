//! DDL operators. Each performs its schema change in `open` and
//! produces no rows; the driver reports success at the statement level.

use crate::{ExecutionContext, Executor};
use catalog::ColumnInfo;
use common::{DbResult, Row};

pub struct CreateTableExec {
    name: String,
    columns: Vec<ColumnInfo>,
    schema: Vec<String>,
}

impl CreateTableExec {
    pub fn new(name: String, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name,
            columns,
            schema: Vec::new(),
        }
    }
}

impl Executor for CreateTableExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        ctx.storage.create_table(&self.name, self.columns.clone())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        Ok(None)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

pub struct DropTableExec {
    name: String,
    if_exists: bool,
    schema: Vec<String>,
}

impl DropTableExec {
    pub fn new(name: String, if_exists: bool) -> Self {
        Self {
            name,
            if_exists,
            schema: Vec::new(),
        }
    }
}

impl Executor for DropTableExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        if self.if_exists && !ctx.storage.catalog().has_table(&self.name) {
            return Ok(());
        }
        ctx.storage.drop_table(&self.name)
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        Ok(None)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

pub struct CreateIndexExec {
    name: String,
    table: String,
    column: String,
    unique: bool,
    schema: Vec<String>,
}

impl CreateIndexExec {
    pub fn new(name: String, table: String, column: String, unique: bool) -> Self {
        Self {
            name,
            table,
            column,
            unique,
            schema: Vec::new(),
        }
    }
}

impl Executor for CreateIndexExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        ctx.storage
            .create_index(&self.name, &self.table, &self.column, self.unique)
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        Ok(None)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

pub struct DropIndexExec {
    name: String,
    schema: Vec<String>,
}

impl DropIndexExec {
    pub fn new(name: String) -> Self {
        Self {
            name,
            schema: Vec::new(),
        }
    }
}

impl Executor for DropIndexExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        ctx.storage.drop_index(&self.name)
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        Ok(None)
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
