//! Maps an optimized plan onto its operator tree.

use crate::ddl::{CreateIndexExec, CreateTableExec, DropIndexExec, DropTableExec};
use crate::dml::{DeleteExec, InsertExec, UpdateExec};
use crate::filter::FilterExec;
use crate::group::GroupByExec;
use crate::join::NestedLoopJoinExec;
use crate::project::ProjectExec;
use crate::scan::{IndexScanExec, SeqScanExec};
use crate::sort::OrderByExec;
use crate::Executor;
use common::DbResult;
use planner::Plan;

pub fn build_executor(plan: Plan) -> DbResult<Box<dyn Executor>> {
    Ok(match plan {
        Plan::SeqScan {
            table,
            schema,
            predicate,
        } => Box::new(SeqScanExec::new(table, schema, predicate)),
        Plan::IndexScan {
            table,
            index,
            schema,
            predicate,
        } => Box::new(IndexScanExec::new(table, index, schema, predicate)),
        Plan::Filter { input, predicate } => {
            Box::new(FilterExec::new(build_executor(*input)?, predicate))
        }
        Plan::Project { input, exprs } => {
            Box::new(ProjectExec::new(build_executor(*input)?, exprs))
        }
        Plan::NestedLoopJoin {
            left,
            right,
            join_type,
            condition,
            schema,
        } => Box::new(NestedLoopJoinExec::new(
            build_executor(*left)?,
            build_executor(*right)?,
            join_type,
            condition,
            schema,
        )),
        Plan::GroupBy {
            input,
            group_exprs,
            select_exprs,
        } => Box::new(GroupByExec::new(
            build_executor(*input)?,
            group_exprs,
            select_exprs,
        )),
        Plan::OrderBy { input, items } => {
            Box::new(OrderByExec::new(build_executor(*input)?, items))
        }
        Plan::Insert { table, rows } => Box::new(InsertExec::new(table, rows)),
        Plan::Update {
            table,
            assignments,
            predicate,
        } => Box::new(UpdateExec::new(table, assignments, predicate)),
        Plan::Delete { table, predicate } => Box::new(DeleteExec::new(table, predicate)),
        Plan::CreateTable { name, columns } => Box::new(CreateTableExec::new(name, columns)),
        Plan::DropTable { name, if_exists } => Box::new(DropTableExec::new(name, if_exists)),
        Plan::CreateIndex {
            name,
            table,
            column,
            unique,
        } => Box::new(CreateIndexExec::new(name, table, column, unique)),
        Plan::DropIndex { name } => Box::new(DropIndexExec::new(name)),
    })
}
