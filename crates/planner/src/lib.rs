//! Query planner: lowers parsed statements into executor-ready plans.
//!
//! The plan is a tagged sum with exclusively-owned children. Column
//! references are resolved to ordinals here, so operators never see
//! names at runtime; the schema strings carried by scans and joins exist
//! for resolution and for result headers only.
//!
//! Plan shape for SELECT: scan → joins → filter → (group | project) →
//! order. Scan selection is left to the optimizer (`optimizer` module),
//! which rewrites `Filter(SeqScan)` into an `IndexScan` when a canonical
//! index matches the predicate shape.

mod optimizer;

pub use optimizer::Optimizer;
pub use parser::{JoinType, SortDirection};

use catalog::{Catalog, ColumnInfo, TableMeta};
use common::{DbResult, SemanticError};
use expr::{AggFunc, BinaryOp, Expr, UnaryOp};
use parser::{SelectItem, Statement};
use std::ops::Bound;
use types::{SqlType, Value};

/// Expression with column references bound to ordinals.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedExpr {
    Literal(Value),
    Column(usize),
    Unary {
        op: UnaryOp,
        expr: Box<ResolvedExpr>,
    },
    Binary {
        left: Box<ResolvedExpr>,
        op: BinaryOp,
        right: Box<ResolvedExpr>,
    },
    Aggregate {
        func: AggFunc,
        arg: Option<Box<ResolvedExpr>>,
    },
}

impl ResolvedExpr {
    pub fn contains_aggregate(&self) -> bool {
        match self {
            ResolvedExpr::Aggregate { .. } => true,
            ResolvedExpr::Literal(_) | ResolvedExpr::Column(_) => false,
            ResolvedExpr::Unary { expr, .. } => expr.contains_aggregate(),
            ResolvedExpr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
        }
    }
}

/// Access path chosen for an index scan.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexPredicate {
    /// Exact-key lookup.
    Key(Value),
    /// Range lookup with explicit open/closed endpoints.
    Range {
        start: Bound<Value>,
        end: Bound<Value>,
    },
}

/// Executor-ready plan node.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    SeqScan {
        table: String,
        schema: Vec<String>,
        /// Predicate absorbed by predicate pushdown, if any.
        predicate: Option<ResolvedExpr>,
    },
    IndexScan {
        table: String,
        index: String,
        schema: Vec<String>,
        predicate: IndexPredicate,
    },
    Filter {
        input: Box<Plan>,
        predicate: ResolvedExpr,
    },
    Project {
        input: Box<Plan>,
        exprs: Vec<(String, ResolvedExpr)>,
    },
    NestedLoopJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        join_type: JoinType,
        condition: ResolvedExpr,
        schema: Vec<String>,
    },
    GroupBy {
        input: Box<Plan>,
        group_exprs: Vec<ResolvedExpr>,
        select_exprs: Vec<(String, ResolvedExpr)>,
    },
    OrderBy {
        input: Box<Plan>,
        items: Vec<(ResolvedExpr, SortDirection)>,
    },
    Insert {
        table: String,
        /// One entry per VALUES tuple, already in table column order.
        rows: Vec<Vec<ResolvedExpr>>,
    },
    Update {
        table: String,
        assignments: Vec<(usize, ResolvedExpr)>,
        predicate: Option<ResolvedExpr>,
    },
    Delete {
        table: String,
        predicate: Option<ResolvedExpr>,
    },
    CreateTable {
        name: String,
        columns: Vec<ColumnInfo>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    CreateIndex {
        name: String,
        table: String,
        column: String,
        unique: bool,
    },
    DropIndex {
        name: String,
    },
}

impl Plan {
    pub fn is_dml(&self) -> bool {
        matches!(self, Plan::Insert { .. } | Plan::Update { .. } | Plan::Delete { .. })
    }

    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Plan::CreateTable { .. }
                | Plan::DropTable { .. }
                | Plan::CreateIndex { .. }
                | Plan::DropIndex { .. }
        )
    }

    /// Column labels of the rows this plan produces.
    pub fn output_schema(&self) -> Vec<String> {
        match self {
            Plan::SeqScan { schema, .. } | Plan::IndexScan { schema, .. } => schema.clone(),
            Plan::Filter { input, .. } | Plan::OrderBy { input, .. } => input.output_schema(),
            Plan::Project { exprs, .. } => exprs.iter().map(|(name, _)| name.clone()).collect(),
            Plan::GroupBy { select_exprs, .. } => {
                select_exprs.iter().map(|(name, _)| name.clone()).collect()
            }
            Plan::NestedLoopJoin { schema, .. } => schema.clone(),
            _ => Vec::new(),
        }
    }
}

/// Main planner entry point.
pub struct Planner;

impl Planner {
    /// Lower a statement into a plan, resolving every name against the
    /// catalog. Run the result through `Optimizer::optimize` before
    /// execution unless scan parity is being tested.
    pub fn plan(stmt: Statement, catalog: &Catalog) -> DbResult<Plan> {
        match stmt {
            Statement::CreateTable { name, columns } => Self::plan_create_table(name, columns),
            Statement::DropTable { name, if_exists } => Ok(Plan::DropTable { name, if_exists }),
            Statement::CreateIndex {
                name,
                table,
                column,
                unique,
            } => Ok(Plan::CreateIndex {
                name,
                table,
                column,
                unique,
            }),
            Statement::DropIndex { name } => Ok(Plan::DropIndex { name }),
            Statement::Insert {
                table,
                columns,
                rows,
            } => Self::plan_insert(table, columns, rows, catalog),
            Statement::Update {
                table,
                assignments,
                selection,
            } => Self::plan_update(table, assignments, selection, catalog),
            Statement::Delete { table, selection } => {
                let meta = catalog.table(&table)?;
                let schema = table_schema(meta, false);
                let predicate = selection
                    .map(|pred| resolve_expr(&pred, &schema))
                    .transpose()?;
                Ok(Plan::Delete { table, predicate })
            }
            Statement::Select {
                columns,
                from,
                joins,
                selection,
                group_by,
                order_by,
            } => Self::plan_select(columns, from, joins, selection, group_by, order_by, catalog),
        }
    }

    fn plan_create_table(name: String, columns: Vec<parser::ColumnDef>) -> DbResult<Plan> {
        let mut mapped = Vec::with_capacity(columns.len());
        for def in columns {
            let ty = SqlType::parse(&def.ty)
                .ok_or_else(|| SemanticError::InvalidDataType(def.ty.clone()))?;
            mapped.push(ColumnInfo {
                name: def.name,
                ty,
                not_null: def.not_null,
                primary_key: def.primary_key,
            });
        }
        Ok(Plan::CreateTable {
            name,
            columns: mapped,
        })
    }

    fn plan_insert(
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
        catalog: &Catalog,
    ) -> DbResult<Plan> {
        let meta = catalog.table(&table)?;
        let arity = meta.columns.len();
        // VALUES tuples may not reference columns.
        let empty_schema: Vec<String> = Vec::new();

        let mut resolved_rows = Vec::with_capacity(rows.len());
        match &columns {
            None => {
                for row in &rows {
                    if row.len() != arity {
                        return Err(SemanticError::ColumnCountMismatch {
                            expected: arity,
                            actual: row.len(),
                        }
                        .into());
                    }
                    let exprs = row
                        .iter()
                        .map(|e| resolve_expr(e, &empty_schema))
                        .collect::<DbResult<Vec<_>>>()?;
                    resolved_rows.push(exprs);
                }
            }
            Some(names) => {
                let ordinals = names
                    .iter()
                    .map(|name| {
                        meta.column_index(name)
                            .ok_or_else(|| SemanticError::ColumnNotExists(name.clone()).into())
                    })
                    .collect::<DbResult<Vec<_>>>()?;
                for row in &rows {
                    if row.len() != names.len() {
                        return Err(SemanticError::ColumnCountMismatch {
                            expected: names.len(),
                            actual: row.len(),
                        }
                        .into());
                    }
                    // Unmentioned columns receive NULL.
                    let mut exprs = vec![ResolvedExpr::Literal(Value::Null); arity];
                    for (ordinal, value) in ordinals.iter().zip(row) {
                        exprs[*ordinal] = resolve_expr(value, &empty_schema)?;
                    }
                    resolved_rows.push(exprs);
                }
            }
        }

        Ok(Plan::Insert {
            table,
            rows: resolved_rows,
        })
    }

    fn plan_update(
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
        catalog: &Catalog,
    ) -> DbResult<Plan> {
        let meta = catalog.table(&table)?;
        let schema = table_schema(meta, false);

        let assignments = assignments
            .into_iter()
            .map(|(column, value)| {
                let ordinal = meta
                    .column_index(&column)
                    .ok_or(SemanticError::ColumnNotExists(column))?;
                Ok((ordinal, resolve_expr(&value, &schema)?))
            })
            .collect::<DbResult<Vec<_>>>()?;
        let predicate = selection
            .map(|pred| resolve_expr(&pred, &schema))
            .transpose()?;

        Ok(Plan::Update {
            table,
            assignments,
            predicate,
        })
    }

    fn plan_select(
        columns: Vec<SelectItem>,
        from: String,
        joins: Vec<parser::JoinClause>,
        selection: Option<Expr>,
        group_by: Vec<Expr>,
        order_by: Vec<parser::OrderByExpr>,
        catalog: &Catalog,
    ) -> DbResult<Plan> {
        // Qualify column labels whenever a join is involved so both
        // sides stay addressable.
        let qualified = !joins.is_empty();

        let from_meta = catalog.table(&from)?;
        let mut schema = table_schema(from_meta, qualified);
        let mut plan = Plan::SeqScan {
            table: from.clone(),
            schema: schema.clone(),
            predicate: None,
        };

        for join in joins {
            let right_meta = catalog.table(&join.table)?;
            let right_schema = table_schema(right_meta, true);
            let mut combined = schema.clone();
            combined.extend(right_schema.iter().cloned());

            let condition = resolve_expr(&join.condition, &combined)?;
            plan = Plan::NestedLoopJoin {
                left: Box::new(plan),
                right: Box::new(Plan::SeqScan {
                    table: join.table.clone(),
                    schema: right_schema,
                    predicate: None,
                }),
                join_type: join.join_type,
                condition,
                schema: combined.clone(),
            };
            schema = combined;
        }

        if let Some(pred) = selection {
            let predicate = resolve_expr(&pred, &schema)?;
            plan = Plan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        // Expand `*` and resolve the select list against the input.
        let select_exprs: Vec<(String, ResolvedExpr)> = {
            let mut out = Vec::new();
            for item in &columns {
                match item {
                    SelectItem::Wildcard => {
                        for (ordinal, name) in schema.iter().enumerate() {
                            out.push((name.clone(), ResolvedExpr::Column(ordinal)));
                        }
                    }
                    SelectItem::Expr(e) => {
                        out.push((e.display_name(), resolve_expr(e, &schema)?));
                    }
                }
            }
            out
        };

        let has_aggregates = columns.iter().any(|item| match item {
            SelectItem::Expr(e) => e.contains_aggregate(),
            SelectItem::Wildcard => false,
        });

        plan = if !group_by.is_empty() || has_aggregates {
            let group_exprs = group_by
                .iter()
                .map(|e| resolve_expr(e, &schema))
                .collect::<DbResult<Vec<_>>>()?;
            Plan::GroupBy {
                input: Box::new(plan),
                group_exprs,
                select_exprs,
            }
        } else {
            Plan::Project {
                input: Box::new(plan),
                exprs: select_exprs,
            }
        };

        if !order_by.is_empty() {
            // ORDER BY sees the projected output schema.
            let out_schema = plan.output_schema();
            let items = order_by
                .into_iter()
                .map(|item| Ok((resolve_expr(&item.expr, &out_schema)?, item.direction)))
                .collect::<DbResult<Vec<_>>>()?;
            plan = Plan::OrderBy {
                input: Box::new(plan),
                items,
            };
        }

        Ok(plan)
    }
}

/// Column labels of one table, optionally qualified as `table.column`.
fn table_schema(meta: &TableMeta, qualified: bool) -> Vec<String> {
    meta.columns
        .iter()
        .map(|c| {
            if qualified {
                format!("{}.{}", meta.name, c.name)
            } else {
                c.name.clone()
            }
        })
        .collect()
}

/// Bind an expression's column references against `schema`.
///
/// Qualified references match `table.column` labels exactly; unqualified
/// references match a plain label or a unique `.column` suffix, taking
/// the leftmost match (ambiguity is the analyzer's to reject).
pub fn resolve_expr(expr: &Expr, schema: &[String]) -> DbResult<ResolvedExpr> {
    match expr {
        Expr::Literal(v) => Ok(ResolvedExpr::Literal(v.clone())),
        Expr::Column { table, name } => {
            let ordinal = find_column(schema, table.as_deref(), name)
                .ok_or_else(|| SemanticError::ColumnNotExists(match table {
                    Some(t) => format!("{t}.{name}"),
                    None => name.clone(),
                }))?;
            Ok(ResolvedExpr::Column(ordinal))
        }
        Expr::Unary { op, expr } => Ok(ResolvedExpr::Unary {
            op: *op,
            expr: Box::new(resolve_expr(expr, schema)?),
        }),
        Expr::Binary { left, op, right } => Ok(ResolvedExpr::Binary {
            left: Box::new(resolve_expr(left, schema)?),
            op: *op,
            right: Box::new(resolve_expr(right, schema)?),
        }),
        Expr::Aggregate { func, arg } => {
            let func = AggFunc::parse(func)
                .ok_or_else(|| SemanticError::InvalidFunction(func.clone()))?;
            let arg = arg
                .as_ref()
                .map(|e| resolve_expr(e, schema).map(Box::new))
                .transpose()?;
            Ok(ResolvedExpr::Aggregate { func, arg })
        }
    }
}

pub fn find_column(schema: &[String], table: Option<&str>, name: &str) -> Option<usize> {
    match table {
        Some(table) => {
            let full = format!("{table}.{name}");
            schema.iter().position(|c| c.eq_ignore_ascii_case(&full))
        }
        None => schema.iter().position(|c| {
            c.eq_ignore_ascii_case(name)
                || c.to_lowercase().ends_with(&format!(".{}", name.to_lowercase()))
        }),
    }
}
