//! Semantic analysis: name, arity, and type checks against the catalog,
//! run before planning so the executor only ever sees well-formed
//! statements.
//!
//! CREATE TABLE gets its own validation path (its table does not exist
//! in the catalog yet); every other statement resolves tables and
//! columns and type-checks literal comparisons.

#[cfg(test)]
mod tests;

use catalog::{Catalog, TableMeta};
use common::{DbResult, SemanticError};
use expr::{AggFunc, Expr};
use parser::{ColumnDef, JoinClause, SelectItem, Statement};
use types::SqlType;

/// Column labels paired with their types, as the planner will see them.
struct Scope {
    columns: Vec<(String, SqlType)>,
}

impl Scope {
    fn single(table: &TableMeta) -> Scope {
        Scope {
            columns: table
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.ty))
                .collect(),
        }
    }

    fn qualified(tables: &[&TableMeta]) -> Scope {
        let mut columns = Vec::new();
        for table in tables {
            for c in &table.columns {
                columns.push((format!("{}.{}", table.name, c.name), c.ty));
            }
        }
        Scope { columns }
    }

    /// Resolve a reference, rejecting ambiguous unqualified names.
    fn resolve(&self, table: Option<&str>, name: &str) -> DbResult<SqlType> {
        let matches: Vec<&(String, SqlType)> = match table {
            Some(table) => {
                let full = format!("{table}.{name}");
                self.columns
                    .iter()
                    .filter(|(label, _)| label.eq_ignore_ascii_case(&full))
                    .collect()
            }
            None => self
                .columns
                .iter()
                .filter(|(label, _)| {
                    label.eq_ignore_ascii_case(name)
                        || label
                            .to_lowercase()
                            .ends_with(&format!(".{}", name.to_lowercase()))
                })
                .collect(),
        };

        match matches.len() {
            0 => Err(SemanticError::ColumnNotExists(name.to_string()).into()),
            1 => Ok(matches[0].1),
            _ => Err(SemanticError::AmbiguousColumn(name.to_string()).into()),
        }
    }
}

pub fn analyze(stmt: &Statement, catalog: &Catalog) -> DbResult<()> {
    match stmt {
        Statement::CreateTable { name, columns } => validate_create_table(name, columns, catalog),
        Statement::DropTable { name, if_exists } => {
            if !if_exists {
                catalog.table(name)?;
            }
            Ok(())
        }
        Statement::CreateIndex { table, column, .. } => {
            let meta = catalog.table(table)?;
            meta.column(column)?;
            Ok(())
        }
        // Index existence is the index manager's to check.
        Statement::DropIndex { .. } => Ok(()),
        Statement::Insert {
            table,
            columns,
            rows,
        } => analyze_insert(table, columns.as_deref(), rows, catalog),
        Statement::Select {
            columns,
            from,
            joins,
            selection,
            group_by,
            order_by,
        } => analyze_select(columns, from, joins, selection, group_by, order_by, catalog),
        Statement::Update {
            table,
            assignments,
            selection,
        } => {
            let meta = catalog.table(table)?;
            let scope = Scope::single(meta);
            for (column, value) in assignments {
                let ty = meta.column(column)?.ty;
                check_scalar_expr(value, &scope)?;
                if let Expr::Literal(v) = value {
                    check_literal_fits(v, ty, column)?;
                }
            }
            check_predicate(selection, &scope)
        }
        Statement::Delete { table, selection } => {
            let meta = catalog.table(table)?;
            check_predicate(selection, &Scope::single(meta))
        }
    }
}

/// CREATE TABLE validation. The table must not exist; names must be
/// non-empty and unique; types must parse; at most one PRIMARY KEY.
pub fn validate_create_table(
    name: &str,
    columns: &[ColumnDef],
    catalog: &Catalog,
) -> DbResult<()> {
    if name.trim().is_empty() {
        return Err(SemanticError::EmptyTableName.into());
    }
    if catalog.has_table(name) {
        return Err(SemanticError::TableAlreadyExists(name.to_string()).into());
    }

    let mut pk_count = 0usize;
    for (idx, column) in columns.iter().enumerate() {
        if column.name.trim().is_empty() {
            return Err(SemanticError::EmptyColumnName.into());
        }
        if SqlType::parse(&column.ty).is_none() {
            return Err(SemanticError::InvalidDataType(column.ty.clone()).into());
        }
        if columns[..idx].iter().any(|c| c.name == column.name) {
            return Err(SemanticError::DuplicateColumnName(column.name.clone()).into());
        }
        if column.primary_key {
            pk_count += 1;
        }
    }
    if pk_count > 1 {
        return Err(SemanticError::DuplicatePrimaryKey(name.to_string()).into());
    }
    Ok(())
}

fn analyze_insert(
    table: &str,
    columns: Option<&[String]>,
    rows: &[Vec<Expr>],
    catalog: &Catalog,
) -> DbResult<()> {
    let meta = catalog.table(table)?;

    let targets: Vec<(String, SqlType)> = match columns {
        Some(names) => {
            let mut targets = Vec::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                if names[..idx].contains(name) {
                    return Err(SemanticError::DuplicateColumnName(name.clone()).into());
                }
                targets.push((name.clone(), meta.column(name)?.ty));
            }
            targets
        }
        None => meta
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.ty))
            .collect(),
    };

    let empty_scope = Scope { columns: Vec::new() };
    for row in rows {
        if row.len() != targets.len() {
            return Err(SemanticError::ColumnCountMismatch {
                expected: targets.len(),
                actual: row.len(),
            }
            .into());
        }
        for ((column, ty), value) in targets.iter().zip(row) {
            check_scalar_expr(value, &empty_scope)?;
            if let Expr::Literal(v) = value {
                check_literal_fits(v, *ty, column)?;
            }
        }
    }
    Ok(())
}

fn analyze_select(
    columns: &[SelectItem],
    from: &str,
    joins: &[JoinClause],
    selection: &Option<Expr>,
    group_by: &[Expr],
    order_by: &[parser::OrderByExpr],
    catalog: &Catalog,
) -> DbResult<()> {
    let from_meta = catalog.table(from)?;

    let scope = if joins.is_empty() {
        Scope::single(from_meta)
    } else {
        let mut tables = vec![from_meta];
        for join in joins {
            tables.push(catalog.table(&join.table)?);
        }
        Scope::qualified(&tables)
    };

    for join in joins {
        check_scalar_expr(&join.condition, &scope)?;
    }
    check_predicate(selection, &scope)?;

    for item in columns {
        if let SelectItem::Expr(e) = item {
            check_expr(e, &scope)?;
        }
    }
    for e in group_by {
        check_scalar_expr(e, &scope)?;
    }
    for item in order_by {
        // ORDER BY may also reference select-list output labels (e.g.
        // an aggregate's display name), so unresolved names here are
        // left for the planner to judge against the projected schema.
        let _ = check_expr(&item.expr, &scope);
    }
    Ok(())
}

fn check_predicate(predicate: &Option<Expr>, scope: &Scope) -> DbResult<()> {
    match predicate {
        Some(pred) => check_scalar_expr(pred, scope),
        None => Ok(()),
    }
}

/// Expression check where aggregates are not allowed.
fn check_scalar_expr(expr: &Expr, scope: &Scope) -> DbResult<()> {
    if expr.contains_aggregate() {
        return Err(SemanticError::InvalidValue(
            "aggregate functions are only allowed in the select list".into(),
        )
        .into());
    }
    check_expr(expr, scope)
}

fn check_expr(expr: &Expr, scope: &Scope) -> DbResult<()> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Column { table, name } => scope.resolve(table.as_deref(), name).map(|_| ()),
        Expr::Unary { expr, .. } => check_expr(expr, scope),
        Expr::Binary { left, op, right } => {
            check_expr(left, scope)?;
            check_expr(right, scope)?;
            if op.is_comparison() {
                check_comparison_types(left, right, scope)?;
            }
            Ok(())
        }
        Expr::Aggregate { func, arg } => {
            if AggFunc::parse(func).is_none() {
                return Err(SemanticError::InvalidFunction(func.clone()).into());
            }
            match arg {
                Some(arg) => check_expr(arg, scope),
                None => Ok(()),
            }
        }
    }
}

/// Reject comparisons whose two sides can never be compared: a Text
/// column against a numeric literal, or vice versa.
fn check_comparison_types(left: &Expr, right: &Expr, scope: &Scope) -> DbResult<()> {
    let left_ty = static_type(left, scope);
    let right_ty = static_type(right, scope);
    if let (Some(l), Some(r)) = (left_ty, right_ty) {
        let compatible = matches!(
            (l, r),
            (SqlType::Text, SqlType::Text)
                | (SqlType::Int | SqlType::Double, SqlType::Int | SqlType::Double)
        );
        if !compatible {
            return Err(SemanticError::TypeMismatch(format!(
                "cannot compare {l} with {r}"
            ))
            .into());
        }
    }
    Ok(())
}

/// Static type of a column reference or literal; compound expressions
/// are left to runtime.
fn static_type(expr: &Expr, scope: &Scope) -> Option<SqlType> {
    match expr {
        Expr::Column { table, name } => scope.resolve(table.as_deref(), name).ok(),
        Expr::Literal(v) => v.sql_type(),
        _ => None,
    }
}

/// Literal-vs-column compatibility for INSERT and UPDATE targets.
fn check_literal_fits(value: &types::Value, ty: SqlType, column: &str) -> DbResult<()> {
    let ok = match (value.sql_type(), ty) {
        (None, _) => true, // NULL; nullability is checked at execution
        (Some(SqlType::Int), SqlType::Int | SqlType::Double) => true,
        (Some(SqlType::Double), SqlType::Double) => true,
        (Some(SqlType::Text), SqlType::Text) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(SemanticError::TypeMismatch(format!(
            "column '{column}' is {ty}, literal {value} is not"
        ))
        .into())
    }
}
