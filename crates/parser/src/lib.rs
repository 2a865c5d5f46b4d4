mod ast;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{BinaryOp, Expr, UnaryOp};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::Value;

/// Parse SQL text into the internal AST statements.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    let dialect = GenericDialect {};
    let stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::Parse(format!("{e}")))?;

    stmts.into_iter().map(map_statement).collect()
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable {
            name,
            columns,
            constraints,
            ..
        } => {
            let table = normalize_object_name(&name)?;
            let table_level_pk = table_level_primary_key(&constraints)?;

            let mapped_columns = columns
                .into_iter()
                .map(|col| map_column_def(col, table_level_pk.as_deref()))
                .collect::<DbResult<Vec<_>>>()?;

            Ok(Statement::CreateTable {
                name: table,
                columns: mapped_columns,
            })
        }
        SqlStatement::Drop {
            object_type,
            if_exists,
            names,
            ..
        } => match object_type {
            sqlast::ObjectType::Table => Ok(Statement::DropTable {
                name: first_name(names)?,
                if_exists,
            }),
            sqlast::ObjectType::Index => Ok(Statement::DropIndex {
                name: first_name(names)?,
            }),
            _ => Err(DbError::Parse(format!(
                "unsupported DROP type: {object_type:?}"
            ))),
        },
        SqlStatement::CreateIndex {
            name,
            table_name,
            columns,
            unique,
            ..
        } => {
            let index_name = name
                .ok_or_else(|| DbError::Parse("index name required".into()))
                .map(|n| normalize_object_name(&n))??;
            let table = normalize_object_name(&table_name)?;
            if columns.len() != 1 {
                return Err(DbError::Parse(
                    "indexes cover exactly one column".into(),
                ));
            }
            let column = map_index_column(&columns[0])?;
            Ok(Statement::CreateIndex {
                name: index_name,
                table,
                column,
                unique,
            })
        }
        SqlStatement::Insert {
            table_name,
            columns,
            source,
            ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source = source.ok_or_else(|| DbError::Parse("INSERT source missing".into()))?;
            let rows = extract_values(*source)?;
            let columns = if columns.is_empty() {
                None
            } else {
                Some(columns.iter().map(normalize_ident).collect())
            };
            Ok(Statement::Insert {
                table,
                columns,
                rows,
            })
        }
        SqlStatement::Query(query) => map_select(*query),
        SqlStatement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let table = plain_table_name(&table)?;
            let assignments = assignments
                .into_iter()
                .map(|assign| {
                    let ident = assign
                        .id
                        .last()
                        .ok_or_else(|| DbError::Parse("invalid assignment target".into()))?;
                    Ok((normalize_ident(ident), map_expr(assign.value)?))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Update {
                table,
                assignments,
                selection,
            })
        }
        SqlStatement::Delete {
            from, selection, ..
        } => {
            if from.len() != 1 {
                return Err(DbError::Parse("DELETE takes exactly one table".into()));
            }
            let table = plain_table_name(&from[0])?;
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Delete { table, selection })
        }
        _ => Err(DbError::Parse("unsupported statement".into())),
    }
}

fn map_column_def(col: sqlast::ColumnDef, table_level_pk: Option<&str>) -> DbResult<ColumnDef> {
    use sqlast::ColumnOption;

    let name = normalize_ident(&col.name);
    let mut not_null = false;
    let mut primary_key = table_level_pk.is_some_and(|pk| pk == name);

    for option in &col.options {
        match &option.option {
            ColumnOption::NotNull => not_null = true,
            ColumnOption::Unique { is_primary: true, .. } => primary_key = true,
            ColumnOption::Unique { .. } => {}
            other => {
                return Err(DbError::Parse(format!(
                    "unsupported column option: {other:?}"
                )))
            }
        }
    }

    // A primary key is implicitly NOT NULL.
    Ok(ColumnDef {
        name,
        ty: col.data_type.to_string().to_uppercase(),
        not_null: not_null || primary_key,
        primary_key,
    })
}

fn table_level_primary_key(
    constraints: &[sqlast::TableConstraint],
) -> DbResult<Option<String>> {
    use sqlast::TableConstraint;

    for constraint in constraints {
        if let TableConstraint::Unique {
            columns,
            is_primary: true,
            ..
        } = constraint
        {
            if columns.len() != 1 {
                return Err(DbError::Parse(
                    "composite primary keys not supported".into(),
                ));
            }
            return Ok(Some(normalize_ident(&columns[0])));
        }
    }
    Ok(None)
}

fn map_select(query: sqlast::Query) -> DbResult<Statement> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        _ => return Err(DbError::Parse("only plain SELECT is supported".into())),
    };

    let sqlast::Select {
        projection,
        from,
        selection,
        group_by,
        ..
    } = *select;

    if from.len() != 1 {
        return Err(DbError::Parse("SELECT requires exactly one FROM table".into()));
    }
    let from_table = table_factor_name(&from[0].relation)?;
    let joins = from[0]
        .joins
        .iter()
        .map(map_join)
        .collect::<DbResult<Vec<_>>>()?;

    let columns = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;
    let selection = selection.map(map_expr).transpose()?;

    let group_by = match group_by {
        sqlast::GroupByExpr::Expressions(exprs) => exprs
            .into_iter()
            .map(map_expr)
            .collect::<DbResult<Vec<_>>>()?,
        sqlast::GroupByExpr::All => {
            return Err(DbError::Parse("GROUP BY ALL not supported".into()))
        }
    };

    let order_by = query
        .order_by
        .into_iter()
        .map(map_order_by_expr)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(Statement::Select {
        columns,
        from: from_table,
        joins,
        selection,
        group_by,
        order_by,
    })
}

fn map_join(join: &sqlast::Join) -> DbResult<JoinClause> {
    use sqlast::{JoinConstraint, JoinOperator};

    let table = table_factor_name(&join.relation)?;
    let (join_type, constraint) = match &join.join_operator {
        JoinOperator::Inner(c) => (JoinType::Inner, c),
        JoinOperator::LeftOuter(c) => (JoinType::Left, c),
        JoinOperator::RightOuter(c) => (JoinType::Right, c),
        other => {
            return Err(DbError::Parse(format!(
                "unsupported join type: {other:?}"
            )))
        }
    };
    let condition = match constraint {
        JoinConstraint::On(expr) => map_expr(expr.clone())?,
        _ => return Err(DbError::Parse("joins require an ON condition".into())),
    };

    Ok(JoinClause {
        table,
        join_type,
        condition,
    })
}

fn map_order_by_expr(expr: sqlast::OrderByExpr) -> DbResult<ast::OrderByExpr> {
    let direction = match expr.asc {
        Some(false) => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    Ok(ast::OrderByExpr {
        expr: map_expr(expr.expr)?,
        direction,
    })
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Vec<Expr>>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(DbError::Parse("INSERT requires at least one row".into()));
            }
            values
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(map_expr).collect())
                .collect()
        }
        _ => Err(DbError::Parse("INSERT expects a VALUES list".into())),
    }
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<SelectItem> {
    match item {
        sqlast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        sqlast::SelectItem::QualifiedWildcard(_, _) => {
            Err(DbError::Parse("qualified wildcard not supported".into()))
        }
        sqlast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr(map_expr(expr)?)),
        sqlast::SelectItem::ExprWithAlias { .. } => {
            Err(DbError::Parse("select aliases not supported".into()))
        }
    }
}

fn map_expr(expr: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: normalize_ident(&ident),
        }),
        SqlExpr::CompoundIdentifier(idents) => {
            if idents.len() != 2 {
                return Err(DbError::Parse(format!(
                    "unsupported identifier path of {} parts",
                    idents.len()
                )));
            }
            Ok(Expr::Column {
                table: Some(normalize_ident(&idents[0])),
                name: normalize_ident(&idents[1]),
            })
        }
        SqlExpr::Value(value) => Ok(Expr::Literal(map_value(value)?)),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: Box::new(map_expr(*left)?),
            op: map_binary_op(op)?,
            right: Box::new(map_expr(*right)?),
        }),
        SqlExpr::UnaryOp { op, expr } => map_unary(op, *expr),
        SqlExpr::Nested(expr) => map_expr(*expr),
        SqlExpr::Function(func) => map_function(func),
        other => Err(DbError::Parse(format!("unsupported expression: {other:?}"))),
    }
}

fn map_function(func: sqlast::Function) -> DbResult<Expr> {
    use sqlast::{FunctionArg, FunctionArgExpr};

    let name = normalize_object_name(&func.name)?;
    if func.args.len() > 1 {
        return Err(DbError::Parse(format!(
            "function '{name}' takes at most one argument"
        )));
    }

    let arg = match func.args.into_iter().next() {
        None | Some(FunctionArg::Unnamed(FunctionArgExpr::Wildcard)) => None,
        Some(FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))) => {
            Some(Box::new(map_expr(expr)?))
        }
        Some(other) => {
            return Err(DbError::Parse(format!(
                "unsupported function argument: {other:?}"
            )))
        }
    };

    Ok(Expr::Aggregate { func: name, arg })
}

fn map_unary(op: sqlast::UnaryOperator, expr: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::UnaryOperator as SqlUnary;

    match op {
        SqlUnary::Not => Ok(Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(map_expr(expr)?),
        }),
        SqlUnary::Plus => map_expr(expr),
        SqlUnary::Minus => {
            // Fold negated numeric literals so `-5` stays a literal.
            match map_expr(expr)? {
                Expr::Literal(Value::Int(v)) => Ok(Expr::Literal(Value::Int(-v))),
                Expr::Literal(Value::Double(v)) => Ok(Expr::Literal(Value::Double(-v))),
                other => Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(other),
                }),
            }
        }
        other => Err(DbError::Parse(format!(
            "unsupported unary operator: {other:?}"
        ))),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            if let Ok(parsed) = num.parse::<i64>() {
                Ok(Value::Int(parsed))
            } else {
                num.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| DbError::Parse(format!("invalid numeric literal: {num}")))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => Ok(Value::Text(s)),
        SqlValue::Boolean(b) => Ok(Value::Int(b as i64)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(DbError::Parse(format!("unsupported literal: {other:?}"))),
    }
}

fn map_binary_op(op: sqlast::BinaryOperator) -> DbResult<BinaryOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => BinaryOp::Eq,
        SqlBinary::NotEq => BinaryOp::Ne,
        SqlBinary::Lt => BinaryOp::Lt,
        SqlBinary::LtEq => BinaryOp::Le,
        SqlBinary::Gt => BinaryOp::Gt,
        SqlBinary::GtEq => BinaryOp::Ge,
        SqlBinary::And => BinaryOp::And,
        SqlBinary::Or => BinaryOp::Or,
        SqlBinary::Plus => BinaryOp::Add,
        SqlBinary::Minus => BinaryOp::Sub,
        SqlBinary::Multiply => BinaryOp::Mul,
        SqlBinary::Divide => BinaryOp::Div,
        other => return Err(DbError::Parse(format!("unsupported operator: {other:?}"))),
    })
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(normalize_ident)
        .ok_or_else(|| DbError::Parse("invalid object name".into()))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(DbError::Parse("DROP requires a target".into()));
    }
    normalize_object_name(&names.remove(0))
}

fn plain_table_name(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(DbError::Parse("joins are not allowed here".into()));
    }
    table_factor_name(&table.relation)
}

fn table_factor_name(factor: &sqlast::TableFactor) -> DbResult<String> {
    match factor {
        sqlast::TableFactor::Table { name, alias, .. } => {
            if alias.is_some() {
                return Err(DbError::Parse("table aliases not supported".into()));
            }
            normalize_object_name(name)
        }
        _ => Err(DbError::Parse("unsupported table factor".into())),
    }
}

fn map_index_column(column: &sqlast::OrderByExpr) -> DbResult<String> {
    match &column.expr {
        sqlast::Expr::Identifier(ident) => Ok(normalize_ident(ident)),
        other => Err(DbError::Parse(format!(
            "unsupported index column: {other:?}"
        ))),
    }
}
