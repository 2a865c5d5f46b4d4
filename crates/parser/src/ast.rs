use expr::Expr;

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
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
    Insert {
        table: String,
        /// Explicit column list, if one was written.
        columns: Option<Vec<String>>,
        /// One entry per VALUES tuple.
        rows: Vec<Vec<Expr>>,
    },
    Select {
        columns: Vec<SelectItem>,
        from: String,
        joins: Vec<JoinClause>,
        selection: Option<Expr>,
        group_by: Vec<Expr>,
        order_by: Vec<OrderByExpr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
}

/// Column definition as written in DDL. The type stays raw text; semantic
/// analysis maps it to a `SqlType` and rejects unknown names.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr(Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub join_type: JoinType,
    pub condition: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub direction: SortDirection,
}
