use std::fmt;
use types::Value;

/// Binary comparison, logical, and arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }

    /// Short lowercase token used when synthesizing output column names.
    pub fn token(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Aggregate functions accepted in select lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggFunc {
    pub fn parse(name: &str) -> Option<AggFunc> {
        match name.to_uppercase().as_str() {
            "COUNT" => Some(AggFunc::Count),
            "SUM" => Some(AggFunc::Sum),
            "AVG" => Some(AggFunc::Avg),
            "MAX" => Some(AggFunc::Max),
            "MIN" => Some(AggFunc::Min),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Max => "MAX",
            AggFunc::Min => "MIN",
        }
    }
}

/// Expression abstract syntax tree as produced by the parser.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Column reference with an optional table qualifier (`t.c`).
    Column {
        table: Option<String>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Aggregate call. `arg` of `None` means `*`. The function name stays
    /// raw here; semantic analysis rejects names that are not aggregates.
    Aggregate {
        func: String,
        arg: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Does this expression (or any sub-expression) contain an aggregate?
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Literal(_) | Expr::Column { .. } => false,
            Expr::Unary { expr, .. } => expr.contains_aggregate(),
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
        }
    }

    /// Output column name for this expression: identifiers keep their
    /// name, literals print themselves, and compound expressions get a
    /// synthesized `left_op_right` label.
    pub fn display_name(&self) -> String {
        match self {
            Expr::Literal(v) => v.to_string(),
            Expr::Column { table, name } => match table {
                Some(t) => format!("{t}.{name}"),
                None => name.clone(),
            },
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => format!("not_{}", expr.display_name()),
                UnaryOp::Neg => format!("-{}", expr.display_name()),
            },
            Expr::Binary { left, op, right } => {
                format!("{}_{}_{}", left.display_name(), op.token(), right.display_name())
            }
            Expr::Aggregate { func, arg } => match arg {
                Some(arg) => format!("{}({})", func.to_uppercase(), arg.display_name()),
                None => format!("{}(*)", func.to_uppercase()),
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_follow_expression_text() {
        assert_eq!(Expr::column("salary").display_name(), "salary");
        assert_eq!(Expr::Literal(Value::Int(42)).display_name(), "42");
        assert_eq!(
            Expr::binary(Expr::column("a"), BinaryOp::Add, Expr::column("b")).display_name(),
            "a_add_b"
        );
        assert_eq!(
            Expr::Column {
                table: Some("users".into()),
                name: "id".into()
            }
            .display_name(),
            "users.id"
        );
    }

    #[test]
    fn aggregate_display_names() {
        let count_star = Expr::Aggregate {
            func: "count".into(),
            arg: None,
        };
        assert_eq!(count_star.display_name(), "COUNT(*)");

        let avg = Expr::Aggregate {
            func: "AVG".into(),
            arg: Some(Box::new(Expr::column("salary"))),
        };
        assert_eq!(avg.display_name(), "AVG(salary)");
    }

    #[test]
    fn aggregate_detection_sees_nested_calls() {
        let nested = Expr::binary(
            Expr::Aggregate {
                func: "SUM".into(),
                arg: Some(Box::new(Expr::column("v"))),
            },
            BinaryOp::Div,
            Expr::Literal(Value::Int(2)),
        );
        assert!(nested.contains_aggregate());
        assert!(!Expr::column("v").contains_aggregate());
    }

    #[test]
    fn agg_func_parse_is_case_insensitive() {
        assert_eq!(AggFunc::parse("count"), Some(AggFunc::Count));
        assert_eq!(AggFunc::parse("Avg"), Some(AggFunc::Avg));
        assert_eq!(AggFunc::parse("median"), None);
    }
}
