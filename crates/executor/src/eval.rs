//! The one expression evaluator every operator shares.
//!
//! Predicates follow truthy-Int semantics: comparisons and logical
//! operators yield `Int(1)` or `Int(0)`, and a row passes a filter when
//! the result is truthy. Comparisons against NULL yield `Int(0)` (an
//! outer-join padding row never matches), while Text-versus-numeric
//! comparisons are real type errors.

use common::{DbError, DbResult, RuntimeError, Row};
use expr::{BinaryOp, UnaryOp};
use planner::ResolvedExpr;
use types::Value;

/// Evaluate an ordinal-resolved expression against one row.
pub fn eval(expr: &ResolvedExpr, row: &Row) -> DbResult<Value> {
    match expr {
        ResolvedExpr::Literal(v) => Ok(v.clone()),
        ResolvedExpr::Column(ordinal) => row
            .values
            .get(*ordinal)
            .cloned()
            .ok_or_else(|| {
                DbError::Executor(format!(
                    "column ordinal {ordinal} out of range for a {}-column row",
                    row.arity()
                ))
            }),
        ResolvedExpr::Unary { op, expr } => {
            let v = eval(expr, row)?;
            apply_unary(*op, v)
        }
        ResolvedExpr::Binary { left, op, right } => {
            let l = eval(left, row)?;
            let r = eval(right, row)?;
            apply_binary(*op, l, r)
        }
        ResolvedExpr::Aggregate { func, .. } => Err(DbError::Executor(format!(
            "{} outside of an aggregation context",
            func.name()
        ))),
    }
}

pub fn apply_unary(op: UnaryOp, value: Value) -> DbResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Int(if value.is_truthy() { 0 } else { 1 })),
        UnaryOp::Neg => match value {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Double(v) => Ok(Value::Double(-v)),
            Value::Null => Ok(Value::Null),
            Value::Text(_) => Err(RuntimeError::TypeMismatchInExpression(
                "cannot negate a string".into(),
            )
            .into()),
        },
    }
}

pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> DbResult<Value> {
    if op.is_comparison() {
        return compare(op, &left, &right);
    }
    match op {
        BinaryOp::And => Ok(Value::Int(
            (left.is_truthy() && right.is_truthy()) as i64,
        )),
        BinaryOp::Or => Ok(Value::Int(
            (left.is_truthy() || right.is_truthy()) as i64,
        )),
        _ => arithmetic(op, left, right),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> DbResult<Value> {
    use std::cmp::Ordering;

    // NULL never matches anything, itself included.
    if matches!(left, Value::Null) || matches!(right, Value::Null) {
        return Ok(Value::Int(0));
    }

    let ord = left.cmp_same_type(right).ok_or_else(|| {
        RuntimeError::TypeMismatchInExpression(format!(
            "cannot compare {left} with {right}"
        ))
    })?;

    let result = match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => unreachable!("compare only handles comparison operators"),
    };
    Ok(Value::Int(result as i64))
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> DbResult<Value> {
    // NULL propagates through arithmetic.
    if matches!(left, Value::Null) || matches!(right, Value::Null) {
        return Ok(Value::Null);
    }

    match (&left, &right) {
        (Value::Int(l), Value::Int(r)) => {
            let (l, r) = (*l, *r);
            Ok(match op {
                BinaryOp::Add => Value::Int(l.wrapping_add(r)),
                BinaryOp::Sub => Value::Int(l.wrapping_sub(r)),
                BinaryOp::Mul => Value::Int(l.wrapping_mul(r)),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(RuntimeError::DivisionByZero.into());
                    }
                    Value::Int(l / r)
                }
                _ => unreachable!("arithmetic only handles arithmetic operators"),
            })
        }
        _ => {
            let l = left.as_f64().ok_or_else(|| {
                RuntimeError::TypeMismatchInExpression(format!("{left} is not numeric"))
            })?;
            let r = right.as_f64().ok_or_else(|| {
                RuntimeError::TypeMismatchInExpression(format!("{right} is not numeric"))
            })?;
            Ok(match op {
                BinaryOp::Add => Value::Double(l + r),
                BinaryOp::Sub => Value::Double(l - r),
                BinaryOp::Mul => Value::Double(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        return Err(RuntimeError::DivisionByZero.into());
                    }
                    Value::Double(l / r)
                }
                _ => unreachable!("arithmetic only handles arithmetic operators"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(ordinal: usize) -> ResolvedExpr {
        ResolvedExpr::Column(ordinal)
    }

    fn lit(v: Value) -> ResolvedExpr {
        ResolvedExpr::Literal(v)
    }

    fn bin(l: ResolvedExpr, op: BinaryOp, r: ResolvedExpr) -> ResolvedExpr {
        ResolvedExpr::Binary {
            left: Box::new(l),
            op,
            right: Box::new(r),
        }
    }

    #[test]
    fn comparisons_yield_truthy_ints() {
        let row = Row::new(vec![Value::Int(5)]);
        let gt = bin(col(0), BinaryOp::Gt, lit(Value::Int(3)));
        let lt = bin(col(0), BinaryOp::Lt, lit(Value::Int(3)));

        assert_eq!(eval(&gt, &row).unwrap(), Value::Int(1));
        assert_eq!(eval(&lt, &row).unwrap(), Value::Int(0));
    }

    #[test]
    fn int_double_comparisons_widen() {
        let row = Row::new(vec![Value::Double(5500.5)]);
        let pred = bin(col(0), BinaryOp::Gt, lit(Value::Int(5000)));
        assert_eq!(eval(&pred, &row).unwrap(), Value::Int(1));
    }

    #[test]
    fn text_numeric_comparison_is_a_type_error() {
        let row = Row::new(vec![Value::Text("abc".into())]);
        let pred = bin(col(0), BinaryOp::Eq, lit(Value::Int(1)));
        assert!(matches!(
            eval(&pred, &row).unwrap_err(),
            DbError::Runtime(RuntimeError::TypeMismatchInExpression(_))
        ));
    }

    #[test]
    fn null_comparisons_never_match() {
        let row = Row::new(vec![Value::Null]);
        let eq = bin(col(0), BinaryOp::Eq, lit(Value::Null));
        let ne = bin(col(0), BinaryOp::Ne, lit(Value::Int(1)));
        assert_eq!(eval(&eq, &row).unwrap(), Value::Int(0));
        assert_eq!(eval(&ne, &row).unwrap(), Value::Int(0));
    }

    #[test]
    fn arithmetic_keeps_ints_and_widens_mixed() {
        let row = Row::new(vec![Value::Int(7), Value::Double(0.5)]);
        let int_sum = bin(col(0), BinaryOp::Add, lit(Value::Int(3)));
        let mixed = bin(col(0), BinaryOp::Mul, col(1));

        assert_eq!(eval(&int_sum, &row).unwrap(), Value::Int(10));
        assert_eq!(eval(&mixed, &row).unwrap(), Value::Double(3.5));
    }

    #[test]
    fn integer_division_truncates_and_zero_divides_error() {
        let row = Row::new(vec![Value::Int(7)]);
        let div = bin(col(0), BinaryOp::Div, lit(Value::Int(2)));
        assert_eq!(eval(&div, &row).unwrap(), Value::Int(3));

        let by_zero = bin(col(0), BinaryOp::Div, lit(Value::Int(0)));
        assert!(matches!(
            eval(&by_zero, &row).unwrap_err(),
            DbError::Runtime(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        let row = Row::new(vec![Value::Null]);
        let add = bin(col(0), BinaryOp::Add, lit(Value::Int(100)));
        assert_eq!(eval(&add, &row).unwrap(), Value::Null);
    }

    #[test]
    fn logic_uses_truthiness() {
        let row = Row::new(vec![Value::Int(1), Value::Int(0)]);
        let and = bin(col(0), BinaryOp::And, col(1));
        let or = bin(col(0), BinaryOp::Or, col(1));
        let not = ResolvedExpr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(col(1)),
        };

        assert_eq!(eval(&and, &row).unwrap(), Value::Int(0));
        assert_eq!(eval(&or, &row).unwrap(), Value::Int(1));
        assert_eq!(eval(&not, &row).unwrap(), Value::Int(1));
    }
}
