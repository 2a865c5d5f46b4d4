use std::cmp::Ordering;
use std::fmt;

/// Column types accepted by the SQL surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Double,
    Text,
}

impl SqlType {
    /// Parse a type name as written in DDL. Synonyms follow the SQL surface.
    pub fn parse(raw: &str) -> Option<SqlType> {
        match raw.trim().to_uppercase().as_str() {
            "INT" | "INTEGER" => Some(SqlType::Int),
            "DOUBLE" | "FLOAT" | "REAL" => Some(SqlType::Double),
            "STRING" | "TEXT" | "VARCHAR" => Some(SqlType::Text),
            _ => None,
        }
    }

    /// Canonical name used in metadata files and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Double => "DOUBLE",
            SqlType::Text => "STRING",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged scalar. `Null` only arises from outer-join padding and
/// nullable columns; it is not a declarable column type.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Int(_) => Some(SqlType::Int),
            Value::Double(_) => Some(SqlType::Double),
            Value::Text(_) => Some(SqlType::Text),
            Value::Null => None,
        }
    }

    /// Predicate truthiness: zero of either numeric type, the empty
    /// string, and NULL are falsey; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Null => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Ordering within a type. Int and Double widen to Double; any
    /// comparison involving Text and a numeric (or NULL) is refused.
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|ord| ord == Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Null => f.write_str("NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn cmp_widens_int_and_double() {
        assert_eq!(Value::Int(1).cmp_same_type(&Value::Double(1.5)), Some(Less));
        assert_eq!(Value::Double(2.0).cmp_same_type(&Value::Int(2)), Some(Equal));
        assert_eq!(Value::Double(3.5).cmp_same_type(&Value::Int(3)), Some(Greater));
    }

    #[test]
    fn text_never_compares_with_numerics() {
        assert_eq!(Value::Text("1".into()).cmp_same_type(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).cmp_same_type(&Value::Text("1".into())), None);
        assert_eq!(Value::Null.cmp_same_type(&Value::Int(1)), None);
    }

    #[test]
    fn text_compares_lexicographically() {
        assert_eq!(
            Value::Text("abc".into()).cmp_same_type(&Value::Text("abd".into())),
            Some(Less)
        );
    }

    #[test]
    fn truthiness_matches_predicate_rules() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Double(0.0).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Double(0.5).is_truthy());
        assert!(Value::Text("0".into()).is_truthy());
    }

    #[test]
    fn type_names_round_trip() {
        for ty in [SqlType::Int, SqlType::Double, SqlType::Text] {
            assert_eq!(SqlType::parse(ty.name()), Some(ty));
        }
        assert_eq!(SqlType::parse("varchar"), Some(SqlType::Text));
        assert_eq!(SqlType::parse("BLOB"), None);
    }

    #[test]
    fn serde_round_trip_stability() {
        let vals = vec![
            Value::Int(-42),
            Value::Double(2.75),
            Value::Text("Ada".into()),
            Value::Null,
        ];

        let json = serde_json::to_string(&vals).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();

        assert_eq!(vals, back);
    }

    proptest! {
        #[test]
        fn int_order_is_antisymmetric(i in any::<i64>(), j in any::<i64>()) {
            let a = Value::Int(i);
            let b = Value::Int(j);
            let ord1 = a.cmp_same_type(&b).unwrap();
            let ord2 = b.cmp_same_type(&a).unwrap();
            prop_assert_eq!(ord1, ord2.reverse());
        }

        #[test]
        fn widened_order_agrees_with_f64(i in -1_000_000i64..1_000_000, d in -1e6f64..1e6) {
            let ord = Value::Int(i).cmp_same_type(&Value::Double(d));
            prop_assert_eq!(ord, (i as f64).partial_cmp(&d));
        }

        #[test]
        fn text_cmp_matches_std(a in ".*", b in ".*") {
            let va = Value::Text(a.clone());
            let vb = Value::Text(b.clone());
            prop_assert_eq!(va.cmp_same_type(&vb), Some(a.cmp(&b)));
        }
    }
}
