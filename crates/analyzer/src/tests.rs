use super::*;
use catalog::{ColumnInfo, IndexInfo, IndexKind};
use common::DbError;
use parser::parse_sql;

fn catalog() -> Catalog {
    let users = TableMeta::new(
        "users",
        vec![
            ColumnInfo::new("id", SqlType::Int).primary_key(),
            ColumnInfo::new("name", SqlType::Text),
        ],
        vec![IndexInfo {
            name: "pk_users_id".into(),
            table: "users".into(),
            column: "id".into(),
            column_ordinal: 0,
            kind: IndexKind::BTree,
            unique: true,
        }],
    );
    let orders = TableMeta::new(
        "orders",
        vec![
            ColumnInfo::new("id", SqlType::Int).primary_key(),
            ColumnInfo::new("user_id", SqlType::Int),
        ],
        vec![],
    );
    Catalog::new(vec![users, orders])
}

fn analyze_one(sql: &str) -> DbResult<()> {
    let stmt = parse_sql(sql).unwrap().remove(0);
    analyze(&stmt, &catalog())
}

fn expect_semantic(sql: &str) -> SemanticError {
    match analyze_one(sql) {
        Err(DbError::Semantic(err)) => err,
        other => panic!("expected a semantic error for {sql:?}, got {other:?}"),
    }
}

#[test]
fn valid_statements_pass() {
    analyze_one("SELECT id, name FROM users WHERE id > 3").unwrap();
    analyze_one("INSERT INTO users VALUES (1, 'a')").unwrap();
    analyze_one("UPDATE users SET name = 'b' WHERE id = 1").unwrap();
    analyze_one("DELETE FROM users WHERE name = 'b'").unwrap();
    analyze_one("SELECT COUNT(*), AVG(id) FROM users").unwrap();
    analyze_one("CREATE TABLE fresh (id INT PRIMARY KEY, label STRING)").unwrap();
    analyze_one("DROP TABLE IF EXISTS ghost").unwrap();
}

#[test]
fn unknown_table_and_column() {
    assert!(matches!(
        expect_semantic("SELECT * FROM ghost"),
        SemanticError::TableNotExists(_)
    ));
    assert!(matches!(
        expect_semantic("SELECT ghost FROM users"),
        SemanticError::ColumnNotExists(_)
    ));
    assert!(matches!(
        expect_semantic("DROP TABLE ghost"),
        SemanticError::TableNotExists(_)
    ));
}

#[test]
fn create_table_shape_checks() {
    assert!(matches!(
        expect_semantic("CREATE TABLE users (id INT)"),
        SemanticError::TableAlreadyExists(_)
    ));
    assert!(matches!(
        expect_semantic("CREATE TABLE bad (id INT, id STRING)"),
        SemanticError::DuplicateColumnName(_)
    ));
    assert!(matches!(
        expect_semantic("CREATE TABLE bad (id BLOB)"),
        SemanticError::InvalidDataType(_)
    ));
    assert!(matches!(
        expect_semantic("CREATE TABLE bad (a INT PRIMARY KEY, b INT PRIMARY KEY)"),
        SemanticError::DuplicatePrimaryKey(_)
    ));
}

#[test]
fn insert_arity_and_types() {
    assert!(matches!(
        expect_semantic("INSERT INTO users VALUES (1)"),
        SemanticError::ColumnCountMismatch { expected: 2, actual: 1 }
    ));
    assert!(matches!(
        expect_semantic("INSERT INTO users VALUES ('x', 'a')"),
        SemanticError::TypeMismatch(_)
    ));
    assert!(matches!(
        expect_semantic("INSERT INTO users (id, id) VALUES (1, 2)"),
        SemanticError::DuplicateColumnName(_)
    ));
    assert!(matches!(
        expect_semantic("INSERT INTO users (ghost) VALUES (1)"),
        SemanticError::ColumnNotExists(_)
    ));
}

#[test]
fn text_numeric_comparison_is_rejected_statically() {
    assert!(matches!(
        expect_semantic("SELECT * FROM users WHERE name > 5"),
        SemanticError::TypeMismatch(_)
    ));
    analyze_one("SELECT * FROM users WHERE name = 'a'").unwrap();
}

#[test]
fn ambiguous_unqualified_column_in_join() {
    // `id` exists on both sides.
    assert!(matches!(
        expect_semantic(
            "SELECT * FROM users JOIN orders ON users.id = orders.user_id WHERE id = 1"
        ),
        SemanticError::AmbiguousColumn(_)
    ));
    // Qualified references are fine.
    analyze_one(
        "SELECT * FROM users JOIN orders ON users.id = orders.user_id WHERE users.id = 1",
    )
    .unwrap();
    // Unqualified but unique names resolve too.
    analyze_one("SELECT * FROM users JOIN orders ON users.id = orders.user_id WHERE name = 'a'")
        .unwrap();
}

#[test]
fn aggregates_are_select_list_only() {
    assert!(matches!(
        expect_semantic("SELECT * FROM users WHERE COUNT(*) > 1"),
        SemanticError::InvalidValue(_)
    ));
    assert!(matches!(
        expect_semantic("SELECT MEDIAN(id) FROM users"),
        SemanticError::InvalidFunction(_)
    ));
}

#[test]
fn update_checks_assignment_types() {
    assert!(matches!(
        expect_semantic("UPDATE users SET name = 5"),
        SemanticError::TypeMismatch(_)
    ));
    assert!(matches!(
        expect_semantic("UPDATE users SET ghost = 5"),
        SemanticError::ColumnNotExists(_)
    ));
}
