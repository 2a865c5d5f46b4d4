//! End-to-end SQL scenarios over a fresh database per test.

use common::{Config, DbError, IndexError, RecordBatch};
use database::{Database, Output};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};
use types::Value;

fn open() -> (Database, TempDir) {
    let dir = tempdir().unwrap();
    let db = open_at(&dir);
    (db, dir)
}

fn open_at(dir: &TempDir) -> Database {
    let config = Config::builder()
        .data_dir(dir.path().to_path_buf())
        .buffer_pool_frames(64)
        .btree_order(16)
        .build();
    Database::open(config).unwrap()
}

fn rows(output: Output) -> RecordBatch {
    match output {
        Output::Rows(batch) => batch,
        other => panic!("expected rows, got {other:?}"),
    }
}

fn query(db: &mut Database, sql: &str) -> RecordBatch {
    rows(db.execute(sql).unwrap().pop().unwrap())
}

fn row_values(batch: &RecordBatch) -> Vec<Vec<Value>> {
    batch.rows.iter().map(|r| r.values.clone()).collect()
}

#[test]
fn create_insert_scan() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (id INT PRIMARY KEY, name STRING, age INT)")
        .unwrap();
    db.execute("INSERT INTO t VALUES (1,'Alice',25),(2,'Bob',30)")
        .unwrap();

    let batch = query(&mut db, "SELECT * FROM t");
    assert_eq!(
        row_values(&batch),
        vec![
            vec![Value::Int(1), Value::Text("Alice".into()), Value::Int(25)],
            vec![Value::Int(2), Value::Text("Bob".into()), Value::Int(30)],
        ]
    );
}

#[test]
fn duplicate_primary_key_is_rejected() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (id INT PRIMARY KEY, n STRING)").unwrap();
    db.execute("INSERT INTO t VALUES (1, 'a')").unwrap();

    let err = db.execute("INSERT INTO t VALUES (1, 'b')").unwrap_err();
    assert!(matches!(
        err,
        DbError::Index(IndexError::UniqueViolation { .. })
    ));

    let batch = query(&mut db, "SELECT * FROM t");
    assert_eq!(
        row_values(&batch),
        vec![vec![Value::Int(1), Value::Text("a".into())]]
    );
}

#[test]
fn index_range_scan_matches_sequential_scan() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE employees (id INT PRIMARY KEY, salary DOUBLE)")
        .unwrap();

    let mut script = String::new();
    for i in 0..1000 {
        let salary = 3000.0 + ((i * 37) % 500) as f64 * 10.0;
        script.push_str(&format!("INSERT INTO employees VALUES ({i}, {salary});\n"));
    }
    db.execute(&script).unwrap();
    db.execute("CREATE INDEX idx_salary ON employees(salary)").unwrap();

    let sql = "SELECT * FROM employees WHERE salary > 5000.0 AND salary < 6000.0";
    let mut optimized = row_values(&rows(db.execute(sql).unwrap().pop().unwrap()));
    let mut plain = row_values(&rows(db.execute_unoptimized(sql).unwrap().pop().unwrap()));

    let key = |row: &Vec<Value>| match row[0] {
        Value::Int(v) => v,
        _ => unreachable!(),
    };
    optimized.sort_by_key(key);
    plain.sort_by_key(key);

    assert!(!optimized.is_empty());
    assert_eq!(optimized, plain);
}

#[test]
fn aggregation_with_grouping() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE emp (dept STRING, salary DOUBLE)").unwrap();
    db.execute(
        "INSERT INTO emp VALUES ('E',5000.0),('E',6000.0),('M',7000.0),('M',6500.0)",
    )
    .unwrap();

    let batch = query(
        &mut db,
        "SELECT dept, COUNT(*), AVG(salary) FROM emp GROUP BY dept ORDER BY dept",
    );
    assert_eq!(
        row_values(&batch),
        vec![
            vec![Value::Text("E".into()), Value::Int(2), Value::Double(5500.0)],
            vec![Value::Text("M".into()), Value::Int(2), Value::Double(6750.0)],
        ]
    );
}

#[test]
fn avg_counts_null_rows_in_its_denominator() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE emp (dept STRING, salary INT)").unwrap();
    db.execute("INSERT INTO emp VALUES ('E', 10), ('E', NULL), ('E', 20), ('M', NULL)")
        .unwrap();

    let batch = query(
        &mut db,
        "SELECT dept, SUM(salary), AVG(salary) FROM emp GROUP BY dept ORDER BY dept",
    );
    assert_eq!(
        row_values(&batch),
        vec![
            // 'E' sums its two numeric salaries but averages over all
            // three rows.
            vec![Value::Text("E".into()), Value::Int(30), Value::Double(10.0)],
            // A group with no numeric values sums to 0 and averages 0.
            vec![Value::Text("M".into()), Value::Int(0), Value::Double(0.0)],
        ]
    );
}

#[test]
fn left_join_emits_unmatched_left_rows_with_nulls() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE users (id INT PRIMARY KEY, name STRING)").unwrap();
    db.execute("CREATE TABLE orders (id INT PRIMARY KEY, user_id INT, amount DOUBLE)")
        .unwrap();
    db.execute("INSERT INTO users VALUES (1,'a'),(2,'b')").unwrap();
    db.execute("INSERT INTO orders VALUES (100,1,50.0)").unwrap();

    let batch = query(
        &mut db,
        "SELECT * FROM users LEFT JOIN orders ON users.id = orders.user_id",
    );
    assert_eq!(
        row_values(&batch),
        vec![
            vec![
                Value::Int(1),
                Value::Text("a".into()),
                Value::Int(100),
                Value::Int(1),
                Value::Double(50.0)
            ],
            vec![
                Value::Int(2),
                Value::Text("b".into()),
                Value::Null,
                Value::Null,
                Value::Null
            ],
        ]
    );
}

#[test]
fn update_survives_physical_relocation() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (id INT PRIMARY KEY, v INT)").unwrap();
    for i in 0..10 {
        db.execute(&format!("INSERT INTO t VALUES ({i}, {i})")).unwrap();
    }

    match db.execute("UPDATE t SET v = v + 100 WHERE id = 5").unwrap().pop() {
        Some(Output::Affected(1)) => {}
        other => panic!("unexpected update result: {other:?}"),
    }

    let batch = query(&mut db, "SELECT v FROM t WHERE id = 5");
    assert_eq!(row_values(&batch), vec![vec![Value::Int(105)]]);

    // Every other row is untouched.
    let batch = query(&mut db, "SELECT COUNT(*) FROM t");
    assert_eq!(row_values(&batch), vec![vec![Value::Int(10)]]);
}

#[test]
fn errors_leave_the_session_usable() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();

    assert!(db.execute("SELECT ghost FROM t").is_err());
    assert!(db.execute("SELECT * FROM missing").is_err());
    assert!(db.execute("INSERT INTO t VALUES ('not an int')").is_err());

    db.execute("INSERT INTO t VALUES (1)").unwrap();
    let batch = query(&mut db, "SELECT * FROM t");
    assert_eq!(batch.rows.len(), 1);
}

#[test]
fn persistence_round_trips_across_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut db = open_at(&dir);
        db.execute("CREATE TABLE t (id INT PRIMARY KEY, name STRING NOT NULL)")
            .unwrap();
        db.execute("CREATE INDEX idx_name ON t(name)").unwrap();
        db.execute("INSERT INTO t VALUES (1,'a'),(2,'b'),(3,'c')").unwrap();
        db.execute("DELETE FROM t WHERE id = 2").unwrap();
        db.persist().unwrap();
    }

    let mut db = open_at(&dir);
    let batch = query(&mut db, "SELECT id, name FROM t ORDER BY id");
    assert_eq!(
        row_values(&batch),
        vec![
            vec![Value::Int(1), Value::Text("a".into())],
            vec![Value::Int(3), Value::Text("c".into())],
        ]
    );

    // Indexes survived and still enforce uniqueness / serve lookups.
    assert!(db.execute("INSERT INTO t VALUES (1, 'dup')").is_err());
    let batch = query(&mut db, "SELECT name FROM t WHERE id = 3");
    assert_eq!(row_values(&batch), vec![vec![Value::Text("c".into())]]);

    let files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    for expected in ["database.db", "metadata.meta", "indexes.meta", "t.tbl", "idx_name.index"] {
        assert!(files.contains(&expected.to_string()), "missing {expected}");
    }
}

#[test]
fn order_by_two_keys_and_where_interaction() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (a INT, b INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1, 2), (1, 1), (2, 9), (0, 5)").unwrap();

    let batch = query(&mut db, "SELECT a, b FROM t WHERE a <= 1 ORDER BY a, b DESC");
    assert_eq!(
        row_values(&batch),
        vec![
            vec![Value::Int(0), Value::Int(5)],
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(1), Value::Int(1)],
        ]
    );
}

#[test]
fn drop_table_removes_everything() {
    let (mut db, _dir) = open();
    db.execute("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
    db.execute("INSERT INTO t VALUES (1)").unwrap();
    db.execute("DROP TABLE t").unwrap();

    assert!(db.execute("SELECT * FROM t").is_err());
    assert!(!db.catalog().has_table("t"));

    // IF EXISTS tolerates the absence.
    db.execute("DROP TABLE IF EXISTS t").unwrap();
}
