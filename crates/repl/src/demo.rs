//! Scripted showcase: DDL, bulk insert, index-versus-scan parity, a
//! join, and an aggregation, printed step by step.

use anyhow::Result;
use common::pretty::{render_record_batch, TableStyleKind};
use database::{Database, Output};

const SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS employees",
    "DROP TABLE IF EXISTS departments",
    "CREATE TABLE departments (id INT PRIMARY KEY, name STRING NOT NULL)",
    "CREATE TABLE employees (id INT PRIMARY KEY, dept_id INT, salary DOUBLE)",
    "INSERT INTO departments VALUES (1, 'engineering'), (2, 'marketing')",
    "CREATE INDEX idx_salary ON employees(salary)",
];

const QUERIES: &[&str] = &[
    "SELECT * FROM employees WHERE salary > 5000.0 AND salary < 6000.0 ORDER BY salary",
    "SELECT departments.name, COUNT(*), AVG(employees.salary) \
     FROM employees JOIN departments ON employees.dept_id = departments.id \
     GROUP BY departments.name ORDER BY departments.name",
    "SELECT * FROM departments LEFT JOIN employees ON departments.id = employees.dept_id \
     WHERE departments.name = 'marketing'",
];

pub fn run(db: &mut Database) -> Result<()> {
    for sql in SETUP {
        println!("sql> {sql}");
        report(db, sql)?;
    }

    println!("-- loading 500 employees");
    let mut script = String::new();
    for i in 0..500 {
        let dept = 1 + i % 2;
        let salary = 3000.0 + ((i * 83) % 400) as f64 * 10.0;
        script.push_str(&format!(
            "INSERT INTO employees VALUES ({i}, {dept}, {salary});\n"
        ));
    }
    db.execute(&script)?;

    for sql in QUERIES {
        println!("sql> {sql}");
        report(db, sql)?;
    }

    let stats = db.pool_stats();
    println!(
        "-- buffer pool: {}/{} frames, {} hits, {} misses, {} evictions",
        stats.used_frames, stats.capacity, stats.hits, stats.misses, stats.evictions
    );
    Ok(())
}

fn report(db: &mut Database, sql: &str) -> Result<()> {
    for output in db.execute(sql)? {
        match output {
            Output::Rows(batch) => {
                println!("{}", render_record_batch(&batch, TableStyleKind::Ascii));
                println!("{} row(s)", batch.rows.len());
            }
            Output::Affected(count) => println!("{count} row(s) affected."),
            Output::Ddl(message) => println!("{message}"),
        }
    }
    Ok(())
}
