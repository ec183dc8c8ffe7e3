//! Shared helpers for the rowview integration tests.

#![allow(dead_code)]

use rowview::{ColumnSpec, DataType, Database, SharedGroup, TableRef};
use tracing_subscriber::EnvFilter;

pub const NAME: usize = 0;
pub const AGE: usize = 1;
pub const SCORE: usize = 2;

/// Install a test-writer subscriber honoring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn people_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("name", DataType::String),
        ColumnSpec::new("age", DataType::Int),
        ColumnSpec::new("score", DataType::Double),
    ]
}

/// Append `(name, age, score)` rows to `table`.
pub fn fill_people(table: &TableRef, rows: &[(&str, i64, f64)]) {
    let mut t = table.write();
    let first = t.add_empty_rows(rows.len()).unwrap();
    for (i, (name, age, score)) in rows.iter().enumerate() {
        t.set_string(NAME, first + i, name).unwrap();
        t.set_int(AGE, first + i, *age).unwrap();
        t.set_double(SCORE, first + i, *score).unwrap();
    }
}

/// Free-standing people table.
pub fn people(rows: &[(&str, i64, f64)]) -> TableRef {
    let table = TableRef::new("people", people_columns());
    fill_people(&table, rows);
    table
}

/// Database whose first commit creates a populated "people" table.
pub fn database_with_people(rows: &[(&str, i64, f64)]) -> Database {
    let db = Database::new();
    let sg = db.begin_read();
    sg.promote_to_write().unwrap();
    let table = sg.add_table("people", people_columns()).unwrap();
    fill_people(&table, rows);
    sg.commit_and_continue_as_read().unwrap();
    db
}

/// Run `f` inside a write transaction of `sg` and commit.
pub fn write<T>(sg: &SharedGroup, f: impl FnOnce(&SharedGroup) -> T) -> T {
    sg.promote_to_write().unwrap();
    let out = f(sg);
    sg.commit_and_continue_as_read().unwrap();
    out
}

pub fn sample() -> Vec<(&'static str, i64, f64)> {
    vec![
        ("ann", 31, 4.5),
        ("bob", 17, 3.0),
        ("cid", 45, 4.5),
        ("dee", 17, 1.5),
        ("eve", 120, 2.0),
    ]
}
