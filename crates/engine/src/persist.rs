//! Text metadata and snapshot formats inside the database directory:
//!
//! - `metadata.meta`: table count, then per table a name line, a column
//!   count line, and one `name|type|notnull|pk` line per column.
//! - `<table>.tbl`: the same header for one table, a row count, then one
//!   hex-encoded serialized row per line.
//! - `indexes.meta`: count, then `name|table|column|kind|unique` lines.
//! - `<index>.index`: bincode of the tree's `(key, rid)` entries.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use catalog::{ColumnInfo, IndexInfo, IndexKind};
use common::{DbResult, RecordId, Row, StorageError};
use std::fs;
use std::path::Path;
use types::{SqlType, Value};

fn bincode_config() -> impl Config {
    config::legacy()
}

fn bad(msg: impl Into<String>) -> common::DbError {
    StorageError::InvalidMetadata(msg.into()).into()
}

// ---- column lines ----

fn column_line(column: &ColumnInfo) -> String {
    format!(
        "{}|{}|{}|{}",
        column.name,
        column.ty.name(),
        column.not_null as u8,
        column.primary_key as u8
    )
}

fn parse_column_line(line: &str) -> DbResult<ColumnInfo> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 4 {
        return Err(bad(format!("malformed column line '{line}'")));
    }
    let ty = SqlType::parse(parts[1]).ok_or_else(|| bad(format!("unknown type '{}'", parts[1])))?;
    Ok(ColumnInfo {
        name: parts[0].to_string(),
        ty,
        not_null: parts[2] == "1",
        primary_key: parts[3] == "1",
    })
}

fn parse_count(line: Option<&str>, what: &str) -> DbResult<usize> {
    line.ok_or_else(|| bad(format!("missing {what} count")))?
        .trim()
        .parse::<usize>()
        .map_err(|_| bad(format!("invalid {what} count")))
}

// ---- metadata.meta ----

pub fn write_metadata(path: &Path, tables: &[(String, Vec<ColumnInfo>)]) -> DbResult<()> {
    let mut out = String::new();
    out.push_str(&format!("{}\n", tables.len()));
    for (name, columns) in tables {
        out.push_str(&format!("{name}\n{}\n", columns.len()));
        for column in columns {
            out.push_str(&column_line(column));
            out.push('\n');
        }
    }
    fs::write(path, out)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> DbResult<Vec<(String, Vec<ColumnInfo>)>> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();
    let table_count = parse_count(lines.next(), "table")?;

    let mut tables = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        let name = lines
            .next()
            .ok_or_else(|| bad("missing table name"))?
            .trim()
            .to_string();
        let column_count = parse_count(lines.next(), "column")?;
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let line = lines.next().ok_or_else(|| bad("missing column line"))?;
            columns.push(parse_column_line(line)?);
        }
        tables.push((name, columns));
    }
    Ok(tables)
}

// ---- <table>.tbl ----

pub fn write_table_snapshot(
    path: &Path,
    name: &str,
    columns: &[ColumnInfo],
    rows: &[Row],
) -> DbResult<()> {
    let mut out = String::new();
    out.push_str(&format!("{name}\n{}\n", columns.len()));
    for column in columns {
        out.push_str(&column_line(column));
        out.push('\n');
    }
    out.push_str(&format!("{}\n", rows.len()));
    for row in rows {
        out.push_str(&hex::encode(row.serialize()));
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

pub fn read_table_snapshot(path: &Path) -> DbResult<(String, Vec<ColumnInfo>, Vec<Row>)> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();

    let name = lines
        .next()
        .ok_or_else(|| bad("missing table name"))?
        .trim()
        .to_string();
    let column_count = parse_count(lines.next(), "column")?;
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let line = lines.next().ok_or_else(|| bad("missing column line"))?;
        columns.push(parse_column_line(line)?);
    }

    let row_count = parse_count(lines.next(), "row")?;
    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let line = lines.next().ok_or_else(|| bad("missing row line"))?;
        let bytes = hex::decode(line.trim()).map_err(|e| bad(format!("bad row hex: {e}")))?;
        rows.push(Row::deserialize(&bytes)?);
    }
    Ok((name, columns, rows))
}

// ---- indexes.meta ----

pub fn write_indexes_meta(path: &Path, infos: &[IndexInfo]) -> DbResult<()> {
    let mut out = String::new();
    out.push_str(&format!("{}\n", infos.len()));
    for info in infos {
        out.push_str(&format!(
            "{}|{}|{}|{}|{}\n",
            info.name,
            info.table,
            info.column,
            info.kind.name(),
            info.unique as u8
        ));
    }
    fs::write(path, out)?;
    Ok(())
}

/// Reads the index catalog. Column ordinals are not stored in the file;
/// the caller resolves them against the loaded table schemas.
pub fn read_indexes_meta(path: &Path) -> DbResult<Vec<IndexInfo>> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();
    let count = parse_count(lines.next(), "index")?;

    let mut infos = Vec::with_capacity(count);
    for _ in 0..count {
        let line = lines.next().ok_or_else(|| bad("missing index line"))?;
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 5 {
            return Err(bad(format!("malformed index line '{line}'")));
        }
        if parts[3] != IndexKind::BTree.name() {
            return Err(bad(format!("unknown index kind '{}'", parts[3])));
        }
        infos.push(IndexInfo {
            name: parts[0].to_string(),
            table: parts[1].to_string(),
            column: parts[2].to_string(),
            column_ordinal: 0,
            kind: IndexKind::BTree,
            unique: parts[4] == "1",
        });
    }
    Ok(infos)
}

// ---- <index>.index ----

pub fn write_index_snapshot(path: &Path, entries: &[(Value, RecordId)]) -> DbResult<()> {
    let raw: Vec<(Value, u32)> = entries.iter().map(|(k, r)| (k.clone(), r.0)).collect();
    let bytes = encode_to_vec(&raw, bincode_config())
        .map_err(|e| bad(format!("encode index snapshot: {e}")))?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_index_snapshot(path: &Path) -> DbResult<Vec<(Value, RecordId)>> {
    let bytes = fs::read(path)?;
    let (raw, _): (Vec<(Value, u32)>, usize) = decode_from_slice(&bytes, bincode_config())
        .map_err(|e| bad(format!("decode index snapshot: {e}")))?;
    Ok(raw.into_iter().map(|(k, r)| (k, RecordId(r))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", SqlType::Int).primary_key(),
            ColumnInfo::new("name", SqlType::Text),
            ColumnInfo::new("score", SqlType::Double),
        ]
    }

    #[test]
    fn metadata_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.meta");

        let tables = vec![
            ("users".to_string(), columns()),
            ("orders".to_string(), vec![ColumnInfo::new("id", SqlType::Int)]),
        ];
        write_metadata(&path, &tables).unwrap();

        let loaded = read_metadata(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, "users");
        assert_eq!(loaded[0].1, columns());
        assert_eq!(loaded[1].1.len(), 1);
    }

    #[test]
    fn table_snapshot_round_trips_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.tbl");

        let rows = vec![
            Row::new(vec![Value::Int(1), Value::Text("a".into()), Value::Double(0.5)]),
            Row::new(vec![Value::Int(2), Value::Text(String::new()), Value::Null]),
        ];
        write_table_snapshot(&path, "users", &columns(), &rows).unwrap();

        let (name, cols, loaded) = read_table_snapshot(&path).unwrap();
        assert_eq!(name, "users");
        assert_eq!(cols, columns());
        assert_eq!(loaded, rows);
    }

    #[test]
    fn indexes_meta_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("indexes.meta");

        let infos = vec![IndexInfo {
            name: "pk_users_id".into(),
            table: "users".into(),
            column: "id".into(),
            column_ordinal: 0,
            kind: IndexKind::BTree,
            unique: true,
        }];
        write_indexes_meta(&path, &infos).unwrap();

        let loaded = read_indexes_meta(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "pk_users_id");
        assert!(loaded[0].unique);
    }

    #[test]
    fn index_snapshot_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pk_users_id.index");

        let entries = vec![
            (Value::Int(1), RecordId(1)),
            (Value::Double(2.5), RecordId(2)),
            (Value::Text("k".into()), RecordId(3)),
        ];
        write_index_snapshot(&path, &entries).unwrap();

        assert_eq!(read_index_snapshot(&path).unwrap(), entries);
    }

    #[test]
    fn malformed_metadata_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.meta");
        fs::write(&path, "1\nusers\nnot-a-number\n").unwrap();

        assert!(matches!(
            read_metadata(&path).unwrap_err(),
            common::DbError::Storage(StorageError::InvalidMetadata(_))
        ));
    }
}
