//! Read-only schema view consumed by semantic analysis and planning.
//!
//! The storage engine is the single source of truth for schema state; it
//! projects a fresh `Catalog` after every DDL statement. Nothing here
//! mutates storage, which is what keeps the view from drifting.

use ahash::RandomState;
use common::{DbResult, SemanticError};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Describes one column of a table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: SqlType,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            not_null: false,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }
}

/// Supported index implementations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::BTree => "BTREE",
        }
    }
}

/// Metadata describing one index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub column: String,
    pub column_ordinal: usize,
    pub kind: IndexKind,
    pub unique: bool,
}

/// Metadata describing one table, with its indexes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    #[serde(skip)]
    #[serde(default)]
    column_lookup: Map<String, usize>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>, indexes: Vec<IndexInfo>) -> Self {
        let mut meta = Self {
            name: name.into(),
            columns,
            indexes,
            column_lookup: Map::default(),
        };
        meta.rebuild_lookup();
        meta
    }

    fn rebuild_lookup(&mut self) {
        self.column_lookup.clear();
        for (idx, column) in self.columns.iter().enumerate() {
            self.column_lookup.insert(column.name.clone(), idx);
        }
    }

    /// Ordinal of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_lookup.get(name).copied()
    }

    pub fn column(&self, name: &str) -> DbResult<&ColumnInfo> {
        self.column_index(name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| SemanticError::ColumnNotExists(name.to_string()).into())
    }

    /// The primary-key column, if the table declares one.
    pub fn primary_key(&self) -> Option<(usize, &ColumnInfo)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, col)| col.primary_key)
    }

    /// The index covering `column`, if any.
    pub fn index_on(&self, column: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|idx| idx.column == column)
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}

/// Immutable snapshot of every table the engine knows about.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    #[serde(skip)]
    #[serde(default)]
    table_lookup: Map<String, usize>,
}

impl Catalog {
    pub fn new(mut tables: Vec<TableMeta>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        let mut catalog = Self {
            tables,
            table_lookup: Map::default(),
        };
        catalog.rebuild_lookup();
        catalog
    }

    fn rebuild_lookup(&mut self) {
        self.table_lookup.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            table.rebuild_lookup();
            self.table_lookup.insert(table.name.clone(), idx);
        }
    }

    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        self.table_lookup
            .get(name)
            .map(|idx| &self.tables[*idx])
            .ok_or_else(|| SemanticError::TableNotExists(name.to_string()).into())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table_lookup.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    /// Find an index by name across all tables.
    pub fn index(&self, name: &str) -> Option<(&TableMeta, &IndexInfo)> {
        self.tables
            .iter()
            .find_map(|table| table.index(name).map(|idx| (table, idx)))
    }
}
