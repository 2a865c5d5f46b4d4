use crate::{persist, PageManager, Table};
use buffer::BufferPoolStats;
use catalog::{Catalog, ColumnInfo, IndexInfo, IndexKind, TableMeta};
use common::{
    Config, DbResult, IndexError, RecordId, Row, SemanticError, StorageError,
};
use hashbrown::HashMap;
use index::IndexManager;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use types::Value;

const HEAP_FILE: &str = "database.db";
const METADATA_FILE: &str = "metadata.meta";
const INDEXES_FILE: &str = "indexes.meta";

/// Top-level storage facade: owns the page manager, every heap table,
/// and the index manager, and keeps a read-only catalog projection in
/// sync after each DDL. All schema truth lives here; the catalog is a
/// view, never an authority.
pub struct StorageEngine {
    config: Config,
    dir: PathBuf,
    pager: PageManager,
    tables: BTreeMap<String, Table>,
    indexes: IndexManager,
    catalog: Catalog,
}

impl StorageEngine {
    /// Open (or create) the database directory and replay any persisted
    /// metadata and table snapshots.
    pub fn open(config: Config) -> DbResult<Self> {
        let dir = config.data_dir.clone();
        fs::create_dir_all(&dir)?;
        let pager = PageManager::open(&dir.join(HEAP_FILE), config.buffer_pool_frames)?;

        let mut engine = Self {
            pager,
            dir,
            tables: BTreeMap::new(),
            indexes: IndexManager::new(config.btree_order),
            catalog: Catalog::default(),
            config,
        };
        engine.load()?;
        engine.refresh_catalog();
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pager.stats()
    }

    pub fn table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()).into())
    }


    // ---- DDL ----

    /// Create a table. A PRIMARY KEY column gets an automatic unique
    /// index named `pk_<table>_<column>`.
    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnInfo>) -> DbResult<()> {
        if self.tables.contains_key(name) {
            return Err(SemanticError::TableAlreadyExists(name.to_string()).into());
        }

        let pk = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.primary_key)
            .map(|(ordinal, c)| (ordinal, c.name.clone()));

        self.tables
            .insert(name.to_string(), Table::new(name, columns));

        if let Some((ordinal, column)) = pk {
            self.indexes.create(IndexInfo {
                name: format!("pk_{name}_{column}"),
                table: name.to_string(),
                column,
                column_ordinal: ordinal,
                kind: IndexKind::BTree,
                unique: true,
            })?;
        }

        self.refresh_catalog();
        Ok(())
    }

    /// Drop a table, its pages, its indexes, and their snapshot files.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let table = self
            .tables
            .remove(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))?;

        for pid in table.pages() {
            self.pager.deallocate(*pid)?;
        }
        for index in self.indexes.drop_table_indexes(name) {
            remove_file_if_present(&self.index_path(&index));
        }
        remove_file_if_present(&self.table_path(name));

        self.refresh_catalog();
        Ok(())
    }

    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        column: &str,
        unique: bool,
    ) -> DbResult<()> {
        let (ordinal, rows) = {
            let t = self.table(table)?;
            let ordinal = t
                .columns()
                .iter()
                .position(|c| c.name == column)
                .ok_or_else(|| SemanticError::ColumnNotExists(column.to_string()))?;
            (ordinal, t.scan(&self.pager)?)
        };

        self.indexes.create(IndexInfo {
            name: name.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            column_ordinal: ordinal,
            kind: IndexKind::BTree,
            unique,
        })?;

        if let Err(err) = self
            .indexes
            .populate(name, rows.iter().map(|(rid, row)| (*rid, row)))
        {
            // Existing data violates the new constraint; undo the create.
            let _ = self.indexes.drop(name);
            self.refresh_catalog();
            return Err(err);
        }

        self.refresh_catalog();
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> DbResult<()> {
        self.indexes.drop(name)?;
        remove_file_if_present(&self.index_path(name));
        self.refresh_catalog();
        Ok(())
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.has_index(name)
    }

    // ---- row operations ----

    /// Validate, preflight constraints, then write the row and mirror it
    /// into the table's indexes. A constraint failure happens before any
    /// byte is written, so the store is unchanged on error.
    pub fn insert_row(&mut self, table: &str, row: &Row) -> DbResult<RecordId> {
        let validated = self.table(table)?.validate_row(row)?;

        self.check_primary_key(table, &validated, None)?;
        self.indexes.preflight_insert(table, &validated)?;

        let t = lookup_mut(&mut self.tables, table)?;
        let rid = t.insert_validated(&mut self.pager, &validated)?;
        self.indexes.insert_record(table, &validated, rid)?;
        Ok(rid)
    }

    /// Update a row in place (the record id never changes).
    pub fn update_row(&mut self, table: &str, rid: RecordId, row: &Row) -> DbResult<()> {
        let validated = self.table(table)?.validate_row(row)?;
        let old = self.table(table)?.get(&self.pager, rid)?;

        self.check_primary_key(table, &validated, Some(rid))?;
        self.indexes.preflight_update(table, &validated, rid)?;

        let t = lookup_mut(&mut self.tables, table)?;
        t.update(&mut self.pager, rid, &validated)?;
        self.indexes.update_record(table, &old, &validated, rid)
    }

    pub fn delete_row(&mut self, table: &str, rid: RecordId) -> DbResult<()> {
        let t = lookup_mut(&mut self.tables, table)?;
        let old = t.delete(&mut self.pager, rid)?;
        self.indexes.delete_record(table, &old, rid);
        Ok(())
    }

    pub fn get_row(&self, table: &str, rid: RecordId) -> DbResult<Row> {
        self.table(table)?.get(&self.pager, rid)
    }

    pub fn scan(&self, table: &str) -> DbResult<Vec<(RecordId, Row)>> {
        self.table(table)?.scan(&self.pager)
    }

    pub fn record_ids(&self, table: &str) -> DbResult<Vec<RecordId>> {
        Ok(self.table(table)?.all_record_ids())
    }

    /// Bulk-load insert: skips constraint checks and index mirroring.
    /// Callers must run `rebuild_indexes` before serving index reads.
    pub fn fast_insert_row(&mut self, table: &str, row: &Row) -> DbResult<RecordId> {
        let t = lookup_mut(&mut self.tables, table)?;
        t.fast_insert(&mut self.pager, row)
    }

    pub fn rebuild_indexes(&mut self, table: &str) -> DbResult<()> {
        let rows = self.table(table)?.scan(&self.pager)?;
        self.indexes
            .rebuild_table_indexes(table, rows.iter().map(|(rid, row)| (*rid, row)));
        Ok(())
    }

    // ---- lookups ----

    pub fn index_search(&self, index: &str, key: &Value) -> DbResult<Vec<RecordId>> {
        self.indexes.search(index, key)
    }

    pub fn index_range(
        &self,
        index: &str,
        start: Bound<&Value>,
        end: Bound<&Value>,
    ) -> DbResult<Vec<RecordId>> {
        self.indexes.range(index, start, end)
    }

    /// Scan-based lookup used as the ground truth for index parity
    /// checks (and as the fallback when a column has no index).
    pub fn search_by_column(&self, table: &str, column: &str, key: &Value) -> DbResult<Vec<RecordId>> {
        let t = self.table(table)?;
        let ordinal = t
            .columns()
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| SemanticError::ColumnNotExists(column.to_string()))?;

        let mut out = Vec::new();
        for (rid, row) in t.scan(&self.pager)? {
            if row.values[ordinal].eq_same_type(key) == Some(true) {
                out.push(rid);
            }
        }
        Ok(out)
    }

    /// Enforce primary-key uniqueness through the pk index when present,
    /// else by scanning.
    fn check_primary_key(
        &self,
        table: &str,
        row: &Row,
        except: Option<RecordId>,
    ) -> DbResult<()> {
        let t = self.table(table)?;
        let (ordinal, column) = match t.primary_key() {
            Some((ordinal, c)) => (ordinal, c.name.clone()),
            None => return Ok(()),
        };
        let key = &row.values[ordinal];
        if matches!(key, Value::Null) {
            return Err(SemanticError::InvalidValue(format!(
                "primary key column '{column}' cannot be NULL"
            ))
            .into());
        }

        let pk_index = format!("pk_{table}_{column}");
        let hits = if self.indexes.has_index(&pk_index) {
            self.indexes.search(&pk_index, key)?
        } else {
            self.search_by_column(table, &column, key)?
        };

        let conflict = match except {
            Some(rid) => hits.iter().any(|hit| *hit != rid),
            None => !hits.is_empty(),
        };
        if conflict {
            return Err(IndexError::UniqueViolation {
                index: pk_index,
                key: key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ---- persistence ----

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.tbl"))
    }

    fn index_path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{index}.index"))
    }

    /// Flush pages and write the metadata, table, and index snapshots.
    ///
    /// Record ids are renumbered densely inside the snapshots (a reload
    /// assigns ids in row order), so index entries are remapped to the
    /// ids the next load will hand out.
    pub fn save(&mut self) -> DbResult<()> {
        self.pager.flush_all()?;

        let schemas: Vec<(String, Vec<ColumnInfo>)> = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.columns().to_vec()))
            .collect();
        persist::write_metadata(&self.dir.join(METADATA_FILE), &schemas)?;

        let mut rid_remap: HashMap<String, HashMap<u32, u32>> = HashMap::new();
        for (name, table) in &self.tables {
            let rows = table.scan(&self.pager)?;
            let remap: HashMap<u32, u32> = rows
                .iter()
                .enumerate()
                .map(|(pos, (rid, _))| (rid.0, pos as u32 + 1))
                .collect();
            rid_remap.insert(name.clone(), remap);

            let plain: Vec<Row> = rows.into_iter().map(|(_, row)| row).collect();
            persist::write_table_snapshot(
                &self.table_path(name),
                name,
                table.columns(),
                &plain,
            )?;
        }

        let mut infos: Vec<IndexInfo> = self.indexes.infos().cloned().collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        persist::write_indexes_meta(&self.dir.join(INDEXES_FILE), &infos)?;

        for info in &infos {
            let entries = self.indexes.entries(&info.name)?;
            let remap = rid_remap.get(&info.table);
            let remapped: Vec<(Value, RecordId)> = entries
                .into_iter()
                .filter_map(|(key, rid)| {
                    remap
                        .and_then(|m| m.get(&rid.0))
                        .map(|new| (key, RecordId(*new)))
                })
                .collect();
            persist::write_index_snapshot(&self.index_path(&info.name), &remapped)?;
        }
        Ok(())
    }

    fn load(&mut self) -> DbResult<()> {
        let metadata_path = self.dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Ok(());
        }

        for (name, columns) in persist::read_metadata(&metadata_path)? {
            let mut table = Table::new(&name, columns);
            let snapshot = self.table_path(&name);
            if snapshot.exists() {
                let (_, _, rows) = persist::read_table_snapshot(&snapshot)?;
                for row in &rows {
                    table.fast_insert(&mut self.pager, row)?;
                }
            }
            self.tables.insert(name, table);
        }

        let indexes_path = self.dir.join(INDEXES_FILE);
        if !indexes_path.exists() {
            return Ok(());
        }
        for mut info in persist::read_indexes_meta(&indexes_path)? {
            let table = match self.tables.get(&info.table) {
                Some(table) => table,
                None => {
                    tracing::warn!(index = %info.name, table = %info.table, "index references a missing table; skipped");
                    continue;
                }
            };
            info.column_ordinal = table
                .columns()
                .iter()
                .position(|c| c.name == info.column)
                .ok_or_else(|| {
                    StorageError::InvalidMetadata(format!(
                        "index '{}' references unknown column '{}'",
                        info.name, info.column
                    ))
                })?;

            let name = info.name.clone();
            let table_name = info.table.clone();
            self.indexes.create(info)?;
            self.restore_index(&name, &table_name)?;
        }
        Ok(())
    }

    /// Load an index snapshot if it is consistent with the replayed
    /// rows; rebuild from the heap otherwise.
    fn restore_index(&mut self, index: &str, table: &str) -> DbResult<()> {
        let path = self.index_path(index);
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        if path.exists() {
            match persist::read_index_snapshot(&path) {
                Ok(entries)
                    if entries
                        .iter()
                        .all(|(_, rid)| t.location(*rid).is_some()) =>
                {
                    return self.indexes.load_entries(index, entries);
                }
                Ok(_) => {
                    tracing::warn!(index, "stale index snapshot; rebuilding from heap");
                }
                Err(err) => {
                    tracing::warn!(index, %err, "unreadable index snapshot; rebuilding from heap");
                }
            }
        }

        let rows = t.scan(&self.pager)?;
        self.indexes
            .populate(index, rows.iter().map(|(rid, row)| (*rid, row)))
    }

    fn refresh_catalog(&mut self) {
        let tables = self
            .tables
            .values()
            .map(|table| {
                let indexes = self
                    .indexes
                    .infos_for_table(table.name())
                    .cloned()
                    .collect();
                TableMeta::new(table.name(), table.columns().to_vec(), indexes)
            })
            .collect();
        self.catalog = Catalog::new(tables);
    }
}

fn lookup_mut<'a>(tables: &'a mut BTreeMap<String, Table>, name: &str) -> DbResult<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StorageError::TableNotFound(name.to_string()).into())
}

fn remove_file_if_present(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), %err, "failed to remove file");
        }
    }
}
