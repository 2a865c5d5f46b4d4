//! Named index registry that mirrors table mutations into B+ trees.
//!
//! Uniqueness is enforced here, before any tree is touched, so a
//! violation leaves every index unchanged. Deletions are best-effort:
//! the row is about to disappear either way, so a straggling index entry
//! is logged rather than turned into a failure.

use ahash::RandomState;
use btree::BPlusTree;
use catalog::IndexInfo;
use common::{DbResult, IndexError, RecordId, Row};
use hashbrown::HashMap;
use std::ops::Bound;
use types::Value;

type Map<K, V> = HashMap<K, V, RandomState>;

struct IndexState {
    info: IndexInfo,
    tree: BPlusTree,
}

pub struct IndexManager {
    order: usize,
    indexes: Map<String, IndexState>,
}

impl IndexManager {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            indexes: Map::default(),
        }
    }

    pub fn create(&mut self, info: IndexInfo) -> DbResult<()> {
        if self.indexes.contains_key(&info.name) {
            return Err(IndexError::IndexAlreadyExists(info.name).into());
        }
        let tree = BPlusTree::new(self.order);
        self.indexes.insert(info.name.clone(), IndexState { info, tree });
        Ok(())
    }

    pub fn drop(&mut self, name: &str) -> DbResult<IndexInfo> {
        self.indexes
            .remove(name)
            .map(|state| state.info)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()).into())
    }

    /// Drop every index owned by `table` (table drop takes its indexes
    /// with it). Returns the dropped names.
    pub fn drop_table_indexes(&mut self, table: &str) -> Vec<String> {
        let names: Vec<String> = self
            .indexes
            .values()
            .filter(|state| state.info.table == table)
            .map(|state| state.info.name.clone())
            .collect();
        for name in &names {
            self.indexes.remove(name);
        }
        names
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.get(name).map(|state| &state.info)
    }

    pub fn infos(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indexes.values().map(|state| &state.info)
    }

    pub fn infos_for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a IndexInfo> {
        self.infos().filter(move |info| info.table == table)
    }

    /// Mirror a fresh row into every index on `table`. Unique indexes are
    /// checked up front so a violation modifies nothing.
    pub fn insert_record(&mut self, table: &str, row: &Row, rid: RecordId) -> DbResult<()> {
        self.check_unique(table, row, None)?;

        for state in self.indexes.values_mut().filter(|s| s.info.table == table) {
            if let Some(key) = index_key(&state.info, row) {
                state.tree.insert(key, rid);
            }
        }
        Ok(())
    }

    /// Remove a row from every index on `table`. One missing entry does
    /// not block the others.
    pub fn delete_record(&mut self, table: &str, row: &Row, rid: RecordId) {
        for state in self.indexes.values_mut().filter(|s| s.info.table == table) {
            if let Some(key) = index_key(&state.info, row) {
                if !state.tree.remove(&key, rid) {
                    tracing::warn!(
                        index = %state.info.name,
                        rid = rid.0,
                        "index entry missing during delete"
                    );
                }
            }
        }
    }

    /// Re-key a row after an update. Indexes whose column value is
    /// unchanged are skipped; changed keys are unique-checked first so
    /// the mutation is all-or-nothing.
    pub fn update_record(
        &mut self,
        table: &str,
        old: &Row,
        new: &Row,
        rid: RecordId,
    ) -> DbResult<()> {
        self.check_unique(table, new, Some(rid))?;

        for state in self.indexes.values_mut().filter(|s| s.info.table == table) {
            let ordinal = state.info.column_ordinal;
            if old.values.get(ordinal) == new.values.get(ordinal) {
                continue;
            }
            if let Some(old_key) = index_key(&state.info, old) {
                if !state.tree.remove(&old_key, rid) {
                    tracing::warn!(
                        index = %state.info.name,
                        rid = rid.0,
                        "stale index entry missing during update"
                    );
                }
            }
            if let Some(new_key) = index_key(&state.info, new) {
                state.tree.insert(new_key, rid);
            }
        }
        Ok(())
    }

    pub fn search(&self, name: &str, key: &Value) -> DbResult<Vec<RecordId>> {
        let state = self
            .indexes
            .get(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        Ok(state.tree.search(key))
    }

    pub fn range(
        &self,
        name: &str,
        start: Bound<&Value>,
        end: Bound<&Value>,
    ) -> DbResult<Vec<RecordId>> {
        let state = self
            .indexes
            .get(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        Ok(state.tree.range(start, end))
    }

    /// Would inserting `row` violate a unique index on `table`? Exposed
    /// so the engine can refuse before the row is written anywhere.
    pub fn preflight_insert(&self, table: &str, row: &Row) -> DbResult<()> {
        self.check_unique(table, row, None)
    }

    /// Like `preflight_insert`, but tolerates the row's own existing
    /// entries (for updates).
    pub fn preflight_update(&self, table: &str, row: &Row, rid: RecordId) -> DbResult<()> {
        self.check_unique(table, row, Some(rid))
    }

    /// Fill a (fresh or cleared) index from existing table rows. For a
    /// unique index, a duplicate key aborts the population and leaves
    /// the tree empty.
    pub fn populate<'a>(
        &mut self,
        name: &str,
        rows: impl Iterator<Item = (RecordId, &'a Row)>,
    ) -> DbResult<()> {
        let state = self
            .indexes
            .get_mut(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        state.tree.clear();
        for (rid, row) in rows {
            if let Some(key) = index_key(&state.info, row) {
                if state.info.unique && !state.tree.search(&key).is_empty() {
                    state.tree.clear();
                    return Err(IndexError::UniqueViolation {
                        index: state.info.name.clone(),
                        key: key.to_string(),
                    }
                    .into());
                }
                state.tree.insert(key, rid);
            }
        }
        Ok(())
    }

    /// Replace one tree's contents with a saved entry list.
    pub fn load_entries(&mut self, name: &str, entries: Vec<(Value, RecordId)>) -> DbResult<()> {
        let state = self
            .indexes
            .get_mut(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        state.tree.clear();
        for (key, rid) in entries {
            state.tree.insert(key, rid);
        }
        Ok(())
    }

    /// Snapshot of one tree's entries, for persistence.
    pub fn entries(&self, name: &str) -> DbResult<Vec<(Value, RecordId)>> {
        let state = self
            .indexes
            .get(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        Ok(state.tree.entries())
    }

    /// Throw away and repopulate every index on `table`. The bulk-load
    /// path (`fast_insert`) requires this before the table serves index
    /// reads again.
    pub fn rebuild_table_indexes<'a>(
        &mut self,
        table: &str,
        rows: impl Iterator<Item = (RecordId, &'a Row)> + Clone,
    ) {
        for state in self.indexes.values_mut().filter(|s| s.info.table == table) {
            state.tree.clear();
            for (rid, row) in rows.clone() {
                if let Some(key) = index_key(&state.info, row) {
                    state.tree.insert(key, rid);
                }
            }
        }
    }

    fn check_unique(&self, table: &str, row: &Row, except: Option<RecordId>) -> DbResult<()> {
        for state in self
            .indexes
            .values()
            .filter(|s| s.info.table == table && s.info.unique)
        {
            let key = match index_key(&state.info, row) {
                Some(key) => key,
                None => continue,
            };
            let hits = state.tree.search(&key);
            let conflict = match except {
                Some(rid) => hits.iter().any(|hit| *hit != rid),
                None => !hits.is_empty(),
            };
            if conflict {
                return Err(IndexError::UniqueViolation {
                    index: state.info.name.clone(),
                    key: key.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// The indexed column's value, or `None` for NULL (NULLs are not
/// indexed).
fn index_key(info: &IndexInfo, row: &Row) -> Option<Value> {
    match row.values.get(info.column_ordinal) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::IndexKind;
    use common::DbError;

    fn info(name: &str, table: &str, ordinal: usize, unique: bool) -> IndexInfo {
        IndexInfo {
            name: name.into(),
            table: table.into(),
            column: format!("col{ordinal}"),
            column_ordinal: ordinal,
            kind: IndexKind::BTree,
            unique,
        }
    }

    fn row(values: Vec<Value>) -> Row {
        Row::new(values)
    }

    #[test]
    fn mirrors_inserts_into_every_table_index() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_a", "t", 0, false)).unwrap();
        mgr.create(info("idx_b", "t", 1, false)).unwrap();
        mgr.create(info("idx_other", "u", 0, false)).unwrap();

        let r = row(vec![Value::Int(1), Value::Text("x".into())]);
        mgr.insert_record("t", &r, RecordId(7)).unwrap();

        assert_eq!(mgr.search("idx_a", &Value::Int(1)).unwrap(), vec![RecordId(7)]);
        assert_eq!(
            mgr.search("idx_b", &Value::Text("x".into())).unwrap(),
            vec![RecordId(7)]
        );
        assert!(mgr.search("idx_other", &Value::Int(1)).unwrap().is_empty());
    }

    #[test]
    fn unique_violation_modifies_nothing() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_plain", "t", 1, false)).unwrap();
        mgr.create(info("pk_t_id", "t", 0, true)).unwrap();

        mgr.insert_record("t", &row(vec![Value::Int(1), Value::Int(10)]), RecordId(1))
            .unwrap();

        let err = mgr
            .insert_record("t", &row(vec![Value::Int(1), Value::Int(20)]), RecordId(2))
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Index(IndexError::UniqueViolation { .. })
        ));

        // The non-unique index saw nothing of the failed insert.
        assert!(mgr.search("idx_plain", &Value::Int(20)).unwrap().is_empty());
    }

    #[test]
    fn update_skips_unchanged_columns_and_rekeys_changed() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_v", "t", 1, false)).unwrap();

        let old = row(vec![Value::Int(1), Value::Int(10)]);
        let new = row(vec![Value::Int(1), Value::Int(99)]);
        mgr.insert_record("t", &old, RecordId(1)).unwrap();
        mgr.update_record("t", &old, &new, RecordId(1)).unwrap();

        assert!(mgr.search("idx_v", &Value::Int(10)).unwrap().is_empty());
        assert_eq!(mgr.search("idx_v", &Value::Int(99)).unwrap(), vec![RecordId(1)]);
    }

    #[test]
    fn update_to_own_key_is_not_a_violation() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("pk_t_id", "t", 0, true)).unwrap();

        let old = row(vec![Value::Int(5), Value::Int(1)]);
        let new = row(vec![Value::Int(5), Value::Int(2)]);
        mgr.insert_record("t", &old, RecordId(1)).unwrap();
        mgr.update_record("t", &old, &new, RecordId(1)).unwrap();

        assert_eq!(mgr.search("pk_t_id", &Value::Int(5)).unwrap(), vec![RecordId(1)]);
    }

    #[test]
    fn delete_is_best_effort() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_a", "t", 0, false)).unwrap();

        let r = row(vec![Value::Int(3)]);
        mgr.insert_record("t", &r, RecordId(1)).unwrap();
        mgr.delete_record("t", &r, RecordId(1));
        // Double delete logs but does not fail.
        mgr.delete_record("t", &r, RecordId(1));

        assert!(mgr.search("idx_a", &Value::Int(3)).unwrap().is_empty());
    }

    #[test]
    fn null_values_are_not_indexed() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_a", "t", 0, true)).unwrap();

        mgr.insert_record("t", &row(vec![Value::Null]), RecordId(1)).unwrap();
        mgr.insert_record("t", &row(vec![Value::Null]), RecordId(2)).unwrap();

        assert!(mgr.search("idx_a", &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn dropping_a_table_drops_its_indexes() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_a", "t", 0, false)).unwrap();
        mgr.create(info("idx_b", "t", 1, false)).unwrap();
        mgr.create(info("idx_u", "u", 0, false)).unwrap();

        let mut dropped = mgr.drop_table_indexes("t");
        dropped.sort();
        assert_eq!(dropped, vec!["idx_a".to_string(), "idx_b".to_string()]);
        assert!(mgr.has_index("idx_u"));
        assert!(mgr.search("idx_a", &Value::Int(1)).is_err());
    }

    #[test]
    fn rebuild_restores_bulk_loaded_rows() {
        let mut mgr = IndexManager::new(8);
        mgr.create(info("idx_a", "t", 0, false)).unwrap();

        let rows: Vec<(RecordId, Row)> = (0..20)
            .map(|i| (RecordId(i), row(vec![Value::Int(i as i64)])))
            .collect();
        mgr.rebuild_table_indexes("t", rows.iter().map(|(rid, r)| (*rid, r)));

        for (rid, r) in &rows {
            assert_eq!(mgr.search("idx_a", &r.values[0]).unwrap(), vec![*rid]);
        }
    }
}
