use crate::PageManager;
use catalog::ColumnInfo;
use common::{
    DbResult, PageId, RecordId, RecordLocation, Row, SemanticError, SlotId, StorageError,
};
use std::collections::BTreeMap;
use storage::PageKind;
use types::Value;

/// A heap table: column layout, the pages holding its rows, and the map
/// from stable record ids to physical slots.
///
/// Record ids never change once allocated. An update rewrites in place
/// when the new payload fits its page; otherwise the record moves to
/// another page and only the location map is repointed, so indexes keyed
/// by record id stay valid.
pub struct Table {
    name: String,
    columns: Vec<ColumnInfo>,
    pages: Vec<PageId>,
    locations: BTreeMap<RecordId, RecordLocation>,
    next_record_id: u32,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            pages: Vec::new(),
            locations: BTreeMap::new(),
            next_record_id: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn primary_key(&self) -> Option<(usize, &ColumnInfo)> {
        self.columns.iter().enumerate().find(|(_, c)| c.primary_key)
    }

    pub fn row_count(&self) -> usize {
        self.locations.len()
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Live record ids in allocation order.
    pub fn all_record_ids(&self) -> Vec<RecordId> {
        self.locations.keys().copied().collect()
    }

    pub fn location(&self, rid: RecordId) -> Option<RecordLocation> {
        self.locations.get(&rid).copied()
    }

    /// Arity, nullability, and type checks; widens Int literals into
    /// Double columns. Returns the row as it will be stored.
    pub fn validate_row(&self, row: &Row) -> DbResult<Row> {
        if row.arity() != self.columns.len() {
            return Err(SemanticError::ColumnCountMismatch {
                expected: self.columns.len(),
                actual: row.arity(),
            }
            .into());
        }

        let mut stored = Vec::with_capacity(row.arity());
        for (column, value) in self.columns.iter().zip(&row.values) {
            let coerced = match (column.ty, value) {
                (_, Value::Null) => {
                    if column.not_null {
                        return Err(SemanticError::InvalidValue(format!(
                            "column '{}' is NOT NULL",
                            column.name
                        ))
                        .into());
                    }
                    Value::Null
                }
                (types::SqlType::Int, Value::Int(v)) => Value::Int(*v),
                (types::SqlType::Double, Value::Double(v)) => Value::Double(*v),
                (types::SqlType::Double, Value::Int(v)) => Value::Double(*v as f64),
                (types::SqlType::Text, Value::Text(s)) => {
                    if column.not_null && s.is_empty() {
                        return Err(SemanticError::InvalidValue(format!(
                            "column '{}' is NOT NULL and rejects the empty string",
                            column.name
                        ))
                        .into());
                    }
                    Value::Text(s.clone())
                }
                (expected, actual) => {
                    return Err(SemanticError::TypeMismatch(format!(
                        "column '{}' is {expected}, got {actual}",
                        column.name
                    ))
                    .into());
                }
            };
            stored.push(coerced);
        }
        Ok(Row::new(stored))
    }

    /// Insert a validated row, allocating a page when none of the
    /// existing ones fits.
    pub fn insert(&mut self, pager: &mut PageManager, row: &Row) -> DbResult<RecordId> {
        let validated = self.validate_row(row)?;
        self.insert_unchecked(pager, &validated)
    }

    /// Bulk-load path: no validation. The caller owns rebuilding the
    /// table's indexes before serving index reads.
    pub fn fast_insert(&mut self, pager: &mut PageManager, row: &Row) -> DbResult<RecordId> {
        self.insert_unchecked(pager, row)
    }

    /// Insert a row the caller has already passed through
    /// `validate_row`.
    pub fn insert_validated(&mut self, pager: &mut PageManager, row: &Row) -> DbResult<RecordId> {
        self.insert_unchecked(pager, row)
    }

    fn insert_unchecked(&mut self, pager: &mut PageManager, row: &Row) -> DbResult<RecordId> {
        let bytes = row.serialize();
        let (page_id, slot) = self.place_record(pager, &bytes)?;

        let rid = RecordId(self.next_record_id);
        self.next_record_id += 1;
        self.locations.insert(rid, RecordLocation { page_id, slot });
        Ok(rid)
    }

    /// First page whose free space admits the payload, else a new page.
    fn place_record(
        &mut self,
        pager: &mut PageManager,
        bytes: &[u8],
    ) -> DbResult<(PageId, SlotId)> {
        for pid in &self.pages {
            let page = pager.read(*pid)?;
            if page.can_fit(bytes.len()) {
                let mut page = page.as_ref().clone();
                let slot = page.insert_record(bytes)?;
                pager.write(page)?;
                return Ok((*pid, slot));
            }
        }

        let pid = pager.allocate(PageKind::Data)?;
        let mut page = pager.read(pid)?.as_ref().clone();
        let slot = page.insert_record(bytes).map_err(|_| {
            StorageError::PageAllocationFailed(format!(
                "row of {} bytes exceeds page capacity",
                bytes.len()
            ))
        })?;
        pager.write(page)?;
        self.pages.push(pid);
        Ok((pid, slot))
    }

    pub fn get(&self, pager: &PageManager, rid: RecordId) -> DbResult<Row> {
        let loc = self
            .locations
            .get(&rid)
            .ok_or(StorageError::RecordNotFound(rid.0))?;
        let page = pager.read(loc.page_id)?;
        let bytes = page.get_record(loc.slot)?;
        Row::deserialize(&bytes)
    }

    /// Rewrite a record under its existing id. In-place when the new
    /// payload fits the page; otherwise the record relocates and the
    /// location map is repointed.
    pub fn update(&mut self, pager: &mut PageManager, rid: RecordId, row: &Row) -> DbResult<()> {
        let validated = self.validate_row(row)?;
        let loc = *self
            .locations
            .get(&rid)
            .ok_or(StorageError::RecordNotFound(rid.0))?;
        let bytes = validated.serialize();

        let mut page = pager.read(loc.page_id)?.as_ref().clone();
        match page.update_record(loc.slot, &bytes) {
            Ok(()) => {
                pager.write(page)?;
                Ok(())
            }
            Err(common::DbError::Storage(StorageError::PageFull(_))) => {
                // Place the new copy first so the row is never lost.
                let (new_page, new_slot) = self.place_record(pager, &bytes)?;
                let mut old_page = pager.read(loc.page_id)?.as_ref().clone();
                old_page.delete_record(loc.slot)?;
                let emptied = old_page.record_count() == 0;
                pager.write(old_page)?;
                if emptied {
                    self.release_page(pager, loc.page_id)?;
                }
                self.locations.insert(
                    rid,
                    RecordLocation {
                        page_id: new_page,
                        slot: new_slot,
                    },
                );
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Delete a record, returning the row it held (the caller mirrors the
    /// removal into indexes). Empties pages back to the allocator.
    pub fn delete(&mut self, pager: &mut PageManager, rid: RecordId) -> DbResult<Row> {
        let loc = *self
            .locations
            .get(&rid)
            .ok_or(StorageError::RecordNotFound(rid.0))?;
        let row = self.get(pager, rid)?;

        let mut page = pager.read(loc.page_id)?.as_ref().clone();
        page.delete_record(loc.slot)?;
        let emptied = page.record_count() == 0;
        pager.write(page)?;
        if emptied {
            self.release_page(pager, loc.page_id)?;
        }

        self.locations.remove(&rid);
        Ok(row)
    }

    fn release_page(&mut self, pager: &mut PageManager, pid: PageId) -> DbResult<()> {
        self.pages.retain(|p| *p != pid);
        pager.deallocate(pid)
    }

    /// Every live `(rid, row)` pair in record-id order.
    pub fn scan(&self, pager: &PageManager) -> DbResult<Vec<(RecordId, Row)>> {
        let mut out = Vec::with_capacity(self.locations.len());
        for rid in self.locations.keys() {
            out.push((*rid, self.get(pager, *rid)?));
        }
        Ok(out)
    }
}
