
pub mod error;
pub mod pretty;

pub use error::{DbError, DbResult, IndexError, RuntimeError, SemanticError, StorageError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use types::Value;

/// Logical identifier of an on-disk page. Page 0 is reserved as invalid;
/// the heap file stores page `p` at offset `(p - 1) * PAGE_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    pub const INVALID: PageId = PageId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Index into a page's slot directory.
pub type SlotId = u16;

/// Table-local logical identifier of a row, allocated monotonically on
/// insert and stable across physical relocations. The physical placement
/// lives in the owning table's `RecordId -> (PageId, SlotId)` map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

/// Physical placement of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLocation {
    pub page_id: PageId,
    pub slot: SlotId,
}

/// Positional row backed by `types::Value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_TEXT: u8 = 3;

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Encode as a length-prefixed, typed-tag byte stream: a `u16` arity,
    /// then per value a tag byte and a fixed or `u32`-length-prefixed
    /// payload. The encoding round-trips exactly, empty strings included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.values.len() * 9);
        out.extend_from_slice(&(self.values.len() as u16).to_le_bytes());
        for value in &self.values {
            match value {
                Value::Null => out.push(TAG_NULL),
                Value::Int(v) => {
                    out.push(TAG_INT);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Value::Double(v) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&v.to_bits().to_le_bytes());
                }
                Value::Text(s) => {
                    out.push(TAG_TEXT);
                    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
            }
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> DbResult<Row> {
        let mut cursor = Cursor::new(bytes);
        let arity = cursor.read_u16()?;
        let mut values = Vec::with_capacity(arity as usize);
        for _ in 0..arity {
            let tag = cursor.read_u8()?;
            let value = match tag {
                TAG_NULL => Value::Null,
                TAG_INT => Value::Int(i64::from_le_bytes(cursor.read_array()?)),
                TAG_DOUBLE => Value::Double(f64::from_bits(u64::from_le_bytes(cursor.read_array()?))),
                TAG_TEXT => {
                    let len = cursor.read_u32()? as usize;
                    let raw = cursor.read_bytes(len)?;
                    let text = std::str::from_utf8(raw).map_err(|_| {
                        StorageError::InvalidRowEncoding("non-UTF-8 text payload".into())
                    })?;
                    Value::Text(text.to_string())
                }
                other => {
                    return Err(
                        StorageError::InvalidRowEncoding(format!("unknown value tag {other}")).into(),
                    )
                }
            };
            values.push(value);
        }
        if !cursor.is_exhausted() {
            return Err(StorageError::InvalidRowEncoding("trailing bytes after row".into()).into());
        }
        Ok(Row::new(values))
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> DbResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or_else(|| {
            DbError::from(StorageError::InvalidRowEncoding("truncated row payload".into()))
        })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> DbResult<[u8; N]> {
        let raw = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(raw);
        Ok(out)
    }

    fn read_u8(&mut self) -> DbResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> DbResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> DbResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// Rectangular result set carrying column labels and rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordBatch {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// Runtime configuration for the engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_frames(64)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory holding the paged heap, metadata, and index snapshots.
    #[builder(default = PathBuf::from("./quarry_data"))]
    pub data_dir: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 128)]
    pub buffer_pool_frames: usize,
    /// B+ tree order (max children per internal node).
    #[builder(default = 128)]
    pub btree_order: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./quarry_data"),
            buffer_pool_frames: 128,
            btree_order: 128,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Config, DbError, DbResult, PageId, RecordBatch, RecordId, RecordLocation, Row, SlotId,
    };
    pub use types::{SqlType, Value};
}
