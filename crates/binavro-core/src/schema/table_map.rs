//! Table map events
//!
//! A TABLE_MAP_EVENT binds a numeric table id to a database/table name and
//! the column layout used by the row events that follow it. The map is
//! ephemeral: a new one replaces it whenever the schema version changes.

use crate::codec::ByteCursor;
use crate::column::ColumnType;
use crate::error::DecodeError;
use crate::gtid::Gtid;

/// Size of the active table map slot array.
pub const MAX_MAPPED_TABLES: usize = 1024;

/// Binding between a binlog table id and a versioned table definition.
#[derive(Debug, Clone)]
pub struct TableMap {
    pub id: u64,
    pub flags: u16,
    pub database: String,
    pub table: String,
    pub columns: u64,
    pub column_types: Vec<ColumnType>,
    /// Opaque metadata blob; layout depends on the column types.
    pub column_metadata: Vec<u8>,
    /// Byte offset of each column's slice inside `column_metadata`.
    pub metadata_offsets: Vec<usize>,
    /// Column names snapshotted from the table definition at map time.
    pub column_names: Vec<String>,
    /// Version copied from the definition at map time.
    pub version: u32,
    /// GTID current when the map was created.
    pub gtid: Gtid,
}

impl TableMap {
    /// Parse a TABLE_MAP_EVENT payload.
    ///
    /// The table id is 4 or 6 bytes depending on the post-header length the
    /// format description announced. Column names and version are bound
    /// later by the registry, once the matching definition is found.
    pub fn parse(payload: &[u8], post_header_len: u8, gtid: Gtid) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(payload);

        let table_id_len = if post_header_len == 6 { 4 } else { 6 };
        let id = cursor.uint_le(table_id_len)?;
        let flags = cursor.u16_le()?;

        let db_len = cursor.u8()? as usize;
        let database = String::from_utf8_lossy(cursor.take(db_len)?).to_string();
        cursor.skip(1)?; // NUL terminator

        let table_len = cursor.u8()? as usize;
        let table = String::from_utf8_lossy(cursor.take(table_len)?).to_string();
        cursor.skip(1)?; // NUL terminator

        let columns = cursor.lenenc_int()?;
        let mut column_types = Vec::with_capacity(columns as usize);
        for _ in 0..columns {
            column_types.push(ColumnType::from_u8(cursor.u8()?)?);
        }

        let metadata_len = cursor.lenenc_int()? as usize;
        let column_metadata = cursor.take(metadata_len)?.to_vec();

        // Null bitmap: present in the event but unused by the converter,
        // the per-row null bitmaps are authoritative.
        cursor.skip((columns as usize).div_ceil(8))?;

        let mut metadata_offsets = Vec::with_capacity(columns as usize);
        let mut offset = 0;
        for ct in &column_types {
            metadata_offsets.push(offset);
            offset += ct.metadata_len();
        }
        if offset > column_metadata.len() {
            return Err(DecodeError::ShortBuffer {
                needed: offset,
                remaining: column_metadata.len(),
            });
        }

        Ok(Self {
            id,
            flags,
            database,
            table,
            columns,
            column_types,
            column_metadata,
            metadata_offsets,
            column_names: Vec::new(),
            version: 0,
            gtid,
        })
    }

    pub fn ident(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Metadata slice for column `i`, empty for types without metadata.
    pub fn metadata_for(&self, i: usize) -> &[u8] {
        let Some(&start) = self.metadata_offsets.get(i) else {
            return &[];
        };
        let len = self.column_types[i].metadata_len();
        &self.column_metadata[start..start + len]
    }

    /// Slot in the fixed-size active map array.
    pub fn slot(&self) -> usize {
        (self.id % MAX_MAPPED_TABLES as u64) as usize
    }
}
