//! Row event decoding
//!
//! Turns WRITE_ROWS / UPDATE_ROWS / DELETE_ROWS events into one record per
//! row image. Updates produce two records per row: the before-image and the
//! after-image, in that order.

use apache_avro::types::Value;

use super::value::{decode_value, Datum};
use crate::binlog::EventType;
use crate::codec::ByteCursor;
use crate::error::DecodeError;
use crate::gtid::Gtid;
use crate::schema::table_map::TableMap;

/// Kind of change a record describes; the wire order of the schema enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEventKind {
    Insert,
    UpdateBefore,
    UpdateAfter,
    Delete,
}

impl RowEventKind {
    pub fn index(&self) -> u32 {
        match self {
            RowEventKind::Insert => 0,
            RowEventKind::UpdateBefore => 1,
            RowEventKind::UpdateAfter => 2,
            RowEventKind::Delete => 3,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RowEventKind::Insert => "insert",
            RowEventKind::UpdateBefore => "update_before",
            RowEventKind::UpdateAfter => "update_after",
            RowEventKind::Delete => "delete",
        }
    }
}

/// The `(table_id, flags)` prefix shared by every row event.
#[derive(Debug, Clone, Copy)]
pub struct RowsEventHeader {
    pub table_id: u64,
    pub flags: u16,
}

/// Consume the row event post-header prefix.
///
/// The table id is 4 bytes when the format description declared a 6-byte
/// post-header, 6 bytes otherwise.
pub fn parse_rows_header(
    cursor: &mut ByteCursor<'_>,
    post_header_len: u8,
) -> Result<RowsEventHeader, DecodeError> {
    let table_id_len = if post_header_len == 6 { 4 } else { 6 };
    let table_id = cursor.uint_le(table_id_len)?;
    let flags = cursor.u16_le()?;
    Ok(RowsEventHeader { table_id, flags })
}

/// One decoded row image.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub kind: RowEventKind,
    /// One entry per table column; columns absent from the event are null.
    pub values: Vec<Datum>,
}

impl RowRecord {
    /// Count of non-null values, matching the set bits of
    /// `columns_present AND NOT null_bitmap`.
    pub fn non_null_values(&self) -> usize {
        self.values.iter().filter(|v| !v.is_null()).count()
    }
}

/// Decode every row image in the event.
///
/// The cursor must be positioned after the `(table_id, flags)` prefix.
pub fn decode_rows_event(
    event_type: EventType,
    map: &TableMap,
    cursor: &mut ByteCursor<'_>,
) -> Result<Vec<RowRecord>, DecodeError> {
    if event_type.is_v2_row_event() {
        let extra_len = cursor.u16_le()? as usize;
        if extra_len > 2 {
            cursor.skip(extra_len - 2)?;
        }
    }

    let ncolumns = cursor.lenenc_int()?;
    if ncolumns != map.columns {
        return Err(DecodeError::ColumnCountMismatch {
            expected: map.columns,
            actual: ncolumns,
        });
    }

    let bitmap_len = (ncolumns as usize).div_ceil(8);
    let columns_present = cursor.take(bitmap_len)?.to_vec();
    let columns_update = if event_type.is_update_event() {
        Some(cursor.take(bitmap_len)?.to_vec())
    } else {
        None
    };

    let before_kind = if event_type.is_update_event() {
        RowEventKind::UpdateBefore
    } else if event_type.is_delete_event() {
        RowEventKind::Delete
    } else {
        RowEventKind::Insert
    };

    let mut records = Vec::new();
    while !cursor.is_empty() {
        records.push(decode_image(cursor, map, &columns_present, before_kind)?);
        if let Some(update_bitmap) = &columns_update {
            records.push(decode_image(
                cursor,
                map,
                update_bitmap,
                RowEventKind::UpdateAfter,
            )?);
        }
    }

    Ok(records)
}

fn decode_image(
    cursor: &mut ByteCursor<'_>,
    map: &TableMap,
    present: &[u8],
    kind: RowEventKind,
) -> Result<RowRecord, DecodeError> {
    let ncolumns = map.columns as usize;
    let present_count = (0..ncolumns).filter(|&i| bit_is_set(present, i)).count();
    let null_bitmap = cursor.take(present_count.div_ceil(8))?;

    // BIT columns may borrow the spare high bits of the null bitmap area.
    let mut extra_bits = ncolumns.div_ceil(8) * 8 - ncolumns;

    let mut values = Vec::with_capacity(ncolumns);
    let mut present_idx = 0;
    for i in 0..ncolumns {
        if !bit_is_set(present, i) {
            values.push(Datum::Null);
            continue;
        }
        let is_null = bit_is_set(null_bitmap, present_idx);
        present_idx += 1;
        if is_null {
            values.push(Datum::Null);
        } else {
            values.push(decode_value(
                cursor,
                map.column_types[i],
                map.metadata_for(i),
                &mut extra_bits,
            )?);
        }
    }

    Ok(RowRecord { kind, values })
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    let byte = idx / 8;
    byte < bitmap.len() && bitmap[byte] & (1 << (idx % 8)) != 0
}

/// Assemble the Avro record for a row image, fields in schema order.
pub fn to_avro_record(
    record: RowRecord,
    gtid: &Gtid,
    timestamp: u32,
    column_names: &[String],
) -> Value {
    let mut fields = Vec::with_capacity(3 + column_names.len());
    fields.push(("GTID".to_string(), Value::String(gtid.triplet())));
    fields.push(("timestamp".to_string(), Value::Int(timestamp as i32)));
    fields.push((
        "event_type".to_string(),
        Value::Enum(record.kind.index(), record.kind.symbol().to_string()),
    ));

    for (name, datum) in column_names.iter().zip(record.values) {
        let value = match datum {
            Datum::Null => Value::Union(0, Box::new(Value::Null)),
            other => Value::Union(1, Box::new(other.into_avro())),
        };
        fields.push((name.clone(), value));
    }

    Value::Record(fields)
}
