//! Column value decoding
//!
//! One decoder per column kind, dispatching on the table map's type byte and
//! per-column metadata. Temporal values are rendered to `YYYY-MM-DD HH:MM:SS`
//! strings (or the appropriate subset) as they are decoded.

use apache_avro::types::Value;
use chrono::{Local, TimeZone};

use crate::codec::ByteCursor;
use crate::column::ColumnType;
use crate::error::DecodeError;

/// A decoded column value, shaped like the Avro field it will land in.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn into_avro(self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Int(v) => Value::Int(v),
            Datum::Long(v) => Value::Long(v),
            Datum::Float(v) => Value::Float(v),
            Datum::Double(v) => Value::Double(v),
            Datum::Text(v) => Value::String(v),
            Datum::Bytes(v) => Value::Bytes(v),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

/// Decode one non-null column value.
///
/// `extra_bits` is the pool of spare high bits left over in the row's null
/// bitmap area; BIT columns may consume part of their width from it.
pub fn decode_value(
    cursor: &mut ByteCursor<'_>,
    col_type: ColumnType,
    metadata: &[u8],
    extra_bits: &mut usize,
) -> Result<Datum, DecodeError> {
    match col_type {
        ColumnType::Tiny => Ok(Datum::Int(cursor.i8()? as i32)),
        ColumnType::Short => Ok(Datum::Int(cursor.u16_le()? as i16 as i32)),
        ColumnType::Int24 => {
            let val = cursor.u24_le()?;
            let signed = if val & 0x80_0000 != 0 {
                (val | 0xff00_0000) as i32
            } else {
                val as i32
            };
            Ok(Datum::Int(signed))
        }
        ColumnType::Long => Ok(Datum::Int(cursor.u32_le()? as i32)),
        ColumnType::LongLong => Ok(Datum::Long(cursor.u64_le()? as i64)),
        ColumnType::Float => {
            let bits = cursor.u32_le()?;
            Ok(Datum::Float(f32::from_le_bytes(bits.to_le_bytes())))
        }
        ColumnType::Double => {
            let bits = cursor.u64_le()?;
            Ok(Datum::Double(f64::from_le_bytes(bits.to_le_bytes())))
        }
        ColumnType::Year => Ok(Datum::Int(cursor.u8()? as i32 + 1900)),

        ColumnType::Date => {
            let packed = cursor.u24_le()?;
            let day = packed & 0x1f;
            let month = (packed >> 5) & 0x0f;
            let year = packed >> 9;
            Ok(Datum::Text(format!("{year:04}-{month:02}-{day:02}")))
        }
        ColumnType::Time => {
            let packed = cursor.u24_le()?;
            let second = packed % 100;
            let minute = (packed / 100) % 100;
            let hour = packed / 10_000;
            Ok(Datum::Text(format!("{hour:02}:{minute:02}:{second:02}")))
        }
        ColumnType::DateTime => {
            let packed = cursor.u64_le()?;
            let second = packed % 100;
            let minute = (packed / 100) % 100;
            let hour = (packed / 10_000) % 100;
            let day = (packed / 1_000_000) % 100;
            let month = (packed / 100_000_000) % 100;
            let year = packed / 10_000_000_000;
            Ok(Datum::Text(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            )))
        }
        ColumnType::Timestamp => {
            let secs = cursor.uint_be(4)? as u32;
            Ok(Datum::Text(format_timestamp(secs, None)))
        }
        ColumnType::Timestamp2 => {
            let secs = cursor.uint_be(4)? as u32;
            let frac = read_fraction(cursor, metadata)?;
            Ok(Datum::Text(format_timestamp(secs, frac)))
        }
        ColumnType::DateTime2 => {
            let raw = cursor.unpack5()? as i64;
            let n = (raw - 0x80_0000_0000).unsigned_abs();
            let date = n >> 17;
            let time = n & 0x1_ffff;
            let second = time & 0x3f;
            let minute = (time >> 6) & 0x3f;
            let hour = time >> 12;
            let day = date & 0x1f;
            let year_month = date >> 5;
            let month = year_month % 13;
            let year = year_month / 13;
            let mut out = format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            );
            push_fraction(&mut out, read_fraction(cursor, metadata)?);
            Ok(Datum::Text(out))
        }
        ColumnType::Time2 => {
            let packed = cursor.uint_be(3)? as u32;
            let negative = packed & 0x80_0000 == 0;
            let value = if negative {
                0x80_0000 - (packed & 0x7f_ffff)
            } else {
                packed & 0x7f_ffff
            };
            let hour = (value >> 12) & 0x3ff;
            let minute = (value >> 6) & 0x3f;
            let second = value & 0x3f;
            let sign = if negative { "-" } else { "" };
            let mut out = format!("{sign}{hour:02}:{minute:02}:{second:02}");
            push_fraction(&mut out, read_fraction(cursor, metadata)?);
            Ok(Datum::Text(out))
        }

        ColumnType::Varchar | ColumnType::VarString | ColumnType::Decimal
        | ColumnType::NewDecimal => {
            let bytes = cursor.lenenc_str()?;
            Ok(Datum::Text(String::from_utf8_lossy(bytes).to_string()))
        }
        ColumnType::Geometry => Ok(Datum::Bytes(cursor.lenenc_str()?.to_vec())),

        ColumnType::String => {
            // ENUM and SET surface as fixed strings with the real type in
            // the metadata.
            let real_type = metadata.first().copied().unwrap_or(0);
            if real_type == ColumnType::Enum as u8 || real_type == ColumnType::Set as u8 {
                let width = metadata.get(1).copied().unwrap_or(1).max(1) as usize;
                let value = cursor.uint_le(width)?;
                Ok(Datum::Text(value.to_string()))
            } else {
                let len = cursor.u8()? as usize;
                let bytes = cursor.take(len)?;
                Ok(Datum::Text(String::from_utf8_lossy(bytes).to_string()))
            }
        }
        ColumnType::Enum | ColumnType::Set => {
            let width = metadata.get(1).copied().unwrap_or(1).max(1) as usize;
            let value = cursor.uint_le(width)?;
            Ok(Datum::Text(value.to_string()))
        }

        ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob
        | ColumnType::Blob => {
            let len_bytes = metadata.first().copied().unwrap_or(1) as usize;
            let len = cursor.uint_le(len_bytes)? as usize;
            Ok(Datum::Bytes(cursor.take(len)?.to_vec()))
        }

        ColumnType::Bit => {
            let m0 = metadata.first().copied().unwrap_or(0) as usize;
            let m1 = metadata.get(1).copied().unwrap_or(0) as usize;
            let mut width = m0 + m1 * 8;
            let from_extra = width.min(*extra_bits);
            *extra_bits -= from_extra;
            width -= from_extra;
            let bytes = width.div_ceil(8);
            Ok(Datum::Long(cursor.uint_be(bytes)? as i64))
        }

        ColumnType::Null | ColumnType::NewDate => {
            Err(DecodeError::UnknownColumnType(col_type as u8))
        }
    }
}

/// Read the fractional-seconds tail of a temporal2 value.
fn read_fraction(
    cursor: &mut ByteCursor<'_>,
    metadata: &[u8],
) -> Result<Option<(u64, u8)>, DecodeError> {
    let decimals = metadata.first().copied().unwrap_or(0);
    if decimals == 0 {
        return Ok(None);
    }
    let bytes = (decimals as usize).div_ceil(2);
    let value = cursor.uint_be(bytes)?;
    Ok(Some((value, decimals)))
}

fn push_fraction(out: &mut String, frac: Option<(u64, u8)>) {
    if let Some((value, decimals)) = frac {
        out.push('.');
        out.push_str(&format!("{value:0width$}", width = decimals as usize));
    }
}

/// Broken-down local time for TIMESTAMP columns.
fn format_timestamp(secs: u32, frac: Option<(u64, u8)>) -> String {
    let mut out = match Local.timestamp_opt(secs as i64, 0).earliest() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "1970-01-01 00:00:00".to_string(),
    };
    push_fraction(&mut out, frac);
    out
}
