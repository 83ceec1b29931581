//! Error types for binlog conversion
//!
//! Each stage of the pipeline has its own error enum so that the conversion
//! driver can apply the right recovery policy: decode errors skip the
//! offending event, binlog errors stop the current file, schema errors drop
//! the affected table, Avro file errors roll the output back to the last
//! complete block.

use thiserror::Error;

/// Errors raised while pulling typed values out of raw event bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A read would run past the end of the buffer. Decoders never over-read.
    #[error("short buffer: needed {needed} bytes, {remaining} remaining")]
    ShortBuffer { needed: usize, remaining: usize },

    /// Row event declared a different column count than the table map.
    #[error("column count mismatch: table map has {expected} columns, row event has {actual}")]
    ColumnCountMismatch { expected: u64, actual: u64 },

    /// Column type byte that no decoder is registered for.
    #[error("unknown column type 0x{0:02x}")]
    UnknownColumnType(u8),

    /// First byte of a length-encoded integer was the 0xfb NULL marker or 0xff.
    #[error("invalid length-encoded integer prefix 0x{0:02x}")]
    InvalidLengthEncoding(u8),
}

/// Errors raised by the binlog event framer.
#[derive(Error, Debug)]
pub enum BinlogError {
    #[error("binlog magic bytes are not correct")]
    BadMagic,

    /// The file ended inside an event, or `next_pos` went backwards.
    #[error("binlog truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("event at offset {offset} declares size {size}, minimum is 19")]
    EventTooShort { offset: u64, size: u32 },

    #[error("unknown event type 0x{code:02x} at offset {offset}")]
    UnknownEventType { code: u8, offset: u64 },

    /// The first event after the magic must describe the binlog format.
    #[error("format description event missing from start of binlog")]
    MissingFormatDescription,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors in DDL tracking and table mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Table map or row event arrived before the CREATE statement was seen.
    #[error("no CREATE TABLE statement read for table '{0}'")]
    UnknownTable(String),

    #[error("malformed statement: {0}")]
    MalformedStatement(String),

    /// ALTER TABLE without a prior CREATE for the same table.
    #[error("ALTER TABLE for '{0}' has no prior CREATE TABLE")]
    AlterBeforeCreate(String),

    #[error("table '{0}' exceeded the maximum schema version")]
    VersionOverflow(String),
}

/// Errors from the Avro object-container file layer.
#[derive(Error, Debug)]
pub enum AvroFileError {
    #[error("Avro magic marker bytes are not correct")]
    BadMagic,

    /// Block trailer did not repeat the header sync marker.
    #[error("sync marker mismatch at offset {offset}")]
    SyncMarkerMismatch { offset: u64 },

    #[error("unsupported Avro codec '{0}'")]
    UnsupportedCodec(String),

    /// Existing file carries a different schema than the writer expects.
    #[error("schema in file '{0}' does not match the active table schema")]
    SchemaMismatch(String),

    #[error("Avro schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Umbrella error for conversion operations.
#[derive(Error, Debug)]
pub enum CdcError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("binlog error: {0}")]
    Binlog(#[from] BinlogError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Avro file error: {0}")]
    AvroFile(#[from] AvroFileError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdcError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, CdcError>;
