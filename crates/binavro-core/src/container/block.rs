//! In-memory data block for the object-container writer

use crate::codec::avro;
use crate::error::AvroFileError;

/// A remembered fill level of a [`DataBlock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockMark {
    records: u64,
    datasize: usize,
}

/// Records accumulated for the next container block.
///
/// The buffer grows by doubling as records are appended; an allocation
/// failure is reported to the caller and leaves the block untouched, with
/// every previously appended record intact.
#[derive(Debug, Default)]
pub struct DataBlock {
    records: u64,
    buf: Vec<u8>,
}

impl DataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn datasize(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Append one record's encoded body.
    pub fn add_datum(&mut self, datum: &[u8]) -> Result<(), AvroFileError> {
        self.reserve(datum.len())?;
        self.buf.extend_from_slice(datum);
        self.records += 1;
        Ok(())
    }

    /// Append a zig-zag encoded long as part of a record body.
    pub fn add_long(&mut self, val: i64) -> Result<(), AvroFileError> {
        self.reserve(10)?;
        avro::encode_long(&mut self.buf, val);
        Ok(())
    }

    /// Append a length-prefixed string as part of a record body.
    pub fn add_string(&mut self, s: &str) -> Result<(), AvroFileError> {
        self.reserve(10 + s.len())?;
        avro::encode_string(&mut self.buf, s);
        Ok(())
    }

    /// Append a raw little-endian float as part of a record body.
    pub fn add_float(&mut self, val: f32) -> Result<(), AvroFileError> {
        self.reserve(4)?;
        avro::encode_float(&mut self.buf, val);
        Ok(())
    }

    /// Append a raw little-endian double as part of a record body.
    pub fn add_double(&mut self, val: f64) -> Result<(), AvroFileError> {
        self.reserve(8)?;
        avro::encode_double(&mut self.buf, val);
        Ok(())
    }

    /// Mark the bytes appended through the add_* primitives as one record.
    pub fn end_record(&mut self) {
        self.records += 1;
    }

    /// Reset to zero records and an empty buffer after a successful flush.
    pub fn reset(&mut self) {
        self.records = 0;
        self.buf.clear();
    }

    /// Snapshot of the block's fill level, for rollback.
    pub fn mark(&self) -> BlockMark {
        BlockMark {
            records: self.records,
            datasize: self.buf.len(),
        }
    }

    /// Drop everything appended after `mark`.
    pub fn rollback_to(&mut self, mark: BlockMark) {
        self.records = mark.records;
        self.buf.truncate(mark.datasize);
    }

    fn reserve(&mut self, additional: usize) -> Result<(), AvroFileError> {
        self.buf.try_reserve(additional).map_err(|_| {
            AvroFileError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "data block allocation failed",
            ))
        })
    }
}
