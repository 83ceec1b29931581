//! Avro object-container file writer
//!
//! Writes standard Avro container files: a header carrying the JSON schema
//! and a 16-byte sync marker, followed by blocks of
//! `count | size | records | sync_marker`. Supports create-or-append on an
//! existing file, and rolls a failed block write back by truncating the file
//! to its pre-flush length so the file never holds a partial block.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use apache_avro::{to_avro_datum, types::Value, Schema};
use tracing::{debug, warn};

use super::block::{BlockMark, DataBlock};
use super::reader::read_header;
use super::{AVRO_MAGIC, SYNC_MARKER_SIZE};
use crate::codec::avro;
use crate::error::AvroFileError;

/// Open container file plus the in-memory block being accumulated.
pub struct AvroWriter {
    file: File,
    path: PathBuf,
    schema: Schema,
    schema_json: String,
    sync_marker: [u8; SYNC_MARKER_SIZE],
    block: DataBlock,
    /// Block fill level at the last transaction commit.
    commit_mark: BlockMark,
}

impl AvroWriter {
    /// Open `path` for appending, creating it with a fresh header when it
    /// does not exist. An existing file must carry byte-identical schema
    /// JSON; anything else means the caller is writing the wrong version.
    pub fn create_or_append(
        path: impl AsRef<Path>,
        schema_json: &str,
    ) -> Result<Self, AvroFileError> {
        let path = path.as_ref().to_path_buf();
        let schema =
            Schema::parse_str(schema_json).map_err(|e| AvroFileError::Schema(e.to_string()))?;

        let exists = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if exists {
            let header = read_header(&path)?;
            if header.schema_json != schema_json {
                return Err(AvroFileError::SchemaMismatch(
                    path.display().to_string(),
                ));
            }
            let mut file = OpenOptions::new().write(true).read(true).open(&path)?;
            file.seek(SeekFrom::End(0))?;
            debug!(path = %path.display(), "appending to existing container");
            Ok(Self {
                file,
                path,
                schema,
                schema_json: header.schema_json,
                sync_marker: header.sync_marker,
                block: DataBlock::new(),
                commit_mark: BlockMark::default(),
            })
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .read(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            let sync_marker: [u8; SYNC_MARKER_SIZE] = rand::random();
            let mut header = Vec::with_capacity(schema_json.len() + 64);
            header.extend_from_slice(&AVRO_MAGIC);
            // Metadata map: one block of two entries, then the end marker.
            avro::encode_long(&mut header, 2);
            avro::encode_string(&mut header, "avro.codec");
            avro::encode_bytes(&mut header, b"null");
            avro::encode_string(&mut header, "avro.schema");
            avro::encode_bytes(&mut header, schema_json.as_bytes());
            avro::encode_long(&mut header, 0);
            header.extend_from_slice(&sync_marker);
            file.write_all(&header)?;
            file.sync_data()?;
            debug!(path = %path.display(), "created container");
            Ok(Self {
                file,
                path,
                schema,
                schema_json: schema_json.to_string(),
                sync_marker,
                block: DataBlock::new(),
                commit_mark: BlockMark::default(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_json(&self) -> &str {
        &self.schema_json
    }

    pub fn sync_marker(&self) -> &[u8; SYNC_MARKER_SIZE] {
        &self.sync_marker
    }

    /// Records waiting in the open block.
    pub fn pending_records(&self) -> u64 {
        self.block.records()
    }

    /// Encode one record against the schema and buffer it in the block.
    pub fn append_record(&mut self, value: Value) -> Result<(), AvroFileError> {
        let datum =
            to_avro_datum(&self.schema, value).map_err(|e| AvroFileError::Schema(e.to_string()))?;
        self.block.add_datum(&datum)
    }

    /// Remember the current block fill level as transaction-committed.
    pub fn mark_commit(&mut self) {
        self.commit_mark = self.block.mark();
    }

    /// Drop records buffered after the last commit; used when the driver
    /// rewinds to the checkpoint and will replay the open transaction.
    pub fn discard_uncommitted(&mut self) {
        self.block.rollback_to(self.commit_mark);
    }

    /// Finalize the open block to disk.
    ///
    /// On any partial write the file is truncated back to the position it
    /// held before finalization started and the cursor reseeked to the end,
    /// so a later flush can retry with the block contents intact. Returns
    /// true when a block was written.
    pub fn flush(&mut self) -> Result<bool, AvroFileError> {
        if self.block.is_empty() {
            return Ok(false);
        }

        let pre_pos = self.file.seek(SeekFrom::End(0))?;

        let mut frame = Vec::with_capacity(self.block.datasize() + 32);
        avro::encode_long(&mut frame, self.block.records() as i64);
        avro::encode_long(&mut frame, self.block.datasize() as i64);
        frame.extend_from_slice(self.block.data());
        frame.extend_from_slice(&self.sync_marker);

        if let Err(e) = self.file.write_all(&frame).and_then(|_| self.file.sync_data()) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "block write failed, truncating to {pre_pos}"
            );
            self.file.set_len(pre_pos)?;
            self.file.seek(SeekFrom::End(0))?;
            return Err(AvroFileError::Io(e));
        }

        debug!(
            path = %self.path.display(),
            records = self.block.records(),
            bytes = self.block.datasize(),
            "finalized block"
        );
        self.block.reset();
        self.commit_mark = BlockMark::default();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::types::Value;

    const SCHEMA: &str = r#"{"type":"record","name":"R","fields":[
        {"name":"a","type":"long"},{"name":"s","type":"string"}]}"#;

    fn record(a: i64, s: &str) -> Value {
        Value::Record(vec![
            ("a".into(), Value::Long(a)),
            ("s".into(), Value::String(s.into())),
        ])
    }

    #[test]
    fn test_create_writes_standard_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.avro");
        let writer = AvroWriter::create_or_append(&path, SCHEMA).unwrap();
        drop(writer);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &AVRO_MAGIC);
        // Readable back by the independent reader.
        let header = read_header(&path).unwrap();
        assert_eq!(header.schema_json, SCHEMA);
        assert_eq!(header.codec, "null");
    }

    #[test]
    fn test_append_reuses_sync_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.avro");

        let mut writer = AvroWriter::create_or_append(&path, SCHEMA).unwrap();
        let marker = *writer.sync_marker();
        writer.append_record(record(1, "x")).unwrap();
        assert!(writer.flush().unwrap());
        drop(writer);

        let writer = AvroWriter::create_or_append(&path, SCHEMA).unwrap();
        assert_eq!(*writer.sync_marker(), marker);
    }

    #[test]
    fn test_append_rejects_different_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.avro");
        AvroWriter::create_or_append(&path, SCHEMA).unwrap();

        let other = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"long"}]}"#;
        assert!(matches!(
            AvroWriter::create_or_append(&path, other),
            Err(AvroFileError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_flush_empty_block_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.avro");
        let mut writer = AvroWriter::create_or_append(&path, SCHEMA).unwrap();
        let len_before = std::fs::metadata(&path).unwrap().len();
        assert!(!writer.flush().unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn test_flush_resets_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.avro");
        let mut writer = AvroWriter::create_or_append(&path, SCHEMA).unwrap();
        writer.append_record(record(1, "a")).unwrap();
        writer.append_record(record(2, "b")).unwrap();
        assert_eq!(writer.pending_records(), 2);
        writer.flush().unwrap();
        assert_eq!(writer.pending_records(), 0);
    }
}
