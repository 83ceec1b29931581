//! Avro object-container file reader
//!
//! Block-oriented access to the files the writer produces. The serving layer
//! streams whole raw blocks to Avro clients unchanged and decodes individual
//! records for JSON clients; both paths go through this reader.

use std::fs::File;
use std::io::Cursor;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use apache_avro::{from_avro_datum, types::Value, Schema};

use super::{AVRO_MAGIC, SYNC_MARKER_SIZE};
use crate::codec::{avro, ByteCursor};
use crate::error::{AvroFileError, DecodeError};

/// Parsed container header.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub schema_json: String,
    pub codec: String,
    pub sync_marker: [u8; SYNC_MARKER_SIZE],
    /// Offset of the first block, one past the header sync marker.
    pub data_start: u64,
}

/// Read and validate a container header.
pub fn read_header(path: impl AsRef<Path>) -> Result<ContainerHeader, AvroFileError> {
    let file = File::open(path.as_ref())?;
    read_header_from(&file)
}

fn read_header_from(file: &File) -> Result<ContainerHeader, AvroFileError> {
    let file_len = file.metadata()?.len();
    let mut buf_len = 64 * 1024;

    loop {
        let take = buf_len.min(file_len as usize);
        let mut buf = vec![0u8; take];
        file.read_exact_at(&mut buf, 0)?;

        match parse_header(&buf) {
            Ok(header) => return Ok(header),
            Err(AvroFileError::Io(_)) if take < file_len as usize => {
                // Header larger than the buffer; widen and retry.
                buf_len *= 4;
            }
            Err(e) => return Err(e),
        }
    }
}

fn parse_header(buf: &[u8]) -> Result<ContainerHeader, AvroFileError> {
    let short = |e: DecodeError| match e {
        DecodeError::ShortBuffer { .. } => AvroFileError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "container header incomplete",
        )),
        other => AvroFileError::Schema(other.to_string()),
    };

    let mut cursor = ByteCursor::new(buf);
    let magic = cursor.take(4).map_err(|_| AvroFileError::BadMagic)?;
    if magic != AVRO_MAGIC {
        return Err(AvroFileError::BadMagic);
    }

    let mut schema_json = None;
    let mut codec = "null".to_string();

    // The metadata map arrives in count-prefixed batches, ended by a zero.
    loop {
        let count = avro::decode_long(&mut cursor).map_err(short)?;
        if count == 0 {
            break;
        }
        for _ in 0..count.unsigned_abs() {
            let key = avro::decode_bytes(&mut cursor).map_err(short)?;
            let key = String::from_utf8_lossy(key).to_string();
            let value = avro::decode_bytes(&mut cursor).map_err(short)?.to_vec();
            match key.as_str() {
                "avro.schema" => schema_json = Some(String::from_utf8_lossy(&value).to_string()),
                "avro.codec" => codec = String::from_utf8_lossy(&value).to_string(),
                _ => {}
            }
        }
    }

    let mut sync_marker = [0u8; SYNC_MARKER_SIZE];
    sync_marker.copy_from_slice(cursor.take(SYNC_MARKER_SIZE).map_err(short)?);

    let schema_json = schema_json
        .ok_or_else(|| AvroFileError::Schema("container header has no avro.schema".into()))?;
    if codec != "null" {
        return Err(AvroFileError::UnsupportedCodec(codec));
    }

    Ok(ContainerHeader {
        schema_json,
        codec,
        sync_marker,
        data_start: cursor.position() as u64,
    })
}

/// One container block.
#[derive(Debug, Clone)]
pub struct Block {
    pub records: u64,
    /// Record bodies only.
    pub data: Vec<u8>,
    /// The full framed block, `count | size | data | sync`, for passthrough.
    pub raw: Vec<u8>,
    pub start: u64,
    pub end: u64,
}

impl Block {
    /// Decode every record in the block against the writer schema.
    pub fn decode_records(&self, schema: &Schema) -> Result<Vec<Value>, AvroFileError> {
        let mut cursor = Cursor::new(self.data.as_slice());
        let mut out = Vec::with_capacity(self.records as usize);
        for _ in 0..self.records {
            let value = from_avro_datum(schema, &mut cursor, None)
                .map_err(|e| AvroFileError::Schema(e.to_string()))?;
            out.push(value);
        }
        Ok(out)
    }
}

/// Sequential block reader over one container file.
#[derive(Debug)]
pub struct AvroReader {
    file: File,
    path: PathBuf,
    header: ContainerHeader,
    schema: Schema,
    offset: u64,
}

impl AvroReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AvroFileError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let header = read_header_from(&file)?;
        let schema = Schema::parse_str(&header.schema_json)
            .map_err(|e| AvroFileError::Schema(e.to_string()))?;
        let offset = header.data_start;
        Ok(Self {
            file,
            path,
            header,
            schema,
            offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Offset of the next block to read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Position the reader at a block boundary previously returned in a
    /// [`Block`].
    pub fn seek_to(&mut self, offset: u64) {
        self.offset = offset.max(self.header.data_start);
    }

    /// The raw header bytes, which Avro-format clients receive verbatim as
    /// their schema preamble.
    pub fn header_bytes(&self) -> Result<Vec<u8>, AvroFileError> {
        let mut buf = vec![0u8; self.header.data_start as usize];
        self.file.read_exact_at(&mut buf, 0)?;
        Ok(buf)
    }

    /// Read the next complete block.
    ///
    /// Returns `None` at end of file, and also when only a partial block is
    /// present yet: the converter may still be writing it, so the caller
    /// should retry after the next flush notification.
    pub fn next_block(&mut self) -> Result<Option<Block>, AvroFileError> {
        let file_len = self.file.metadata()?.len();
        if self.offset >= file_len {
            return Ok(None);
        }

        // Two zig-zag longs are at most 20 bytes.
        let prefix_len = 20.min((file_len - self.offset) as usize);
        let mut prefix = vec![0u8; prefix_len];
        self.file.read_exact_at(&mut prefix, self.offset)?;

        let mut cursor = ByteCursor::new(&prefix);
        let (records, datasize) =
            match avro::decode_long(&mut cursor).and_then(|r| Ok((r, avro::decode_long(&mut cursor)?))) {
                Ok(pair) => pair,
                // A block header cut short means a write is in flight.
                Err(DecodeError::ShortBuffer { .. }) => return Ok(None),
                Err(e) => return Err(AvroFileError::Schema(e.to_string())),
            };

        if records < 0 || datasize < 0 {
            return Err(AvroFileError::Schema(format!(
                "negative block header at offset {}",
                self.offset
            )));
        }

        let body_start = self.offset + cursor.position() as u64;
        let body_end = body_start + datasize as u64 + SYNC_MARKER_SIZE as u64;
        if body_end > file_len {
            return Ok(None);
        }

        let mut data = vec![0u8; datasize as usize];
        self.file.read_exact_at(&mut data, body_start)?;
        let mut sync = [0u8; SYNC_MARKER_SIZE];
        self.file
            .read_exact_at(&mut sync, body_start + datasize as u64)?;
        if sync != self.header.sync_marker {
            return Err(AvroFileError::SyncMarkerMismatch {
                offset: body_start + datasize as u64,
            });
        }

        let mut raw = Vec::with_capacity((body_end - self.offset) as usize);
        raw.extend_from_slice(&prefix[..cursor.position()]);
        raw.extend_from_slice(&data);
        raw.extend_from_slice(&sync);

        let block = Block {
            records: records as u64,
            data,
            raw,
            start: self.offset,
            end: body_end,
        };
        self.offset = body_end;
        Ok(Some(block))
    }
}
