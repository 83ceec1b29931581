//! Binlog event framer
//!
//! Reads fixed 19-byte event headers and their payloads from an open binlog
//! file, validating `next_pos` monotonicity as it goes. The format
//! description event at the start of every file teaches the framer the
//! per-type post-header lengths and whether events carry trailing CRC32
//! checksums; the checksum is stripped from payloads before they reach any
//! decoder.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::event::{EventHeader, EventType, BINLOG_EVENT_HDR_LEN, BINLOG_MAGIC};
use crate::error::BinlogError;

/// Offset of the `event_header_length` byte inside the format description
/// payload: binlog version (2), server version (50), create timestamp (4).
const FDE_HEADER_LEN_OFFSET: usize = 2 + 50 + 4;

/// Parsed format description event.
#[derive(Debug, Clone)]
pub struct FormatDescription {
    pub header_len: u8,
    /// Post-header lengths indexed by `event type - 1`.
    post_header_lens: Vec<u8>,
    /// True when every subsequent event ends in a CRC32 checksum.
    pub checksums: bool,
}

impl FormatDescription {
    /// Parse the payload of a FORMAT_DESCRIPTION_EVENT.
    ///
    /// The byte five from the end is the checksum algorithm indicator when
    /// the server writes checksums; 0x01 means CRC32 and shortens the length
    /// table by the indicator plus the event's own checksum.
    pub fn parse(payload: &[u8]) -> Result<Self, BinlogError> {
        if payload.len() < FDE_HEADER_LEN_OFFSET + 2 {
            return Err(BinlogError::MissingFormatDescription);
        }

        let header_len = payload[FDE_HEADER_LEN_OFFSET];
        let table_start = FDE_HEADER_LEN_OFFSET + 1;

        let checksums = payload.len() >= table_start + 5 && payload[payload.len() - 5] == 0x01;
        let table_end = if checksums {
            payload.len() - 5
        } else {
            payload.len()
        };

        Ok(Self {
            header_len,
            post_header_lens: payload[table_start..table_end].to_vec(),
            checksums,
        })
    }

    /// Post-header length for an event type, 0 if the table has no entry.
    pub fn post_header_len(&self, event_type: EventType) -> u8 {
        let code = event_type.code();
        if code == 0 {
            return 0;
        }
        self.post_header_lens
            .get(code as usize - 1)
            .copied()
            .unwrap_or(0)
    }
}

/// One framed event: header, payload with any checksum removed, and the file
/// offset the header was read at.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub header: EventHeader,
    pub payload: Vec<u8>,
    pub offset: u64,
}

/// Sequential reader over one binlog file.
pub struct BinlogReader {
    file: File,
    path: PathBuf,
    file_len: u64,
    offset: u64,
    format: Option<FormatDescription>,
}

impl BinlogReader {
    /// Open a binlog file and position the reader at `start_offset`.
    ///
    /// The 4-byte magic is always validated. When resuming past the start of
    /// the file, the format description event at offset 4 is read first so
    /// the framer knows the post-header lengths and checksum mode.
    pub fn open(path: impl AsRef<Path>, start_offset: u64) -> Result<Self, BinlogError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 4];
        if file_len < 4 {
            return Err(BinlogError::BadMagic);
        }
        file.read_exact_at(&mut magic, 0)?;
        if magic != BINLOG_MAGIC {
            return Err(BinlogError::BadMagic);
        }

        let mut reader = Self {
            file,
            path,
            file_len,
            offset: 4,
            format: None,
        };

        let resume_at = start_offset.max(4);
        if resume_at > 4 {
            // Learn the format before jumping to the resume position.
            match reader.read_event()? {
                Some(event) if event.header.event_type == EventType::FormatDescription => {}
                _ => return Err(BinlogError::MissingFormatDescription),
            }
            reader.offset = resume_at;
        }

        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read offset, always at an event boundary or end of file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn format(&self) -> Option<&FormatDescription> {
        self.format.as_ref()
    }

    /// Frame the next event, or `None` at a clean end of file.
    pub fn read_event(&mut self) -> Result<Option<RawEvent>, BinlogError> {
        // The file may have grown since open.
        self.file_len = self.file.metadata()?.len();

        if self.offset >= self.file_len {
            return Ok(None);
        }
        if self.offset + BINLOG_EVENT_HDR_LEN as u64 > self.file_len {
            return Err(BinlogError::Truncated {
                offset: self.offset,
            });
        }

        let mut header_buf = [0u8; BINLOG_EVENT_HDR_LEN as usize];
        self.file.read_exact_at(&mut header_buf, self.offset)?;
        let header = EventHeader::parse(&header_buf, self.offset)?;

        if header.next_pos > 0 {
            let expected = self.offset + header.event_size as u64;
            if header.next_pos as u64 != expected || header.next_pos as u64 <= self.offset {
                debug!(
                    offset = self.offset,
                    next_pos = header.next_pos,
                    expected,
                    "next_pos does not advance to the following event"
                );
                return Err(BinlogError::Truncated {
                    offset: self.offset,
                });
            }
        }

        let payload_len = (header.event_size - BINLOG_EVENT_HDR_LEN) as usize;
        let payload_offset = self.offset + BINLOG_EVENT_HDR_LEN as u64;
        if payload_offset + payload_len as u64 > self.file_len {
            return Err(BinlogError::Truncated {
                offset: self.offset,
            });
        }

        let mut payload = vec![0u8; payload_len];
        self.file.read_exact_at(&mut payload, payload_offset)?;

        match header.event_type {
            EventType::FormatDescription => {
                let format = FormatDescription::parse(&payload)?;
                debug!(
                    header_len = format.header_len,
                    checksums = format.checksums,
                    "learned binlog format"
                );
                self.format = Some(format);
            }
            _ => {
                let format = self
                    .format
                    .as_ref()
                    .ok_or(BinlogError::MissingFormatDescription)?;
                if format.checksums {
                    if payload.len() < 4 {
                        return Err(BinlogError::Truncated {
                            offset: self.offset,
                        });
                    }
                    payload.truncate(payload.len() - 4);
                }
            }
        }

        let offset = self.offset;
        self.offset += header.event_size as u64;

        trace!(
            offset,
            event_type = ?header.event_type,
            size = header.event_size,
            "framed event"
        );

        Ok(Some(RawEvent {
            header,
            payload,
            offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Append one event to `out`, returning nothing; the header's next_pos
    /// points at the end of the event.
    fn push_event(out: &mut Vec<u8>, event_type: u8, payload: &[u8]) {
        let event_size = BINLOG_EVENT_HDR_LEN + payload.len() as u32;
        let next_pos = out.len() as u32 + event_size;
        out.extend_from_slice(&1000u32.to_le_bytes());
        out.push(event_type);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&event_size.to_le_bytes());
        out.extend_from_slice(&next_pos.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(payload);
    }

    fn fde_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&4u16.to_le_bytes());
        let mut version = [0u8; 50];
        version[..9].copy_from_slice(b"10.0.23-t");
        payload.extend_from_slice(&version);
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(19);
        // Post-header length table for event types 1..=0xa3.
        let mut lens = vec![0u8; 0xa3];
        lens[EventType::FormatDescription.code() as usize - 1] = 84;
        lens[EventType::TableMap.code() as usize - 1] = 8;
        lens[EventType::WriteRowsV2.code() as usize - 1] = 10;
        payload.extend_from_slice(&lens);
        payload
    }

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn binlog_with_fde() -> Vec<u8> {
        let mut data = BINLOG_MAGIC.to_vec();
        push_event(&mut data, 15, &fde_payload());
        data
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let file = write_temp(&[0u8; 32]);
        assert!(matches!(
            BinlogReader::open(file.path(), 4),
            Err(BinlogError::BadMagic)
        ));
    }

    #[test]
    fn test_reads_format_description_first() {
        let mut data = binlog_with_fde();
        push_event(&mut data, 16, &8u64.to_le_bytes());
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), 4).unwrap();
        let fde = reader.read_event().unwrap().unwrap();
        assert_eq!(fde.header.event_type, EventType::FormatDescription);
        let format = reader.format().unwrap();
        assert_eq!(format.header_len, 19);
        assert!(!format.checksums);
        assert_eq!(format.post_header_len(EventType::TableMap), 8);
        assert_eq!(format.post_header_len(EventType::WriteRowsV2), 10);

        let xid = reader.read_event().unwrap().unwrap();
        assert_eq!(xid.header.event_type, EventType::Xid);
        assert_eq!(xid.payload, 8u64.to_le_bytes());

        assert!(reader.read_event().unwrap().is_none());
    }

    #[test]
    fn test_event_before_fde_is_rejected() {
        let mut data = BINLOG_MAGIC.to_vec();
        push_event(&mut data, 16, &8u64.to_le_bytes());
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), 4).unwrap();
        assert!(matches!(
            reader.read_event(),
            Err(BinlogError::MissingFormatDescription)
        ));
    }

    #[test]
    fn test_checksum_stripped_from_payload() {
        let mut fde = fde_payload();
        fde.push(0x01); // CRC32 algorithm marker
        fde.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let mut data = BINLOG_MAGIC.to_vec();
        push_event(&mut data, 15, &fde);
        let mut xid_payload = 8u64.to_le_bytes().to_vec();
        xid_payload.extend_from_slice(&[1, 2, 3, 4]); // fake CRC
        push_event(&mut data, 16, &xid_payload);
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), 4).unwrap();
        reader.read_event().unwrap();
        assert!(reader.format().unwrap().checksums);

        let xid = reader.read_event().unwrap().unwrap();
        assert_eq!(xid.payload, 8u64.to_le_bytes());
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = binlog_with_fde();
        let truncation_point = data.len();
        push_event(&mut data, 16, &8u64.to_le_bytes());
        data.truncate(data.len() - 3);
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), 4).unwrap();
        reader.read_event().unwrap();
        match reader.read_event() {
            Err(BinlogError::Truncated { offset }) => {
                assert_eq!(offset, truncation_point as u64);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_next_pos() {
        let mut data = binlog_with_fde();
        let offset = data.len() as u32;
        let payload = 8u64.to_le_bytes();
        let event_size = BINLOG_EVENT_HDR_LEN + payload.len() as u32;
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.push(16);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&event_size.to_le_bytes());
        data.extend_from_slice(&(offset + event_size + 7).to_le_bytes()); // wrong
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&payload);
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), 4).unwrap();
        reader.read_event().unwrap();
        assert!(matches!(
            reader.read_event(),
            Err(BinlogError::Truncated { .. })
        ));
    }

    #[test]
    fn test_resume_learns_format_from_start() {
        let mut data = binlog_with_fde();
        let resume_at = data.len() as u64;
        push_event(&mut data, 16, &8u64.to_le_bytes());
        let file = write_temp(&data);

        let mut reader = BinlogReader::open(file.path(), resume_at).unwrap();
        assert!(reader.format().is_some());
        let xid = reader.read_event().unwrap().unwrap();
        assert_eq!(xid.header.event_type, EventType::Xid);
    }
}
