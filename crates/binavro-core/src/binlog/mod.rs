//! MariaDB 10 binlog wire format: event types, header framing, GTID events.

pub mod event;
pub mod framer;

pub use event::{
    EventHeader, EventType, BINLOG_EVENT_HDR_LEN, BINLOG_MAGIC, MAX_EVENT_TYPE_MARIADB10,
    ROW_EVENT_END_STATEMENT, TABLE_DUMMY_ID,
};
pub use framer::{BinlogReader, FormatDescription, RawEvent};

use crate::codec::ByteCursor;
use crate::error::DecodeError;
use crate::gtid::Gtid;

/// MariaDB GTID event flag: transaction consists of this event alone.
pub const FL_STANDALONE: u8 = 0x01;

/// Payload of a MariaDB GTID_EVENT (type 0xa2).
#[derive(Debug, Clone)]
pub struct MariadbGtidEvent {
    pub gtid: Gtid,
    pub flags: u8,
}

impl MariadbGtidEvent {
    /// Parse from the event payload; the server id comes from the header.
    pub fn parse(payload: &[u8], server_id: u32) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(payload);
        let sequence = cursor.u64_le()?;
        let domain = cursor.u32_le()?;
        let flags = cursor.u8()?;
        Ok(Self {
            gtid: Gtid::new(domain, server_id, sequence),
            flags,
        })
    }

    /// A non-standalone GTID event opens a transaction, like a BEGIN.
    pub fn starts_transaction(&self) -> bool {
        self.flags & FL_STANDALONE == 0
    }
}

/// Payload of a ROTATE_EVENT: position and the name of the next binlog file.
#[derive(Debug, Clone)]
pub struct RotateEvent {
    pub position: u64,
    pub next_file: String,
}

impl RotateEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(payload);
        let position = cursor.u64_le()?;
        let name = cursor.take(cursor.remaining())?;
        Ok(Self {
            position,
            next_file: String::from_utf8_lossy(name)
                .trim_end_matches('\0')
                .to_string(),
        })
    }
}
