//! Binlog event types and the fixed 19-byte event header

use crate::codec::ByteCursor;
use crate::error::{BinlogError, DecodeError};

/// Magic bytes at the start of every binlog file.
pub const BINLOG_MAGIC: [u8; 4] = [0xfe, 0x62, 0x69, 0x6e];

/// Size of the fixed event header.
pub const BINLOG_EVENT_HDR_LEN: u32 = 19;

/// Highest event type code a MariaDB 10 server emits (GTID_LIST_EVENT).
pub const MAX_EVENT_TYPE_MARIADB10: u8 = 0xa3;

/// Table id of the sentinel row event that releases all table maps.
pub const TABLE_DUMMY_ID: u64 = 0x00ff_ffff;

/// Row event flag marking the end of a statement.
pub const ROW_EVENT_END_STATEMENT: u16 = 0x0001;

/// Binlog event types, including the MariaDB 10 additions at 0xa0..=0xa3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Query,
    Stop,
    Rotate,
    FormatDescription,
    Xid,
    TableMap,
    WriteRowsV0,
    UpdateRowsV0,
    DeleteRowsV0,
    WriteRowsV1,
    UpdateRowsV1,
    DeleteRowsV1,
    Heartbeat,
    WriteRowsV2,
    UpdateRowsV2,
    DeleteRowsV2,
    AnnotateRows,
    BinlogCheckpoint,
    MariadbGtid,
    MariadbGtidList,
    /// Valid but uninteresting to the converter.
    Other(u8),
}

impl EventType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => EventType::Query,
            3 => EventType::Stop,
            4 => EventType::Rotate,
            15 => EventType::FormatDescription,
            16 => EventType::Xid,
            19 => EventType::TableMap,
            20 => EventType::WriteRowsV0,
            21 => EventType::UpdateRowsV0,
            22 => EventType::DeleteRowsV0,
            23 => EventType::WriteRowsV1,
            24 => EventType::UpdateRowsV1,
            25 => EventType::DeleteRowsV1,
            27 => EventType::Heartbeat,
            30 => EventType::WriteRowsV2,
            31 => EventType::UpdateRowsV2,
            32 => EventType::DeleteRowsV2,
            0xa0 => EventType::AnnotateRows,
            0xa1 => EventType::BinlogCheckpoint,
            0xa2 => EventType::MariadbGtid,
            0xa3 => EventType::MariadbGtidList,
            other => EventType::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            EventType::Query => 2,
            EventType::Stop => 3,
            EventType::Rotate => 4,
            EventType::FormatDescription => 15,
            EventType::Xid => 16,
            EventType::TableMap => 19,
            EventType::WriteRowsV0 => 20,
            EventType::UpdateRowsV0 => 21,
            EventType::DeleteRowsV0 => 22,
            EventType::WriteRowsV1 => 23,
            EventType::UpdateRowsV1 => 24,
            EventType::DeleteRowsV1 => 25,
            EventType::Heartbeat => 27,
            EventType::WriteRowsV2 => 30,
            EventType::UpdateRowsV2 => 31,
            EventType::DeleteRowsV2 => 32,
            EventType::AnnotateRows => 0xa0,
            EventType::BinlogCheckpoint => 0xa1,
            EventType::MariadbGtid => 0xa2,
            EventType::MariadbGtidList => 0xa3,
            EventType::Other(code) => *code,
        }
    }

    pub fn is_row_event(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsV0
                | EventType::UpdateRowsV0
                | EventType::DeleteRowsV0
                | EventType::WriteRowsV1
                | EventType::UpdateRowsV1
                | EventType::DeleteRowsV1
                | EventType::WriteRowsV2
                | EventType::UpdateRowsV2
                | EventType::DeleteRowsV2
        )
    }

    /// V2 row events carry an extra-data block after the post-header.
    pub fn is_v2_row_event(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsV2 | EventType::UpdateRowsV2 | EventType::DeleteRowsV2
        )
    }

    pub fn is_update_event(&self) -> bool {
        matches!(
            self,
            EventType::UpdateRowsV0 | EventType::UpdateRowsV1 | EventType::UpdateRowsV2
        )
    }

    pub fn is_delete_event(&self) -> bool {
        matches!(
            self,
            EventType::DeleteRowsV0 | EventType::DeleteRowsV1 | EventType::DeleteRowsV2
        )
    }
}

/// The fixed 19-byte header preceding every event.
#[derive(Debug, Clone)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: EventType,
    pub server_id: u32,
    pub event_size: u32,
    pub next_pos: u32,
    pub flags: u16,
}

impl EventHeader {
    /// Parse a header read at `offset`, applying the structural validations
    /// of the framer: minimum size and known event type range.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self, BinlogError> {
        let mut cursor = ByteCursor::new(data);
        let parse = |cursor: &mut ByteCursor<'_>| -> Result<EventHeader, DecodeError> {
            let timestamp = cursor.u32_le()?;
            let type_code = cursor.u8()?;
            let server_id = cursor.u32_le()?;
            let event_size = cursor.u32_le()?;
            let next_pos = cursor.u32_le()?;
            let flags = cursor.u16_le()?;
            Ok(EventHeader {
                timestamp,
                event_type: EventType::from_u8(type_code),
                server_id,
                event_size,
                next_pos,
                flags,
            })
        };

        let header = parse(&mut cursor).map_err(|_| BinlogError::Truncated { offset })?;

        if header.event_size < BINLOG_EVENT_HDR_LEN {
            return Err(BinlogError::EventTooShort {
                offset,
                size: header.event_size,
            });
        }
        let code = header.event_type.code();
        if code > MAX_EVENT_TYPE_MARIADB10 {
            return Err(BinlogError::UnknownEventType { code, offset });
        }

        Ok(header)
    }
}
