//! Synthetic binlog construction for integration tests
//!
//! Builds byte-exact MariaDB 10 binlog files: magic, format description,
//! then whatever events a test needs.

use std::path::Path;

/// Builds one binlog file in memory.
pub struct BinlogBuilder {
    data: Vec<u8>,
    server_id: u32,
    timestamp: u32,
}

pub const TEST_TIMESTAMP: u32 = 1_462_290_000;

const HDR_LEN: usize = 19;

impl BinlogBuilder {
    /// Start a binlog: magic plus a format description event.
    pub fn new() -> Self {
        let mut builder = Self {
            data: vec![0xfe, 0x62, 0x69, 0x6e],
            server_id: 1,
            timestamp: TEST_TIMESTAMP,
        };
        builder.format_description();
        builder
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, &self.data).unwrap();
    }

    /// Append one event with a correct header.
    pub fn event(&mut self, event_type: u8, payload: &[u8]) -> &mut Self {
        let event_size = (HDR_LEN + payload.len()) as u32;
        let next_pos = self.data.len() as u32 + event_size;
        self.data.extend_from_slice(&self.timestamp.to_le_bytes());
        self.data.push(event_type);
        self.data.extend_from_slice(&self.server_id.to_le_bytes());
        self.data.extend_from_slice(&event_size.to_le_bytes());
        self.data.extend_from_slice(&next_pos.to_le_bytes());
        self.data.extend_from_slice(&0u16.to_le_bytes());
        self.data.extend_from_slice(payload);
        self
    }

    fn format_description(&mut self) {
        let mut payload = Vec::new();
        payload.extend_from_slice(&4u16.to_le_bytes());
        let mut version = [0u8; 50];
        version[..7].copy_from_slice(b"10.0.23");
        payload.extend_from_slice(&version);
        payload.extend_from_slice(&self.timestamp.to_le_bytes());
        payload.push(19); // event header length

        // Post-header lengths, indexed by event type - 1, through 0xa3.
        let mut lens = vec![0u8; 0xa3];
        lens[2 - 1] = 13; // QUERY
        lens[4 - 1] = 8; // ROTATE
        lens[15 - 1] = 84; // FORMAT_DESCRIPTION
        lens[19 - 1] = 8; // TABLE_MAP
        for code in [23u8, 24, 25] {
            lens[code as usize - 1] = 8; // rows v1
        }
        for code in [30u8, 31, 32] {
            lens[code as usize - 1] = 10; // rows v2
        }
        lens[0xa2 - 1] = 19; // MariaDB GTID
        payload.extend_from_slice(&lens);

        self.event(15, &payload);
    }

    /// MariaDB GTID event; non-standalone GTIDs open a transaction.
    pub fn gtid(&mut self, domain: u32, sequence: u64, standalone: bool) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&sequence.to_le_bytes());
        payload.extend_from_slice(&domain.to_le_bytes());
        payload.push(if standalone { 0x01 } else { 0x00 });
        self.event(0xa2, &payload)
    }

    pub fn query(&mut self, db: &str, sql: &str) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes()); // thread id
        payload.extend_from_slice(&0u32.to_le_bytes()); // exec time
        payload.push(db.len() as u8);
        payload.extend_from_slice(&0u16.to_le_bytes()); // error code
        payload.extend_from_slice(&0u16.to_le_bytes()); // status vars
        payload.extend_from_slice(db.as_bytes());
        payload.push(0);
        payload.extend_from_slice(sql.as_bytes());
        self.event(2, &payload)
    }

    pub fn xid(&mut self, xid: u64) -> &mut Self {
        self.event(16, &xid.to_le_bytes())
    }

    pub fn table_map(
        &mut self,
        table_id: u64,
        db: &str,
        table: &str,
        types: &[u8],
        metadata: &[u8],
    ) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&table_id.to_le_bytes()[..6]);
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.push(db.len() as u8);
        payload.extend_from_slice(db.as_bytes());
        payload.push(0);
        payload.push(table.len() as u8);
        payload.extend_from_slice(table.as_bytes());
        payload.push(0);
        payload.push(types.len() as u8);
        payload.extend_from_slice(types);
        payload.push(metadata.len() as u8);
        payload.extend_from_slice(metadata);
        payload.extend(std::iter::repeat(0u8).take(types.len().div_ceil(8)));
        self.event(19, &payload)
    }

    /// Rows event v1; `body` starts at the column count.
    pub fn rows_v1(&mut self, event_type: u8, table_id: u64, body: &[u8]) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&table_id.to_le_bytes()[..6]);
        payload.extend_from_slice(&1u16.to_le_bytes()); // STMT_END
        payload.extend_from_slice(body);
        self.event(event_type, &payload)
    }

    pub fn write_rows(&mut self, table_id: u64, body: &[u8]) -> &mut Self {
        self.rows_v1(23, table_id, body)
    }

    pub fn update_rows(&mut self, table_id: u64, body: &[u8]) -> &mut Self {
        self.rows_v1(24, table_id, body)
    }

    pub fn delete_rows(&mut self, table_id: u64, body: &[u8]) -> &mut Self {
        self.rows_v1(25, table_id, body)
    }

    pub fn rotate(&mut self, next_file: &str) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&4u64.to_le_bytes());
        payload.extend_from_slice(next_file.as_bytes());
        self.event(4, &payload)
    }

    /// Append an event header whose declared size runs past the end of the
    /// file, with a consistent next_pos so only the payload read fails.
    pub fn truncated_event(&mut self) -> &mut Self {
        let event_size = (HDR_LEN + 64) as u32;
        let next_pos = self.data.len() as u32 + event_size;
        self.data.extend_from_slice(&self.timestamp.to_le_bytes());
        self.data.push(16);
        self.data.extend_from_slice(&self.server_id.to_le_bytes());
        self.data.extend_from_slice(&event_size.to_le_bytes());
        self.data.extend_from_slice(&next_pos.to_le_bytes());
        self.data.extend_from_slice(&0u16.to_le_bytes());
        self.data.extend_from_slice(&[0u8; 10]); // 54 bytes short
        self
    }
}

/// Row image helpers: build rows event bodies.
pub mod body {
    /// Single-column LONG insert image.
    pub fn one_long(value: u32) -> Vec<u8> {
        let mut body = vec![0x01, 0x01, 0x00];
        body.extend_from_slice(&value.to_le_bytes());
        body
    }

    /// `(a INT, b VARCHAR)` image with both columns present.
    pub fn long_and_varchar(a: u32, b: &str) -> Vec<u8> {
        let mut image = vec![0x00]; // null bitmap
        image.extend_from_slice(&a.to_le_bytes());
        image.push(b.len() as u8);
        image.extend_from_slice(b.as_bytes());
        image
    }
}
