//! Conversion driver
//!
//! Pulls events from the framer and routes them: QUERY_EVENTs to the DDL
//! tracker, TABLE_MAP_EVENTs to the registry, row events to the decoder and
//! on to the Avro writers. Commits drive the flush thresholds; rotation
//! moves to the next binlog file; the checkpoint always points at the last
//! committed transaction.

use tracing::{debug, error, info, warn};

use crate::binlog::{
    BinlogReader, EventType, MariadbGtidEvent, RawEvent, RotateEvent, ROW_EVENT_END_STATEMENT,
    TABLE_DUMMY_ID,
};
use crate::checkpoint::ConversionCheckpoint;
use crate::codec::ByteCursor;
use crate::config::ConverterConfig;
use crate::error::{BinlogError, CdcError, Result};
use crate::gtid::Gtid;
use crate::rows::{decode_rows_event, parse_rows_header, to_avro_record};
use crate::schema::ddl::{parse_query_event, DdlOutcome};
use crate::schema::TableRegistry;
use crate::stats::ConverterStats;

/// How a conversion pass over the binlog directory ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The last available binlog file has been fully converted; poll again
    /// once the fetcher has produced more data.
    LastFile,
    /// The current file ends inside a transaction; retry later from the
    /// checkpoint.
    OpenTransaction,
}

enum FileAction {
    /// Switched to another file; keep converting.
    Continue,
    LastFile,
    OpenTransaction,
}

/// The conversion worker state.
pub struct Converter {
    config: ConverterConfig,
    registry: TableRegistry,
    /// Name of the binlog file currently being read.
    binlog_name: String,
    /// Read position; equal to `safe_pos` except inside a transaction.
    current_pos: u64,
    /// Position just past the last committed transaction.
    safe_pos: u64,
    gtid: Gtid,
    pending_transaction: bool,
    row_count: u64,
    trx_count: u64,
    stats: ConverterStats,
    listeners: Vec<Box<dyn Fn() + Send>>,
}

impl Converter {
    /// Create a converter, restoring the checkpoint and the persisted table
    /// definitions when present.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = TableRegistry::new(&config.avro_dir);
        registry.ddl.load()?;

        let checkpoint = ConversionCheckpoint::load(&config.avro_dir)?;
        let (binlog_name, position, gtid) = match checkpoint {
            Some(cp) => {
                info!(file = %cp.file, position = cp.position, gtid = %cp.gtid, "resuming conversion");
                (cp.file, cp.position, cp.gtid)
            }
            None => (config.binlog_file_name(config.start_index), 4, Gtid::default()),
        };

        Ok(Self {
            config,
            registry,
            binlog_name,
            current_pos: position,
            safe_pos: position,
            gtid,
            pending_transaction: false,
            row_count: 0,
            trx_count: 0,
            stats: ConverterStats::default(),
            listeners: Vec::new(),
        })
    }

    /// Register a callback invoked after every flush, used to wake waiting
    /// client sessions.
    pub fn on_flush(&mut self, listener: impl Fn() + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn stats(&self) -> &ConverterStats {
        &self.stats
    }

    pub fn position(&self) -> (&str, u64) {
        (&self.binlog_name, self.current_pos)
    }

    /// Convert until no more binlog data is available.
    ///
    /// Follows rotations across files. On a binlog error the read position
    /// is rewound to the last commit and the error is returned; the caller
    /// retries later from the checkpoint.
    pub fn run_once(&mut self) -> Result<ConversionOutcome> {
        loop {
            match self.convert_file()? {
                FileAction::Continue => continue,
                FileAction::LastFile => return Ok(ConversionOutcome::LastFile),
                FileAction::OpenTransaction => return Ok(ConversionOutcome::OpenTransaction),
            }
        }
    }

    fn convert_file(&mut self) -> Result<FileAction> {
        let path = self.config.binlog_path(&self.binlog_name);
        let mut reader = BinlogReader::open(&path, self.current_pos.max(4))?;
        let start_pos = reader.offset();
        self.current_pos = start_pos;
        debug!(file = %self.binlog_name, offset = start_pos, "converting binlog file");

        let mut rotate_to: Option<String> = None;

        loop {
            let event = match reader.read_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e @ BinlogError::Truncated { .. }) => {
                    error!(
                        file = %self.binlog_name,
                        error = %e,
                        safe_position = self.safe_pos,
                        "binlog stream aborted, rewinding to last commit"
                    );
                    self.registry.discard_uncommitted_all();
                    self.pending_transaction = false;
                    self.current_pos = self.safe_pos;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            self.stats.record_event(event.header.event_type.code());

            match event.header.event_type {
                EventType::Rotate => {
                    match RotateEvent::parse(&event.payload) {
                        Ok(rotate) => {
                            debug!(next = %rotate.next_file, "rotate event");
                            rotate_to = Some(rotate.next_file);
                        }
                        Err(e) => warn!(error = %e, "malformed rotate event"),
                    }
                    self.current_pos = reader.offset();
                    break;
                }
                EventType::Stop => {
                    self.current_pos = reader.offset();
                    break;
                }
                _ => {
                    self.dispatch(&event, &reader)?;
                    self.current_pos = reader.offset();
                }
            }
        }

        if self.pending_transaction {
            debug!(
                file = %self.binlog_name,
                "file ends inside a transaction, rewinding to {}", self.safe_pos
            );
            // The replay from the checkpoint will regenerate these records.
            self.registry.discard_uncommitted_all();
            self.pending_transaction = false;
            self.current_pos = self.safe_pos;
            return Ok(FileAction::OpenTransaction);
        }

        // Everything read so far is committed.
        self.safe_pos = self.current_pos;
        if self.current_pos != start_pos || self.registry.pending_records() > 0 {
            self.flush_and_checkpoint()?;
        }

        let next = rotate_to.or_else(|| self.next_sequential_file());
        match next {
            Some(next) => {
                self.stats.rotates += 1;
                self.stats.files += 1;
                info!(from = %self.binlog_name, to = %next, "switching binlog file");
                self.binlog_name = next;
                self.current_pos = 4;
                self.safe_pos = 4;
                self.flush_and_checkpoint()?;
                Ok(FileAction::Continue)
            }
            None => Ok(FileAction::LastFile),
        }
    }

    fn dispatch(&mut self, event: &RawEvent, reader: &BinlogReader) -> Result<()> {
        let post_header_len = reader
            .format()
            .map(|f| f.post_header_len(event.header.event_type))
            .unwrap_or(0);

        match event.header.event_type {
            EventType::Query => self.handle_query(event),
            EventType::MariadbGtid => {
                match MariadbGtidEvent::parse(&event.payload, event.header.server_id) {
                    Ok(gtid_event) => {
                        self.gtid = gtid_event.gtid;
                        if gtid_event.starts_transaction() {
                            self.pending_transaction = true;
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping malformed GTID event"),
                }
                Ok(())
            }
            EventType::Xid => {
                self.trx_count += 1;
                self.commit(event.header.next_pos as u64)
            }
            EventType::TableMap => {
                if let Err(e) =
                    self.registry
                        .handle_table_map(&event.payload, post_header_len, self.gtid)
                {
                    match e {
                        CdcError::Schema(_) | CdcError::Decode(_) => {
                            error!(error = %e, "dropping table map event");
                            Ok(())
                        }
                        other => Err(other),
                    }
                } else {
                    Ok(())
                }
            }
            t if t.is_row_event() => self.handle_row_event(event, post_header_len),
            _ => Ok(()),
        }
    }

    fn handle_query(&mut self, event: &RawEvent) -> Result<()> {
        let (schema, sql) = match parse_query_event(&event.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "skipping malformed query event");
                return Ok(());
            }
        };

        match self.registry.ddl.handle_statement(&schema, &sql, self.gtid) {
            Ok(DdlOutcome::TransactionBegin) => {
                self.pending_transaction = true;
                Ok(())
            }
            Ok(DdlOutcome::Commit) => {
                // COMMIT against a non-transactional table; the preceding
                // row events are committed.
                self.trx_count += 1;
                self.commit(event.header.next_pos as u64)
            }
            Ok(_) => Ok(()),
            Err(CdcError::Schema(e)) => {
                error!(error = %e, "DDL statement not applied");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn handle_row_event(&mut self, event: &RawEvent, post_header_len: u8) -> Result<()> {
        let mut cursor = ByteCursor::new(&event.payload);
        let rows_header = match parse_rows_header(&mut cursor, post_header_len) {
            Ok(h) => h,
            Err(e) => {
                error!(error = %e, "skipping undecodable row event");
                return Ok(());
            }
        };

        if rows_header.table_id == TABLE_DUMMY_ID
            && rows_header.flags & ROW_EVENT_END_STATEMENT != 0
        {
            // Release-all-maps sentinel; produces no records.
            return Ok(());
        }

        let Some(map) = self.registry.active_map(rows_header.table_id) else {
            error!(
                table_id = rows_header.table_id,
                "row event for unmapped table id, skipping event"
            );
            return Ok(());
        };

        let records = match decode_rows_event(event.header.event_type, &map, &mut cursor) {
            Ok(records) => records,
            Err(e) => {
                error!(table = %map.ident(), error = %e, "skipping undecodable row event");
                return Ok(());
            }
        };

        let ident = map.ident();
        let Some(table) = self.registry.open_table_mut(&ident) else {
            error!(table = %ident, "no open Avro file for table, skipping event");
            return Ok(());
        };

        for record in records {
            let value = to_avro_record(record, &self.gtid, event.header.timestamp, &map.column_names);
            if let Err(e) = table.writer.append_record(value) {
                error!(table = %ident, error = %e, "failed to append record");
                return Ok(());
            }
            self.gtid.event_num += 1;
            self.row_count += 1;
            self.stats.rows += 1;
        }

        Ok(())
    }

    /// A transaction committed at `next_pos`.
    fn commit(&mut self, next_pos: u64) -> Result<()> {
        self.pending_transaction = false;
        self.safe_pos = next_pos;
        self.stats.transactions += 1;
        self.registry.mark_commit_all();

        if self.row_count >= self.config.row_target || self.trx_count >= self.config.trx_target {
            debug!(
                rows = self.row_count,
                transactions = self.trx_count,
                "flush threshold reached"
            );
            self.flush_and_checkpoint()?;
        }
        Ok(())
    }

    /// Flush all writers, wake clients, persist the checkpoint.
    fn flush_and_checkpoint(&mut self) -> Result<()> {
        self.registry.flush_all()?;
        for listener in &self.listeners {
            listener();
        }
        ConversionCheckpoint {
            file: self.binlog_name.clone(),
            position: self.safe_pos,
            gtid: self.gtid,
        }
        .save(&self.config.avro_dir)?;
        self.row_count = 0;
        self.trx_count = 0;
        Ok(())
    }

    /// The next sequentially numbered binlog file, if it exists on disk.
    fn next_sequential_file(&self) -> Option<String> {
        let index = self.config.binlog_index(&self.binlog_name)?;
        let next = self.config.binlog_file_name(index + 1);
        self.config.binlog_path(&next).is_file().then_some(next)
    }
}
