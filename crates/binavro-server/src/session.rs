//! Client session engine
//!
//! Every connection walks the same state machine:
//!
//! ```text
//! Unregistered --REGISTER--> Registered --REQUEST-DATA--> RequestData
//!      any ------------------(protocol or I/O error)----> Errored
//! ```
//!
//! In `RequestData` the session streams the requested table's container
//! files: whole raw blocks for Avro clients, one JSON object per record for
//! JSON clients, rotating to the next schema version file as it appears.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use apache_avro::types::Value;
use binavro_core::container::AvroReader;
use binavro_core::Gtid;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::protocol::ClientFormat;

/// Upper bound on bytes sent per drain cycle, so one catching-up client
/// cannot monopolize its connection task.
pub const AVRO_DATA_BURST_SIZE: usize = 32 * 1024;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unregistered,
    Registered,
    RequestData,
    Errored,
}

/// Shared handle connecting the converter to waiting client sessions.
pub struct StreamHub {
    avro_dir: PathBuf,
    notify: Notify,
}

impl StreamHub {
    pub fn new(avro_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            avro_dir: avro_dir.into(),
            notify: Notify::new(),
        })
    }

    pub fn avro_dir(&self) -> &PathBuf {
        &self.avro_dir
    }

    /// Wake every session waiting for fresh data. Called by the converter
    /// after each flush; safe to call from a blocking thread.
    pub fn notify_data(&self) {
        self.notify.notify_waiters();
    }

    /// Wait until the converter reports fresh data.
    pub async fn wait_for_data(&self) {
        self.notify.notified().await;
    }
}

/// Result of one drain cycle.
#[derive(Debug, Clone, Copy)]
pub struct StreamProgress {
    pub bytes_sent: usize,
    /// False when the stream is caught up and should wait for new data.
    pub more: bool,
}

/// Streaming state for one `RequestData` session.
pub struct DataStream {
    hub: Arc<StreamHub>,
    format: ClientFormat,
    /// Table part of the filename, `db.table`.
    base: String,
    version: u32,
    reader: AvroReader,
    /// Pending seek target; cleared after the first matching row is sent.
    seek: Option<Gtid>,
    /// GTID of the last row emitted (JSON path).
    last_gtid: Option<Gtid>,
}

impl DataStream {
    /// Resolve a REQUEST-DATA file stem and open the container.
    ///
    /// A stem without a trailing six-digit version defaults to `000001`.
    /// Returns the offending filename when the file does not exist, so the
    /// caller can reply `ERR NO-FILE`.
    pub fn open(
        hub: Arc<StreamHub>,
        filestem: &str,
        format: ClientFormat,
        seek: Option<Gtid>,
    ) -> Result<Self, String> {
        let (base, version) = split_versioned_stem(filestem);
        let filename = container_file_name(&base, version);
        let path = hub.avro_dir().join(&filename);
        if !path.is_file() {
            return Err(filename);
        }
        let reader = AvroReader::open(&path).map_err(|_| filename)?;

        debug!(file = %path.display(), ?format, "opened stream");
        Ok(Self {
            hub,
            format,
            base,
            version,
            reader,
            seek,
            last_gtid: None,
        })
    }

    pub fn last_gtid(&self) -> Option<Gtid> {
        self.last_gtid
    }

    /// Send the schema preamble for the current file: the JSON schema text
    /// for JSON clients, the container header bytes for Avro clients.
    pub async fn send_preamble<W>(&mut self, out: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self.format {
            ClientFormat::Json => {
                let mut schema = self.reader.header().schema_json.clone();
                schema.push('\n');
                out.write_all(schema.as_bytes()).await?;
            }
            ClientFormat::Avro => {
                let header = self.reader.header_bytes().context("reading header")?;
                out.write_all(&header).await?;
            }
        }
        out.flush().await?;
        Ok(())
    }

    /// Drain up to [`AVRO_DATA_BURST_SIZE`] bytes of records to the client.
    pub async fn drain<W>(&mut self, out: &mut W) -> anyhow::Result<StreamProgress>
    where
        W: AsyncWrite + Unpin,
    {
        let mut sent = 0;

        while sent < AVRO_DATA_BURST_SIZE {
            let block = match self.reader.next_block().context("reading block")? {
                Some(block) => block,
                None => {
                    if self.rotate_to_next_version()? {
                        self.send_preamble(out).await?;
                        continue;
                    }
                    out.flush().await?;
                    return Ok(StreamProgress {
                        bytes_sent: sent,
                        more: false,
                    });
                }
            };

            match self.format {
                ClientFormat::Avro => {
                    out.write_all(&block.raw).await?;
                    sent += block.raw.len();
                }
                ClientFormat::Json => {
                    let records = block
                        .decode_records(self.reader.schema())
                        .context("decoding block")?;
                    for record in records {
                        let gtid = record_gtid(&record);
                        if let Some(seek) = self.seek {
                            match gtid {
                                Some(row) if row.reaches(&seek) => self.seek = None,
                                _ => {
                                    trace!(requested = %seek, "seeking past row");
                                    continue;
                                }
                            }
                        }
                        let mut line = avro_value_to_json(&record).to_string();
                        line.push('\n');
                        out.write_all(line.as_bytes()).await?;
                        sent += line.len();
                        self.last_gtid = gtid.or(self.last_gtid);
                    }
                }
            }
        }

        out.flush().await?;
        Ok(StreamProgress {
            bytes_sent: sent,
            more: true,
        })
    }

    /// Move to the next schema version's file when it exists.
    fn rotate_to_next_version(&mut self) -> anyhow::Result<bool> {
        let next_version = self.version + 1;
        let path = self
            .hub
            .avro_dir()
            .join(container_file_name(&self.base, next_version));
        if !path.is_file() {
            return Ok(false);
        }

        let reader = AvroReader::open(&path)
            .map_err(|e| anyhow!("opening next version {}: {e}", path.display()))?;
        debug!(file = %path.display(), "rotating to next table version");
        self.version = next_version;
        self.reader = reader;
        Ok(true)
    }
}

/// Split `db.table.000002` into `(db.table, 2)`; a stem without a version
/// suffix maps to version 1.
fn split_versioned_stem(filestem: &str) -> (String, u32) {
    if let Some((base, suffix)) = filestem.rsplit_once('.') {
        if suffix.len() == 6 && suffix.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(version) = suffix.parse() {
                return (base.to_string(), version);
            }
        }
    }
    (filestem.to_string(), 1)
}

fn container_file_name(base: &str, version: u32) -> String {
    format!("{base}.{version:06}.avro")
}

/// Pull the GTID triplet out of a decoded record.
fn record_gtid(record: &Value) -> Option<Gtid> {
    let Value::Record(fields) = record else {
        return None;
    };
    fields.iter().find_map(|(name, value)| {
        if name == "GTID" {
            if let Value::String(s) = value {
                return s.parse().ok();
            }
        }
        None
    })
}

/// Render a decoded Avro value as JSON for the line-oriented stream.
fn avro_value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int(v) => Json::from(*v),
        Value::Long(v) => Json::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v as f64)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) | Value::Fixed(_, b) => {
            Json::String(String::from_utf8_lossy(b).to_string())
        }
        Value::Enum(_, symbol) => Json::String(symbol.clone()),
        Value::Union(_, inner) => avro_value_to_json(inner),
        Value::Array(items) => Json::Array(items.iter().map(avro_value_to_json).collect()),
        Value::Record(fields) => Json::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), avro_value_to_json(value)))
                .collect(),
        ),
        other => Json::String(format!("{other:?}")),
    }
}
