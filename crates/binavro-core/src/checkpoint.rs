//! Resumable conversion checkpoint
//!
//! A tiny INI-shaped file, `avro-conversion.ini`, records the binlog file,
//! byte offset and GTID of the last committed transaction. Updates go
//! through a temp file and rename so the checkpoint on disk is always
//! complete.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CdcError, Result};
use crate::gtid::Gtid;

/// Name of the checkpoint file inside the Avro directory.
pub const CHECKPOINT_FILE: &str = "avro-conversion.ini";

const SECTION: &str = "[avro-conversion]";

/// Position the conversion can safely resume from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCheckpoint {
    pub file: String,
    pub position: u64,
    pub gtid: Gtid,
}

impl ConversionCheckpoint {
    pub fn path(avro_dir: &Path) -> PathBuf {
        avro_dir.join(CHECKPOINT_FILE)
    }

    /// Load the checkpoint, `None` when no conversion has run yet.
    pub fn load(avro_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(avro_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text).map(Some)
    }

    fn parse(text: &str) -> Result<Self> {
        let mut in_section = false;
        let mut file = None;
        let mut position = None;
        let mut gtid = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                in_section = line == SECTION;
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "file" => file = Some(value.trim().to_string()),
                "position" => {
                    position = Some(value.trim().parse::<u64>().map_err(|_| {
                        CdcError::config(format!("bad checkpoint position '{value}'"))
                    })?)
                }
                "gtid" => {
                    gtid = Some(
                        value
                            .trim()
                            .parse::<Gtid>()
                            .map_err(CdcError::config)?,
                    )
                }
                _ => {}
            }
        }

        match (file, position) {
            (Some(file), Some(position)) => Ok(Self {
                file,
                position,
                gtid: gtid.unwrap_or_default(),
            }),
            _ => Err(CdcError::config("checkpoint file is missing keys")),
        }
    }

    /// Persist atomically: write a temp file, fsync, rename into place.
    pub fn save(&self, avro_dir: &Path) -> Result<()> {
        let path = Self::path(avro_dir);
        let tmp = path.with_extension("tmp");

        let body = format!(
            "{SECTION}\nposition={}\ngtid={}\nfile={}\n",
            self.position,
            self.gtid.with_event_num(),
            self.file
        );

        {
            use std::io::Write;
            let mut f = fs::File::create(&tmp)?;
            f.write_all(body.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(file = %self.file, position = self.position, "checkpoint saved");
        Ok(())
    }
}
