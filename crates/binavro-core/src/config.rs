//! Converter configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CdcError, Result};

/// Default number of row records that triggers a flush.
pub const DEFAULT_ROW_TARGET: u64 = 1000;

/// Default number of transactions that triggers a flush.
pub const DEFAULT_TRX_TARGET: u64 = 50;

/// Settings for the binlog-to-Avro conversion loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Directory the binlog files are read from.
    pub binlog_dir: PathBuf,
    /// Directory the Avro files, schemas and state files are written to.
    pub avro_dir: PathBuf,
    /// Root of the binlog filenames, e.g. `binlog` for `binlog.000001`.
    pub filestem: String,
    /// Sequence number of the first binlog file.
    pub start_index: u32,
    /// Flush all tables once this many records have been written.
    pub row_target: u64,
    /// Flush all tables once this many transactions have committed.
    pub trx_target: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binlog_dir: PathBuf::from("."),
            avro_dir: PathBuf::from("."),
            filestem: "binlog".to_string(),
            start_index: 1,
            row_target: DEFAULT_ROW_TARGET,
            trx_target: DEFAULT_TRX_TARGET,
        }
    }
}

impl ConverterConfig {
    pub fn new(binlog_dir: impl Into<PathBuf>, avro_dir: impl Into<PathBuf>) -> Self {
        Self {
            binlog_dir: binlog_dir.into(),
            avro_dir: avro_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_filestem(mut self, filestem: impl Into<String>) -> Self {
        self.filestem = filestem.into();
        self
    }

    pub fn with_start_index(mut self, index: u32) -> Self {
        self.start_index = index;
        self
    }

    pub fn with_row_target(mut self, target: u64) -> Self {
        self.row_target = target;
        self
    }

    pub fn with_trx_target(mut self, target: u64) -> Self {
        self.trx_target = target;
        self
    }

    /// Binlog filename for a sequence number: `{filestem}.{seq:06}`.
    pub fn binlog_file_name(&self, index: u32) -> String {
        format!("{}.{:06}", self.filestem, index)
    }

    /// Sequence number parsed from a binlog filename produced by
    /// [`Self::binlog_file_name`].
    pub fn binlog_index(&self, name: &str) -> Option<u32> {
        let suffix = name.strip_prefix(&self.filestem)?.strip_prefix('.')?;
        suffix.parse().ok()
    }

    pub fn binlog_path(&self, name: &str) -> PathBuf {
        self.binlog_dir.join(name)
    }

    /// Check directories and create the Avro directory if needed.
    pub fn validate(&self) -> Result<()> {
        if !self.binlog_dir.is_dir() {
            return Err(CdcError::config(format!(
                "binlog directory '{}' does not exist",
                self.binlog_dir.display()
            )));
        }
        if self.filestem.is_empty() {
            return Err(CdcError::config("binlog filestem must not be empty"));
        }
        if self.row_target == 0 || self.trx_target == 0 {
            return Err(CdcError::config("flush targets must be positive"));
        }
        ensure_dir(&self.avro_dir)
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binlog_file_name_six_digits() {
        let cfg = ConverterConfig::default().with_filestem("mysql-bin");
        assert_eq!(cfg.binlog_file_name(1), "mysql-bin.000001");
        assert_eq!(cfg.binlog_file_name(123456), "mysql-bin.123456");
    }

    #[test]
    fn test_binlog_index_round_trip() {
        let cfg = ConverterConfig::default();
        assert_eq!(cfg.binlog_index("binlog.000042"), Some(42));
        assert_eq!(cfg.binlog_index("binlog.x"), None);
        assert_eq!(cfg.binlog_index("other.000001"), None);
    }

    #[test]
    fn test_validate_creates_avro_dir() {
        let dir = tempfile::tempdir().unwrap();
        let avro_dir = dir.path().join("avro");
        let cfg = ConverterConfig::new(dir.path(), &avro_dir);
        cfg.validate().unwrap();
        assert!(avro_dir.is_dir());
    }

    #[test]
    fn test_validate_rejects_missing_binlog_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConverterConfig::new(dir.path().join("nope"), dir.path());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_targets() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConverterConfig::new(dir.path(), dir.path()).with_row_target(0);
        assert!(cfg.validate().is_err());
    }
}
