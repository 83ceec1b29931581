//! # binavro-core - MariaDB binlog to Avro CDC conversion
//!
//! Continuously reads a MariaDB 10 row-based binlog stream from a local
//! directory and converts every data modification into schema-aware records
//! in Avro object-container files, one file per table schema version.
//!
//! ## Architecture
//!
//! ```text
//! binlog files ── BinlogReader ──┬── QUERY_EVENT ──► DdlTracker
//!                                ├── TABLE_MAP   ──► TableRegistry ──► AvroWriter
//!                                └── ROW events  ──► rows::decoder ──► AvroWriter
//!                     Converter drives the loop, checkpoints, flushes
//! ```
//!
//! The serving layer in `binavro-server` reads the produced container files
//! back with [`container::AvroReader`] and streams them to CDC clients.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use binavro_core::{Converter, ConverterConfig};
//!
//! # fn main() -> binavro_core::Result<()> {
//! let config = ConverterConfig::new("/var/lib/binlogs", "/var/lib/avro")
//!     .with_filestem("binlog")
//!     .with_row_target(1000)
//!     .with_trx_target(50);
//!
//! let mut converter = Converter::new(config)?;
//! converter.run_once()?;
//! # Ok(())
//! # }
//! ```

pub mod binlog;
pub mod checkpoint;
pub mod codec;
pub mod column;
pub mod config;
pub mod container;
pub mod convert;
pub mod error;
pub mod gtid;
pub mod rows;
pub mod schema;
pub mod stats;

pub use checkpoint::{ConversionCheckpoint, CHECKPOINT_FILE};
pub use column::ColumnType;
pub use config::ConverterConfig;
pub use convert::{ConversionOutcome, Converter};
pub use error::{AvroFileError, BinlogError, CdcError, DecodeError, Result, SchemaError};
pub use gtid::Gtid;
pub use stats::ConverterStats;
