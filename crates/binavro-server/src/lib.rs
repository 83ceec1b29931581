//! # binavro-server - CDC serving layer
//!
//! Long-lived client sessions subscribe to the converted record stream over
//! a line-oriented TCP protocol, optionally seeking to a GTID, and receive
//! records either as native Avro container blocks or as JSON rows.
//!
//! The converter signals flushes through a shared [`StreamHub`]; caught-up
//! sessions park on it and resume when fresh blocks land on disk.

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{parse_request, ClientFormat, Request};
pub use server::CdcServer;
pub use session::{DataStream, SessionState, StreamHub, AVRO_DATA_BURST_SIZE};
