//! Schema tracking: DDL interpretation, table maps, Avro schema generation.

pub mod avro;
pub mod ddl;
pub mod registry;
pub mod table_map;

pub use ddl::{DdlOutcome, DdlTracker, TableCreate, DDL_LIST_FILE};
pub use registry::{AvroTable, TableRegistry};
pub use table_map::{TableMap, MAX_MAPPED_TABLES};
