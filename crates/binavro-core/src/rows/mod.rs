//! Row image decoding: packed MySQL row images into typed Avro records.

pub mod decoder;
pub mod value;

pub use decoder::{
    decode_rows_event, parse_rows_header, to_avro_record, RowEventKind, RowRecord,
    RowsEventHeader,
};
pub use value::{decode_value, Datum};
