//! Avro schema generation for table versions
//!
//! Every record schema leads with the change metadata fields and then one
//! nullable field per source column:
//!
//! ```json
//! {"GTID": "0-1-5", "timestamp": 1462290, "event_type": "insert", ...columns}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use apache_avro::Schema;
use serde_json::json;
use tracing::debug;

use super::table_map::TableMap;
use crate::error::AvroFileError;

/// Enum symbols for the record's `event_type` field, in wire order.
pub const EVENT_TYPE_SYMBOLS: [&str; 4] = ["insert", "update_before", "update_after", "delete"];

/// Build the JSON schema for one table version.
pub fn record_schema_json(map: &TableMap) -> serde_json::Value {
    let mut fields = vec![
        json!({"name": "GTID", "type": "string"}),
        json!({"name": "timestamp", "type": "int"}),
        json!({
            "name": "event_type",
            "type": {
                "type": "enum",
                "name": "EventType",
                "symbols": EVENT_TYPE_SYMBOLS,
            }
        }),
    ];

    for (name, col_type) in map.column_names.iter().zip(&map.column_types) {
        fields.push(json!({
            "name": name,
            "type": ["null", col_type.avro_type()],
            "default": null,
        }));
    }

    json!({
        "namespace": "ChangeDataSchema.avro",
        "type": "record",
        "name": "ChangeRecord",
        "fields": fields,
    })
}

/// Generate and parse the schema for a table version, returning both the
/// parsed schema and the exact JSON text embedded in container files.
pub fn record_schema(map: &TableMap) -> Result<(Schema, String), AvroFileError> {
    let json = record_schema_json(map);
    let text = json.to_string();
    let schema = Schema::parse_str(&text).map_err(|e| AvroFileError::Schema(e.to_string()))?;
    Ok((schema, text))
}

/// Filename of the `.avsc` sidecar for a table version.
pub fn schema_sidecar_path(avro_dir: &Path, map: &TableMap) -> PathBuf {
    avro_dir.join(format!(
        "{}.{}.{:06}.avsc",
        map.database, map.table, map.version
    ))
}

/// Filename of the `.avro` container for a table version.
pub fn container_path(avro_dir: &Path, map: &TableMap) -> PathBuf {
    avro_dir.join(format!(
        "{}.{}.{:06}.avro",
        map.database, map.table, map.version
    ))
}

/// Write the schema sidecar, once per table version.
pub fn save_schema_sidecar(
    avro_dir: &Path,
    map: &TableMap,
    schema_json: &str,
) -> std::io::Result<()> {
    let path = schema_sidecar_path(avro_dir, map);
    if path.exists() {
        return Ok(());
    }
    debug!(path = %path.display(), "writing schema sidecar");
    fs::write(&path, format!("{schema_json}\n"))
}
