//! Table-map registry
//!
//! Associates the table ids delivered by TABLE_MAP_EVENTs with the current
//! table definitions, assigns schema versions, and keeps one open Avro
//! container writer per active table version. Maps are indexed both by slot
//! (`id % MAX_MAPPED_TABLES`) for row event lookup and by `database.table`
//! for replacement on schema change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::avro::{container_path, record_schema, save_schema_sidecar};
use super::ddl::DdlTracker;
use super::table_map::{TableMap, MAX_MAPPED_TABLES};
use crate::container::AvroWriter;
use crate::error::{Result, SchemaError};
use crate::gtid::Gtid;

/// Open output file bundle for one table version.
pub struct AvroTable {
    pub filename: PathBuf,
    pub writer: AvroWriter,
}

/// All table state owned by the conversion worker.
pub struct TableRegistry {
    avro_dir: PathBuf,
    pub ddl: DdlTracker,
    table_maps: HashMap<String, Arc<TableMap>>,
    open_tables: HashMap<String, AvroTable>,
    active_maps: Vec<Option<Arc<TableMap>>>,
}

impl TableRegistry {
    pub fn new(avro_dir: impl AsRef<Path>) -> Self {
        let avro_dir = avro_dir.as_ref().to_path_buf();
        Self {
            ddl: DdlTracker::new(&avro_dir),
            avro_dir,
            table_maps: HashMap::new(),
            open_tables: HashMap::new(),
            active_maps: vec![None; MAX_MAPPED_TABLES],
        }
    }

    /// Handle a TABLE_MAP_EVENT payload.
    ///
    /// Publishes a new map when the table is seen for the first time or its
    /// schema version changed, opening the Avro file for that version.
    /// Returns the table identifier on success.
    pub fn handle_table_map(
        &mut self,
        payload: &[u8],
        post_header_len: u8,
        gtid: Gtid,
    ) -> Result<String> {
        let mut map = TableMap::parse(payload, post_header_len, gtid)?;
        let ident = map.ident();

        let create = self
            .ddl
            .get(&ident)
            .ok_or_else(|| SchemaError::UnknownTable(ident.clone()))?;

        if create.column_names.len() as u64 != map.columns {
            warn!(
                table = %ident,
                ddl_columns = create.column_names.len(),
                map_columns = map.columns,
                "table map and CREATE statement disagree on column count"
            );
            return Err(SchemaError::UnknownTable(ident).into());
        }

        if let Some(existing) = self.table_maps.get(&ident) {
            if existing.version == create.version {
                if existing.id != map.id {
                    // Same shape under a fresh id; re-publish in the slot array.
                    let mut renumbered = (**existing).clone();
                    renumbered.id = map.id;
                    let renumbered = Arc::new(renumbered);
                    self.active_maps[renumbered.slot()] = Some(Arc::clone(&renumbered));
                    self.table_maps.insert(ident.clone(), renumbered);
                }
                return Ok(ident);
            }
        }

        map.column_names = create.column_names.clone();
        map.version = create.version;

        let (_, schema_json) = record_schema(&map)?;
        let filename = container_path(&self.avro_dir, &map);
        let writer = AvroWriter::create_or_append(&filename, &schema_json)?;
        save_schema_sidecar(&self.avro_dir, &map, &schema_json)?;

        info!(
            table = %ident,
            version = map.version,
            file = %filename.display(),
            "opened table version"
        );

        // Flush and drop the previous version's writer before replacing it.
        if let Some(mut old_table) = self.open_tables.remove(&ident) {
            old_table.writer.flush()?;
        }
        if let Some(old_map) = self.table_maps.remove(&ident) {
            self.active_maps[old_map.slot()] = None;
        }

        let map = Arc::new(map);
        self.active_maps[map.slot()] = Some(Arc::clone(&map));
        self.table_maps.insert(ident.clone(), Arc::clone(&map));
        self.open_tables.insert(ident.clone(), AvroTable { filename, writer });

        Ok(ident)
    }

    /// Look up the active map for a row event's table id.
    ///
    /// A slot collision (different id hashed into the same slot) is treated
    /// as no mapping: that row event cannot be decoded safely.
    pub fn active_map(&self, table_id: u64) -> Option<Arc<TableMap>> {
        let slot = (table_id % MAX_MAPPED_TABLES as u64) as usize;
        self.active_maps[slot]
            .as_ref()
            .filter(|map| map.id == table_id)
            .cloned()
    }

    pub fn open_table_mut(&mut self, ident: &str) -> Option<&mut AvroTable> {
        self.open_tables.get_mut(ident)
    }

    /// Flush every open writer's pending block to disk.
    pub fn flush_all(&mut self) -> Result<()> {
        for (ident, table) in &mut self.open_tables {
            if let Err(e) = table.writer.flush() {
                warn!(table = %ident, error = %e, "flush failed, will retry");
                return Err(e.into());
            }
        }
        debug!(tables = self.open_tables.len(), "flushed all tables");
        Ok(())
    }

    /// Mark every writer's block fill level as committed.
    pub fn mark_commit_all(&mut self) {
        for table in self.open_tables.values_mut() {
            table.writer.mark_commit();
        }
    }

    /// Drop records buffered after the last commit in every writer.
    pub fn discard_uncommitted_all(&mut self) {
        for table in self.open_tables.values_mut() {
            table.writer.discard_uncommitted();
        }
    }

    /// Total records buffered across open tables but not yet on disk.
    pub fn pending_records(&self) -> u64 {
        self.open_tables
            .values()
            .map(|t| t.writer.pending_records())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    fn table_map_payload(table_id: u64, db: &str, table: &str, types: &[u8], meta: &[u8]) -> Vec<u8> {
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
        payload.push(meta.len() as u8);
        payload.extend_from_slice(meta);
        payload.extend(std::iter::repeat(0u8).take(types.len().div_ceil(8)));
        payload
    }

    fn registry_with_table(dir: &Path, sql: &str) -> TableRegistry {
        let mut registry = TableRegistry::new(dir);
        registry
            .ddl
            .handle_statement("d", sql, Gtid::new(0, 1, 1))
            .unwrap();
        registry
    }

    #[test]
    fn test_map_for_unknown_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(dir.path());
        let payload = table_map_payload(42, "d", "t", &[3], &[]);
        let err = registry
            .handle_table_map(&payload, 8, Gtid::default())
            .unwrap_err();
        assert!(err.to_string().contains("d.t"));
    }

    #[test]
    fn test_map_opens_versioned_file_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");

        let payload = table_map_payload(42, "d", "t", &[3], &[]);
        let ident = registry
            .handle_table_map(&payload, 8, Gtid::new(0, 1, 2))
            .unwrap();
        assert_eq!(ident, "d.t");

        assert!(dir.path().join("d.t.000001.avro").exists());
        assert!(dir.path().join("d.t.000001.avsc").exists());

        let map = registry.active_map(42).unwrap();
        assert_eq!(map.version, 1);
        assert_eq!(map.column_names, ["a"]);
        assert_eq!(map.column_types, [ColumnType::Long]);
    }

    #[test]
    fn test_same_version_reuses_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");
        let payload = table_map_payload(42, "d", "t", &[3], &[]);
        registry.handle_table_map(&payload, 8, Gtid::default()).unwrap();
        let first = registry.active_map(42).unwrap();

        registry.handle_table_map(&payload, 8, Gtid::default()).unwrap();
        let second = registry.active_map(42).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_new_id_same_version_republishes() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");
        registry
            .handle_table_map(&table_map_payload(42, "d", "t", &[3], &[]), 8, Gtid::default())
            .unwrap();
        registry
            .handle_table_map(&table_map_payload(43, "d", "t", &[3], &[]), 8, Gtid::default())
            .unwrap();
        assert!(registry.active_map(43).is_some());
        assert_eq!(registry.active_map(43).unwrap().version, 1);
    }

    #[test]
    fn test_version_change_opens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");
        registry
            .handle_table_map(&table_map_payload(42, "d", "t", &[3], &[]), 8, Gtid::default())
            .unwrap();

        registry
            .ddl
            .handle_statement("d", "ALTER TABLE t ADD b INT", Gtid::new(0, 1, 3))
            .unwrap();
        registry
            .handle_table_map(
                &table_map_payload(50, "d", "t", &[3, 3], &[]),
                8,
                Gtid::new(0, 1, 3),
            )
            .unwrap();

        assert!(dir.path().join("d.t.000002.avro").exists());
        let map = registry.active_map(50).unwrap();
        assert_eq!(map.version, 2);
        assert_eq!(map.column_names, ["a", "b"]);
        // The old id is no longer active.
        assert!(registry.active_map(42).is_none());
    }

    #[test]
    fn test_column_count_disagreement_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");
        let payload = table_map_payload(42, "d", "t", &[3, 3], &[]);
        assert!(registry
            .handle_table_map(&payload, 8, Gtid::default())
            .is_err());
    }

    #[test]
    fn test_slot_collision_is_no_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with_table(dir.path(), "CREATE TABLE t (a INT)");
        registry
            .handle_table_map(&table_map_payload(42, "d", "t", &[3], &[]), 8, Gtid::default())
            .unwrap();
        // Same slot, different id.
        assert!(registry.active_map(42 + MAX_MAPPED_TABLES as u64).is_none());
    }
}
