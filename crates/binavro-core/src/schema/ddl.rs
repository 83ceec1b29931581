//! DDL tracking
//!
//! Recognizes `CREATE TABLE` and `ALTER TABLE` statements from QUERY_EVENTs,
//! maintains the versioned [`TableCreate`] definitions, and persists the
//! definitive list of CREATE statements to `table-ddl.list` so that table
//! definitions survive a restart.
//!
//! Only structural recognition is done here: column names in source order.
//! Anything beyond that is out of scope for the converter.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::codec::ByteCursor;
use crate::error::{DecodeError, SchemaError};
use crate::gtid::Gtid;

/// Name of the sidecar file holding the definitive CREATE statements.
pub const DDL_LIST_FILE: &str = "table-ddl.list";

/// Highest schema version before the six-digit filename field overflows.
pub const TABLE_VERSION_MAX: u32 = 999_999;

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*create\s+(or\s+replace\s+)?(temporary\s+)?table\s+").unwrap()
    })
}

fn alter_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*alter\s+(online\s+)?(ignore\s+)?table\s+").unwrap())
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--[^\n]*").unwrap())
}

/// Extract the default schema name and SQL text from a QUERY_EVENT payload.
///
/// Post-header layout: thread id (4), execution time (4), schema name length
/// (1), error code (2), status variable block length (2), then the status
/// variables, the NUL-terminated schema name, and the SQL text.
pub fn parse_query_event(payload: &[u8]) -> Result<(String, String), DecodeError> {
    let mut cursor = ByteCursor::new(payload);
    cursor.skip(8)?;
    let db_name_len = cursor.u8()? as usize;
    cursor.skip(2)?;
    let varblock_len = cursor.u16_le()? as usize;
    cursor.skip(varblock_len)?;
    let db_name = cursor.take(db_name_len)?;
    cursor.skip(1)?; // NUL terminator
    let sql = cursor.take(cursor.remaining())?;
    Ok((
        String::from_utf8_lossy(db_name).to_string(),
        String::from_utf8_lossy(sql).to_string(),
    ))
}

/// Unify whitespace and strip comments so recognition sees one clean line.
pub fn normalize_sql(sql: &str) -> String {
    let no_line_comments = line_comment_re().replace_all(sql, " ");
    let no_comments = block_comment_re().replace_all(&no_line_comments, " ");
    let mut out = String::with_capacity(no_comments.len());
    let mut last_was_space = true;
    for ch in no_comments.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Statement kinds the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlStatement {
    Begin,
    Commit,
    Create,
    Alter,
    Other,
}

/// Classify a normalized statement.
pub fn classify(sql: &str) -> DdlStatement {
    let trimmed = sql.trim();
    if trimmed.eq_ignore_ascii_case("begin") {
        DdlStatement::Begin
    } else if trimmed.eq_ignore_ascii_case("commit") {
        DdlStatement::Commit
    } else if create_table_re().is_match(trimmed) {
        DdlStatement::Create
    } else if alter_table_re().is_match(trimmed) {
        DdlStatement::Alter
    } else {
        DdlStatement::Other
    }
}

/// One `database.table` definition as observed from DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCreate {
    pub database: String,
    pub table: String,
    /// Column names in source order; always equals the column count.
    pub column_names: Vec<String>,
    /// The stored DDL text, whitespace-unified and schema-qualified.
    pub definition: String,
    /// Monotonic counter incremented on every schema-affecting change.
    pub version: u32,
    /// GTID at which this definition last changed.
    pub gtid: Gtid,
}

impl TableCreate {
    /// `database.table`, the key used by every registry in the converter.
    pub fn ident(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Parse a normalized `CREATE TABLE` statement.
    ///
    /// `default_db` qualifies a bare table name; the stored definition is
    /// rewritten to carry the qualified identifier so the list file can be
    /// replayed without context.
    pub fn from_create_statement(
        default_db: &str,
        sql: &str,
        gtid: Gtid,
    ) -> Result<Self, SchemaError> {
        let m = create_table_re()
            .find(sql)
            .ok_or_else(|| SchemaError::MalformedStatement(truncate_for_log(sql)))?;
        let rest = &sql[m.end()..];

        let (ident_len, database, table) = parse_table_identifier(rest, default_db)?;

        let definition_body = &rest[ident_len..];
        let column_names = parse_column_names(definition_body)?;
        if column_names.is_empty() {
            return Err(SchemaError::MalformedStatement(truncate_for_log(sql)));
        }

        // Store the statement with an explicit database so replaying the
        // list file needs no default schema.
        let definition = format!(
            "{}{}.{}{}",
            &sql[..m.end()],
            database,
            table,
            definition_body
        );

        Ok(Self {
            database,
            table,
            column_names,
            definition,
            version: 1,
            gtid,
        })
    }

    /// Apply an `ALTER TABLE` statement to the stored column list.
    ///
    /// Add, drop and rename transformations are applied in source order.
    /// Returns true when the statement affected the schema, in which case
    /// the version has been incremented.
    pub fn apply_alter(&mut self, sql: &str, gtid: Gtid) -> Result<bool, SchemaError> {
        let m = alter_table_re()
            .find(sql)
            .ok_or_else(|| SchemaError::MalformedStatement(truncate_for_log(sql)))?;
        let rest = &sql[m.end()..];
        let (ident_len, _, _) = parse_table_identifier(rest, &self.database)?;
        let operations = &rest[ident_len..];

        let mut changed = false;
        for op in split_top_level(operations) {
            if self.apply_alter_operation(op.trim()) {
                changed = true;
            }
        }

        if changed {
            if self.version >= TABLE_VERSION_MAX {
                return Err(SchemaError::VersionOverflow(self.ident()));
            }
            self.version += 1;
            self.gtid = gtid;
        }
        Ok(changed)
    }

    fn apply_alter_operation(&mut self, op: &str) -> bool {
        let mut tokens = op.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return false;
        };

        match keyword.to_ascii_uppercase().as_str() {
            "ADD" => {
                let mut next = tokens.next();
                if next.is_some_and(|t| t.eq_ignore_ascii_case("column")) {
                    next = tokens.next();
                }
                let Some(name) = next else { return false };
                if is_constraint_keyword(name) {
                    return false;
                }
                self.column_names.push(strip_backticks(name).to_string());
                true
            }
            "DROP" => {
                let mut next = tokens.next();
                if next.is_some_and(|t| t.eq_ignore_ascii_case("column")) {
                    next = tokens.next();
                }
                let Some(name) = next else { return false };
                if is_constraint_keyword(name) {
                    return false;
                }
                let name = strip_backticks(name);
                let before = self.column_names.len();
                self.column_names.retain(|c| c != name);
                before != self.column_names.len()
            }
            "CHANGE" => {
                let mut next = tokens.next();
                if next.is_some_and(|t| t.eq_ignore_ascii_case("column")) {
                    next = tokens.next();
                }
                let (Some(old), Some(new)) = (next, tokens.next()) else {
                    return false;
                };
                self.rename_column(strip_backticks(old), strip_backticks(new))
            }
            "RENAME" => {
                // RENAME COLUMN old TO new
                let Some(second) = tokens.next() else {
                    return false;
                };
                if !second.eq_ignore_ascii_case("column") {
                    return false;
                }
                let old = tokens.next();
                let to = tokens.next();
                let new = tokens.next();
                if !to.is_some_and(|t| t.eq_ignore_ascii_case("to")) {
                    return false;
                }
                let (Some(old), Some(new)) = (old, new) else {
                    return false;
                };
                self.rename_column(strip_backticks(old), strip_backticks(new))
            }
            // MODIFY changes a column type without renaming; still a new shape.
            "MODIFY" => true,
            _ => false,
        }
    }

    fn rename_column(&mut self, old: &str, new: &str) -> bool {
        for name in &mut self.column_names {
            if name == old {
                *name = new.to_string();
                return true;
            }
        }
        false
    }
}

/// Parse a possibly backtick-quoted, possibly schema-qualified identifier.
/// Returns the consumed length and the resolved `(database, table)` pair.
fn parse_table_identifier(
    rest: &str,
    default_db: &str,
) -> Result<(usize, String, String), SchemaError> {
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    let raw = rest[..end].trim();
    if raw.is_empty() {
        return Err(SchemaError::MalformedStatement(truncate_for_log(rest)));
    }

    let (database, table) = match raw.split_once('.') {
        Some((db, tbl)) => (strip_backticks(db).to_string(), strip_backticks(tbl)),
        None => (default_db.to_string(), strip_backticks(raw)),
    };
    if database.is_empty() || table.is_empty() {
        return Err(SchemaError::MalformedStatement(truncate_for_log(rest)));
    }
    Ok((end, database, table.to_string()))
}

/// Extract column names from a CREATE TABLE definition body.
///
/// The body starts at or before the outermost `(`. Each top-level
/// comma-separated item contributes a column when its first token is a bare
/// identifier; index and constraint clauses are skipped. Nested parentheses
/// in type lists such as `ENUM('a','b,c')` and `DECIMAL(10,2)` are honored.
fn parse_column_names(body: &str) -> Result<Vec<String>, SchemaError> {
    let Some((open, close)) = find_outer_parens(body) else {
        return Err(SchemaError::MalformedStatement(truncate_for_log(body)));
    };
    let list = &body[open + 1..close];

    let mut names = Vec::new();
    for item in split_top_level(list) {
        let item = item.trim();
        let Some(first) = item.split(|c: char| c.is_whitespace() || c == '(').next() else {
            continue;
        };
        if first.is_empty() || is_constraint_keyword(first) {
            continue;
        }
        names.push(strip_backticks(first).to_string());
    }
    Ok(names)
}

fn is_constraint_keyword(token: &str) -> bool {
    matches!(
        token.to_ascii_uppercase().as_str(),
        "PRIMARY" | "KEY" | "INDEX" | "CONSTRAINT" | "FOREIGN" | "UNIQUE" | "FULLTEXT" | "SPATIAL"
    )
}

fn strip_backticks(ident: &str) -> &str {
    ident.trim_matches('`')
}

/// Locate the outermost parenthesized span, tracking depth and quoted
/// strings so a `)` inside `ENUM('a)')` does not close the list.
fn find_outer_parens(s: &str) -> Option<(usize, usize)> {
    let mut depth = 0i32;
    let mut open = None;
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' => {
                if depth == 0 && open.is_none() {
                    open = Some(i);
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return open.map(|o| (o, i));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas at parenthesis depth zero, outside quoted strings.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() {
        parts.push(&s[start..]);
    }
    parts
}

fn truncate_for_log(sql: &str) -> String {
    const MAX: usize = 120;
    if sql.len() > MAX {
        format!("{}...", &sql[..MAX])
    } else {
        sql.to_string()
    }
}

/// Outcome of routing one QUERY_EVENT through the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlOutcome {
    TransactionBegin,
    Commit,
    TableCreated(String),
    TableAltered(String),
    Ignored,
}

/// Owns every [`TableCreate`] observed and the `table-ddl.list` sidecar.
pub struct DdlTracker {
    tables: HashMap<String, TableCreate>,
    avro_dir: PathBuf,
    list_path: PathBuf,
}

impl DdlTracker {
    pub fn new(avro_dir: impl AsRef<Path>) -> Self {
        let avro_dir = avro_dir.as_ref().to_path_buf();
        Self {
            tables: HashMap::new(),
            list_path: avro_dir.join(DDL_LIST_FILE),
            avro_dir,
        }
    }

    pub fn get(&self, ident: &str) -> Option<&TableCreate> {
        self.tables.get(ident)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Replay the persisted CREATE statements. Returns how many loaded.
    pub fn load(&mut self) -> std::io::Result<usize> {
        let text = match fs::read_to_string(&self.list_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut loaded = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match TableCreate::from_create_statement("", line, Gtid::default()) {
                Ok(mut create) => {
                    // The persisted statement is the latest definition; its
                    // version is whatever table version is newest on disk.
                    create.version = self
                        .highest_converted_version(&create.database, &create.table)
                        .unwrap_or(1);
                    self.tables.insert(create.ident(), create);
                    loaded += 1;
                }
                Err(e) => warn!(error = %e, "skipping unparseable line in {DDL_LIST_FILE}"),
            }
        }
        info!(tables = loaded, "restored table definitions");
        Ok(loaded)
    }

    /// Scan the Avro directory for the highest converted version of a table.
    fn highest_converted_version(&self, database: &str, table: &str) -> Option<u32> {
        let prefix = format!("{database}.{table}.");
        let entries = fs::read_dir(&self.avro_dir).ok()?;
        entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let version = name.strip_prefix(&prefix)?.strip_suffix(".avro")?;
                (version.len() == 6).then(|| version.parse::<u32>().ok())?
            })
            .max()
    }

    /// Route one QUERY_EVENT statement through the tracker.
    pub fn handle_statement(
        &mut self,
        default_db: &str,
        sql: &str,
        gtid: Gtid,
    ) -> crate::error::Result<DdlOutcome> {
        let sql = normalize_sql(sql);
        match classify(&sql) {
            DdlStatement::Begin => Ok(DdlOutcome::TransactionBegin),
            DdlStatement::Commit => Ok(DdlOutcome::Commit),
            DdlStatement::Create => {
                let create = TableCreate::from_create_statement(default_db, &sql, gtid)?;
                let ident = create.ident();
                debug!(table = %ident, columns = create.column_names.len(), "CREATE TABLE");
                self.insert_create(create);
                self.persist()?;
                Ok(DdlOutcome::TableCreated(ident))
            }
            DdlStatement::Alter => {
                let ident = self.alter_target(default_db, &sql)?;
                let create = self
                    .tables
                    .get_mut(&ident)
                    .ok_or_else(|| SchemaError::AlterBeforeCreate(ident.clone()))?;
                if create.apply_alter(&sql, gtid)? {
                    debug!(table = %ident, version = create.version, "ALTER TABLE");
                    Ok(DdlOutcome::TableAltered(ident))
                } else {
                    Ok(DdlOutcome::Ignored)
                }
            }
            DdlStatement::Other => Ok(DdlOutcome::Ignored),
        }
    }

    fn alter_target(&self, default_db: &str, sql: &str) -> Result<String, SchemaError> {
        let m = alter_table_re()
            .find(sql)
            .ok_or_else(|| SchemaError::MalformedStatement(truncate_for_log(sql)))?;
        let (_, db, table) = parse_table_identifier(&sql[m.end()..], default_db)?;
        Ok(format!("{db}.{table}"))
    }

    fn insert_create(&mut self, mut create: TableCreate) {
        if let Some(prior) = self.tables.get(&create.ident()) {
            create.version = prior.version + 1;
        }
        self.tables.insert(create.ident(), create);
    }

    /// Write the definitive list of CREATE statements, most recent per
    /// table, via write-to-temp and rename.
    pub fn persist(&self) -> std::io::Result<()> {
        let tmp_path = self.list_path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            let mut idents: Vec<_> = self.tables.keys().collect();
            idents.sort();
            for ident in idents {
                writeln!(file, "{}", self.tables[ident].definition)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.list_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(sql: &str) -> TableCreate {
        TableCreate::from_create_statement("test", &normalize_sql(sql), Gtid::new(0, 1, 1)).unwrap()
    }

    #[test]
    fn test_parse_query_event_payload() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&7u32.to_le_bytes()); // thread id
        payload.extend_from_slice(&0u32.to_le_bytes()); // exec time
        payload.push(4); // db name length
        payload.extend_from_slice(&0u16.to_le_bytes()); // error code
        payload.extend_from_slice(&2u16.to_le_bytes()); // status var length
        payload.extend_from_slice(&[0xaa, 0xbb]); // status vars
        payload.extend_from_slice(b"mydb\0");
        payload.extend_from_slice(b"BEGIN");

        let (db, sql) = parse_query_event(&payload).unwrap();
        assert_eq!(db, "mydb");
        assert_eq!(sql, "BEGIN");
    }

    #[test]
    fn test_normalize_whitespace_and_comments() {
        let sql = "CREATE   TABLE /* hidden */ t (\n  a INT, -- trailing\n  b INT\n)";
        assert_eq!(normalize_sql(sql), "CREATE TABLE t ( a INT, b INT )");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("BEGIN"), DdlStatement::Begin);
        assert_eq!(classify("begin"), DdlStatement::Begin);
        assert_eq!(classify("COMMIT"), DdlStatement::Commit);
        assert_eq!(classify("CREATE TABLE t (a INT)"), DdlStatement::Create);
        assert_eq!(
            classify("create or replace temporary table t (a INT)"),
            DdlStatement::Create
        );
        assert_eq!(classify("ALTER TABLE t ADD b INT"), DdlStatement::Alter);
        assert_eq!(
            classify("alter online ignore table t drop b"),
            DdlStatement::Alter
        );
        assert_eq!(classify("INSERT INTO t VALUES (1)"), DdlStatement::Other);
        assert_eq!(classify("CREATE INDEX i ON t (a)"), DdlStatement::Other);
    }

    #[test]
    fn test_create_simple() {
        let c = create("CREATE TABLE t1 (id INT, name VARCHAR(64))");
        assert_eq!(c.database, "test");
        assert_eq!(c.table, "t1");
        assert_eq!(c.column_names, ["id", "name"]);
        assert_eq!(c.version, 1);
    }

    #[test]
    fn test_create_qualified_and_backticked() {
        let c = create("CREATE TABLE `shop`.`orders` (`id` INT, `total` DECIMAL(10,2))");
        assert_eq!(c.database, "shop");
        assert_eq!(c.table, "orders");
        assert_eq!(c.column_names, ["id", "total"]);
    }

    #[test]
    fn test_create_skips_index_clauses() {
        let c = create(
            "CREATE TABLE t (id INT, a VARCHAR(10), PRIMARY KEY (id), \
             KEY idx_a (a), UNIQUE KEY u (a), CONSTRAINT fk FOREIGN KEY (a) REFERENCES o(a))",
        );
        assert_eq!(c.column_names, ["id", "a"]);
    }

    #[test]
    fn test_create_nested_parens_in_types() {
        let c = create("CREATE TABLE t (id INT, kind ENUM('a','b,c'), price DECIMAL(10,2))");
        assert_eq!(c.column_names, ["id", "kind", "price"]);
    }

    #[test]
    fn test_create_quoted_paren_does_not_close_list() {
        let c = create("CREATE TABLE t (kind ENUM('a)','b'), id INT)");
        assert_eq!(c.column_names, ["kind", "id"]);
    }

    #[test]
    fn test_stored_definition_is_qualified() {
        let c = create("CREATE TABLE t1 (id INT)");
        assert!(c.definition.contains("test.t1"));
        // Replaying the stored definition needs no default database.
        let replayed =
            TableCreate::from_create_statement("", &c.definition, Gtid::default()).unwrap();
        assert_eq!(replayed.ident(), "test.t1");
        assert_eq!(replayed.column_names, ["id"]);
    }

    #[test]
    fn test_alter_add_drop_change() {
        let mut c = create("CREATE TABLE t (a INT, b INT, c INT)");

        assert!(c
            .apply_alter(
                &normalize_sql("ALTER TABLE t ADD COLUMN d INT, DROP b, CHANGE c c2 BIGINT"),
                Gtid::new(0, 1, 2),
            )
            .unwrap());
        assert_eq!(c.column_names, ["a", "c2", "d"]);
        assert_eq!(c.version, 2);
    }

    #[test]
    fn test_alter_rename_column() {
        let mut c = create("CREATE TABLE t (a INT)");
        assert!(c
            .apply_alter(
                &normalize_sql("ALTER TABLE t RENAME COLUMN a TO z"),
                Gtid::new(0, 1, 2),
            )
            .unwrap());
        assert_eq!(c.column_names, ["z"]);
    }

    #[test]
    fn test_alter_index_only_is_not_schema_affecting() {
        let mut c = create("CREATE TABLE t (a INT)");
        assert!(!c
            .apply_alter(
                &normalize_sql("ALTER TABLE t ADD INDEX idx (a), DROP INDEX old"),
                Gtid::new(0, 1, 2),
            )
            .unwrap());
        assert_eq!(c.version, 1);
    }

    #[test]
    fn test_tracker_create_then_alter() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DdlTracker::new(dir.path());

        let outcome = tracker
            .handle_statement("d", "CREATE TABLE t (a INT)", Gtid::new(0, 1, 1))
            .unwrap();
        assert_eq!(outcome, DdlOutcome::TableCreated("d.t".into()));

        let outcome = tracker
            .handle_statement("d", "ALTER TABLE t ADD b INT", Gtid::new(0, 1, 2))
            .unwrap();
        assert_eq!(outcome, DdlOutcome::TableAltered("d.t".into()));
        let create = tracker.get("d.t").unwrap();
        assert_eq!(create.column_names, ["a", "b"]);
        assert_eq!(create.version, 2);
    }

    #[test]
    fn test_tracker_alter_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DdlTracker::new(dir.path());
        let err = tracker
            .handle_statement("d", "ALTER TABLE missing ADD a INT", Gtid::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CdcError::Schema(SchemaError::AlterBeforeCreate(t)) if t == "d.missing"
        ));
    }

    #[test]
    fn test_tracker_recreate_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DdlTracker::new(dir.path());
        tracker
            .handle_statement("d", "CREATE TABLE t (a INT)", Gtid::default())
            .unwrap();
        tracker
            .handle_statement("d", "CREATE OR REPLACE TABLE t (a INT, b INT)", Gtid::default())
            .unwrap();
        assert_eq!(tracker.get("d.t").unwrap().version, 2);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut tracker = DdlTracker::new(dir.path());
            tracker
                .handle_statement("d", "CREATE TABLE t1 (a INT, b VARCHAR(10))", Gtid::default())
                .unwrap();
            tracker
                .handle_statement("e", "CREATE TABLE t2 (x INT)", Gtid::default())
                .unwrap();
        }

        let mut tracker = DdlTracker::new(dir.path());
        assert_eq!(tracker.load().unwrap(), 2);
        assert_eq!(tracker.get("d.t1").unwrap().column_names, ["a", "b"]);
        assert_eq!(tracker.get("e.t2").unwrap().column_names, ["x"]);
    }

    #[test]
    fn test_reload_restores_version_from_converted_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut tracker = DdlTracker::new(dir.path());
            tracker
                .handle_statement("d", "CREATE TABLE t (a INT, b INT)", Gtid::default())
                .unwrap();
        }
        // Two converted versions already on disk.
        std::fs::write(dir.path().join("d.t.000001.avro"), b"x").unwrap();
        std::fs::write(dir.path().join("d.t.000002.avro"), b"x").unwrap();

        let mut tracker = DdlTracker::new(dir.path());
        tracker.load().unwrap();
        assert_eq!(tracker.get("d.t").unwrap().version, 2);
    }

    #[test]
    fn test_begin_commit_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = DdlTracker::new(dir.path());
        assert_eq!(
            tracker.handle_statement("d", "BEGIN", Gtid::default()).unwrap(),
            DdlOutcome::TransactionBegin
        );
        assert_eq!(
            tracker.handle_statement("d", "COMMIT", Gtid::default()).unwrap(),
            DdlOutcome::Commit
        );
    }
}
