//! SQLite backed sites.
//!
//! The database file is handled in-process with rusqlite. Snapshots are
//! plain SQL text: a header line, every table with its rows, then views,
//! indexes and triggers, and a closing marker line. A snapshot without the
//! closing marker is treated as truncated and never imported.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::host::Host;
use crate::model::{Environment, UrlMapping};
use crate::rewrite::{count_in_bytes, replace_in_bytes};
use crate::site::Site;
use crate::sync::file::atomic_write;
use crate::sync::hash::bytes_checksum;
use crate::sync::{SyncError, SyncResult};

/// First line of every snapshot.
pub const SNAPSHOT_HEADER: &str = "-- wpsync snapshot";

/// Last line of every complete snapshot.
pub const SNAPSHOT_TRAILER: &str = "-- wpsync snapshot end";

/// SQL function used by the in-place rewrite.
const REPLACE_FUNCTION: &str = "wpsync_replace";

/// Schema objects of the user, excluding SQLite's internal tables.
const USER_OBJECTS: &str = r"
    SELECT type, name, tbl_name, sql FROM sqlite_master
    WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
    ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'view' THEN 1 WHEN 'index' THEN 2 ELSE 3 END, rowid
";

/// A site whose database is a local SQLite file.
pub struct SqliteSite<'a> {
    env: &'a Environment,
    host: Host<'a>,
    db_path: PathBuf,
}

impl<'a> SqliteSite<'a> {
    #[must_use]
    pub fn new(env: &'a Environment, host: Host<'a>, db_path: &str) -> Self {
        Self {
            env,
            host,
            db_path: PathBuf::from(db_path),
        }
    }

    fn open(&self) -> SyncResult<Connection> {
        if !self.db_path.is_file() {
            return Err(SyncError::FileNotFound(self.db_path.display().to_string()));
        }
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }
}

impl Site for SqliteSite<'_> {
    fn environment(&self) -> &Environment {
        self.env
    }

    fn host(&self) -> &Host<'_> {
        &self.host
    }

    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn probe(&self) -> SyncResult<()> {
        if !self.db_path.is_file() {
            return Err(SyncError::Preflight(format!(
                "database file {} does not exist",
                self.db_path.display()
            )));
        }
        let conn = self.open()?;
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn export(&self, path: &str) -> SyncResult<()> {
        let conn = self.open()?;
        let sql = dump(&conn, &self.env.name)?;
        atomic_write(Path::new(path), sql.as_bytes())?;
        debug!(
            env = %self.env.name,
            path,
            bytes = sql.len(),
            sha256 = %bytes_checksum(sql.as_bytes()),
            "SQLite snapshot written"
        );
        Ok(())
    }

    fn import(&self, path: &str) -> SyncResult<()> {
        if !Path::new(path).is_file() {
            return Err(SyncError::FileNotFound(path.to_string()));
        }
        let sql = fs::read_to_string(path)?;
        check_complete(&sql, path)?;

        let mut conn = self.open()?;
        conn.pragma_update(None, "foreign_keys", false)?;
        let tx = conn.transaction()?;
        drop_user_objects(&tx)?;
        tx.execute_batch(&sql)?;
        tx.commit()?;

        info!(env = %self.env.name, path, "SQLite snapshot imported");
        Ok(())
    }

    fn count_occurrences(&self, mapping: &UrlMapping) -> SyncResult<u64> {
        let conn = self.open()?;
        let mut total = 0u64;
        for (table, column) in text_columns(&conn)? {
            let sql = format!(
                "SELECT {col}, count(*) FROM {tbl} \
                 WHERE typeof({col}) = 'text' AND instr({col}, ?1) > 0 GROUP BY {col}",
                col = quote_ident(&column),
                tbl = quote_ident(&table),
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![mapping.from], |row| {
                let per_value = match row.get_ref(0)? {
                    ValueRef::Text(bytes) => count_in_bytes(bytes, &mapping.from),
                    _ => 0,
                };
                Ok((per_value as u64, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (per_value, rows_with_value) = row?;
                total += per_value * u64::try_from(rows_with_value).unwrap_or(0);
            }
        }
        Ok(total)
    }

    fn search_replace(&self, mapping: &UrlMapping) -> SyncResult<u64> {
        let mut conn = self.open()?;
        let replaced = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&replaced);
        conn.create_scalar_function(
            REPLACE_FUNCTION,
            3,
            FunctionFlags::SQLITE_UTF8,
            move |ctx| {
                let from: String = ctx.get(1)?;
                let to: String = ctx.get(2)?;
                let value = match ctx.get_raw(0) {
                    ValueRef::Text(bytes) => bytes,
                    other => {
                        return Err(rusqlite::Error::InvalidFunctionParameterType(
                            0,
                            other.data_type(),
                        ));
                    }
                };
                let (new_value, n) = replace_in_bytes(value, &from, &to);
                counter.fetch_add(n as u64, Ordering::Relaxed);
                Ok(RawText(new_value))
            },
        )?;

        let columns = text_columns(&conn)?;
        let tx = conn.transaction()?;
        for (table, column) in &columns {
            let sql = format!(
                "UPDATE {tbl} SET {col} = {REPLACE_FUNCTION}({col}, ?1, ?2) \
                 WHERE typeof({col}) = 'text' AND instr({col}, ?1) > 0",
                col = quote_ident(column),
                tbl = quote_ident(table),
            );
            let changed = tx.execute(&sql, params![mapping.from, mapping.to])?;
            if changed > 0 {
                debug!(table = %table, column = %column, rows = changed, "Rewrote column");
            }
        }
        tx.commit()?;

        Ok(replaced.load(Ordering::Relaxed))
    }
}

/// Text result whose bytes are passed to SQLite as they are, valid UTF-8
/// or not.
struct RawText(Vec<u8>);

impl ToSql for RawText {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(&self.0)))
    }
}

/// Render the whole database as SQL text.
///
/// # Errors
///
/// Returns an error if the schema or any row cannot be read.
pub fn dump(conn: &Connection, environment: &str) -> SyncResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "{SNAPSHOT_HEADER}");
    let _ = writeln!(out, "-- environment: {environment}");
    let _ = writeln!(out, "-- created: {}", chrono::Utc::now().to_rfc3339());

    let objects = schema_objects(conn)?;

    for object in objects.iter().filter(|o| o.kind == "table") {
        let _ = writeln!(out, "{};", object.sql);
        dump_rows(conn, &object.name, &mut out)?;
    }

    if has_table(conn, "sqlite_sequence")? {
        let _ = writeln!(out, "DELETE FROM \"sqlite_sequence\";");
        dump_rows(conn, "sqlite_sequence", &mut out)?;
    }

    for object in objects.iter().filter(|o| o.kind != "table") {
        let _ = writeln!(out, "{};", object.sql);
    }

    let _ = writeln!(out, "{SNAPSHOT_TRAILER}");
    Ok(out)
}

struct SchemaObject {
    kind: String,
    name: String,
    sql: String,
}

fn schema_objects(conn: &Connection) -> SyncResult<Vec<SchemaObject>> {
    let mut stmt = conn.prepare(USER_OBJECTS)?;
    let rows = stmt.query_map([], |row| {
        Ok(SchemaObject {
            kind: row.get(0)?,
            name: row.get(1)?,
            sql: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn has_table(conn: &Connection, name: &str) -> SyncResult<bool> {
    let found: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

fn dump_rows(conn: &Connection, table: &str, out: &mut String) -> SyncResult<()> {
    let table_ident = quote_ident(table);
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table_ident}"))?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(sql_literal(row.get_ref(idx)?));
        }
        let _ = writeln!(out, "INSERT INTO {table_ident} VALUES({});", values.join(","));
    }
    Ok(())
}

/// Every (table, column) pair of user tables, in schema order.
fn text_columns(conn: &Connection) -> SyncResult<Vec<(String, String)>> {
    let tables: Vec<String> = schema_objects(conn)?
        .into_iter()
        .filter(|o| o.kind == "table")
        .map(|o| o.name)
        .collect();

    let mut columns = Vec::new();
    for table in tables {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            columns.push((table.clone(), name?));
        }
    }
    Ok(columns)
}

fn drop_user_objects(conn: &Connection) -> SyncResult<()> {
    let objects = schema_objects(conn)?;
    // Dropping a table drops its indexes and triggers with it.
    for object in objects.iter().filter(|o| o.kind == "view") {
        conn.execute_batch(&format!("DROP VIEW IF EXISTS {};", quote_ident(&object.name)))?;
    }
    for object in objects.iter().filter(|o| o.kind == "table") {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(&object.name)))?;
    }
    if has_table(conn, "sqlite_sequence")? {
        conn.execute_batch("DELETE FROM \"sqlite_sequence\";")?;
    }
    Ok(())
}

fn check_complete(sql: &str, path: &str) -> SyncResult<()> {
    if !sql.starts_with(SNAPSHOT_HEADER) {
        return Err(SyncError::Verification(format!(
            "{path} is not a wpsync sqlite snapshot"
        )));
    }
    if sql.trim_end().lines().last() != Some(SNAPSHOT_TRAILER) {
        return Err(SyncError::Verification(format!(
            "{path} is truncated (missing end marker)"
        )));
    }
    Ok(())
}

/// Quote an identifier: `"name"`, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render one stored value as a SQL literal.
#[must_use]
pub fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => {
            if f.is_infinite() {
                (if f > 0.0 { "9e999" } else { "-9e999" }).to_string()
            } else {
                format!("{f:?}")
            }
        }
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => format!("'{}'", text.replace('\'', "''")),
            _ => format!("CAST(X'{}' AS TEXT)", hex(bytes)),
        },
        ValueRef::Blob(bytes) => format!("X'{}'", hex(bytes)),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::runner::testing::RecordingRunner;
    use crate::host::Location;
    use crate::model::{Access, DatabaseEngine};
    use tempfile::TempDir;

    fn env(dir: &Path, name: &str) -> Environment {
        Environment {
            name: name.into(),
            base_url: format!("http://{name}.test"),
            root_path: dir.join(name).display().to_string(),
            access: Access::Local,
            database: DatabaseEngine::Sqlite {
                path: dir.join(format!("{name}.db")).display().to_string(),
            },
            work_dir: None,
            protected: false,
        }
    }

    fn db_path(env: &Environment) -> String {
        match &env.database {
            DatabaseEngine::Sqlite { path } => path.clone(),
            DatabaseEngine::WpCli { .. } => unreachable!(),
        }
    }

    fn seed(path: &str, sql: &str) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    fn options(path: &str) -> Vec<(String, String)> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT option_name, CASE typeof(option_value) \
                 WHEN 'blob' THEN 'x' || hex(option_value) \
                 WHEN 'null' THEN '<null>' ELSE option_value END \
                 FROM wp_options ORDER BY option_id",
            )
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    const SCHEMA: &str = r"
        CREATE TABLE wp_options (
            option_id INTEGER PRIMARY KEY AUTOINCREMENT,
            option_name TEXT NOT NULL UNIQUE,
            option_value TEXT
        );
        CREATE INDEX idx_value ON wp_options(option_value);
        CREATE VIEW v_home AS SELECT option_value FROM wp_options WHERE option_name = 'home';
    ";

    #[test]
    fn test_export_import_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let source = env(temp_dir.path(), "local");
        let dest = env(temp_dir.path(), "staging");

        seed(&db_path(&source), SCHEMA);
        seed(
            &db_path(&source),
            r"INSERT INTO wp_options (option_name, option_value) VALUES
                ('siteurl', 'http://a.local'),
                ('quote', 'it''s'),
                ('ratio', 0.5),
                ('blob', X'00FF'),
                ('empty', NULL);",
        );
        seed(&db_path(&dest), "CREATE TABLE old_stuff (x); INSERT INTO old_stuff VALUES (1);");

        let src_site = SqliteSite::new(&source, Host::new(Location::Local, &runner), &db_path(&source));
        let dst_site = SqliteSite::new(&dest, Host::new(Location::Local, &runner), &db_path(&dest));

        let snapshot = temp_dir.path().join("snap.sql").display().to_string();
        src_site.export(&snapshot).unwrap();
        dst_site.import(&snapshot).unwrap();

        assert_eq!(options(&db_path(&dest)).len(), 5);
        assert_eq!(options(&db_path(&dest))[1].1, "it's");

        let conn = Connection::open(db_path(&dest)).unwrap();
        assert!(!has_table(&conn, "old_stuff").unwrap());
        let home: i64 = conn
            .query_row("SELECT count(*) FROM sqlite_master WHERE name = 'v_home'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(home, 1);
        let blob: Vec<u8> = conn
            .query_row("SELECT option_value FROM wp_options WHERE option_name = 'blob'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(blob, vec![0x00, 0xFF]);

        // Identical content dumps identically (apart from the created line).
        let strip = |s: String| -> String {
            s.lines().filter(|l| !l.starts_with("-- ")).collect::<Vec<_>>().join("\n")
        };
        let a = dump(&Connection::open(db_path(&source)).unwrap(), "x").unwrap();
        let b = dump(&conn, "x").unwrap();
        assert_eq!(strip(a), strip(b));
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let dest = env(temp_dir.path(), "staging");
        seed(&db_path(&dest), SCHEMA);
        seed(&db_path(&dest), "INSERT INTO wp_options (option_name, option_value) VALUES ('home', 'keep');");
        let site = SqliteSite::new(&dest, Host::new(Location::Local, &runner), &db_path(&dest));

        let full = temp_dir.path().join("full.sql");
        site.export(full.to_str().unwrap()).unwrap();
        let content = fs::read_to_string(&full).unwrap();
        let truncated = temp_dir.path().join("truncated.sql");
        fs::write(&truncated, &content[..content.len() / 2]).unwrap();

        let err = site.import(truncated.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SyncError::Verification(_)));
        assert_eq!(options(&db_path(&dest)), vec![("home".to_string(), "keep".to_string())]);
    }

    #[test]
    fn test_failed_import_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let dest = env(temp_dir.path(), "staging");
        seed(&db_path(&dest), SCHEMA);
        seed(&db_path(&dest), "INSERT INTO wp_options (option_name, option_value) VALUES ('home', 'keep');");
        let site = SqliteSite::new(&dest, Host::new(Location::Local, &runner), &db_path(&dest));

        let bad = temp_dir.path().join("bad.sql");
        fs::write(
            &bad,
            format!("{SNAPSHOT_HEADER}\nCREATE TABLE t(x);\nINSERT INTO nope VALUES(1);\n{SNAPSHOT_TRAILER}\n"),
        )
        .unwrap();

        assert!(matches!(site.import(bad.to_str().unwrap()), Err(SyncError::Database(_))));
        assert_eq!(options(&db_path(&dest)).len(), 1);
    }

    #[test]
    fn test_search_replace_counts_and_serialized() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let e = env(temp_dir.path(), "local");
        seed(&db_path(&e), SCHEMA);
        seed(
            &db_path(&e),
            r#"INSERT INTO wp_options (option_name, option_value) VALUES
                ('siteurl', 'http://a.local'),
                ('home', 'http://a.local'),
                ('widget', 'a:1:{s:3:"url";s:19:"http://a.local/page";}'),
                ('note', 'a.local and a.local');"#,
        );
        let site = SqliteSite::new(&e, Host::new(Location::Local, &runner), &db_path(&e));
        let mapping = UrlMapping::new("a.local", "staging.example.com");

        assert_eq!(site.count_occurrences(&mapping).unwrap(), 5);
        assert_eq!(site.search_replace(&mapping).unwrap(), 5);
        assert_eq!(site.count_occurrences(&mapping).unwrap(), 0);
        assert_eq!(
            site.count_occurrences(&UrlMapping::new("staging.example.com", "x")).unwrap(),
            5
        );

        let values = options(&db_path(&e));
        assert_eq!(values[0].1, "http://staging.example.com");
        assert_eq!(values[2].1, r#"a:1:{s:3:"url";s:31:"http://staging.example.com/page";}"#);

        // Second run with the same pair changes nothing.
        assert_eq!(site.search_replace(&mapping).unwrap(), 0);
        assert_eq!(options(&db_path(&e)), values);
    }

    #[test]
    fn test_non_idempotent_mapping_replaces_each_value_once() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let e = env(temp_dir.path(), "production");
        seed(&db_path(&e), SCHEMA);
        seed(
            &db_path(&e),
            r"INSERT INTO wp_options (option_name, option_value) VALUES
                ('a', 'example.com'),
                ('b', 'staging.example.com');",
        );
        let site = SqliteSite::new(&e, Host::new(Location::Local, &runner), &db_path(&e));

        let n = site
            .search_replace(&UrlMapping::new("example.com", "staging.example.com"))
            .unwrap();
        assert_eq!(n, 2);
        let values = options(&db_path(&e));
        assert_eq!(values[0].1, "staging.example.com");
        assert_eq!(values[1].1, "staging.staging.example.com");
    }

    #[test]
    fn test_invalid_utf8_text_is_counted_and_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let e = env(temp_dir.path(), "local");
        seed(&db_path(&e), SCHEMA);
        // 'http://a.local' followed by a lone 0xFF byte
        seed(
            &db_path(&e),
            r"INSERT INTO wp_options (option_name, option_value) VALUES
                ('siteurl', 'http://a.local'),
                ('broken', CAST(X'687474703A2F2F612E6C6F63616CFF' AS TEXT));",
        );
        let site = SqliteSite::new(&e, Host::new(Location::Local, &runner), &db_path(&e));
        let mapping = UrlMapping::new("a.local", "b.com");

        assert_eq!(site.count_occurrences(&mapping).unwrap(), 2);
        assert_eq!(site.search_replace(&mapping).unwrap(), 2);
        assert_eq!(site.count_occurrences(&mapping).unwrap(), 0);

        let conn = Connection::open(db_path(&e)).unwrap();
        let (kind, hex): (String, String) = conn
            .query_row(
                "SELECT typeof(option_value), hex(option_value) FROM wp_options \
                 WHERE option_name = 'broken'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(hex, "687474703A2F2F622E636F6DFF");
    }

    #[test]
    fn test_probe_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let e = env(temp_dir.path(), "local");
        let site = SqliteSite::new(&e, Host::new(Location::Local, &runner), &db_path(&e));
        assert!(matches!(site.probe(), Err(SyncError::Preflight(_))));
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal(ValueRef::Null), "NULL");
        assert_eq!(sql_literal(ValueRef::Integer(-3)), "-3");
        assert_eq!(sql_literal(ValueRef::Real(1.0)), "1.0");
        assert_eq!(sql_literal(ValueRef::Text(b"o'k")), "'o''k'");
        assert_eq!(sql_literal(ValueRef::Text(&[0xFF])), "CAST(X'FF' AS TEXT)");
        assert_eq!(sql_literal(ValueRef::Blob(&[1, 171])), "X'01AB'");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
