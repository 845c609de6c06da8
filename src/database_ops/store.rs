//! SQLite dialogue store: one row per dialogue line, many rows per script title.
//!
//! A [`DialogueStore`] owns a single connection for the length of a run; the
//! connection closes when the store is dropped or [`DialogueStore::close`]d.
//! Only the URL column is ever written.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, warn};

/// Table and column names of the dialogue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    table: String,
    title_column: String,
    url_column: String,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            table: "dialogues".to_string(),
            title_column: "script_name".to_string(),
            url_column: "script_url".to_string(),
        }
    }
}

impl StoreSchema {
    /// Names are interpolated into SQL (always double-quoted), so only plain
    /// identifiers are accepted. Keywords such as `order` are fine.
    pub fn new(table: &str, title_column: &str, url_column: &str) -> Result<Self> {
        for name in [table, title_column, url_column] {
            if !is_plain_identifier(name) {
                bail!("'{name}' is not a plain SQL identifier");
            }
        }
        Ok(Self {
            table: table.to_string(),
            title_column: title_column.to_string(),
            url_column: url_column.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn title_column(&self) -> &str {
        &self.title_column
    }

    pub fn url_column(&self) -> &str {
        &self.url_column
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// URL to write onto every row of one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleUpdate {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    Commit,
    RollBack,
}

/// Outcome of one update batch, with coverage read inside the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBatch {
    pub changed_rows: usize,
    pub titles_without_url: Vec<String>,
    pub titles_with_url: usize,
    pub committed: bool,
}

pub struct DialogueStore {
    conn: Connection,
    schema: StoreSchema,
}

impl DialogueStore {
    /// Open an existing store read-write. A missing file is an error, never created.
    pub fn open(path: &Path, schema: StoreSchema) -> Result<Self> {
        if !path.exists() {
            bail!("dialogue store not found: {}", path.display());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open dialogue store {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(3))?;
        debug!(path = %path.display(), "dialogue store opened");
        Self::from_connection(conn, schema)
    }

    /// Wrap an open connection after checking the table carries the expected columns.
    pub fn from_connection(conn: Connection, schema: StoreSchema) -> Result<Self> {
        let columns = table_columns(&conn, schema.table())?;
        if columns.is_empty() {
            bail!("dialogue store has no table '{}'", schema.table());
        }
        for col in [schema.title_column(), schema.url_column()] {
            if !columns.contains(&col.to_lowercase()) {
                bail!(
                    "table '{}' is missing required column '{col}'",
                    schema.table()
                );
            }
        }
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn distinct_titles(&self) -> Result<Vec<String>> {
        distinct_titles(&self.conn, &self.schema)
    }

    /// Titles with at least one row whose URL is NULL or empty.
    pub fn titles_without_url(&self) -> Result<Vec<String>> {
        titles_without_url(&self.conn, &self.schema)
    }

    pub fn count_titles_with_url(&self) -> Result<usize> {
        count_titles_with_url(&self.conn, &self.schema)
    }

    /// Apply all updates inside one transaction.
    ///
    /// Rows that already carry the target URL are left alone, so `changed_rows`
    /// counts real changes only. Any statement failure drops the transaction
    /// uncommitted.
    pub fn apply_updates(&mut self, updates: &[TitleUpdate], mode: CommitMode) -> Result<AppliedBatch> {
        let s = &self.schema;
        let sql = format!(
            "UPDATE \"{t}\" SET \"{u}\" = ?1 \
             WHERE CAST(\"{n}\" AS TEXT) = ?2 AND (\"{u}\" IS NULL OR \"{u}\" <> ?1)",
            t = s.table(),
            u = s.url_column(),
            n = s.title_column(),
        );

        let tx = self
            .conn
            .transaction()
            .context("failed to begin update transaction")?;
        let mut changed_rows = 0usize;
        {
            let mut stmt = tx.prepare(&sql)?;
            for update in updates {
                let n = stmt
                    .execute(params![update.url, update.title])
                    .with_context(|| format!("failed to update title '{}'", update.title))?;
                if n > 0 {
                    debug!(title = %update.title, rows = n, "title updated");
                }
                changed_rows += n;
            }
        }
        let titles_without_url = titles_without_url(&tx, s)?;
        let titles_with_url = count_titles_with_url(&tx, s)?;

        let committed = match mode {
            CommitMode::Commit => {
                tx.commit().context("failed to commit URL updates")?;
                true
            }
            CommitMode::RollBack => {
                tx.rollback().context("failed to roll back URL updates")?;
                false
            }
        };
        Ok(AppliedBatch {
            changed_rows,
            titles_without_url,
            titles_with_url,
            committed,
        })
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow!("failed to close dialogue store: {e}"))
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let mut rows = stmt.query([])?;
    let mut cols = HashSet::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        cols.insert(name.to_lowercase());
    }
    Ok(cols)
}

fn distinct_titles(conn: &Connection, s: &StoreSchema) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT CAST(\"{n}\" AS TEXT) AS title FROM \"{t}\" \
         WHERE \"{n}\" IS NOT NULL ORDER BY title",
        n = s.title_column(),
        t = s.table(),
    );
    collect_strings(conn, &sql)
}

fn titles_without_url(conn: &Connection, s: &StoreSchema) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT CAST(\"{n}\" AS TEXT) AS title FROM \"{t}\" \
         WHERE \"{n}\" IS NOT NULL AND (\"{u}\" IS NULL OR \"{u}\" = '') ORDER BY title",
        n = s.title_column(),
        t = s.table(),
        u = s.url_column(),
    );
    collect_strings(conn, &sql)
}

fn count_titles_with_url(conn: &Connection, s: &StoreSchema) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(DISTINCT CAST(\"{n}\" AS TEXT)) FROM \"{t}\" \
         WHERE \"{u}\" IS NOT NULL AND \"{u}\" != ''",
        n = s.title_column(),
        t = s.table(),
        u = s.url_column(),
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

/// Titles are selected as `CAST(.. AS TEXT)`; rows whose bytes are not UTF-8 are skipped.
fn collect_strings(conn: &Connection, sql: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut undecodable = 0usize;
    while let Some(row) = rows.next()? {
        match row.get_ref(0)? {
            ValueRef::Null => {}
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
                Ok(title) => out.push(title.to_string()),
                Err(_) => undecodable += 1,
            },
            ValueRef::Integer(n) => out.push(n.to_string()),
            ValueRef::Real(f) => out.push(f.to_string()),
        }
    }
    if undecodable > 0 {
        warn!(rows = undecodable, "skipped titles that are not valid UTF-8");
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn rejects_unsafe_identifiers() {
        assert!(StoreSchema::new("dialogues", "script_name", "script_url").is_ok());
        assert!(StoreSchema::new("dialogues; DROP TABLE x", "script_name", "script_url").is_err());
        assert!(StoreSchema::new("dialogues", "1name", "script_url").is_err());
        assert!(StoreSchema::new("dialogues", "script_name", "").is_err());
    }

    #[test]
    fn missing_store_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DialogueStore::open(&dir.path().join("nope.db"), StoreSchema::default());
        assert!(err.is_err());
        assert!(!dir.path().join("nope.db").exists());
    }

    #[test]
    fn missing_column_is_an_error() {
        let (_dir, path) = fixture_store(&[]);
        let schema = StoreSchema::new("dialogues", "script_name", "doc_url").unwrap();
        assert!(DialogueStore::open(&path, schema).is_err());
        let schema = StoreSchema::new("scripts", "script_name", "script_url").unwrap();
        assert!(DialogueStore::open(&path, schema).is_err());
    }

    #[test]
    fn reads_titles_and_coverage() {
        let (_dir, path) = fixture_store(&[
            ("B2_b", "line", None),
            ("B1_a", "line", Some("https://docs.google.com/1")),
            ("B1_a", "line 2", Some("https://docs.google.com/1")),
            ("B3_c", "line", Some("")),
        ]);
        let store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        assert_eq!(store.distinct_titles().unwrap(), vec!["B1_a", "B2_b", "B3_c"]);
        assert_eq!(store.titles_without_url().unwrap(), vec!["B2_b", "B3_c"]);
        assert_eq!(store.count_titles_with_url().unwrap(), 1);
        store.close().unwrap();
    }

    #[test]
    fn updates_only_rows_that_differ() {
        let (_dir, path) = fixture_store(&[
            ("B1_a", "one", None),
            ("B1_a", "two", Some("https://docs.google.com/1")),
            ("B2_b", "one", None),
        ]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let updates = vec![TitleUpdate {
            title: "B1_a".into(),
            url: "https://docs.google.com/1".into(),
        }];
        let batch = store.apply_updates(&updates, CommitMode::Commit).unwrap();
        assert_eq!(batch.changed_rows, 1);
        assert!(batch.committed);
        assert_eq!(batch.titles_without_url, vec!["B2_b"]);
        assert_eq!(batch.titles_with_url, 1);
        drop(store);

        assert_eq!(
            urls_for(&path, "B1_a"),
            vec![
                Some("https://docs.google.com/1".to_string()),
                Some("https://docs.google.com/1".to_string())
            ]
        );
        assert_eq!(urls_for(&path, "B2_b"), vec![None]);
    }

    #[test]
    fn keyword_names_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"CREATE TABLE "order" ("group" TEXT NOT NULL, "url" TEXT);
               INSERT INTO "order" ("group", "url") VALUES ('B1_a', NULL), ('B2_b', NULL);"#,
        )
        .unwrap();
        drop(conn);

        let schema = StoreSchema::new("order", "group", "url").unwrap();
        let mut store = DialogueStore::open(&path, schema).unwrap();
        assert_eq!(store.distinct_titles().unwrap(), vec!["B1_a", "B2_b"]);
        let updates = vec![TitleUpdate {
            title: "B1_a".into(),
            url: "https://docs.google.com/1".into(),
        }];
        let batch = store.apply_updates(&updates, CommitMode::Commit).unwrap();
        assert_eq!(batch.changed_rows, 1);
        assert_eq!(batch.titles_without_url, vec!["B2_b"]);
        assert_eq!(batch.titles_with_url, 1);
    }

    #[test]
    fn non_text_titles_are_read_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untyped.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE dialogues (script_name, script_url TEXT);
             INSERT INTO dialogues VALUES (1234, NULL), ('B1_a', NULL), (X'FF', NULL);",
        )
        .unwrap();
        drop(conn);

        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        assert_eq!(store.distinct_titles().unwrap(), vec!["1234", "B1_a"]);
        assert_eq!(store.titles_without_url().unwrap(), vec!["1234", "B1_a"]);

        let updates = vec![TitleUpdate {
            title: "1234".into(),
            url: "https://docs.google.com/n".into(),
        }];
        let batch = store.apply_updates(&updates, CommitMode::Commit).unwrap();
        assert_eq!(batch.changed_rows, 1);
        assert_eq!(batch.titles_without_url, vec!["B1_a"]);
    }

    #[test]
    fn roll_back_leaves_store_untouched() {
        let (_dir, path) = fixture_store(&[("B1_a", "one", None)]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let updates = vec![TitleUpdate {
            title: "B1_a".into(),
            url: "https://docs.google.com/1".into(),
        }];
        let batch = store.apply_updates(&updates, CommitMode::RollBack).unwrap();
        assert_eq!(batch.changed_rows, 1);
        assert!(!batch.committed);
        assert!(batch.titles_without_url.is_empty());
        assert_eq!(store.titles_without_url().unwrap(), vec!["B1_a"]);
    }
}
