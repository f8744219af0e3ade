use crate::error::{ChurnError, Result};
use crate::model::{Changeset, FileDelta, SCHEMA_VERSION};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite store of already decoded changesets, keyed by id.
pub struct ChangesetCache {
    conn: Connection,
}

impl ChangesetCache {
    pub fn new<CP: AsRef<Path>, RP: AsRef<Path>>(cache_path: Option<CP>, repo_path: RP) -> Result<Self> {
        let cache_dir = match cache_path {
            Some(path) => path.as_ref().to_path_buf(),
            None => repo_path.as_ref().join(".churnmeter"),
        };
        std::fs::create_dir_all(&cache_dir)?;
        let conn = Connection::open(cache_dir.join("cache.db"))?;
        let mut cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    fn initialize(&mut self) -> Result<()> {
        self.check_schema_version()?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS changesets (
                id TEXT NOT NULL,
                include_binary INTEGER NOT NULL,
                author TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (id, include_binary)
            );
            CREATE TABLE IF NOT EXISTS file_deltas (
                changeset_id TEXT NOT NULL,
                include_binary INTEGER NOT NULL,
                path TEXT NOT NULL,
                added INTEGER NOT NULL,
                deleted INTEGER NOT NULL,
                before_lines INTEGER NOT NULL,
                after_lines INTEGER NOT NULL,
                PRIMARY KEY (changeset_id, include_binary, path),
                FOREIGN KEY (changeset_id, include_binary) REFERENCES changesets(id, include_binary)
            );
            ",
        )?;
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        Ok(())
    }

    /// Decodes from an older layout are dropped and rebuilt on demand.
    fn check_schema_version(&mut self) -> Result<()> {
        let user_version: i64 = self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?;

        if user_version != 0 && user_version != SCHEMA_VERSION as i64 {
            tracing::warn!(
                found = user_version,
                expected = SCHEMA_VERSION,
                "discarding changeset cache with old schema"
            );
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS file_deltas;
                 DROP TABLE IF EXISTS changesets;",
            )?;
        }
        Ok(())
    }

    /// `binary` selects decodes made with binary files counted or skipped.
    pub fn get_changeset(&self, id: &str, binary: bool) -> Result<Option<Changeset>> {
        let header = self
            .conn
            .query_row(
                "SELECT author, timestamp FROM changesets WHERE id = ? AND include_binary = ?",
                params![id, binary],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        let Some((author, secs)) = header else {
            return Ok(None);
        };
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| ChurnError::Cache(format!("Invalid timestamp {secs} for {id}")))?;

        let mut stmt = self.conn.prepare(
            "SELECT path, added, deleted, before_lines, after_lines
             FROM file_deltas WHERE changeset_id = ? AND include_binary = ? ORDER BY path",
        )?;
        let file_deltas = stmt
            .query_map(params![id, binary], |row| {
                Ok(FileDelta {
                    path: row.get(0)?,
                    added: row.get::<_, i64>(1)? as u64,
                    deleted: row.get::<_, i64>(2)? as u64,
                    before_lines: row.get::<_, i64>(3)? as u64,
                    after_lines: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Changeset {
            id: id.to_string(),
            author,
            timestamp,
            file_deltas,
        }))
    }

    /// Deltas sharing a path are summed into one row.
    pub fn store_changeset(&mut self, changeset: &Changeset, binary: bool) -> Result<()> {
        let mut by_path: BTreeMap<&str, FileDelta> = BTreeMap::new();
        for delta in &changeset.file_deltas {
            let merged = by_path
                .entry(delta.path.as_str())
                .or_insert_with(|| FileDelta::new(delta.path.as_str()));
            merged.added += delta.added;
            merged.deleted += delta.deleted;
            merged.before_lines += delta.before_lines;
            merged.after_lines += delta.after_lines;
        }

        let tx = self.conn.transaction()?;
        {
            tx.execute(
                "INSERT OR REPLACE INTO changesets (id, include_binary, author, timestamp) VALUES (?, ?, ?, ?)",
                params![changeset.id, binary, changeset.author, changeset.timestamp.timestamp()],
            )?;
            tx.execute(
                "DELETE FROM file_deltas WHERE changeset_id = ? AND include_binary = ?",
                params![changeset.id, binary],
            )?;

            let mut insert = tx.prepare(
                "INSERT INTO file_deltas
                 (changeset_id, include_binary, path, added, deleted, before_lines, after_lines)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for delta in by_path.values() {
                insert.execute(params![
                    changeset.id,
                    binary,
                    delta.path,
                    delta.added as i64,
                    delta.deleted as i64,
                    delta.before_lines as i64,
                    delta.after_lines as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
