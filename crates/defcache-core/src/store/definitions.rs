use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::StoredDefinition;

use super::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Schema version written on first open. Any other version is refused.
pub const SCHEMA_VERSION: i64 = 1;

/// Database file name inside the cache directory
pub const DB_FILE: &str = "definitions.sqlite3";

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

const SELECT_COLUMNS: &str = "table_name, record_key, position, definition";

/// SQLite-backed store of fetched definitions.
/// Clone is cheap - all clones share one connection.
#[derive(Clone)]
pub struct DefinitionStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("location", &self.location)
            .finish()
    }
}

impl DefinitionStore {
    /// Open the store at `path`, creating the file and schema if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let unavailable = |reason: String| StoreError::Unavailable {
            path: location.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut conn =
            Connection::open_with_flags(path, flags).map_err(|e| unavailable(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| unavailable(e.to_string()))?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|e| unavailable(e.to_string()))?;

        initialize_schema(&mut conn, &location)?;
        debug!(path = %location, "Definition store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = ":memory:".to_string();
        let mut conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        initialize_schema(&mut conn, &location)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Path (or `:memory:`) this store was opened from
    pub fn location(&self) -> &str {
        &self.location
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Unavailable {
            path: self.location.clone(),
            reason: "connection lock poisoned".to_string(),
        })
    }

    // ===== Writes =====

    /// Store one table's definitions in a single transaction.
    ///
    /// Positions are assigned to distinct hashes in order of first
    /// appearance, so they stay packed in `0..stored`. A repeated hash keeps
    /// its first position and takes the later definition. Returns the number
    /// of rows the table holds once the batch commits. A definition without
    /// a usable `hash` aborts the whole batch.
    pub fn put_batch(&self, table_name: &str, definitions: &[Value]) -> Result<u64, StoreError> {
        let rows = keyed_rows(table_name, definitions)?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::write_failed(table_name, e))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO definitions (table_name, record_key, position, definition)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (table_name, record_key)
                     DO UPDATE SET position = excluded.position, definition = excluded.definition",
                )
                .map_err(|e| StoreError::write_failed(table_name, e))?;

            for (position, (key, definition)) in rows.iter().enumerate() {
                let body = serde_json::to_string(definition)?;

                stmt.execute(params![table_name, key, position as i64, body])
                    .map_err(|e| StoreError::write_failed(table_name, e))?;
            }
        }

        let stored: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM definitions WHERE table_name = ?1",
                params![table_name],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::write_failed(table_name, e))?;

        tx.execute(
            "INSERT INTO table_meta (table_name, populated_at)
             VALUES (?1, ?2)
             ON CONFLICT (table_name)
             DO UPDATE SET populated_at = excluded.populated_at",
            params![table_name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::write_failed(table_name, e))?;

        tx.commit()
            .map_err(|e| StoreError::write_failed(table_name, e))?;

        let stored = stored as u64;
        if stored != definitions.len() as u64 {
            warn!(
                table = table_name,
                submitted = definitions.len(),
                stored,
                "Duplicate hashes collapsed while storing table"
            );
        }
        info!(table = table_name, stored, "Stored definitions");
        Ok(stored)
    }

    // ===== Reads =====

    /// Number of committed definitions for a table
    pub fn count_by_table(&self, table_name: &str) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM definitions WHERE table_name = ?1",
            params![table_name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Look up a definition by its position in the fetched document
    pub fn get_by_offset(
        &self,
        table_name: &str,
        offset: u64,
    ) -> Result<Option<StoredDefinition>, StoreError> {
        let Ok(offset) = i64::try_from(offset) else {
            return Ok(None);
        };
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM definitions WHERE table_name = ?1 AND position = ?2 LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![table_name, offset],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_definition).transpose()
    }

    /// Look up a definition by its hash
    pub fn get_by_key(
        &self,
        table_name: &str,
        key: i64,
    ) -> Result<Option<StoredDefinition>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM definitions WHERE table_name = ?1 AND record_key = ?2",
                    SELECT_COLUMNS
                ),
                params![table_name, key],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_definition).transpose()
    }

    /// When a table was last written, if ever
    pub fn populated_at(&self, table_name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn()?;
        let stamp: Option<String> = conn
            .query_row(
                "SELECT populated_at FROM table_meta WHERE table_name = ?1",
                params![table_name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stamp.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                debug!(table = table_name, error = %e, "Unreadable populated_at timestamp");
                None
            }
        }))
    }

    // ---------------- Async wrappers (spawn_blocking) ----------------
    // These keep SQLite work off the async executor threads.

    pub async fn put_batch_async(
        &self,
        table_name: String,
        definitions: Vec<Value>,
    ) -> Result<u64, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.put_batch(&table_name, &definitions)).await?
    }

    pub async fn count_by_table_async(&self, table_name: &str) -> Result<u64, StoreError> {
        let store = self.clone();
        let table_name = table_name.to_string();
        tokio::task::spawn_blocking(move || store.count_by_table(&table_name)).await?
    }

    pub async fn get_by_offset_async(
        &self,
        table_name: &str,
        offset: u64,
    ) -> Result<Option<StoredDefinition>, StoreError> {
        let store = self.clone();
        let table_name = table_name.to_string();
        tokio::task::spawn_blocking(move || store.get_by_offset(&table_name, offset)).await?
    }

    pub async fn get_by_key_async(
        &self,
        table_name: &str,
        key: i64,
    ) -> Result<Option<StoredDefinition>, StoreError> {
        let store = self.clone();
        let table_name = table_name.to_string();
        tokio::task::spawn_blocking(move || store.get_by_key(&table_name, key)).await?
    }

    pub async fn populated_at_async(
        &self,
        table_name: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let store = self.clone();
        let table_name = table_name.to_string();
        tokio::task::spawn_blocking(move || store.populated_at(&table_name)).await?
    }
}

/// Pair each definition with its hash, collapsing repeated hashes onto the
/// slot of their first appearance.
fn keyed_rows<'a>(
    table_name: &str,
    definitions: &'a [Value],
) -> Result<Vec<(i64, &'a Value)>, StoreError> {
    let mut rows: Vec<(i64, &Value)> = Vec::with_capacity(definitions.len());
    let mut slots: HashMap<i64, usize> = HashMap::with_capacity(definitions.len());

    for (position, definition) in definitions.iter().enumerate() {
        let key = StoredDefinition::key_of(definition).ok_or_else(|| StoreError::MissingKey {
            table: table_name.to_string(),
            position: position as u64,
        })?;
        match slots.get(&key) {
            Some(&slot) => rows[slot].1 = definition,
            None => {
                slots.insert(key, rows.len());
                rows.push((key, definition));
            }
        }
    }
    Ok(rows)
}

/// Default on-disk location inside a cache directory
pub fn default_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(DB_FILE)
}

/// Row as read from SQLite, before the definition text is parsed
struct RawRow {
    table_name: String,
    key: i64,
    position: i64,
    definition: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            table_name: row.get(0)?,
            key: row.get(1)?,
            position: row.get(2)?,
            definition: row.get(3)?,
        })
    }

    fn into_definition(self) -> Result<StoredDefinition, StoreError> {
        Ok(StoredDefinition {
            table_name: self.table_name,
            key: self.key,
            position: self.position as u64,
            definition: serde_json::from_str(&self.definition)?,
        })
    }
}

/// Create the schema on first open, or check the version of an existing one.
fn initialize_schema(conn: &mut Connection, location: &str) -> Result<(), StoreError> {
    let unavailable = |e: rusqlite::Error| StoreError::Unavailable {
        path: location.to_string(),
        reason: e.to_string(),
    };

    let tx = conn.transaction().map_err(unavailable)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(unavailable)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(unavailable)?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(unavailable)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS definitions (
                    table_name TEXT NOT NULL,
                    record_key INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    definition TEXT NOT NULL,
                    PRIMARY KEY (table_name, record_key)
                );
                CREATE INDEX IF NOT EXISTS idx_definitions_table
                    ON definitions (table_name);
                CREATE INDEX IF NOT EXISTS idx_definitions_position
                    ON definitions (table_name, position);
                CREATE TABLE IF NOT EXISTS table_meta (
                    table_name TEXT PRIMARY KEY,
                    populated_at TEXT NOT NULL
                );",
            )
            .map_err(unavailable)?;
            info!(path = location, version = SCHEMA_VERSION, "Created definition store schema");
        }
        Some(SCHEMA_VERSION) => {}
        Some(found) => {
            return Err(StoreError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
    }

    tx.commit().map_err(unavailable)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(n: u64) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "hash": 1000 + (n - i) * 7,
                    "index": i,
                    "displayProperties": { "name": format!("Item {}", i) }
                })
            })
            .collect()
    }

    #[test]
    fn test_put_then_read_back_by_offset() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let defs = sample(5);

        assert_eq!(store.put_batch("DestinyClassDefinition", &defs).unwrap(), 5);

        for (i, original) in defs.iter().enumerate() {
            let stored = store
                .get_by_offset("DestinyClassDefinition", i as u64)
                .unwrap()
                .unwrap();
            assert_eq!(&stored.definition, original);
            assert_eq!(stored.position, i as u64);
            assert_eq!(stored.table_name, "DestinyClassDefinition");
        }
        assert!(store.get_by_offset("DestinyClassDefinition", 5).unwrap().is_none());
    }

    #[test]
    fn test_get_by_key() {
        let store = DefinitionStore::open_in_memory().unwrap();
        store
            .put_batch("T", &[json!({"hash": 11, "v": "a"}), json!({"hash": 22, "v": "b"})])
            .unwrap();

        let found = store.get_by_key("T", 22).unwrap().unwrap();
        assert_eq!(found.definition["v"], "b");
        assert_eq!(found.position, 1);
        assert!(store.get_by_key("T", 33).unwrap().is_none());
        assert!(store.get_by_key("Other", 22).unwrap().is_none());
    }

    #[test]
    fn test_count_is_per_table() {
        let store = DefinitionStore::open_in_memory().unwrap();
        assert_eq!(store.count_by_table("A").unwrap(), 0);

        store.put_batch("A", &sample(3)).unwrap();
        store.put_batch("B", &sample(2)).unwrap();

        assert_eq!(store.count_by_table("A").unwrap(), 3);
        assert_eq!(store.count_by_table("B").unwrap(), 2);
        assert_eq!(store.count_by_table("C").unwrap(), 0);
    }

    #[test]
    fn test_same_hash_in_different_tables() {
        let store = DefinitionStore::open_in_memory().unwrap();
        store.put_batch("A", &[json!({"hash": 1, "t": "a"})]).unwrap();
        store.put_batch("B", &[json!({"hash": 1, "t": "b"})]).unwrap();

        assert_eq!(store.get_by_key("A", 1).unwrap().unwrap().definition["t"], "a");
        assert_eq!(store.get_by_key("B", 1).unwrap().unwrap().definition["t"], "b");
    }

    #[test]
    fn test_missing_hash_rolls_back_whole_batch() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let defs = vec![json!({"hash": 1}), json!({"hash": 2}), json!({"name": "no hash"})];

        let err = store.put_batch("T", &defs).unwrap_err();
        assert!(matches!(err, StoreError::MissingKey { position: 2, .. }));
        assert_eq!(store.count_by_table("T").unwrap(), 0);
        assert!(store.populated_at("T").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_hashes_report_stored_rows() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let defs = vec![json!({"hash": 5, "v": 1}), json!({"hash": 5, "v": 2})];

        assert_eq!(store.put_batch("T", &defs).unwrap(), 1);
        let row = store.get_by_key("T", 5).unwrap().unwrap();
        assert_eq!(row.definition["v"], 2);
        assert_eq!(row.position, 0);
    }

    #[test]
    fn test_duplicate_hashes_keep_positions_packed() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let defs = vec![
            json!({"hash": 5, "v": "a"}),
            json!({"hash": 5, "v": "b"}),
            json!({"hash": 6, "v": "c"}),
        ];

        let stored = store.put_batch("T", &defs).unwrap();
        assert_eq!(stored, 2);
        assert_eq!(store.count_by_table("T").unwrap(), 2);

        for offset in 0..stored {
            assert!(
                store.get_by_offset("T", offset).unwrap().is_some(),
                "offset {} has no definition",
                offset
            );
        }
        assert_eq!(store.get_by_offset("T", 0).unwrap().unwrap().definition["v"], "b");
        assert_eq!(store.get_by_offset("T", 1).unwrap().unwrap().definition["v"], "c");
        assert!(store.get_by_offset("T", 2).unwrap().is_none());
    }

    #[test]
    fn test_populated_at_recorded() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let before = Utc::now();
        store.put_batch("T", &sample(1)).unwrap();

        let stamp = store.populated_at("T").unwrap().unwrap();
        assert!(stamp >= before - chrono::Duration::seconds(1));
        assert!(store.populated_at("Other").unwrap().is_none());
    }

    #[test]
    fn test_reopen_sees_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DB_FILE);

        {
            let store = DefinitionStore::open(&path).unwrap();
            store.put_batch("T", &sample(4)).unwrap();
        }

        let reopened = DefinitionStore::open(&path).unwrap();
        assert_eq!(reopened.count_by_table("T").unwrap(), 4);
        assert_eq!(
            reopened.get_by_offset("T", 3).unwrap().unwrap().definition["index"],
            3
        );
    }

    #[test]
    fn test_schema_version_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DB_FILE);

        DefinitionStore::open(&path).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("UPDATE store_meta SET version = 9", params![]).unwrap();
        }

        let err = DefinitionStore::open(&path).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch {
                found: 9,
                expected: SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn test_open_fails_when_path_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = DefinitionStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let store = DefinitionStore::open_in_memory().unwrap();
        let stored = store
            .put_batch_async("T".to_string(), sample(3))
            .await
            .unwrap();
        assert_eq!(stored, 3);
        assert_eq!(store.count_by_table_async("T").await.unwrap(), 3);

        let by_offset = store.get_by_offset_async("T", 0).await.unwrap().unwrap();
        let by_key = store
            .get_by_key_async("T", by_offset.key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_offset, by_key);
        assert!(store.populated_at_async("T").await.unwrap().is_some());
    }
}
