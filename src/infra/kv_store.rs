//! Usage: String key/value persistence shared by the account registry and the interception pipeline.

use crate::infra::db::{self, Db};
use crate::shared::error::{db_err, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub trait KvStore: Send + Sync {
    fn read(&self, key: &str) -> AppResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// Durable store backed by the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: Db,
}

impl SqliteKvStore {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        Ok(Self::new(db::init(path)?))
    }
}

impl KvStore for SqliteKvStore {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.db.open_connection()?;
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| db_err!("failed to read kv entry {key}: {e}"))
    }

    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute(
            r#"
INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#,
            params![key, value, now_unix_seconds()],
        )
        .map_err(|e| db_err!("failed to write kv entry {key}: {e}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.db.open_connection()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(|e| db_err!("failed to remove kv entry {key}: {e}"))?;
        Ok(())
    }
}

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock_or_recover().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock_or_recover()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock_or_recover().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.read("account_pool_missing").expect("read"), None);

        store.write("account_pool_k", "one").expect("write");
        assert_eq!(
            store.read("account_pool_k").expect("read").as_deref(),
            Some("one")
        );

        store.write("account_pool_k", "two").expect("overwrite");
        assert_eq!(
            store.read("account_pool_k").expect("read").as_deref(),
            Some("two")
        );

        store.remove("account_pool_k").expect("remove");
        assert_eq!(store.read("account_pool_k").expect("read"), None);

        store.remove("account_pool_k").expect("remove absent key");
    }

    #[test]
    fn memory_store_read_write_remove() {
        exercise(&MemoryKvStore::new());
    }

    #[test]
    fn sqlite_store_read_write_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteKvStore::open(&dir.path().join("kv.db")).expect("open");
        exercise(&store);
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kv.db");
        {
            let store = SqliteKvStore::open(&path).expect("open");
            store.write("account_pool_active_email", "a@x").expect("write");
        }
        let store = SqliteKvStore::open(&path).expect("reopen");
        assert_eq!(
            store.read("account_pool_active_email").expect("read").as_deref(),
            Some("a@x")
        );
    }
}
