//! Key-value store abstraction and its two backends.
//!
//! The pipeline persists everything through [`KvStore`]: an in-memory map for
//! tests and local development, and a SQLite-backed table for production. No
//! transactions and no per-key locking — every record has exactly one logical
//! writer, so read-modify-write races are avoided by construction.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// All keys starting with `prefix`, sorted ascending.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
    /// Increment an integer value, treating a missing key as 0.
    async fn incr(&self, key: &str) -> Result<i64>;
}

// =====================================================
// Record helpers (strict parse-or-discard)
// =====================================================

/// Outcome of reading a structured record.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Found(T),
    Missing,
    /// The stored value failed to parse. The key has been deleted; the caller
    /// reports the loss instead of propagating a parse error.
    Discarded,
}

pub async fn read_record<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<ReadOutcome<T>> {
    match store.get(key).await? {
        None => Ok(ReadOutcome::Missing),
        Some(raw) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => Ok(ReadOutcome::Found(value)),
            Err(e) => {
                log::warn!("Discarding unparseable record at {key}: {e}");
                store.delete(key).await?;
                Ok(ReadOutcome::Discarded)
            }
        },
    }
}

pub async fn write_record<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| PipelineError::Store(format!("serialize {key}: {e}")))?;
    store.set(key, &raw).await
}

// =====================================================
// In-memory backend
// =====================================================

#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .map
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut map = self.map.lock().unwrap();
        let next = map
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        map.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}

// =====================================================
// SQLite backend
// =====================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{prefix}%");
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ORDER BY key")?;
        let keys = stmt
            .query_map([pattern.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let current: Option<String> = {
            let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
            let mut rows = stmt.query([key])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        let next = current.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, next.to_string().as_str()],
        )?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    async fn exercise_store(store: &dyn KvStore) {
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("post:100", "x").await.unwrap();
        store.set("post:101", "y").await.unwrap();
        store.set("cursor:acct1", "101").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        let keys = store.list_keys("post:").await.unwrap();
        assert_eq!(keys, vec!["post:100", "post:101"]);

        store.delete("post:100").await.unwrap();
        assert_eq!(store.get("post:100").await.unwrap(), None);
        assert_eq!(store.list_keys("post:").await.unwrap(), vec!["post:101"]);

        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.get("counter").await.unwrap().as_deref(), Some("2"));

        // set overwrites
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn memory_store_contract() {
        exercise_store(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_contract() {
        exercise_store(&SqliteStore::open(":memory:").unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::open(path).unwrap();
            store.set("cursor:acct1", "99").await.unwrap();
        }
        let store = SqliteStore::open(path).unwrap();
        assert_eq!(
            store.get("cursor:acct1").await.unwrap().as_deref(),
            Some("99")
        );
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        n: i64,
    }

    #[tokio::test]
    async fn read_record_round_trips() {
        let store = MemoryStore::new();
        write_record(&store, "r", &Rec { n: 7 }).await.unwrap();
        match read_record::<Rec>(&store, "r").await.unwrap() {
            ReadOutcome::Found(rec) => assert_eq!(rec, Rec { n: 7 }),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_record_discards_unparseable_values() {
        let store = MemoryStore::new();
        store.set("r", "[object Object]").await.unwrap();
        match read_record::<Rec>(&store, "r").await.unwrap() {
            ReadOutcome::Discarded => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The corrupted value is gone, not repaired.
        assert_eq!(store.get("r").await.unwrap(), None);
        match read_record::<Rec>(&store, "r").await.unwrap() {
            ReadOutcome::Missing => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
