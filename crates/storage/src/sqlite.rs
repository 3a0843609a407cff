use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;
use crate::traits::DurableStore;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(rusqlite::params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.set("queue/x", b"first").unwrap();
        store.set("queue/x", b"second").unwrap();
        assert_eq!(store.get("queue/x").unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn prefix_scan_treats_wildcards_literally() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.set("queue/a", b"1").unwrap();
        store.set("queue_b", b"2").unwrap();
        store.set("queue/c", b"3").unwrap();
        assert_eq!(store.keys_with_prefix("queue/").unwrap(), vec!["queue/a", "queue/c"]);
        assert_eq!(store.keys_with_prefix("queue_").unwrap(), vec!["queue_b"]);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let path = path.to_str().unwrap();
        {
            let mut store = SqliteStore::open(path).unwrap();
            store.set("queue/s1", &[1, 2, 3]).unwrap();
        }
        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.get("queue/s1").unwrap(), Some(vec![1, 2, 3]));
        store.conn().execute_batch("SELECT 1").unwrap();
    }

    #[test]
    fn missing_key_is_none() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("absent").unwrap().is_none());
        store.delete("absent").unwrap();
    }
}
