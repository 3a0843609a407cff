use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::traits::DurableStore;

/// Map-backed store. Durable only for as long as the value is kept alive,
/// which is enough to hand it from one engine instance to the next.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_scan_stops_at_prefix_boundary() {
        let mut store = MemoryStore::new();
        store.set("queue/a", b"1").unwrap();
        store.set("queue/b", b"2").unwrap();
        store.set("quota", b"3").unwrap();
        store.set("a", b"4").unwrap();
        assert_eq!(store.keys_with_prefix("queue/").unwrap(), vec!["queue/a", "queue/b"]);
    }

    #[test]
    fn delete_missing_is_ok() {
        let mut store = MemoryStore::new();
        store.delete("nothing").unwrap();
        store.set("k", b"v").unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        assert!(store.is_empty());
    }
}
