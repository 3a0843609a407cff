use std::collections::BTreeMap;

use rollsync_core::{CellKey, CellValue, Millis};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub key: CellKey,
    pub previous_value: Option<CellValue>,
    pub previous_synced_value: Option<CellValue>,
    pub expires_at: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Staged {
    previous_value: Option<CellValue>,
    previous_synced_value: Option<CellValue>,
}

/// Short-lived undo entries, at most one per key.
///
/// An edit first stages the value it replaced. The entry becomes undoable,
/// and its expiry starts, only when `commit` is called for the key after the
/// server accepted the edit.
#[derive(Debug)]
pub struct UndoLedger {
    entries: BTreeMap<CellKey, UndoEntry>,
    staged: BTreeMap<CellKey, Staged>,
    window_ms: Millis,
}

impl UndoLedger {
    pub fn new(window_ms: Millis) -> Self {
        Self {
            entries: BTreeMap::new(),
            staged: BTreeMap::new(),
            window_ms,
        }
    }

    /// Remember what an unsaved edit replaced. Drops any live entry for the
    /// key, since the newer edit supersedes it.
    pub fn stage(
        &mut self,
        key: CellKey,
        previous_value: Option<CellValue>,
        previous_synced_value: Option<CellValue>,
    ) {
        self.entries.remove(&key);
        self.staged.insert(
            key,
            Staged {
                previous_value,
                previous_synced_value,
            },
        );
    }

    /// Promote the staged entry for `key` once its edit is saved. Returns the
    /// expiry time to arm, or None when nothing was staged.
    pub fn commit(&mut self, key: CellKey, now: Millis) -> Option<Millis> {
        let staged = self.staged.remove(&key)?;
        Some(self.record(key, staged.previous_value, staged.previous_synced_value, now))
    }

    pub fn is_staged(&self, key: &CellKey) -> bool {
        self.staged.contains_key(key)
    }

    /// Record the state a key had before an edit. Replaces any older entry
    /// for the key. Returns the expiry time to arm.
    pub fn record(
        &mut self,
        key: CellKey,
        previous_value: Option<CellValue>,
        previous_synced_value: Option<CellValue>,
        now: Millis,
    ) -> Millis {
        let expires_at = now + self.window_ms;
        self.entries.insert(
            key,
            UndoEntry {
                key,
                previous_value,
                previous_synced_value,
                expires_at,
            },
        );
        expires_at
    }

    /// Take the entry for `key` if it has not expired at `now`.
    pub fn consume(&mut self, key: &CellKey, now: Millis) -> Option<UndoEntry> {
        let entry = self.entries.remove(key)?;
        (entry.expires_at > now).then_some(entry)
    }

    pub fn peek(&self, key: &CellKey) -> Option<&UndoEntry> {
        self.entries.get(key)
    }

    /// Forget the key entirely, staged or live.
    pub fn remove(&mut self, key: &CellKey) -> bool {
        let staged = self.staged.remove(key).is_some();
        self.entries.remove(key).is_some() || staged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollsync_core::EntityId;

    fn key(n: u8) -> CellKey {
        CellKey::new(EntityId::from_bytes([n; 16]), EntityId::from_bytes([0xf0; 16]))
    }

    #[test]
    fn consume_within_window() {
        let mut ledger = UndoLedger::new(5_000);
        assert_eq!(ledger.record(key(1), Some(CellValue::status("present")), None, 1_000), 6_000);
        let entry = ledger.consume(&key(1), 5_999).unwrap();
        assert_eq!(entry.previous_value, Some(CellValue::status("present")));
        assert!(ledger.consume(&key(1), 5_999).is_none());
    }

    #[test]
    fn consume_after_expiry_is_none() {
        let mut ledger = UndoLedger::new(5_000);
        ledger.record(key(1), Some(CellValue::Score(3.0)), None, 0);
        assert!(ledger.consume(&key(1), 5_000).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn newer_record_replaces_older() {
        let mut ledger = UndoLedger::new(5_000);
        ledger.record(key(1), Some(CellValue::status("present")), None, 0);
        ledger.record(key(1), Some(CellValue::status("absent")), None, 100);
        assert_eq!(ledger.len(), 1);
        let entry = ledger.consume(&key(1), 200).unwrap();
        assert_eq!(entry.previous_value, Some(CellValue::status("absent")));
        assert_eq!(entry.expires_at, 5_100);
    }

    #[test]
    fn staged_entry_is_not_undoable_until_committed() {
        let mut ledger = UndoLedger::new(5_000);
        ledger.stage(key(1), Some(CellValue::status("present")), Some(CellValue::status("present")));
        assert!(ledger.peek(&key(1)).is_none());
        assert!(ledger.consume(&key(1), 0).is_none());
        assert!(ledger.is_staged(&key(1)));

        assert_eq!(ledger.commit(key(1), 2_000), Some(7_000));
        assert!(!ledger.is_staged(&key(1)));
        let entry = ledger.consume(&key(1), 6_999).unwrap();
        assert_eq!(entry.previous_value, Some(CellValue::status("present")));
        assert_eq!(ledger.commit(key(1), 3_000), None);
    }

    #[test]
    fn staging_supersedes_live_entry() {
        let mut ledger = UndoLedger::new(5_000);
        ledger.record(key(1), Some(CellValue::status("present")), None, 0);
        ledger.stage(key(1), Some(CellValue::status("absent")), None);
        assert!(ledger.is_empty());
        assert!(ledger.remove(&key(1)));
        assert!(!ledger.is_staged(&key(1)));
    }
}
