use std::collections::{BTreeMap, BTreeSet};

use rollsync_core::{CellKey, CellValue, EntityId, Millis, PendingMutation};

/// Local and last-confirmed value of one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub value: Option<CellValue>,
    pub synced_value: Option<CellValue>,
}

/// Where a dirty cell's latest value currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// Waiting for the next scheduled flush.
    Pending,
    /// Parked in the offline queue after a network failure.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEntry {
    pub state: DirtyState,
    pub attempted_at: Millis,
    /// Server refusal reason. Blocked cells stay dirty but are not flushed
    /// until edited again or retried.
    pub blocked: Option<String>,
}

/// Keys whose local value differs from the synced value. One entry per key.
#[derive(Debug, Default)]
pub struct MutationBuffer {
    entries: BTreeMap<CellKey, BufferEntry>,
}

impl MutationBuffer {
    pub fn contains(&self, key: &CellKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &CellKey) -> Option<&BufferEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mark(&mut self, key: CellKey, now: Millis) {
        self.entries.insert(
            key,
            BufferEntry {
                state: DirtyState::Pending,
                attempted_at: now,
                blocked: None,
            },
        );
    }

    fn clear(&mut self, key: &CellKey) {
        self.entries.remove(key);
    }
}

/// What a `set` replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    pub previous: Option<CellValue>,
    pub previous_synced: Option<CellValue>,
    /// Whether the key is in the mutation buffer after the set.
    pub dirty: bool,
}

/// In-memory map of editable cells, the single source of local truth.
///
/// Invariant: `value != synced_value` exactly when the key is in the buffer.
#[derive(Debug, Default)]
pub struct CellStore {
    cells: BTreeMap<CellKey, Cell>,
    roster: BTreeSet<EntityId>,
    buffer: MutationBuffer,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roster_contains(&self, entity: &EntityId) -> bool {
        self.roster.contains(entity)
    }

    pub fn roster(&self) -> impl Iterator<Item = &EntityId> {
        self.roster.iter()
    }

    pub fn get(&self, key: &CellKey) -> Option<&CellValue> {
        self.cells.get(key).and_then(|c| c.value.as_ref())
    }

    pub fn cell(&self, key: &CellKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    pub fn buffer(&self) -> &MutationBuffer {
        &self.buffer
    }

    /// Optimistically apply a local value and update the buffer.
    pub fn set(&mut self, key: CellKey, value: Option<CellValue>, now: Millis) -> SetOutcome {
        let cell = self.cells.entry(key).or_default();
        let previous = std::mem::replace(&mut cell.value, value);
        let previous_synced = cell.synced_value.clone();
        let dirty = cell.value != cell.synced_value;
        if dirty {
            self.buffer.mark(key, now);
        } else {
            self.buffer.clear(&key);
        }
        SetOutcome {
            previous,
            previous_synced,
            dirty,
        }
    }

    /// Replace everything with an authoritative snapshot. Local edits are
    /// dropped; callers re-apply whatever must survive.
    pub fn reconcile_from_server(
        &mut self,
        entities: &[EntityId],
        cells: &[(CellKey, Option<CellValue>)],
    ) {
        self.roster = entities.iter().copied().collect();
        self.buffer = MutationBuffer::default();
        self.cells = cells
            .iter()
            .map(|(key, value)| {
                (
                    *key,
                    Cell {
                        value: value.clone(),
                        synced_value: value.clone(),
                    },
                )
            })
            .collect();
    }

    /// Take new synced values from the server while keeping unsynced local
    /// edits on top of them.
    pub fn rebase_from_server(
        &mut self,
        entities: &[EntityId],
        cells: &[(CellKey, Option<CellValue>)],
    ) {
        self.roster = entities.iter().copied().collect();
        for (key, server_value) in cells {
            let cell = self.cells.entry(*key).or_default();
            cell.synced_value = server_value.clone();
            if !self.buffer.contains(key) {
                cell.value = server_value.clone();
            } else if cell.value == cell.synced_value {
                self.buffer.clear(key);
            }
        }
    }

    /// Put back an edit recovered from the offline queue.
    /// Returns false if the server already holds that value.
    pub fn restore_queued(&mut self, key: CellKey, value: Option<CellValue>, attempted_at: Millis) -> bool {
        let outcome = self.set(key, value, attempted_at);
        if outcome.dirty {
            self.set_state(&key, DirtyState::Queued);
        }
        outcome.dirty
    }

    /// The server confirmed `sent` for `key`. Returns true if the cell is
    /// clean afterwards; false if it was edited again meanwhile.
    pub fn acknowledge(&mut self, key: &CellKey, sent: &Option<CellValue>) -> bool {
        let Some(cell) = self.cells.get_mut(key) else {
            return true;
        };
        cell.synced_value = sent.clone();
        if cell.value == cell.synced_value {
            self.buffer.clear(key);
            true
        } else {
            false
        }
    }

    /// A flush carrying `sent` failed in transit and went to the offline
    /// queue. Only cells still holding that value move to `Queued`.
    pub fn mark_queued(&mut self, key: &CellKey, sent: &Option<CellValue>) {
        if self.cells.get(key).is_some_and(|c| &c.value == sent) {
            self.set_state(key, DirtyState::Queued);
        }
    }

    pub fn block(&mut self, key: &CellKey, reason: &str) {
        if let Some(entry) = self.buffer.entries.get_mut(key) {
            entry.blocked = Some(reason.to_string());
        }
    }

    /// Clear the blocked flag and make the key eligible for the next flush.
    pub fn unblock(&mut self, key: &CellKey) -> bool {
        match self.buffer.entries.get_mut(key) {
            Some(entry) if entry.blocked.is_some() => {
                entry.blocked = None;
                entry.state = DirtyState::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn is_dirty(&self, key: &CellKey) -> bool {
        self.buffer.contains(key)
    }

    pub fn is_blocked(&self, key: &CellKey) -> bool {
        self.buffer.get(key).is_some_and(|e| e.blocked.is_some())
    }

    /// Current values of all flushable keys: pending and not blocked.
    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.buffer
            .entries
            .iter()
            .filter(|(_, e)| e.state == DirtyState::Pending && e.blocked.is_none())
            .map(|(key, e)| PendingMutation {
                key: *key,
                value: self.cells.get(key).and_then(|c| c.value.clone()),
                attempted_at: e.attempted_at,
            })
            .collect()
    }

    /// Unsaved cells, excluding blocked ones.
    pub fn pending_count(&self) -> usize {
        self.buffer
            .entries
            .values()
            .filter(|e| e.blocked.is_none())
            .count()
    }

    pub fn blocked_cells(&self) -> Vec<(CellKey, String)> {
        self.buffer
            .entries
            .iter()
            .filter_map(|(key, e)| e.blocked.as_ref().map(|r| (*key, r.clone())))
            .collect()
    }

    pub fn dirty_keys(&self) -> Vec<CellKey> {
        self.buffer.entries.keys().copied().collect()
    }

    /// Drop the local edit and return to the synced value.
    pub fn discard(&mut self, key: &CellKey) -> bool {
        let Some(cell) = self.cells.get_mut(key) else {
            return false;
        };
        cell.value = cell.synced_value.clone();
        let was_dirty = self.buffer.contains(key);
        self.buffer.clear(key);
        was_dirty
    }

    fn set_state(&mut self, key: &CellKey, state: DirtyState) {
        if let Some(entry) = self.buffer.entries.get_mut(key) {
            entry.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> CellKey {
        CellKey::new(EntityId::from_bytes([n; 16]), EntityId::from_bytes([0xf0; 16]))
    }

    fn present() -> Option<CellValue> {
        Some(CellValue::status("present"))
    }

    fn absent() -> Option<CellValue> {
        Some(CellValue::status("absent"))
    }

    fn seeded() -> CellStore {
        let mut store = CellStore::new();
        store.reconcile_from_server(
            &[EntityId::from_bytes([1; 16]), EntityId::from_bytes([2; 16])],
            &[(key(1), present()), (key(2), None)],
        );
        store
    }

    #[test]
    fn set_marks_dirty_and_revert_clears() {
        let mut store = seeded();
        let out = store.set(key(1), absent(), 10);
        assert!(out.dirty);
        assert_eq!(out.previous, present());
        assert!(store.is_dirty(&key(1)));

        let out = store.set(key(1), present(), 20);
        assert!(!out.dirty);
        assert!(!store.is_dirty(&key(1)));
        assert!(store.buffer().is_empty());
    }

    #[test]
    fn repeated_edits_coalesce_to_one_entry() {
        let mut store = seeded();
        store.set(key(2), Some(CellValue::status("late")), 1);
        store.set(key(2), absent(), 2);
        store.set(key(2), present(), 3);
        let pending = store.pending_mutations();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, present());
        assert_eq!(pending[0].attempted_at, 3);
    }

    #[test]
    fn acknowledge_respects_newer_edit() {
        let mut store = seeded();
        store.set(key(2), absent(), 1);
        store.set(key(2), present(), 2);
        // server confirms the older value
        assert!(!store.acknowledge(&key(2), &absent()));
        assert!(store.is_dirty(&key(2)));
        assert_eq!(store.cell(&key(2)).unwrap().synced_value, absent());
        assert!(store.acknowledge(&key(2), &present()));
        assert!(!store.is_dirty(&key(2)));
    }

    #[test]
    fn blocked_cells_excluded_from_pending() {
        let mut store = seeded();
        store.set(key(1), absent(), 1);
        store.set(key(2), absent(), 1);
        store.block(&key(1), "window closed");
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.pending_mutations().len(), 1);
        assert_eq!(store.blocked_cells(), vec![(key(1), "window closed".to_string())]);
        assert!(store.unblock(&key(1)));
        assert_eq!(store.pending_count(), 2);
    }

    #[test]
    fn new_edit_clears_blocked_flag() {
        let mut store = seeded();
        store.set(key(1), absent(), 1);
        store.block(&key(1), "locked");
        store.set(key(1), Some(CellValue::status("late")), 2);
        assert!(!store.is_blocked(&key(1)));
    }

    #[test]
    fn queued_cells_not_flushed_by_scheduler() {
        let mut store = seeded();
        store.set(key(1), absent(), 1);
        store.mark_queued(&key(1), &absent());
        assert!(store.pending_mutations().is_empty());
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.buffer().get(&key(1)).unwrap().state, DirtyState::Queued);
    }

    #[test]
    fn mark_queued_ignores_stale_value() {
        let mut store = seeded();
        store.set(key(1), absent(), 1);
        store.mark_queued(&key(1), &Some(CellValue::status("late")));
        assert_eq!(store.buffer().get(&key(1)).unwrap().state, DirtyState::Pending);
    }

    #[test]
    fn rebase_keeps_local_edits() {
        let mut store = seeded();
        store.set(key(1), absent(), 1);
        store.rebase_from_server(
            &[EntityId::from_bytes([1; 16]), EntityId::from_bytes([2; 16])],
            &[(key(1), Some(CellValue::status("late"))), (key(2), present())],
        );
        assert_eq!(store.get(&key(1)), absent().as_ref());
        assert!(store.is_dirty(&key(1)));
        assert_eq!(store.get(&key(2)), present().as_ref());
        assert!(!store.is_dirty(&key(2)));
    }

    #[test]
    fn restore_queued_skips_values_already_on_server() {
        let mut store = seeded();
        assert!(!store.restore_queued(key(1), present(), 5));
        assert!(store.restore_queued(key(2), absent(), 5));
        assert_eq!(store.buffer().get(&key(2)).unwrap().state, DirtyState::Queued);
    }

    #[test]
    fn discard_reverts_to_synced() {
        let mut store = seeded();
        store.set(key(1), None, 1);
        assert!(store.discard(&key(1)));
        assert_eq!(store.get(&key(1)), present().as_ref());
        assert!(!store.is_dirty(&key(1)));
    }
}
