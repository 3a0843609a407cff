use std::collections::BTreeMap;

use rollsync_core::{CellKey, Millis, PendingMutation, QueueEntry, ScopeId};
use rollsync_storage::{DurableStore, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cells::CellStore;

const QUEUE_PREFIX: &str = "queue/";
const CHECKSUM_LEN: usize = 32;

pub fn queue_key(scope_id: ScopeId) -> String {
    format!("{QUEUE_PREFIX}{scope_id}")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueDocument {
    next_seq: u64,
    entries: Vec<QueueEntry>,
}

fn encode(doc: &QueueDocument) -> Result<Vec<u8>, StorageError> {
    let payload = rmp_serde::to_vec(doc).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let mut framed = Vec::with_capacity(CHECKSUM_LEN + payload.len());
    framed.extend_from_slice(blake3::hash(&payload).as_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

fn decode(key: &str, bytes: &[u8]) -> Result<QueueDocument, StorageError> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(StorageError::Corrupt {
            key: key.to_string(),
            detail: "record shorter than checksum".into(),
        });
    }
    let (checksum, payload) = bytes.split_at(CHECKSUM_LEN);
    if blake3::hash(payload).as_bytes() != checksum {
        warn!(key, "offline queue checksum mismatch");
        return Err(StorageError::Corrupt {
            key: key.to_string(),
            detail: "checksum mismatch".into(),
        });
    }
    rmp_serde::from_slice(payload).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn read_document<S: DurableStore>(store: &S, scope_id: ScopeId) -> Result<QueueDocument, StorageError> {
    let key = queue_key(scope_id);
    match store.get(&key)? {
        Some(bytes) => decode(&key, &bytes),
        None => Ok(QueueDocument::default()),
    }
}

/// Mutations of one scope to resend in the next replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPlan {
    pub writes: Vec<PendingMutation>,
    /// Entries dropped without a network call.
    pub pruned: usize,
}

/// Durable write-ahead log of mutations that could not reach the server.
///
/// Persisted under `queue/<scope>` after every change, so a fresh instance
/// over the same store sees exactly what the previous one left behind.
#[derive(Debug)]
pub struct OfflineQueue {
    scope_id: ScopeId,
    next_seq: u64,
    entries: Vec<QueueEntry>,
}

impl OfflineQueue {
    pub fn load<S: DurableStore>(store: &S, scope_id: ScopeId) -> Result<Self, StorageError> {
        let doc = read_document(store, scope_id)?;
        debug!(scope = %scope_id, entries = doc.entries.len(), "loaded offline queue");
        Ok(Self {
            scope_id,
            next_seq: doc.next_seq,
            entries: doc.entries,
        })
    }

    /// Number of queued entries for any scope, without loading an engine.
    pub fn count_for<S: DurableStore>(store: &S, scope_id: ScopeId) -> Result<usize, StorageError> {
        Ok(read_document(store, scope_id)?.entries.len())
    }

    /// Scopes that currently have a persisted queue.
    pub fn queued_scopes<S: DurableStore>(store: &S) -> Result<Vec<ScopeId>, StorageError> {
        store
            .keys_with_prefix(QUEUE_PREFIX)?
            .iter()
            .map(|key| {
                Uuid::parse_str(&key[QUEUE_PREFIX.len()..])
                    .map(ScopeId::from_uuid)
                    .map_err(|e| StorageError::Corrupt {
                        key: key.clone(),
                        detail: e.to_string(),
                    })
            })
            .collect()
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enqueue<S: DurableStore>(
        &mut self,
        store: &mut S,
        mutations: impl IntoIterator<Item = PendingMutation>,
    ) -> Result<usize, StorageError> {
        let before = self.entries.len();
        for mutation in mutations {
            self.entries.push(QueueEntry {
                scope_id: self.scope_id,
                seq: self.next_seq,
                mutation,
            });
            self.next_seq += 1;
        }
        let added = self.entries.len() - before;
        if added > 0 {
            self.persist(store)?;
        }
        Ok(added)
    }

    /// Collapse the queue against the current cell store and pick what to send.
    ///
    /// Per key: if the cell is clean the entries are stale and dropped; else
    /// only the newest entry survives, rewritten to the cell's current value.
    /// Keys that are blocked or for which `sendable` is false stay queued
    /// untouched and are not sent.
    pub fn prepare_replay<S: DurableStore>(
        &mut self,
        store: &mut S,
        cells: &CellStore,
        sendable: impl Fn(&CellKey) -> bool,
        now: Millis,
    ) -> Result<ReplayPlan, StorageError> {
        let mut newest: BTreeMap<CellKey, u64> = BTreeMap::new();
        for entry in &self.entries {
            newest.insert(entry.key(), entry.seq);
        }

        let before = self.entries.len();
        let mut changed = false;
        let mut writes = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for mut entry in std::mem::take(&mut self.entries) {
            let key = entry.key();
            if !cells.is_dirty(&key) {
                continue;
            }
            let held = cells.is_blocked(&key) || !sendable(&key);
            if held {
                kept.push(entry);
                continue;
            }
            if newest.get(&key) != Some(&entry.seq) {
                continue;
            }
            let current = cells.get(&key).cloned();
            if entry.mutation.value != current {
                entry.mutation.value = current;
                entry.mutation.attempted_at = now;
                changed = true;
            }
            writes.push(entry.mutation.clone());
            kept.push(entry);
        }
        self.entries = kept;

        let pruned = before - self.entries.len();
        if pruned > 0 || changed {
            self.persist(store)?;
        }
        if pruned > 0 {
            debug!(scope = %self.scope_id, pruned, "pruned stale queue entries");
        }
        Ok(ReplayPlan { writes, pruned })
    }

    /// The newest queued mutation of each key, in key order.
    pub fn latest(&self) -> Vec<PendingMutation> {
        let mut newest: BTreeMap<CellKey, &QueueEntry> = BTreeMap::new();
        for entry in &self.entries {
            newest
                .entry(entry.key())
                .and_modify(|e| {
                    if entry.seq > e.seq {
                        *e = entry;
                    }
                })
                .or_insert(entry);
        }
        newest.into_values().map(|e| e.mutation.clone()).collect()
    }

    /// The server holds a value for each key that is at least as new as
    /// anything queued for it. Every entry for those keys goes, whatever
    /// value it carried.
    pub fn acknowledge<S: DurableStore>(
        &mut self,
        store: &mut S,
        keys: &[CellKey],
    ) -> Result<usize, StorageError> {
        let removed = self.remove_keys(store, keys)?;
        if removed > 0 {
            debug!(scope = %self.scope_id, removed, "queue entries superseded by saved values");
        }
        Ok(removed)
    }

    /// Drop every entry for the given keys regardless of value.
    pub fn remove_keys<S: DurableStore>(
        &mut self,
        store: &mut S,
        keys: &[CellKey],
    ) -> Result<usize, StorageError> {
        let before = self.entries.len();
        self.entries.retain(|entry| !keys.contains(&entry.key()));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist(store)?;
        }
        Ok(removed)
    }

    fn persist<S: DurableStore>(&self, store: &mut S) -> Result<(), StorageError> {
        let key = queue_key(self.scope_id);
        if self.entries.is_empty() {
            return store.delete(&key);
        }
        let bytes = encode(&QueueDocument {
            next_seq: self.next_seq,
            entries: self.entries.clone(),
        })?;
        store.set(&key, &bytes)
    }
}
