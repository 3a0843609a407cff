use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::ids::{CellKey, EntityId, ScopeId};
use crate::session::SessionWindow;
use crate::value::CellValue;

/// A local edit waiting to reach the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub key: CellKey,
    pub value: Option<CellValue>,
    pub attempted_at: Millis,
}

/// A mutation parked in the durable offline queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub scope_id: ScopeId,
    pub seq: u64,
    pub mutation: PendingMutation,
}

impl QueueEntry {
    pub fn key(&self) -> CellKey {
        self.mutation.key
    }
}

/// One `{key, value}` item of a bulk upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWrite {
    pub key: CellKey,
    pub value: Option<CellValue>,
}

/// A key the server refused to apply inside an otherwise accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCell {
    pub key: CellKey,
    pub reason: String,
}

/// Response of a bulk upsert that was not a hard conflict. An empty
/// `blocked` list means full success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResponse {
    #[serde(default)]
    pub blocked: Vec<BlockedCell>,
}

impl UpsertResponse {
    pub fn accepted() -> Self {
        Self::default()
    }
}

/// Authoritative state of a scope as returned by the roster/session fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope_id: ScopeId,
    pub window: SessionWindow,
    /// Row entities of the roster. Every key whose subject is listed here is
    /// editable, whether or not a value exists for it yet.
    pub entities: Vec<EntityId>,
    pub cells: Vec<(CellKey, Option<CellValue>)>,
}
