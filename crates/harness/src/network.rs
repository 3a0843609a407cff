use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rollsync_core::{
    ActorId, BlockedCell, CellKey, CellValue, CellWrite, Clock, EntityId, Grant, LockReason,
    ManualClock, ScopeId, ScopeSnapshot, SessionWindow, UpsertResponse,
};
use rollsync_engine::{Transport, TransportError};

#[derive(Debug, Clone)]
struct ServerScope {
    window: SessionWindow,
    entities: Vec<EntityId>,
    cells: BTreeMap<CellKey, Option<CellValue>>,
    grants: Vec<Grant>,
}

/// Calls received by the server, failed attempts included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub snapshot: usize,
    pub upsert: usize,
    pub grants: usize,
    pub close: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.snapshot + self.upsert + self.grants + self.close
    }
}

#[derive(Debug, Default)]
struct ServerState {
    scopes: BTreeMap<ScopeId, ServerScope>,
    offline: bool,
    blocked: BTreeMap<CellKey, String>,
    reject_next: Option<String>,
    calls: CallCounts,
    upserts: Vec<Vec<CellWrite>>,
}

/// In-process stand-in for the remote collaborator.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another one.
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Rc<RefCell<ServerState>>,
    clock: ManualClock,
}

impl FakeServer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            state: Rc::new(RefCell::new(ServerState::default())),
            clock,
        }
    }

    pub fn add_scope(
        &self,
        scope: ScopeId,
        window: SessionWindow,
        entities: Vec<EntityId>,
        cells: Vec<(CellKey, Option<CellValue>)>,
    ) {
        self.state.borrow_mut().scopes.insert(
            scope,
            ServerScope {
                window,
                entities,
                cells: cells.into_iter().collect(),
                grants: Vec::new(),
            },
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    /// Refuse writes to `key` inside otherwise accepted batches.
    pub fn block_key(&self, key: CellKey, reason: &str) {
        self.state.borrow_mut().blocked.insert(key, reason.to_string());
    }

    pub fn unblock_all(&self) {
        self.state.borrow_mut().blocked.clear();
    }

    pub fn reject_next(&self, message: &str) {
        self.state.borrow_mut().reject_next = Some(message.to_string());
    }

    pub fn set_grants(&self, scope: ScopeId, grants: Vec<Grant>) {
        if let Some(s) = self.state.borrow_mut().scopes.get_mut(&scope) {
            s.grants = grants;
        }
    }

    /// Close the window server-side without the client knowing.
    pub fn close_window(&self, scope: ScopeId, reason: LockReason) {
        let now = self.clock.now_ms();
        if let Some(s) = self.state.borrow_mut().scopes.get_mut(&scope) {
            s.window.closed_at.get_or_insert(now);
            s.window.close_reason.get_or_insert(reason);
        }
    }

    pub fn set_window(&self, scope: ScopeId, window: SessionWindow) {
        if let Some(s) = self.state.borrow_mut().scopes.get_mut(&scope) {
            s.window = window;
        }
    }

    /// Server-side value of a cell. None if the cell was never written.
    pub fn cell(&self, scope: ScopeId, key: &CellKey) -> Option<CellValue> {
        self.state
            .borrow()
            .scopes
            .get(&scope)
            .and_then(|s| s.cells.get(key).cloned())
            .flatten()
    }

    /// Write a cell as another client would.
    pub fn write_cell(&self, scope: ScopeId, key: CellKey, value: Option<CellValue>) {
        if let Some(s) = self.state.borrow_mut().scopes.get_mut(&scope) {
            s.cells.insert(key, value);
        }
    }

    pub fn calls(&self) -> CallCounts {
        self.state.borrow().calls
    }

    pub fn upsert_log(&self) -> Vec<Vec<CellWrite>> {
        self.state.borrow().upserts.clone()
    }

    fn scope_window(&self, scope: ScopeId) -> Result<SessionWindow, TransportError> {
        self.state
            .borrow()
            .scopes
            .get(&scope)
            .map(|s| s.window.clone())
            .ok_or_else(|| TransportError::Rejected(format!("unknown scope {scope}")))
    }
}

impl Transport for FakeServer {
    fn fetch_snapshot(&mut self, scope: ScopeId) -> Result<ScopeSnapshot, TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.snapshot += 1;
        if state.offline {
            return Err(TransportError::Io("connection refused".into()));
        }
        let s = state
            .scopes
            .get(&scope)
            .ok_or_else(|| TransportError::Rejected(format!("unknown scope {scope}")))?;
        Ok(ScopeSnapshot {
            scope_id: scope,
            window: s.window.clone(),
            entities: s.entities.clone(),
            cells: s.cells.iter().map(|(k, v)| (*k, v.clone())).collect(),
        })
    }

    fn bulk_upsert(
        &mut self,
        scope: ScopeId,
        writes: &[CellWrite],
    ) -> Result<UpsertResponse, TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.upsert += 1;
        if state.offline {
            return Err(TransportError::Io("connection reset".into()));
        }
        if let Some(message) = state.reject_next.take() {
            return Err(TransportError::Rejected(message));
        }
        state.upserts.push(writes.to_vec());

        let blocked_keys = state.blocked.clone();
        let s = state
            .scopes
            .get_mut(&scope)
            .ok_or_else(|| TransportError::Rejected(format!("unknown scope {scope}")))?;
        if s.window.closed_at.is_some() {
            let reason = s.window.close_reason.unwrap_or(LockReason::Manual);
            return Err(TransportError::WindowClosed {
                reason,
                detail: format!("session closed ({reason})"),
            });
        }
        let mut blocked = Vec::new();
        for write in writes {
            match blocked_keys.get(&write.key) {
                Some(reason) => blocked.push(BlockedCell {
                    key: write.key,
                    reason: reason.clone(),
                }),
                None => {
                    s.cells.insert(write.key, write.value.clone());
                }
            }
        }
        Ok(UpsertResponse { blocked })
    }

    fn active_grants(&mut self, scope: ScopeId, _actor: ActorId) -> Result<Vec<Grant>, TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.grants += 1;
        if state.offline {
            return Err(TransportError::Io("connection refused".into()));
        }
        Ok(state
            .scopes
            .get(&scope)
            .map(|s| s.grants.clone())
            .unwrap_or_default())
    }

    fn close_session(&mut self, scope: ScopeId) -> Result<SessionWindow, TransportError> {
        {
            let mut state = self.state.borrow_mut();
            state.calls.close += 1;
            if state.offline {
                return Err(TransportError::Io("connection refused".into()));
            }
        }
        self.close_window(scope, LockReason::Manual);
        self.scope_window(scope)
    }
}
