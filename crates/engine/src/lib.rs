pub mod cells;
pub mod config;
pub mod conflict;
pub mod error;
pub mod grants;
pub mod queue;
pub mod scheduler;
pub mod timers;
pub mod transport;
pub mod undo;
pub mod validate;
pub mod window;

pub use cells::{CellStore, DirtyState};
pub use config::EngineConfig;
pub use error::EngineError;
pub use grants::{GrantResolver, is_editable};
pub use queue::{OfflineQueue, queue_key};
pub use scheduler::SyncState;
pub use transport::{Transport, TransportError};
pub use undo::{UndoEntry, UndoLedger};
pub use validate::{ValidationError, ValidationRules};
pub use window::SessionWindowMachine;

use rollsync_core::{
    CellKey, CellValue, CellWrite, Clock, CoreError, LockReason, Millis, PendingMutation, ScopeId,
    ScopeSnapshot, SessionWindow, UpsertResponse, WindowState,
};
use rollsync_storage::DurableStore;
use tracing::{debug, info, warn};

use crate::conflict::Resolution;
use crate::scheduler::{FlushResult, SyncScheduler, TimerDecision};
use crate::timers::{TimerKind, TimerTable};

/// Reason attached to dirty cells that lost their edit permission locally.
pub const LOCKED_REASON: &str = "session locked";

/// Something the host should surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Saved { count: usize },
    QueuedOffline { count: usize },
    CellsBlocked { keys: Vec<CellKey> },
    /// First observation of a locked window. Emitted once per loaded session.
    SessionLocked { reason: LockReason },
    WindowConflict { reason: LockReason, detail: String },
    UndoExpired { key: CellKey },
}

/// A batch claimed by `begin_flush`. Must be handed back to `complete_flush`.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    pub scope_id: ScopeId,
    pub writes: Vec<CellWrite>,
    mutations: Vec<PendingMutation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Saved { accepted: usize, blocked: usize },
    /// The batch is in the offline queue.
    Offline { detail: String },
    Conflict { reason: LockReason, detail: String },
    Rejected { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFlushReport {
    pub flushed_count: usize,
    pub remaining_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub sync: SyncState,
    pub window: Option<WindowState>,
    pub pending: usize,
    pub blocked: usize,
    pub queued: usize,
    pub needs_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Undo,
}

/// Local-first edit/sync engine for one scope.
///
/// Sans-IO with respect to time: the host calls `poll()` at or after
/// `next_wakeup()`. Network calls go through the owned `Transport`, except
/// when the host drives a flush itself with `begin_flush`/`complete_flush`.
pub struct SyncEngine<T, S, C> {
    scope_id: ScopeId,
    config: EngineConfig,
    transport: T,
    store: S,
    clock: C,
    cells: CellStore,
    scheduler: SyncScheduler,
    queue: OfflineQueue,
    window: Option<SessionWindowMachine>,
    grants: GrantResolver,
    undo: UndoLedger,
    timers: TimerTable,
    needs_refresh: bool,
    events: Vec<EngineEvent>,
}

impl<T: Transport, S: DurableStore, C: Clock> SyncEngine<T, S, C> {
    /// Create an engine and read the scope's offline queue. Call `load()`
    /// before editing.
    pub fn new(
        scope_id: ScopeId,
        config: EngineConfig,
        transport: T,
        store: S,
        clock: C,
    ) -> Result<Self, EngineError> {
        let queue = OfflineQueue::load(&store, scope_id)?;
        Ok(Self {
            scope_id,
            scheduler: SyncScheduler::new(config.debounce_ms),
            undo: UndoLedger::new(config.undo_window_ms),
            config,
            transport,
            store,
            clock,
            cells: CellStore::new(),
            queue,
            window: None,
            grants: GrantResolver::new(),
            timers: TimerTable::new(),
            needs_refresh: false,
            events: Vec::new(),
        })
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (T, S, C) {
        (self.transport, self.store, self.clock)
    }

    // ---- loading ----

    pub fn load(&mut self) -> Result<(), EngineError> {
        let snapshot = self.transport.fetch_snapshot(self.scope_id)?;
        self.apply_snapshot(snapshot)
    }

    /// Replace all local state with an authoritative snapshot, then lay the
    /// offline queue back over it as unsynced edits. Timers are recomputed
    /// from the snapshot.
    pub fn apply_snapshot(&mut self, snapshot: ScopeSnapshot) -> Result<(), EngineError> {
        if snapshot.scope_id != self.scope_id {
            return Err(CoreError::InvalidData(format!(
                "snapshot for scope {} applied to {}",
                snapshot.scope_id, self.scope_id
            ))
            .into());
        }
        let now = self.clock.now_ms();
        self.timers.clear();
        self.undo.clear();
        self.scheduler = SyncScheduler::new(self.config.debounce_ms);
        self.needs_refresh = false;
        self.cells.reconcile_from_server(&snapshot.entities, &snapshot.cells);

        let mut already_applied = Vec::new();
        for m in self.queue.latest() {
            if !self.cells.restore_queued(m.key, m.value, m.attempted_at) {
                already_applied.push(m.key);
            }
        }
        self.queue.acknowledge(&mut self.store, &already_applied)?;

        self.window = Some(SessionWindowMachine::new(snapshot.window));
        self.grants = GrantResolver::new();
        let state = self.window_state_at(now)?;
        if state.is_locked() {
            self.ensure_grants();
        }
        self.sync_deadline_timer();
        self.reevaluate_dirty(state, now);

        info!(
            scope = %self.scope_id,
            entities = snapshot.entities.len(),
            cells = snapshot.cells.len(),
            queued = self.queue.len(),
            "scope loaded"
        );
        Ok(())
    }

    /// Re-fetch session and cell state from the server, keeping local edits.
    pub fn refresh(&mut self) -> Result<(), EngineError> {
        if self.window.is_none() {
            return Err(EngineError::NotLoaded);
        }
        let snapshot = self.transport.fetch_snapshot(self.scope_id)?;
        let now = self.clock.now_ms();
        if let Some(window) = self.window.as_mut() {
            window.apply_server(snapshot.window);
        }
        // re-armed from the fresh window below
        self.timers.cancel(TimerKind::Deadline);
        self.cells.rebase_from_server(&snapshot.entities, &snapshot.cells);
        self.grants.invalidate();
        let state = self.window_state_at(now)?;
        if state.is_locked() {
            let grants = self.transport.active_grants(self.scope_id, self.config.actor)?;
            self.grants.replace(grants);
        }
        self.needs_refresh = false;
        self.sync_deadline_timer();

        if self.reevaluate_dirty(state, now) {
            let at = self.scheduler.on_edit(now);
            self.timers.arm(TimerKind::Debounce, at);
        }
        debug!(scope = %self.scope_id, state = ?state, "session state refreshed");
        Ok(())
    }

    // ---- editing ----

    pub fn get(&self, key: &CellKey) -> Option<&CellValue> {
        self.cells.get(key)
    }

    pub fn cells(&self) -> &CellStore {
        &self.cells
    }

    /// Optimistically set a cell and schedule a flush.
    ///
    /// Refused locally when the value is invalid, the subject is not on the
    /// roster, the window is locked with no covering grant, or a window
    /// conflict is waiting for `refresh()`.
    pub fn set(&mut self, key: CellKey, value: Option<CellValue>) -> Result<(), EngineError> {
        let now = self.clock.now_ms();
        self.check_editable(&key, now)?;
        self.config.rules.validate(value.as_ref())?;
        self.apply_edit(key, value, Origin::User, now);
        Ok(())
    }

    /// Revert `key` to the value it had before its last edit. Returns false
    /// when there is nothing to undo (never recorded, already used, or expired).
    pub fn undo(&mut self, key: CellKey) -> Result<bool, EngineError> {
        let now = self.clock.now_ms();
        self.check_editable(&key, now)?;
        let Some(entry) = self.undo.consume(&key, now) else {
            return Ok(false);
        };
        self.timers.cancel(TimerKind::UndoExpiry(key));
        debug!(
            %key,
            restores_synced = entry.previous_value == entry.previous_synced_value,
            "undo"
        );
        self.apply_edit(key, entry.previous_value, Origin::Undo, now);
        Ok(true)
    }

    pub fn can_undo(&self, key: &CellKey) -> bool {
        self.undo
            .peek(key)
            .is_some_and(|e| e.expires_at > self.clock.now_ms())
    }

    /// Throw away the local edit of `key`, queued copies included.
    pub fn discard(&mut self, key: CellKey) -> Result<bool, EngineError> {
        let discarded = self.cells.discard(&key);
        self.undo.remove(&key);
        self.timers.cancel(TimerKind::UndoExpiry(key));
        self.queue.remove_keys(&mut self.store, &[key])?;
        Ok(discarded)
    }

    /// Clear the blocked flag on `keys` and schedule them again. Keys that
    /// are still not editable stay blocked. Returns how many were released.
    pub fn retry_blocked(&mut self, keys: &[CellKey]) -> Result<usize, EngineError> {
        let now = self.clock.now_ms();
        self.window_state_at(now)?;
        if self.needs_refresh {
            return Err(EngineError::RefreshRequired);
        }
        let mut released = 0;
        for key in keys {
            if !self.cells.is_blocked(key) || self.check_editable(key, now).is_err() {
                continue;
            }
            if self.cells.unblock(key) {
                released += 1;
            }
        }
        if released > 0 {
            let at = self.scheduler.on_edit(now);
            self.timers.arm(TimerKind::Debounce, at);
        }
        Ok(released)
    }

    /// Whether `key` may be edited right now. May fetch grants.
    pub fn editable(&mut self, key: &CellKey) -> Result<bool, EngineError> {
        let now = self.clock.now_ms();
        let state = self.window_state_at(now)?;
        if state.is_locked() && !self.ensure_grants() {
            return Ok(false);
        }
        Ok(self.grants.editable(key, state, now))
    }

    /// Current window state; latches and announces a lock when first seen.
    pub fn window_state(&mut self) -> Result<WindowState, EngineError> {
        let now = self.clock.now_ms();
        self.window_state_at(now)
    }

    pub fn window(&self) -> Option<&SessionWindow> {
        self.window.as_ref().map(|w| w.window())
    }

    // ---- timers ----

    pub fn next_wakeup(&self) -> Option<Millis> {
        self.timers.next_wakeup()
    }

    /// Fire every due timer.
    pub fn poll(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now_ms();
        if self.window.is_some() {
            // settle the window before any flush looks at it
            self.window_state_at(now)?;
        }
        for kind in self.timers.take_due(now) {
            match kind {
                TimerKind::Debounce => match self.scheduler.on_timer(now) {
                    TimerDecision::Rearm(at) => {
                        debug!(scope = %self.scope_id, "flush in flight, re-arming debounce");
                        self.timers.arm(TimerKind::Debounce, at);
                    }
                    TimerDecision::Flush => {
                        self.run_flush()?;
                    }
                },
                TimerKind::Deadline => self.on_deadline(now)?,
                TimerKind::UndoExpiry(key) => {
                    if self.undo.peek(&key).is_some_and(|e| e.expires_at <= now) {
                        self.undo.remove(&key);
                        self.events.push(EngineEvent::UndoExpired { key });
                    }
                }
            }
        }
        Ok(())
    }

    fn on_deadline(&mut self, now: Millis) -> Result<(), EngineError> {
        debug!(scope = %self.scope_id, "deadline reached, re-fetching session");
        match self.refresh() {
            Ok(()) => {}
            Err(EngineError::Transport(e)) if e.is_transient() => {
                warn!(scope = %self.scope_id, error = %e, "deadline refresh failed");
                let state = self.window_state_at(now)?;
                self.reevaluate_dirty(state, now);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    // ---- flushing ----

    /// Flush immediately, skipping the debounce. Respects single-flight.
    pub fn save_now(&mut self) -> Result<Option<FlushOutcome>, EngineError> {
        if !self.scheduler.is_flushing() {
            self.timers.cancel(TimerKind::Debounce);
        }
        self.run_flush()
    }

    fn run_flush(&mut self) -> Result<Option<FlushOutcome>, EngineError> {
        let Some(batch) = self.begin_flush()? else {
            return Ok(None);
        };
        let result = self.transport.bulk_upsert(self.scope_id, &batch.writes);
        self.complete_flush(batch, result).map(Some)
    }

    /// Claim the flight slot and collect every sendable dirty cell as it is
    /// now. None if a flush is already out or nothing needs sending.
    pub fn begin_flush(&mut self) -> Result<Option<FlushBatch>, EngineError> {
        let now = self.clock.now_ms();
        let state = self.window_state_at(now)?;
        if self.scheduler.is_flushing() {
            debug!(scope = %self.scope_id, "flush already in flight");
            return Ok(None);
        }
        if self.needs_refresh {
            return Ok(None);
        }
        self.reevaluate_dirty(state, now);

        let mutations = self.cells.pending_mutations();
        if mutations.is_empty() {
            self.scheduler.nothing_to_flush();
            return Ok(None);
        }
        self.scheduler.begin();
        let writes: Vec<CellWrite> = mutations
            .iter()
            .map(|m| CellWrite {
                key: m.key,
                value: m.value.clone(),
            })
            .collect();
        debug!(scope = %self.scope_id, count = writes.len(), "flush started");
        Ok(Some(FlushBatch {
            scope_id: self.scope_id,
            writes,
            mutations,
        }))
    }

    /// Apply the server's answer to a batch from `begin_flush`.
    pub fn complete_flush(
        &mut self,
        batch: FlushBatch,
        result: Result<UpsertResponse, TransportError>,
    ) -> Result<FlushOutcome, EngineError> {
        let resolution = conflict::resolve(&batch.writes, result);
        if let Resolution::Offline { detail } = &resolution {
            warn!(scope = %self.scope_id, error = %detail, count = batch.mutations.len(), "flush failed, queueing offline");
            let added = self.queue.enqueue(&mut self.store, batch.mutations.iter().cloned())?;
            for m in &batch.mutations {
                self.cells.mark_queued(&m.key, &m.value);
            }
            self.events.push(EngineEvent::QueuedOffline { count: added });
        }
        self.reconcile(&batch.writes, resolution)
    }

    /// Replay the offline queue. Stale entries are pruned without a network
    /// call; entries for keys that are blocked or not editable stay queued.
    pub fn flush_offline(&mut self) -> Result<QueueFlushReport, EngineError> {
        let now = self.clock.now_ms();
        let state = self.window_state_at(now)?;
        if self.scheduler.is_flushing() || self.needs_refresh {
            return Ok(self.queue_report(0));
        }
        if state.is_locked() && !self.queue.is_empty() {
            self.ensure_grants();
        }
        let grants = &self.grants;
        let plan = self.queue.prepare_replay(
            &mut self.store,
            &self.cells,
            |key| grants.editable(key, state, now),
            now,
        )?;
        if plan.writes.is_empty() {
            return Ok(self.queue_report(0));
        }

        self.scheduler.begin();
        let writes: Vec<CellWrite> = plan
            .writes
            .into_iter()
            .map(|m| CellWrite {
                key: m.key,
                value: m.value,
            })
            .collect();
        debug!(scope = %self.scope_id, count = writes.len(), pruned = plan.pruned, "replaying offline queue");
        let result = self.transport.bulk_upsert(self.scope_id, &writes);
        let flushed = match self.reconcile(&writes, conflict::resolve(&writes, result))? {
            FlushOutcome::Saved { accepted, .. } => accepted,
            _ => 0,
        };
        Ok(self.queue_report(flushed))
    }

    /// Close the session on the server. Closing twice is not an error.
    pub fn close_session(&mut self) -> Result<(), EngineError> {
        if self.window.is_none() {
            return Err(EngineError::NotLoaded);
        }
        let server_window = self.transport.close_session(self.scope_id)?;
        let now = self.clock.now_ms();
        if let Some(window) = self.window.as_mut() {
            window.apply_server(server_window);
            window.close(now);
        }
        self.grants.invalidate();
        self.sync_deadline_timer();
        let state = self.window_state_at(now)?;
        self.reevaluate_dirty(state, now);
        info!(scope = %self.scope_id, "session closed");
        Ok(())
    }

    // ---- queries ----

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_count(&self) -> usize {
        self.cells.pending_count()
    }

    pub fn blocked_cells(&self) -> Vec<(CellKey, String)> {
        self.cells.blocked_cells()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn sync_state(&self) -> SyncState {
        self.scheduler.state()
    }

    pub fn status(&self) -> EngineStatus {
        let now = self.clock.now_ms();
        EngineStatus {
            sync: self.scheduler.state(),
            window: self.window.as_ref().map(|w| w.peek(now)),
            pending: self.cells.pending_count(),
            blocked: self.cells.blocked_cells().len(),
            queued: self.queue.len(),
            needs_refresh: self.needs_refresh,
        }
    }

    // ---- internals ----

    /// The single mutation path for user edits and undo.
    fn apply_edit(&mut self, key: CellKey, value: Option<CellValue>, origin: Origin, now: Millis) {
        let outcome = self.cells.set(key, value.clone(), now);
        if origin == Origin::User {
            self.undo.remove(&key);
            self.timers.cancel(TimerKind::UndoExpiry(key));
            if outcome.previous.is_some() && outcome.previous != value {
                self.undo.stage(key, outcome.previous, outcome.previous_synced);
            }
        }
        if outcome.dirty {
            let at = self.scheduler.on_edit(now);
            self.timers.arm(TimerKind::Debounce, at);
        }
    }

    fn check_editable(&mut self, key: &CellKey, now: Millis) -> Result<(), EngineError> {
        let state = self.window_state_at(now)?;
        if self.needs_refresh {
            return Err(EngineError::RefreshRequired);
        }
        if !self.cells.roster_contains(&key.subject) {
            return Err(EngineError::UnknownEntity(key.subject.to_string()));
        }
        if let WindowState::Locked(reason) = state {
            if !self.ensure_grants() || !self.grants.editable(key, state, now) {
                return Err(EngineError::PermissionDenied { key: *key, reason });
            }
        }
        Ok(())
    }

    fn window_state_at(&mut self, now: Millis) -> Result<WindowState, EngineError> {
        if self.window.is_none() {
            return Err(EngineError::NotLoaded);
        }
        // Deadline passed before poll() fired it: ask the server before the
        // lock latches.
        if self
            .timers
            .deadline(TimerKind::Deadline)
            .is_some_and(|at| at <= now)
        {
            self.timers.cancel(TimerKind::Deadline);
            self.on_deadline(now)?;
        }
        let window = self.window.as_mut().ok_or(EngineError::NotLoaded)?;
        let state = window.state(now);
        if let Some(reason) = window.take_lock_notice(now) {
            info!(scope = %self.scope_id, reason = reason.as_str(), "session locked");
            self.timers.cancel(TimerKind::Deadline);
            self.events.push(EngineEvent::SessionLocked { reason });
        }
        Ok(state)
    }

    /// Fetch grants if not already known. False if they are unavailable, in
    /// which case nothing counts as covered.
    fn ensure_grants(&mut self) -> bool {
        if !self.grants.needs_fetch() {
            return true;
        }
        match self.transport.active_grants(self.scope_id, self.config.actor) {
            Ok(grants) => {
                debug!(scope = %self.scope_id, count = grants.len(), "fetched grants");
                self.grants.replace(grants);
                true
            }
            Err(e) => {
                warn!(scope = %self.scope_id, error = %e, "grant fetch failed, session is read-only");
                false
            }
        }
    }

    fn sync_deadline_timer(&mut self) {
        match self.window.as_ref().and_then(|w| w.deadline()) {
            Some(at) => self.timers.arm(TimerKind::Deadline, at),
            None => {
                self.timers.cancel(TimerKind::Deadline);
            }
        }
    }

    /// Block dirty cells that are no longer editable. Returns whether any
    /// sendable edit remains.
    fn reevaluate_dirty(&mut self, state: WindowState, now: Millis) -> bool {
        let dirty = self.cells.dirty_keys();
        if dirty.is_empty() {
            return false;
        }
        if state.is_locked() {
            self.ensure_grants();
        }
        let mut newly_blocked = Vec::new();
        for key in &dirty {
            if self.cells.is_blocked(key) {
                continue;
            }
            if !self.grants.editable(key, state, now) {
                self.cells.block(key, LOCKED_REASON);
                newly_blocked.push(*key);
            }
        }
        if !newly_blocked.is_empty() {
            warn!(scope = %self.scope_id, count = newly_blocked.len(), "dirty cells lost edit permission");
            self.events.push(EngineEvent::CellsBlocked { keys: newly_blocked });
        }
        !self.cells.pending_mutations().is_empty()
    }

    /// Apply a resolved flush to local state and release the flight slot.
    fn reconcile(&mut self, writes: &[CellWrite], resolution: Resolution) -> Result<FlushOutcome, EngineError> {
        let now = self.clock.now_ms();
        let (outcome, result) = match resolution {
            Resolution::Applied { accepted, blocked } => {
                for (key, value) in &accepted {
                    if self.cells.acknowledge(key, value)
                        && let Some(expires_at) = self.undo.commit(*key, now)
                    {
                        self.timers.arm(TimerKind::UndoExpiry(*key), expires_at);
                    }
                }
                let accepted_keys: Vec<CellKey> = accepted.iter().map(|(key, _)| *key).collect();
                self.queue.acknowledge(&mut self.store, &accepted_keys)?;
                let blocked_keys = self.block_unchanged(
                    writes,
                    blocked.iter().map(|b| (b.key, b.reason.as_str())),
                );
                if !blocked_keys.is_empty() {
                    warn!(scope = %self.scope_id, count = blocked_keys.len(), "server blocked cells");
                    self.events.push(EngineEvent::CellsBlocked { keys: blocked_keys });
                }
                if !accepted.is_empty() {
                    self.events.push(EngineEvent::Saved { count: accepted.len() });
                }
                info!(scope = %self.scope_id, accepted = accepted.len(), blocked = blocked.len(), "flush applied");
                (
                    FlushOutcome::Saved {
                        accepted: accepted.len(),
                        blocked: blocked.len(),
                    },
                    FlushResult::Saved,
                )
            }
            Resolution::Offline { detail } => (FlushOutcome::Offline { detail }, FlushResult::Offline),
            Resolution::WindowClosed { reason, detail } => {
                warn!(scope = %self.scope_id, reason = reason.as_str(), %detail, "window closed by server");
                self.needs_refresh = true;
                self.grants.invalidate();
                self.events.push(EngineEvent::WindowConflict {
                    reason,
                    detail: detail.clone(),
                });
                (FlushOutcome::Conflict { reason, detail }, FlushResult::Failed)
            }
            Resolution::Rejected { message } => {
                warn!(scope = %self.scope_id, %message, "flush rejected");
                let keys = self.block_unchanged(writes, writes.iter().map(|w| (w.key, message.as_str())));
                if !keys.is_empty() {
                    self.events.push(EngineEvent::CellsBlocked { keys });
                }
                (FlushOutcome::Rejected { message }, FlushResult::Failed)
            }
        };

        let has_pending = !self.cells.pending_mutations().is_empty();
        if let Some(at) = self.scheduler.finish(result, has_pending, now) {
            self.timers.arm(TimerKind::Debounce, at);
        }

        if self.needs_refresh
            && let Err(e) = self.refresh()
        {
            warn!(scope = %self.scope_id, error = %e, "refresh after conflict failed");
        }
        Ok(outcome)
    }

    /// Block keys whose local value is still what was sent. A key edited
    /// again since then stays pending with its newer value.
    fn block_unchanged<'a>(
        &mut self,
        writes: &[CellWrite],
        refused: impl Iterator<Item = (CellKey, &'a str)>,
    ) -> Vec<CellKey> {
        let mut keys = Vec::new();
        for (key, reason) in refused {
            let sent = writes.iter().find(|w| w.key == key).map(|w| &w.value);
            if sent.is_some_and(|v| self.cells.get(&key) == v.as_ref()) {
                self.cells.block(&key, reason);
                keys.push(key);
            }
        }
        keys
    }

    fn queue_report(&self, flushed_count: usize) -> QueueFlushReport {
        QueueFlushReport {
            flushed_count,
            remaining_count: self.queue.len(),
        }
    }
}
