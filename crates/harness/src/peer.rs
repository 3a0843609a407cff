use rollsync_core::{
    CellKey, CellValue, Clock, EntityId, ManualClock, Millis, ScopeId, SessionWindow,
};
use rollsync_engine::{EngineConfig, EngineError, SyncEngine};
use rollsync_storage::{DurableStore, MemoryStore, SqliteStore};

use crate::FakeServer;

pub const START_MS: Millis = 1_700_000_000_000;

/// A scope seeded on the server: a roster of subjects and one fact column.
#[derive(Debug, Clone)]
pub struct Roster {
    pub scope: ScopeId,
    pub subjects: Vec<EntityId>,
    pub fact: EntityId,
}

impl Roster {
    pub fn key(&self, index: usize) -> CellKey {
        CellKey::new(self.subjects[index], self.fact)
    }

    /// Seed a scope with `size` subjects and every cell marked present.
    pub fn seed(server: &FakeServer, size: usize, window: SessionWindow) -> Self {
        let roster = Self {
            scope: ScopeId::new(),
            subjects: (0..size).map(|_| EntityId::new()).collect(),
            fact: EntityId::new(),
        };
        let cells = (0..size)
            .map(|i| (roster.key(i), Some(CellValue::status("present"))))
            .collect();
        server.add_scope(roster.scope, window, roster.subjects.clone(), cells);
        roster
    }
}

/// One engine instance wired to a fake server and a manual clock.
pub struct TestClient<S: DurableStore = MemoryStore> {
    pub engine: SyncEngine<FakeServer, S, ManualClock>,
    pub server: FakeServer,
    pub clock: ManualClock,
}

impl TestClient<MemoryStore> {
    pub fn new(server: &FakeServer, clock: &ManualClock, scope: ScopeId) -> Result<Self, EngineError> {
        Self::with_store(server, clock, scope, MemoryStore::new(), EngineConfig::default())
    }
}

impl<S: DurableStore> TestClient<S> {
    /// Build and load an engine over `store`.
    pub fn with_store(
        server: &FakeServer,
        clock: &ManualClock,
        scope: ScopeId,
        store: S,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut engine = SyncEngine::new(scope, config, server.clone(), store, clock.clone())?;
        engine.load()?;
        Ok(Self {
            engine,
            server: server.clone(),
            clock: clock.clone(),
        })
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Move time forward by `delta_ms`, firing timers in order as they
    /// come due.
    pub fn advance(&mut self, delta_ms: Millis) -> Result<(), EngineError> {
        let target = self.clock.now_ms() + delta_ms;
        while let Some(at) = self.engine.next_wakeup() {
            if at > target {
                break;
            }
            if at > self.clock.now_ms() {
                self.clock.set(at);
            }
            self.engine.poll()?;
        }
        self.clock.set(target);
        self.engine.poll()
    }

    /// Let the debounce elapse.
    pub fn settle(&mut self) -> Result<(), EngineError> {
        let debounce = self.engine.config().debounce_ms;
        self.advance(debounce)
    }

    pub fn set_status(&mut self, key: CellKey, code: &str) -> Result<(), EngineError> {
        self.engine.set(key, Some(CellValue::status(code)))
    }

    /// Drop this instance and start a fresh one over the same store, as a
    /// page reload would.
    pub fn reload(self) -> Result<Self, EngineError> {
        let config = self.engine.config().clone();
        let scope = self.engine.scope_id();
        let (_, store, _) = self.engine.into_parts();
        Self::with_store(&self.server, &self.clock, scope, store, config)
    }
}

/// A file-backed store in a temporary directory. Keep the directory alive
/// for as long as the store is used.
pub fn temp_sqlite() -> Result<(tempfile::TempDir, String, SqliteStore), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rollsync.db").to_string_lossy().into_owned();
    let store = SqliteStore::open(&path)?;
    Ok((dir, path, store))
}
