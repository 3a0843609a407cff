use std::collections::BTreeMap;

use rollsync_core::{CellKey, Millis};

/// Every wall-clock timeout the engine arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    Debounce,
    Deadline,
    UndoExpiry(CellKey),
}

/// Pending timeouts, one per kind. Arming a kind that is already armed
/// replaces its deadline.
#[derive(Debug, Default)]
pub struct TimerTable {
    deadlines: BTreeMap<TimerKind, Millis>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, at: Millis) {
        self.deadlines.insert(kind, at);
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Millis> {
        self.deadlines.get(&kind).copied()
    }

    pub fn next_wakeup(&self) -> Option<Millis> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Millis) -> Vec<TimerKind> {
        let mut due: Vec<(Millis, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(kind, at)| (*at, *kind))
            .collect();
        due.sort();
        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
