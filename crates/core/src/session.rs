use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::ids::EntityId;

/// Why a session window ended up locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockReason {
    /// The hard deadline elapsed.
    Deadline,
    /// Someone closed the session explicitly.
    Manual,
}

impl LockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    /// Still editable, but past the point where arrivals count as late.
    LateOpen,
    Locked(LockReason),
}

impl WindowState {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

/// Server-declared editing window of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub opens_at: Millis,
    pub hard_deadline: Millis,
    #[serde(default)]
    pub late_after: Option<Millis>,
    pub closed_at: Option<Millis>,
    /// Set by the server when it knows how the window was closed.
    #[serde(default)]
    pub close_reason: Option<LockReason>,
}

impl SessionWindow {
    pub fn new(opens_at: Millis, hard_deadline: Millis) -> Self {
        Self {
            opens_at,
            hard_deadline,
            late_after: None,
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn with_late_after(mut self, late_after: Millis) -> Self {
        self.late_after = Some(late_after);
        self
    }

    pub fn closed(mut self, closed_at: Millis, reason: LockReason) -> Self {
        self.closed_at = Some(closed_at);
        self.close_reason = Some(reason);
        self
    }

    /// Evaluate the window at `now`. A window whose deadline has passed is
    /// locked even if nobody recorded `closed_at` yet.
    pub fn state_at(&self, now: Millis) -> WindowState {
        if let Some(closed_at) = self.closed_at {
            let reason = self.close_reason.unwrap_or(if closed_at >= self.hard_deadline {
                LockReason::Deadline
            } else {
                LockReason::Manual
            });
            return WindowState::Locked(reason);
        }
        if now >= self.hard_deadline {
            return WindowState::Locked(LockReason::Deadline);
        }
        match self.late_after {
            Some(late_after) if now >= late_after => WindowState::LateOpen,
            _ => WindowState::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantKind {
    Full,
    Partial,
}

/// Time-boxed permission to edit after the window locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub kind: GrantKind,
    #[serde(default)]
    pub scope_entity_ids: BTreeSet<EntityId>,
    pub valid_until: Millis,
}

impl Grant {
    pub fn full(valid_until: Millis) -> Self {
        Self {
            kind: GrantKind::Full,
            scope_entity_ids: BTreeSet::new(),
            valid_until,
        }
    }

    pub fn partial(entities: impl IntoIterator<Item = EntityId>, valid_until: Millis) -> Self {
        Self {
            kind: GrantKind::Partial,
            scope_entity_ids: entities.into_iter().collect(),
            valid_until,
        }
    }

    pub fn is_active(&self, now: Millis) -> bool {
        self.valid_until > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_until_deadline() {
        let w = SessionWindow::new(1_000, 2_000);
        assert_eq!(w.state_at(500), WindowState::Open);
        assert_eq!(w.state_at(1_999), WindowState::Open);
        assert_eq!(w.state_at(2_000), WindowState::Locked(LockReason::Deadline));
    }

    #[test]
    fn late_open_between_late_mark_and_deadline() {
        let w = SessionWindow::new(1_000, 2_000).with_late_after(1_500);
        assert_eq!(w.state_at(1_499), WindowState::Open);
        assert_eq!(w.state_at(1_500), WindowState::LateOpen);
        assert!(w.state_at(2_500).is_locked());
    }

    #[test]
    fn closed_at_infers_reason_when_server_is_silent() {
        let mut w = SessionWindow::new(1_000, 2_000);
        w.closed_at = Some(1_200);
        assert_eq!(w.state_at(1_300), WindowState::Locked(LockReason::Manual));
        w.closed_at = Some(2_000);
        assert_eq!(w.state_at(2_100), WindowState::Locked(LockReason::Deadline));
    }

    #[test]
    fn explicit_close_reason_wins() {
        let w = SessionWindow::new(1_000, 2_000).closed(2_500, LockReason::Manual);
        assert_eq!(w.state_at(3_000), WindowState::Locked(LockReason::Manual));
    }

    #[test]
    fn grant_activity_is_strict() {
        let g = Grant::full(5_000);
        assert!(g.is_active(4_999));
        assert!(!g.is_active(5_000));
    }
}
