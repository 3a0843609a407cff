use rollsync_core::{LockReason, Millis, SessionWindow, WindowState};
use tracing::info;

/// Client-side view of a session window.
///
/// Once locked, stays locked for the life of this instance no matter what
/// later server data says. Only a new session (a new instance) can reopen.
#[derive(Debug, Clone)]
pub struct SessionWindowMachine {
    window: SessionWindow,
    locked: Option<LockReason>,
    notified: bool,
}

impl SessionWindowMachine {
    pub fn new(window: SessionWindow) -> Self {
        Self {
            window,
            locked: None,
            notified: false,
        }
    }

    pub fn window(&self) -> &SessionWindow {
        &self.window
    }

    /// State at `now` without latching a lock.
    pub fn peek(&self, now: Millis) -> WindowState {
        match self.locked {
            Some(reason) => WindowState::Locked(reason),
            None => self.window.state_at(now),
        }
    }

    pub fn state(&mut self, now: Millis) -> WindowState {
        if let Some(reason) = self.locked {
            return WindowState::Locked(reason);
        }
        let state = self.window.state_at(now);
        if let WindowState::Locked(reason) = state {
            info!(reason = reason.as_str(), "session window locked");
            self.locked = Some(reason);
        }
        state
    }

    /// Take the server's latest view of the window.
    pub fn apply_server(&mut self, window: SessionWindow) {
        if self.locked.is_none() {
            self.window = window;
        } else if self.window.closed_at.is_none() {
            // keep our terminal state, but adopt the server's timestamps
            self.window.closed_at = window.closed_at;
            self.window.close_reason = window.close_reason.or(self.window.close_reason);
        }
    }

    /// Record a successful explicit close.
    pub fn close(&mut self, now: Millis) {
        if self.window.closed_at.is_none() {
            self.window.closed_at = Some(now);
            self.window.close_reason = Some(LockReason::Manual);
        }
        self.locked.get_or_insert(self.window.close_reason.unwrap_or(LockReason::Manual));
    }

    /// When the deadline timer should fire, if it still matters.
    pub fn deadline(&self) -> Option<Millis> {
        match self.locked {
            Some(_) => None,
            None if self.window.closed_at.is_some() => None,
            None => Some(self.window.hard_deadline),
        }
    }

    /// Lock reason to announce, exactly once per instance.
    pub fn take_lock_notice(&mut self, now: Millis) -> Option<LockReason> {
        if self.notified {
            return None;
        }
        match self.state(now) {
            WindowState::Locked(reason) => {
                self.notified = true;
                Some(reason)
            }
            _ => None,
        }
    }
}
