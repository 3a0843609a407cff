use rollsync_core::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Scheduled,
    Flushing,
    Saved,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Flushing => "flushing",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }
}

/// What to do when the debounce timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDecision {
    Flush,
    /// A flush is already in flight; try again at this time.
    Rearm(Millis),
}

/// How a flush ended, from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    Saved,
    /// Network failure; the batch went to the offline queue.
    Offline,
    /// The server answered with an application-level failure.
    Failed,
}

/// Debounce and single-flight state machine for one scope.
///
/// The scheduler never touches timers itself; it returns the deadline the
/// caller must arm.
#[derive(Debug)]
pub struct SyncScheduler {
    state: SyncState,
    debounce_ms: Millis,
}

impl SyncScheduler {
    pub fn new(debounce_ms: Millis) -> Self {
        Self {
            state: SyncState::Idle,
            debounce_ms,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_flushing(&self) -> bool {
        self.state == SyncState::Flushing
    }

    /// An edit landed in the buffer. Returns the debounce deadline.
    pub fn on_edit(&mut self, now: Millis) -> Millis {
        if self.state != SyncState::Flushing {
            self.state = SyncState::Scheduled;
        }
        now + self.debounce_ms
    }

    pub fn on_timer(&mut self, now: Millis) -> TimerDecision {
        if self.state == SyncState::Flushing {
            TimerDecision::Rearm(now + self.debounce_ms)
        } else {
            TimerDecision::Flush
        }
    }

    /// Claim the single flight slot. False if a flush is already out.
    pub fn begin(&mut self) -> bool {
        if self.state == SyncState::Flushing {
            return false;
        }
        self.state = SyncState::Flushing;
        true
    }

    /// A flush was requested but the buffer held nothing to send.
    pub fn nothing_to_flush(&mut self) {
        if self.state == SyncState::Scheduled {
            self.state = SyncState::Idle;
        }
    }

    /// Release the flight slot. If edits arrived meanwhile, returns the
    /// deadline of the follow-up cycle.
    pub fn finish(&mut self, result: FlushResult, has_pending: bool, now: Millis) -> Option<Millis> {
        self.state = match result {
            FlushResult::Saved => SyncState::Saved,
            FlushResult::Offline => SyncState::Idle,
            FlushResult::Failed => SyncState::Error,
        };
        if has_pending {
            self.state = SyncState::Scheduled;
            Some(now + self.debounce_ms)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_schedules_after_debounce() {
        let mut s = SyncScheduler::new(900);
        assert_eq!(s.on_edit(1_000), 1_900);
        assert_eq!(s.state(), SyncState::Scheduled);
        assert_eq!(s.on_edit(1_500), 2_400);
        assert_eq!(s.on_timer(2_400), TimerDecision::Flush);
    }

    #[test]
    fn timer_during_flight_rearms() {
        let mut s = SyncScheduler::new(900);
        s.on_edit(0);
        assert!(s.begin());
        assert!(!s.begin());
        s.on_edit(100);
        assert_eq!(s.state(), SyncState::Flushing);
        assert_eq!(s.on_timer(1_000), TimerDecision::Rearm(1_900));
    }

    #[test]
    fn finish_schedules_follow_up_when_edits_arrived() {
        let mut s = SyncScheduler::new(900);
        s.begin();
        assert_eq!(s.finish(FlushResult::Saved, true, 50), Some(950));
        assert_eq!(s.state(), SyncState::Scheduled);
    }

    #[test]
    fn finish_states() {
        let mut s = SyncScheduler::new(900);
        s.begin();
        assert_eq!(s.finish(FlushResult::Saved, false, 0), None);
        assert_eq!(s.state(), SyncState::Saved);
        s.begin();
        s.finish(FlushResult::Offline, false, 0);
        assert_eq!(s.state(), SyncState::Idle);
        s.begin();
        s.finish(FlushResult::Failed, false, 0);
        assert_eq!(s.state(), SyncState::Error);
        assert_eq!(s.on_edit(0), 900);
        assert_eq!(s.state(), SyncState::Scheduled);
    }

    #[test]
    fn empty_flush_returns_to_idle() {
        let mut s = SyncScheduler::new(900);
        s.on_edit(0);
        s.nothing_to_flush();
        assert_eq!(s.state(), SyncState::Idle);
    }
}
