use rollsync_core::{CellKey, Grant, GrantKind, Millis, WindowState};

/// Whether `key` may be edited given the window state and grants at `now`.
///
/// A partial grant whose entities cover nothing in the roster leaves the
/// session read-only.
pub fn is_editable(key: &CellKey, state: WindowState, grants: &[Grant], now: Millis) -> bool {
    if !state.is_locked() {
        return true;
    }
    grants.iter().filter(|g| g.is_active(now)).any(|g| match g.kind {
        GrantKind::Full => true,
        GrantKind::Partial => g.scope_entity_ids.contains(&key.subject),
    })
}

/// Grants for one scope, fetched lazily once the window is locked.
#[derive(Debug, Default)]
pub struct GrantResolver {
    grants: Option<Vec<Grant>>,
}

impl GrantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_fetch(&self) -> bool {
        self.grants.is_none()
    }

    pub fn replace(&mut self, grants: Vec<Grant>) {
        self.grants = Some(grants);
    }

    pub fn invalidate(&mut self) {
        self.grants = None;
    }

    pub fn grants(&self) -> &[Grant] {
        self.grants.as_deref().unwrap_or(&[])
    }

    pub fn editable(&self, key: &CellKey, state: WindowState, now: Millis) -> bool {
        is_editable(key, state, self.grants(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollsync_core::{EntityId, LockReason};

    const LOCKED: WindowState = WindowState::Locked(LockReason::Deadline);

    fn key(subject: u8) -> CellKey {
        CellKey::new(EntityId::from_bytes([subject; 16]), EntityId::from_bytes([0xee; 16]))
    }

    #[test]
    fn open_window_always_editable() {
        assert!(is_editable(&key(1), WindowState::Open, &[], 0));
        assert!(is_editable(&key(1), WindowState::LateOpen, &[], 0));
        assert!(!is_editable(&key(1), LOCKED, &[], 0));
    }

    #[test]
    fn full_grant_covers_everything_until_expiry() {
        let grants = vec![Grant::full(1_000)];
        assert!(is_editable(&key(1), LOCKED, &grants, 999));
        assert!(!is_editable(&key(1), LOCKED, &grants, 1_000));
    }

    #[test]
    fn partial_grant_covers_only_its_entities() {
        let grants = vec![Grant::partial([EntityId::from_bytes([2; 16])], 1_000)];
        assert!(!is_editable(&key(1), LOCKED, &grants, 0));
        assert!(is_editable(&key(2), LOCKED, &grants, 0));
    }

    #[test]
    fn grants_union() {
        let grants = vec![
            Grant::partial([EntityId::from_bytes([1; 16])], 100),
            Grant::partial([EntityId::from_bytes([2; 16])], 1_000),
        ];
        assert!(!is_editable(&key(1), LOCKED, &grants, 500));
        assert!(is_editable(&key(2), LOCKED, &grants, 500));
    }

    #[test]
    fn partial_grant_over_absent_entities_is_read_only() {
        let grants = vec![Grant::partial([EntityId::from_bytes([9; 16])], 1_000)];
        let resolver = {
            let mut r = GrantResolver::new();
            r.replace(grants);
            r
        };
        assert!(!resolver.editable(&key(1), LOCKED, 0));
        assert!(!resolver.editable(&key(2), LOCKED, 0));
    }

    #[test]
    fn resolver_tracks_fetch_state() {
        let mut r = GrantResolver::new();
        assert!(r.needs_fetch());
        r.replace(vec![]);
        assert!(!r.needs_fetch());
        assert!(r.grants().is_empty());
        r.invalidate();
        assert!(r.needs_fetch());
    }
}
