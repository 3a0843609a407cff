use rollsync_core::{ActorId, CellWrite, Grant, LockReason, ScopeId, ScopeSnapshot, SessionWindow, UpsertResponse};
use thiserror::Error;

/// Failure of a remote call, already classified by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No network, timeout, connection reset. Retrying later may succeed.
    #[error("network unavailable: {0}")]
    Io(String),

    /// The editing window is closed (HTTP 409). Nothing in the batch was applied.
    #[error("editing window closed ({reason}): {detail}")]
    WindowClosed { reason: LockReason, detail: String },

    /// The server refused the request as malformed or invalid.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// The remote collaborator the engine talks to.
pub trait Transport {
    /// Roster, cell values and session window of a scope.
    fn fetch_snapshot(&mut self, scope: ScopeId) -> Result<ScopeSnapshot, TransportError>;

    fn bulk_upsert(
        &mut self,
        scope: ScopeId,
        writes: &[CellWrite],
    ) -> Result<UpsertResponse, TransportError>;

    fn active_grants(&mut self, scope: ScopeId, actor: ActorId) -> Result<Vec<Grant>, TransportError>;

    /// Close the session. Closing an already closed session succeeds.
    fn close_session(&mut self, scope: ScopeId) -> Result<SessionWindow, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn fetch_snapshot(&mut self, scope: ScopeId) -> Result<ScopeSnapshot, TransportError> {
        (**self).fetch_snapshot(scope)
    }

    fn bulk_upsert(
        &mut self,
        scope: ScopeId,
        writes: &[CellWrite],
    ) -> Result<UpsertResponse, TransportError> {
        (**self).bulk_upsert(scope, writes)
    }

    fn active_grants(&mut self, scope: ScopeId, actor: ActorId) -> Result<Vec<Grant>, TransportError> {
        (**self).active_grants(scope, actor)
    }

    fn close_session(&mut self, scope: ScopeId) -> Result<SessionWindow, TransportError> {
        (**self).close_session(scope)
    }
}
