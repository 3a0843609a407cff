use rollsync_core::{CellKey, CoreError, LockReason};
use rollsync_storage::StorageError;
use thiserror::Error;

use crate::transport::TransportError;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid value: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("cell {key} is not editable: session locked ({reason}) and no grant covers it")]
    PermissionDenied { key: CellKey, reason: LockReason },

    #[error("session state must be refreshed before further edits")]
    RefreshRequired,

    #[error("entity not in roster: {0}")]
    UnknownEntity(String),

    #[error("scope has not been loaded")]
    NotLoaded,

    #[error("configuration error: {0}")]
    Config(String),
}
