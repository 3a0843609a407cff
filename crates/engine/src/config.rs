use rollsync_core::ActorId;
use serde::Deserialize;

use crate::EngineError;
use crate::validate::ValidationRules;

pub const DEFAULT_DEBOUNCE_MS: u64 = 900;
pub const DEFAULT_UNDO_WINDOW_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last edit before a flush fires.
    pub debounce_ms: u64,
    /// How long an undo entry stays consumable.
    pub undo_window_ms: u64,
    /// Actor whose grants are consulted once the session locks.
    pub actor: ActorId,
    pub rules: ValidationRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            undo_window_ms: DEFAULT_UNDO_WINDOW_MS,
            actor: ActorId::new(),
            rules: ValidationRules::default(),
        }
    }
}

impl EngineConfig {
    pub fn for_actor(actor: ActorId) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }
}
