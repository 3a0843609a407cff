use std::collections::BTreeMap;

use rollsync_core::{BlockedCell, CellKey, CellValue, CellWrite, LockReason, UpsertResponse};
use tracing::warn;

use crate::transport::TransportError;

/// What a flush result means for local state.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The server applied `accepted` and refused `blocked`.
    Applied {
        accepted: Vec<(CellKey, Option<CellValue>)>,
        blocked: Vec<BlockedCell>,
    },
    /// The call never reached the server. Nothing was applied.
    Offline { detail: String },
    /// The window closed server-side. Nothing was applied and session state
    /// must be re-fetched before further edits.
    WindowClosed { reason: LockReason, detail: String },
    /// Application-level refusal of the whole batch.
    Rejected { message: String },
}

/// Interpret the outcome of a bulk upsert of `writes`.
pub fn resolve(writes: &[CellWrite], result: Result<UpsertResponse, TransportError>) -> Resolution {
    let response = match result {
        Ok(response) => response,
        Err(error) if error.is_transient() => {
            return Resolution::Offline {
                detail: error.to_string(),
            };
        }
        Err(TransportError::WindowClosed { reason, detail }) => {
            return Resolution::WindowClosed { reason, detail };
        }
        Err(TransportError::Rejected(message) | TransportError::Forbidden(message)) => {
            return Resolution::Rejected { message };
        }
        Err(other) => {
            return Resolution::Rejected {
                message: other.to_string(),
            };
        }
    };

    let mut refused: BTreeMap<CellKey, String> = BTreeMap::new();
    for cell in response.blocked {
        if writes.iter().any(|w| w.key == cell.key) {
            refused.entry(cell.key).or_insert(cell.reason);
        } else {
            warn!(key = %cell.key, "server blocked a key that was not sent");
        }
    }

    let accepted = writes
        .iter()
        .filter(|w| !refused.contains_key(&w.key))
        .map(|w| (w.key, w.value.clone()))
        .collect();
    let blocked = refused
        .into_iter()
        .map(|(key, reason)| BlockedCell { key, reason })
        .collect();
    Resolution::Applied { accepted, blocked }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollsync_core::EntityId;

    fn key(n: u8) -> CellKey {
        CellKey::new(EntityId::from_bytes([n; 16]), EntityId::from_bytes([0xf0; 16]))
    }

    fn writes() -> Vec<CellWrite> {
        (1..=3)
            .map(|n| CellWrite {
                key: key(n),
                value: Some(CellValue::status("present")),
            })
            .collect()
    }

    #[test]
    fn full_success_accepts_everything() {
        let res = resolve(&writes(), Ok(UpsertResponse::accepted()));
        let Resolution::Applied { accepted, blocked } = res else {
            panic!("expected applied");
        };
        assert_eq!(accepted.len(), 3);
        assert!(blocked.is_empty());
    }

    #[test]
    fn partial_rejection_splits_batch() {
        let response = UpsertResponse {
            blocked: vec![
                BlockedCell { key: key(2), reason: "window closed".into() },
                BlockedCell { key: key(9), reason: "unknown".into() },
            ],
        };
        let Resolution::Applied { accepted, blocked } = resolve(&writes(), Ok(response)) else {
            panic!("expected applied");
        };
        let accepted_keys: Vec<CellKey> = accepted.iter().map(|(k, _)| *k).collect();
        assert_eq!(accepted_keys, vec![key(1), key(3)]);
        assert_eq!(blocked, vec![BlockedCell { key: key(2), reason: "window closed".into() }]);
    }

    #[test]
    fn transport_errors_map_to_kinds() {
        assert_eq!(
            resolve(&writes(), Err(TransportError::Io("reset".into()))),
            Resolution::Offline {
                detail: "network unavailable: reset".into()
            }
        );
        assert_eq!(
            resolve(
                &writes(),
                Err(TransportError::WindowClosed {
                    reason: LockReason::Manual,
                    detail: "closed".into()
                })
            ),
            Resolution::WindowClosed {
                reason: LockReason::Manual,
                detail: "closed".into()
            }
        );
        assert!(matches!(
            resolve(&writes(), Err(TransportError::Forbidden("no".into()))),
            Resolution::Rejected { .. }
        ));
    }
}
