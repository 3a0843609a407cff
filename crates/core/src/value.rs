use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// The value held by one cell.
///
/// A cell with no value at all is represented as `Option::<CellValue>::None`
/// everywhere in the engine, never as a variant here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CellValue {
    /// Attendance status code (e.g. "present", "absent", "excused") with
    /// an optional free-text reason.
    Status { code: String, reason: Option<String> },
    /// Numeric score.
    Score(f64),
    /// Reference to a qualitative label (e.g. a rubric level).
    Label(EntityId),
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Status { code: a, reason: ra },
                Self::Status { code: b, reason: rb },
            ) => a == b && ra == rb,
            (Self::Score(a), Self::Score(b)) => a.total_cmp(b).is_eq(),
            (Self::Label(a), Self::Label(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl CellValue {
    pub fn status(code: &str) -> Self {
        Self::Status {
            code: code.to_string(),
            reason: None,
        }
    }

    pub fn status_with_reason(code: &str, reason: &str) -> Self {
        Self::Status {
            code: code.to_string(),
            reason: Some(reason.to_string()),
        }
    }

    pub fn as_status_code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_compare_by_total_order() {
        assert_eq!(CellValue::Score(4.0), CellValue::Score(4.0));
        assert_ne!(CellValue::Score(0.0), CellValue::Score(-0.0));
        assert_eq!(CellValue::Score(f64::NAN), CellValue::Score(f64::NAN));
    }

    #[test]
    fn status_reason_is_part_of_identity() {
        assert_ne!(
            CellValue::status("late"),
            CellValue::status_with_reason("late", "bus")
        );
        assert_eq!(CellValue::status("late").as_status_code(), Some("late"));
    }

    #[test]
    fn msgpack_keeps_variant() {
        let label = CellValue::Label(EntityId::from_bytes([7; 16]));
        let bytes = label.to_msgpack().unwrap();
        assert_eq!(CellValue::from_msgpack(&bytes).unwrap(), label);
    }
}
