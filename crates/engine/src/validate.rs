use std::collections::BTreeSet;

use rollsync_core::CellValue;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("status '{code}' requires a reason")]
    MissingReason { code: String },

    #[error("unknown status '{code}'")]
    UnknownStatus { code: String },

    #[error("score {score} outside [{min}, {max}]")]
    ScoreOutOfRange { score: f64, min: f64, max: f64 },

    #[error("score is not a finite number")]
    NonFiniteScore,
}

/// Field rules checked before a value may enter the mutation buffer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Status codes that must carry a non-blank reason.
    pub reason_required: BTreeSet<String>,
    /// When set, only these status codes are accepted.
    pub allowed_statuses: Option<BTreeSet<String>>,
    /// Inclusive bounds for numeric scores.
    pub score_range: Option<(f64, f64)>,
}

impl ValidationRules {
    /// Clearing a cell (`None`) is always valid.
    pub fn validate(&self, value: Option<&CellValue>) -> Result<(), ValidationError> {
        match value {
            None | Some(CellValue::Label(_)) => Ok(()),
            Some(CellValue::Status { code, reason }) => {
                if let Some(allowed) = &self.allowed_statuses
                    && !allowed.contains(code)
                {
                    return Err(ValidationError::UnknownStatus { code: code.clone() });
                }
                let has_reason = reason.as_deref().is_some_and(|r| !r.trim().is_empty());
                if self.reason_required.contains(code) && !has_reason {
                    return Err(ValidationError::MissingReason { code: code.clone() });
                }
                Ok(())
            }
            Some(CellValue::Score(score)) => {
                if !score.is_finite() {
                    return Err(ValidationError::NonFiniteScore);
                }
                match self.score_range {
                    Some((min, max)) if *score < min || *score > max => {
                        Err(ValidationError::ScoreOutOfRange {
                            score: *score,
                            min,
                            max,
                        })
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendance_rules() -> ValidationRules {
        ValidationRules {
            reason_required: ["excused".to_string()].into(),
            allowed_statuses: Some(
                ["present", "absent", "late", "excused"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            score_range: Some((0.0, 100.0)),
        }
    }

    #[test]
    fn blank_reason_counts_as_missing() {
        let rules = attendance_rules();
        assert_eq!(
            rules.validate(Some(&CellValue::status_with_reason("excused", "   "))),
            Err(ValidationError::MissingReason {
                code: "excused".into()
            })
        );
        assert!(rules
            .validate(Some(&CellValue::status_with_reason("excused", "doctor")))
            .is_ok());
        assert!(rules.validate(Some(&CellValue::status("absent"))).is_ok());
    }

    #[test]
    fn unknown_status_rejected() {
        let rules = attendance_rules();
        assert!(matches!(
            rules.validate(Some(&CellValue::status("teleported"))),
            Err(ValidationError::UnknownStatus { .. })
        ));
    }

    #[test]
    fn scores_checked_against_range() {
        let rules = attendance_rules();
        assert!(rules.validate(Some(&CellValue::Score(100.0))).is_ok());
        assert!(matches!(
            rules.validate(Some(&CellValue::Score(100.5))),
            Err(ValidationError::ScoreOutOfRange { .. })
        ));
        assert_eq!(
            rules.validate(Some(&CellValue::Score(f64::INFINITY))),
            Err(ValidationError::NonFiniteScore)
        );
    }

    #[test]
    fn clearing_is_always_valid() {
        assert!(attendance_rules().validate(None).is_ok());
    }
}
