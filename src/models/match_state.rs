use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("confidence {0} is outside [0, 1]")]
pub struct ConfidenceError(f64);

/// Match confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const CERTAIN: Confidence = Confidence(1.0);

    pub fn new(value: f64) -> Result<Self, ConfidenceError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfidenceError(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ConfidenceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A weak candidate an operator should look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub due_id: Id,
    pub confidence: Confidence,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Unmatched,
    PendingReview,
    AutoMatched,
    ManualMatched,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Unmatched => "UNMATCHED",
            MatchStatus::PendingReview => "PENDING_REVIEW",
            MatchStatus::AutoMatched => "AUTO_MATCHED",
            MatchStatus::ManualMatched => "MANUAL_MATCHED",
            MatchStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    Auto,
    Manual,
}

/// Reconciliation state of one bank transaction.
///
/// Only `AutoMatched` and `ManualMatched` hold a due; those two are the
/// "active" states covered by the one-transaction-per-due rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    #[default]
    Unmatched,
    PendingReview {
        suggestions: Vec<Suggestion>,
    },
    AutoMatched {
        due_id: Id,
        confidence: Confidence,
        reason: String,
        matched_at: DateTime<Utc>,
    },
    ManualMatched {
        due_id: Id,
        operator: String,
        matched_at: DateTime<Utc>,
    },
    Rejected {
        operator: String,
        rejected_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl MatchState {
    pub fn status(&self) -> MatchStatus {
        match self {
            MatchState::Unmatched => MatchStatus::Unmatched,
            MatchState::PendingReview { .. } => MatchStatus::PendingReview,
            MatchState::AutoMatched { .. } => MatchStatus::AutoMatched,
            MatchState::ManualMatched { .. } => MatchStatus::ManualMatched,
            MatchState::Rejected { .. } => MatchStatus::Rejected,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MatchState::AutoMatched { .. } | MatchState::ManualMatched { .. }
        )
    }

    /// States from which a transaction may take a due.
    pub fn is_open(&self) -> bool {
        matches!(self, MatchState::Unmatched | MatchState::PendingReview { .. })
    }

    pub fn due_id(&self) -> Option<&Id> {
        match self {
            MatchState::AutoMatched { due_id, .. } | MatchState::ManualMatched { due_id, .. } => {
                Some(due_id)
            }
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match self {
            MatchState::AutoMatched { confidence, .. } => Some(*confidence),
            MatchState::ManualMatched { .. } => Some(Confidence::CERTAIN),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<MatchMethod> {
        match self {
            MatchState::AutoMatched { .. } => Some(MatchMethod::Auto),
            MatchState::ManualMatched { .. } => Some(MatchMethod::Manual),
            _ => None,
        }
    }

    pub fn matched_at(&self) -> Option<DateTime<Utc>> {
        match self {
            MatchState::AutoMatched { matched_at, .. }
            | MatchState::ManualMatched { matched_at, .. } => Some(*matched_at),
            _ => None,
        }
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match self {
            MatchState::PendingReview { suggestions } => suggestions,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn confidence_rejects_out_of_range() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
    }

    #[test]
    fn confidence_deserialization_is_validated() {
        assert!(serde_json::from_str::<Confidence>("0.9").is_ok());
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
    }

    #[test]
    fn match_state_serializes_with_status_tag() {
        let state = MatchState::ManualMatched {
            due_id: Id::from_string("due-1"),
            operator: "ops".to_string(),
            matched_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "MANUAL_MATCHED");
        assert_eq!(json["due_id"], "due-1");

        let back: MatchState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        assert!(back.is_active());
        assert_eq!(back.method(), Some(MatchMethod::Manual));
        assert_eq!(back.confidence(), Some(Confidence::CERTAIN));
    }

    #[test]
    fn only_matched_states_hold_a_due() {
        assert_eq!(MatchState::Unmatched.due_id(), None);
        let pending = MatchState::PendingReview {
            suggestions: vec![Suggestion {
                due_id: Id::from_string("due-1"),
                confidence: Confidence::new(0.6).unwrap(),
                reason: "amount match".to_string(),
            }],
        };
        assert_eq!(pending.due_id(), None);
        assert!(pending.is_open());
        assert_eq!(pending.suggestions().len(), 1);
    }
}
