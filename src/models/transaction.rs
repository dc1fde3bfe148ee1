use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Id, MatchState, MatchStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account identity of a bank movement, stable across re-syncs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateAction {
    /// Engine produced suggestions or cleared stale ones.
    Evaluate,
    AutoMatch,
    Confirm,
    Unmatch,
    Reject,
}

/// Who last moved the transaction between states, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub action: StateAction,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// A normalized bank statement line. Stored in `transactions.jsonl`; every
/// state change appends a new line, so the file doubles as the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Id,
    pub account_id: Id,
    pub dedup_key: DedupKey,
    pub transaction_date: NaiveDate,
    pub value_date: NaiveDate,
    pub direction: Direction,
    /// Always positive; `direction` carries the sign.
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_iban: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    #[serde(flatten)]
    pub state: MatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change: Option<StateChange>,
    pub created_at: DateTime<Utc>,
}

impl BankTransaction {
    pub fn status(&self) -> MatchStatus {
        self.state.status()
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::In
    }

    pub(crate) fn transition(&mut self, state: MatchState, change: StateChange) {
        self.state = state;
        self.last_change = Some(change);
    }
}
