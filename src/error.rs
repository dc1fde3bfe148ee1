//! Error types shared across ingestion, matching and reconciliation.

use std::time::Duration;

use crate::models::{DedupKey, Id, MatchStatus};

/// Failure talking to a bank.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("bank {bank} is unreachable: {message}")]
    Unreachable { bank: String, message: String },

    #[error("authentication with bank {bank} failed: {message}")]
    Auth { bank: String, message: String },

    #[error("bank {bank} did not answer within {timeout:?}")]
    Timeout { bank: String, timeout: Duration },

    #[error("bank {bank} rejected the request ({status}): {message}")]
    Rejected {
        bank: String,
        status: u16,
        message: String,
    },

    #[error("bank {bank} returned a malformed response: {message}")]
    Malformed { bank: String, message: String },
}

impl ProviderError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unreachable { .. } | ProviderError::Timeout { .. } => true,
            ProviderError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Auth { .. } | ProviderError::Malformed { .. } => false,
        }
    }
}

/// Errors from the reconciliation store and the operator-facing service.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("already reconciled: due {due_id} is matched to transaction {held_by}")]
    AlreadyMatched { due_id: Id, held_by: Id },

    #[error("transaction {transaction_id} is {from}; cannot {action}")]
    InvalidTransition {
        transaction_id: Id,
        from: MatchStatus,
        action: &'static str,
    },

    #[error("transaction {0} is outgoing; only incoming payments settle dues")]
    OutgoingTransaction(Id),

    #[error("dedup key {key} already exists for account {account_id}")]
    DedupConflict { account_id: Id, key: DedupKey },

    #[error("transaction not found: {0}")]
    TransactionNotFound(Id),

    #[error("account not found: {0}")]
    AccountNotFound(Id),

    #[error("due {0} is not outstanding for this property")]
    UnknownDue(Id),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ReconciliationError {
    /// True for outcomes a REST layer would map to a conflict response.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReconciliationError::AlreadyMatched { .. }
                | ReconciliationError::InvalidTransition { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, ReconciliationError>;

/// Why a sync run could not start or did not finish.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no provider registered for bank {0}")]
    UnknownProvider(String),

    #[error("fetching statements for account {account_id} failed: {source}")]
    Fetch {
        account_id: Id,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Store(#[from] ReconciliationError),
}
