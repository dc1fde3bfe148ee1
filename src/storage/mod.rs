//! Persistence for bank accounts, transactions and their match state.
//!
//! Both backends keep one writer lock around a [`TransactionIndex`], so every
//! check-then-write (dedup, confirm, unmatch) is atomic with respect to other
//! callers of the same store.

mod index;
mod json_file;
mod memory;

pub use index::ENGINE_ACTOR;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

pub(crate) use index::TransactionIndex;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::matching::MatchResult;
use crate::models::{BankAccount, BankTransaction, DedupKey, Id, MatchStatus};

/// Storage seam for reconciliation state.
#[async_trait::async_trait]
pub trait ReconciliationStore: Send + Sync {
    // Accounts
    async fn save_account(&self, account: &BankAccount) -> StoreResult<()>;
    async fn get_account(&self, id: &Id) -> StoreResult<Option<BankAccount>>;
    async fn list_accounts(&self) -> StoreResult<Vec<BankAccount>>;
    async fn set_account_active(&self, id: &Id, active: bool) -> StoreResult<BankAccount>;

    // Ingestion
    async fn dedup_keys(&self, account_id: &Id) -> StoreResult<HashSet<DedupKey>>;

    /// Persist a batch of new transactions. Fails with `DedupConflict` (writing
    /// nothing) if any key already exists for the account or repeats in the batch.
    async fn record_transactions(
        &self,
        account_id: &Id,
        txns: &[BankTransaction],
    ) -> StoreResult<()>;

    // Transactions
    async fn get_transaction(&self, id: &Id) -> StoreResult<Option<BankTransaction>>;
    async fn list_transactions(&self, account_id: &Id) -> StoreResult<Vec<BankTransaction>>;
    async fn list_all_transactions(&self) -> StoreResult<Vec<BankTransaction>>;

    // Match state
    /// Write an engine verdict for an open transaction.
    async fn apply_match(
        &self,
        result: &MatchResult,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction>;

    async fn confirm(
        &self,
        txn_id: &Id,
        due_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction>;

    async fn unmatch(
        &self,
        txn_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction>;

    async fn reject(
        &self,
        txn_id: &Id,
        operator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction>;

    async fn active_match_for_due(&self, due_id: &Id) -> StoreResult<Option<BankTransaction>>;
    async fn active_due_ids(&self) -> StoreResult<HashSet<Id>>;

    async fn list_unmatched(&self, account_id: Option<&Id>) -> StoreResult<Vec<BankTransaction>> {
        self.list_with_status(account_id, MatchStatus::Unmatched)
            .await
    }

    async fn list_pending(&self, account_id: Option<&Id>) -> StoreResult<Vec<BankTransaction>> {
        self.list_with_status(account_id, MatchStatus::PendingReview)
            .await
    }

    async fn list_with_status(
        &self,
        account_id: Option<&Id>,
        status: MatchStatus,
    ) -> StoreResult<Vec<BankTransaction>> {
        let txns = match account_id {
            Some(id) => self.list_transactions(id).await?,
            None => self.list_all_transactions().await?,
        };
        Ok(txns.into_iter().filter(|t| t.status() == status).collect())
    }
}
