//! Operator-facing reconciliation operations.
//!
//! This is the surface a REST layer would call for listing, confirming,
//! unmatching and rejecting transactions. Uniqueness is enforced by the store;
//! this layer adds due validation against the ledger and notifications.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::error::{ReconciliationError, StoreResult};
use crate::models::{
    BankTransaction, CandidateReceivable, Direction, Id, MatchMethod, MatchStatus, Suggestion,
};
use crate::notify::{MatchNotice, MatchNotifier, NoopNotifier};
use crate::receivables::CandidateReceivableSource;
use crate::storage::ReconciliationStore;

/// A stored suggestion with the due it points at, when the ledger still has it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionDetail {
    pub suggestion: Suggestion,
    pub due: Option<CandidateReceivable>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BankingStats {
    pub accounts: usize,
    pub active_accounts: usize,
    pub unmatched: usize,
    pub pending_review: usize,
    pub matched: usize,
    pub incoming_today: Decimal,
    pub outgoing_today: Decimal,
}

pub struct ReconciliationService {
    store: Arc<dyn ReconciliationStore>,
    receivables: Arc<dyn CandidateReceivableSource>,
    notifier: Arc<dyn MatchNotifier>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        receivables: Arc<dyn CandidateReceivableSource>,
    ) -> Self {
        Self {
            store,
            receivables,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn MatchNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn require_transaction(&self, id: &Id) -> StoreResult<BankTransaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| ReconciliationError::TransactionNotFound(id.clone()))
    }

    async fn outstanding_dues_for(&self, txn: &BankTransaction) -> StoreResult<Vec<CandidateReceivable>> {
        let account = self
            .store
            .get_account(&txn.account_id)
            .await?
            .ok_or_else(|| ReconciliationError::AccountNotFound(txn.account_id.clone()))?;
        Ok(self
            .receivables
            .list_outstanding_dues(&account.property_id)
            .await?)
    }

    /// Manually match a transaction to a due.
    ///
    /// Fails with `UnknownDue` if the due is not outstanding for the account's
    /// property, `AlreadyMatched` if the due or the transaction is already
    /// matched, `InvalidTransition` for rejected transactions and
    /// `OutgoingTransaction` for money that left the account.
    pub async fn confirm(
        &self,
        txn_id: &Id,
        due_id: &Id,
        operator: &str,
    ) -> StoreResult<BankTransaction> {
        let txn = self.require_transaction(txn_id).await?;
        let due = self
            .outstanding_dues_for(&txn)
            .await?
            .into_iter()
            .find(|due| &due.due_id == due_id)
            .ok_or_else(|| ReconciliationError::UnknownDue(due_id.clone()))?;

        let updated = self
            .store
            .confirm(txn_id, due_id, operator, self.clock.now())
            .await?;
        info!(transaction_id = %txn_id, %due_id, operator, "manually matched");

        self.notifier.notify_matched(&MatchNotice {
            resident_id: due.resident_id,
            due_id: due_id.clone(),
            transaction_id: txn_id.clone(),
            amount: updated.amount,
            method: MatchMethod::Manual,
        });
        Ok(updated)
    }

    /// Undo an automatic or manual match; the due becomes available again.
    pub async fn unmatch(&self, txn_id: &Id, operator: &str) -> StoreResult<BankTransaction> {
        let updated = self
            .store
            .unmatch(txn_id, operator, self.clock.now())
            .await?;
        info!(transaction_id = %txn_id, operator, "match removed");
        Ok(updated)
    }

    /// Mark a transaction as not a due payment. Terminal.
    pub async fn reject(
        &self,
        txn_id: &Id,
        operator: &str,
        reason: Option<&str>,
    ) -> StoreResult<BankTransaction> {
        let updated = self
            .store
            .reject(txn_id, operator, reason, self.clock.now())
            .await?;
        info!(transaction_id = %txn_id, operator, ?reason, "transaction rejected");
        Ok(updated)
    }

    pub async fn get_transaction(&self, txn_id: &Id) -> StoreResult<Option<BankTransaction>> {
        self.store.get_transaction(txn_id).await
    }

    pub async fn list_transactions(&self, account_id: &Id) -> StoreResult<Vec<BankTransaction>> {
        self.store.list_transactions(account_id).await
    }

    pub async fn list_unmatched(&self, account_id: Option<&Id>) -> StoreResult<Vec<BankTransaction>> {
        self.store.list_unmatched(account_id).await
    }

    pub async fn list_pending(&self, account_id: Option<&Id>) -> StoreResult<Vec<BankTransaction>> {
        self.store.list_pending(account_id).await
    }

    /// Stored suggestions for a pending transaction, joined with the current
    /// ledger view of each due.
    pub async fn suggestions(&self, txn_id: &Id) -> StoreResult<Vec<SuggestionDetail>> {
        let txn = self.require_transaction(txn_id).await?;
        if txn.state.suggestions().is_empty() {
            return Ok(Vec::new());
        }

        let dues = self.outstanding_dues_for(&txn).await?;
        Ok(txn
            .state
            .suggestions()
            .iter()
            .map(|suggestion| SuggestionDetail {
                suggestion: suggestion.clone(),
                due: dues.iter().find(|d| d.due_id == suggestion.due_id).cloned(),
            })
            .collect())
    }

    /// Counters across all accounts; money totals cover transactions dated `day`.
    pub async fn stats(&self, day: NaiveDate) -> StoreResult<BankingStats> {
        let accounts = self.store.list_accounts().await?;
        let mut stats = BankingStats {
            accounts: accounts.len(),
            active_accounts: accounts.iter().filter(|a| a.active).count(),
            ..BankingStats::default()
        };

        for txn in self.store.list_all_transactions().await? {
            match txn.status() {
                MatchStatus::Unmatched => stats.unmatched += 1,
                MatchStatus::PendingReview => stats.pending_review += 1,
                MatchStatus::AutoMatched | MatchStatus::ManualMatched => stats.matched += 1,
                MatchStatus::Rejected => {}
            }

            if txn.transaction_date == day {
                match txn.direction {
                    Direction::In => stats.incoming_today += txn.amount,
                    Direction::Out => stats.outgoing_today += txn.amount,
                }
            }
        }
        Ok(stats)
    }
}
