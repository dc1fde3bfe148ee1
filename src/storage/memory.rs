//! In-memory store, used by tests and as the engine's default backend.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{ReconciliationError, StoreResult};
use crate::matching::MatchResult;
use crate::models::{BankAccount, BankTransaction, DedupKey, Id};

use super::{ReconciliationStore, TransactionIndex};

#[derive(Default)]
pub struct MemoryStore {
    index: Mutex<TransactionIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReconciliationStore for MemoryStore {
    async fn save_account(&self, account: &BankAccount) -> StoreResult<()> {
        self.index.lock().await.upsert_account(account.clone());
        Ok(())
    }

    async fn get_account(&self, id: &Id) -> StoreResult<Option<BankAccount>> {
        Ok(self.index.lock().await.account(id).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<BankAccount>> {
        Ok(self.index.lock().await.accounts())
    }

    async fn set_account_active(&self, id: &Id, active: bool) -> StoreResult<BankAccount> {
        self.index.lock().await.set_account_active(id, active)
    }

    async fn dedup_keys(&self, account_id: &Id) -> StoreResult<HashSet<DedupKey>> {
        Ok(self.index.lock().await.dedup_keys(account_id))
    }

    async fn record_transactions(
        &self,
        account_id: &Id,
        txns: &[BankTransaction],
    ) -> StoreResult<()> {
        let mut index = self.index.lock().await;
        index.check_new(account_id, txns)?;
        for txn in txns {
            index.put(txn.clone());
        }
        Ok(())
    }

    async fn get_transaction(&self, id: &Id) -> StoreResult<Option<BankTransaction>> {
        Ok(self.index.lock().await.transaction(id).cloned())
    }

    async fn list_transactions(&self, account_id: &Id) -> StoreResult<Vec<BankTransaction>> {
        Ok(self.index.lock().await.transactions_for(account_id))
    }

    async fn list_all_transactions(&self) -> StoreResult<Vec<BankTransaction>> {
        Ok(self.index.lock().await.all_transactions())
    }

    async fn apply_match(
        &self,
        result: &MatchResult,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let mut index = self.index.lock().await;
        match index.apply_match(result, at)? {
            Some(updated) => Ok(updated),
            None => index
                .transaction(&result.transaction_id)
                .cloned()
                .ok_or_else(|| ReconciliationError::TransactionNotFound(result.transaction_id.clone())),
        }
    }

    async fn confirm(
        &self,
        txn_id: &Id,
        due_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        self.index.lock().await.confirm(txn_id, due_id, operator, at)
    }

    async fn unmatch(
        &self,
        txn_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        self.index.lock().await.unmatch(txn_id, operator, at)
    }

    async fn reject(
        &self,
        txn_id: &Id,
        operator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        self.index.lock().await.reject(txn_id, operator, reason, at)
    }

    async fn active_match_for_due(&self, due_id: &Id) -> StoreResult<Option<BankTransaction>> {
        Ok(self.index.lock().await.active_holder(due_id).cloned())
    }

    async fn active_due_ids(&self) -> StoreResult<HashSet<Id>> {
        Ok(self.index.lock().await.active_due_ids())
    }
}
