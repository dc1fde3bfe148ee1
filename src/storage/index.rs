//! In-memory view of accounts and transactions shared by both store backends.
//!
//! Every mutation validates first and only then writes, so a failed call leaves
//! the index untouched. Callers hold a single writer lock around it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{ReconciliationError, StoreResult};
use crate::matching::{MatchOutcome, MatchResult};
use crate::models::{
    BankAccount, BankTransaction, DedupKey, Id, MatchState, StateAction, StateChange,
};

/// Actor recorded for engine-driven state changes.
pub const ENGINE_ACTOR: &str = "auto-match";

#[derive(Debug, Default)]
pub(crate) struct TransactionIndex {
    accounts: HashMap<Id, BankAccount>,
    transactions: HashMap<Id, BankTransaction>,
    /// Transaction ids per account in ingestion order.
    by_account: HashMap<Id, Vec<Id>>,
    dedup: HashMap<Id, HashMap<DedupKey, Id>>,
    /// due id -> transaction currently holding an active match on it.
    active_by_due: HashMap<Id, Id>,
}

impl TransactionIndex {
    pub fn upsert_account(&mut self, account: BankAccount) {
        self.accounts.insert(account.id.clone(), account);
    }

    pub fn account(&self, id: &Id) -> Option<&BankAccount> {
        self.accounts.get(id)
    }

    pub fn accounts(&self) -> Vec<BankAccount> {
        let mut accounts: Vec<BankAccount> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        accounts
    }

    pub fn set_account_active(&mut self, id: &Id, active: bool) -> StoreResult<BankAccount> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| ReconciliationError::AccountNotFound(id.clone()))?;
        account.active = active;
        Ok(account.clone())
    }

    pub fn dedup_keys(&self, account_id: &Id) -> HashSet<DedupKey> {
        self.dedup
            .get(account_id)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn transaction(&self, id: &Id) -> Option<&BankTransaction> {
        self.transactions.get(id)
    }

    /// Transactions for one account, by transaction date then ingestion order.
    pub fn transactions_for(&self, account_id: &Id) -> Vec<BankTransaction> {
        let mut txns: Vec<BankTransaction> = self
            .by_account
            .get(account_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.transactions.get(id))
            .cloned()
            .collect();
        txns.sort_by_key(|t| t.transaction_date);
        txns
    }

    pub fn all_transactions(&self) -> Vec<BankTransaction> {
        let mut txns = Vec::with_capacity(self.transactions.len());
        for account in self.accounts() {
            txns.extend(self.transactions_for(&account.id));
        }
        txns
    }

    pub fn active_holder(&self, due_id: &Id) -> Option<&BankTransaction> {
        self.active_by_due
            .get(due_id)
            .and_then(|txn_id| self.transactions.get(txn_id))
    }

    pub fn active_due_ids(&self) -> HashSet<Id> {
        self.active_by_due.keys().cloned().collect()
    }

    /// Checks a batch of new transactions without writing anything.
    pub fn check_new(&self, account_id: &Id, txns: &[BankTransaction]) -> StoreResult<()> {
        if !self.accounts.contains_key(account_id) {
            return Err(ReconciliationError::AccountNotFound(account_id.clone()));
        }

        let existing = self.dedup.get(account_id);
        let mut batch = HashSet::new();
        for txn in txns {
            if &txn.account_id != account_id {
                return Err(anyhow::anyhow!(
                    "transaction {} belongs to account {}, not {}",
                    txn.id,
                    txn.account_id,
                    account_id
                )
                .into());
            }
            let seen = existing.is_some_and(|keys| keys.contains_key(&txn.dedup_key));
            if seen || !batch.insert(&txn.dedup_key) {
                return Err(ReconciliationError::DedupConflict {
                    account_id: account_id.clone(),
                    key: txn.dedup_key.clone(),
                });
            }
            if self.transactions.contains_key(&txn.id) {
                return Err(anyhow::anyhow!("transaction id {} already exists", txn.id).into());
            }
        }
        Ok(())
    }

    /// Inserts or replaces a transaction record, keeping every secondary index
    /// consistent. Used both for fresh inserts and for replaying the JSONL log.
    pub fn put(&mut self, txn: BankTransaction) {
        if let Some(previous) = self.transactions.get(&txn.id) {
            if let Some(due_id) = previous.state.due_id() {
                if self.active_by_due.get(due_id) == Some(&previous.id) {
                    self.active_by_due.remove(due_id);
                }
            }
        } else {
            self.by_account
                .entry(txn.account_id.clone())
                .or_default()
                .push(txn.id.clone());
        }

        self.dedup
            .entry(txn.account_id.clone())
            .or_default()
            .insert(txn.dedup_key.clone(), txn.id.clone());
        if let Some(due_id) = txn.state.due_id() {
            self.active_by_due.insert(due_id.clone(), txn.id.clone());
        }
        self.transactions.insert(txn.id.clone(), txn);
    }

    fn open_transaction(&self, id: &Id, action: &'static str) -> StoreResult<&BankTransaction> {
        let txn = self
            .transactions
            .get(id)
            .ok_or_else(|| ReconciliationError::TransactionNotFound(id.clone()))?;
        if txn.state.is_open() {
            Ok(txn)
        } else {
            Err(ReconciliationError::InvalidTransition {
                transaction_id: id.clone(),
                from: txn.status(),
                action,
            })
        }
    }

    fn ensure_due_free(&self, due_id: &Id, txn_id: &Id) -> StoreResult<()> {
        match self.active_by_due.get(due_id) {
            Some(holder) if holder != txn_id => Err(ReconciliationError::AlreadyMatched {
                due_id: due_id.clone(),
                held_by: holder.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Writes an engine verdict. Returns `None` when the record already reflects it.
    ///
    /// Only open transactions are touched; a definitive hit on a due that is
    /// already held fails with `AlreadyMatched` and changes nothing.
    pub fn apply_match(
        &mut self,
        result: &MatchResult,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<BankTransaction>> {
        let txn = self.open_transaction(&result.transaction_id, "auto-match")?;

        let (state, action) = match &result.outcome {
            MatchOutcome::AutoMatched(hit) => {
                self.ensure_due_free(&hit.due_id, &txn.id)?;
                let state = MatchState::AutoMatched {
                    due_id: hit.due_id.clone(),
                    confidence: hit.confidence,
                    reason: hit.reason().to_string(),
                    matched_at: at,
                };
                (state, StateAction::AutoMatch)
            }
            MatchOutcome::PendingReview(suggestions) => (
                MatchState::PendingReview {
                    suggestions: suggestions.clone(),
                },
                StateAction::Evaluate,
            ),
            MatchOutcome::Unmatched => (MatchState::Unmatched, StateAction::Evaluate),
        };

        if txn.state == state {
            return Ok(None);
        }

        let mut updated = txn.clone();
        updated.transition(
            state,
            StateChange {
                action,
                actor: ENGINE_ACTOR.to_string(),
                at,
            },
        );
        self.put(updated.clone());
        Ok(Some(updated))
    }

    pub fn confirm(
        &mut self,
        txn_id: &Id,
        due_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let txn = self
            .transactions
            .get(txn_id)
            .ok_or_else(|| ReconciliationError::TransactionNotFound(txn_id.clone()))?;

        match &txn.state {
            MatchState::AutoMatched { due_id: held, .. }
            | MatchState::ManualMatched { due_id: held, .. } => {
                return Err(ReconciliationError::AlreadyMatched {
                    due_id: held.clone(),
                    held_by: txn_id.clone(),
                });
            }
            MatchState::Rejected { .. } => {
                return Err(ReconciliationError::InvalidTransition {
                    transaction_id: txn_id.clone(),
                    from: txn.status(),
                    action: "confirm",
                });
            }
            MatchState::Unmatched | MatchState::PendingReview { .. } => {}
        }
        if !txn.is_incoming() {
            return Err(ReconciliationError::OutgoingTransaction(txn_id.clone()));
        }
        self.ensure_due_free(due_id, txn_id)?;

        let mut updated = txn.clone();
        updated.transition(
            MatchState::ManualMatched {
                due_id: due_id.clone(),
                operator: operator.to_string(),
                matched_at: at,
            },
            StateChange {
                action: StateAction::Confirm,
                actor: operator.to_string(),
                at,
            },
        );
        self.put(updated.clone());
        Ok(updated)
    }

    pub fn unmatch(
        &mut self,
        txn_id: &Id,
        operator: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let txn = self
            .transactions
            .get(txn_id)
            .ok_or_else(|| ReconciliationError::TransactionNotFound(txn_id.clone()))?;
        if !txn.state.is_active() {
            return Err(ReconciliationError::InvalidTransition {
                transaction_id: txn_id.clone(),
                from: txn.status(),
                action: "unmatch",
            });
        }

        let mut updated = txn.clone();
        updated.transition(
            MatchState::Unmatched,
            StateChange {
                action: StateAction::Unmatch,
                actor: operator.to_string(),
                at,
            },
        );
        self.put(updated.clone());
        Ok(updated)
    }

    pub fn reject(
        &mut self,
        txn_id: &Id,
        operator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<BankTransaction> {
        let txn = self.open_transaction(txn_id, "reject")?;

        let mut updated = txn.clone();
        updated.transition(
            MatchState::Rejected {
                operator: operator.to_string(),
                rejected_at: at,
                reason: reason.map(str::to_string),
            },
            StateChange {
                action: StateAction::Reject,
                actor: operator.to_string(),
                at,
            },
        );
        self.put(updated.clone());
        Ok(updated)
    }
}
