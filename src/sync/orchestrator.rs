//! Drives one account's sync run end-to-end.
//!
//! Runs for the same account are serialized on a per-account async mutex; a
//! second request waits and then finds nothing new. Runs for different
//! accounts proceed in parallel.
//!
//! Nothing is written until the provider has returned a complete batch, so a
//! failed or timed-out fetch leaves the store exactly as it was.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use backoff::ExponentialBackoff;
use chrono::{Duration as ChronoDuration, NaiveDate};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{ProviderError, ReconciliationError, SyncError};
use crate::matching::{AutoMatchEngine, MatchOutcome};
use crate::models::{BankAccount, BankTransaction, CandidateReceivable, Id, MatchMethod};
use crate::normalize::TransactionNormalizer;
use crate::notify::{MatchNotice, MatchNotifier};
use crate::providers::{BankProvider, ProviderRegistry, RawTransaction};
use crate::receivables::CandidateReceivableSource;
use crate::storage::ReconciliationStore;

use super::{SyncContext, SyncOutcome, SyncPhase, SyncReport, SyncResult};

pub struct SyncOrchestrator {
    store: Arc<dyn ReconciliationStore>,
    providers: Arc<ProviderRegistry>,
    receivables: Arc<dyn CandidateReceivableSource>,
    engine: Arc<AutoMatchEngine>,
    notifier: Arc<dyn MatchNotifier>,
    clock: Arc<dyn Clock>,
    normalizer: TransactionNormalizer,
    config: SyncConfig,
    locks: Mutex<HashMap<Id, Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    pub fn new(context: SyncContext) -> Self {
        Self {
            normalizer: TransactionNormalizer::new(context.ids, context.clock.clone()),
            store: context.store,
            providers: context.providers,
            receivables: context.receivables,
            engine: context.engine,
            notifier: context.notifier,
            clock: context.clock,
            config: context.config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn account_lock(&self, account_id: &Id) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_account(&self, account_id: &Id) -> SyncResult<BankAccount> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| ReconciliationError::AccountNotFound(account_id.clone()).into())
    }

    /// Default window: the last `lookback_days` days, today included.
    pub fn default_range(&self) -> (NaiveDate, NaiveDate) {
        let to = self.clock.today();
        let from = to - ChronoDuration::days(i64::from(self.config.lookback_days));
        (from, to)
    }

    /// Fetch, normalize, persist and match one account's statement lines.
    ///
    /// Returns `Err` only when the run cannot start (unknown account or bank
    /// code). Failures after that are reported as [`SyncOutcome::Failed`].
    pub async fn sync_account(
        &self,
        account_id: &Id,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> SyncResult<SyncOutcome> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        let account = self.load_account(account_id).await?;
        if !account.active {
            info!(account_id = %account.id, "account inactive; sync skipped");
            return Ok(SyncOutcome::SkippedInactive {
                account_id: account.id,
            });
        }
        let provider = self.providers.get(&account.bank_code)?;

        let (from, to) = range.unwrap_or_else(|| self.default_range());
        let mut report = SyncReport::new(account.id.clone(), from, to);
        info!(
            account_id = %account.id,
            bank = provider.name(),
            %from,
            %to,
            "sync started"
        );

        match self
            .run(&account, provider.as_ref(), &mut report)
            .await
        {
            Ok(()) => {
                report.enter(SyncPhase::Done);
                info!(
                    account_id = %account.id,
                    fetched = report.fetched,
                    new = report.new,
                    duplicates = report.duplicates,
                    rejected = report.rejected,
                    auto_matched = report.auto_matched,
                    pending_review = report.pending_review,
                    "sync finished"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                report.enter(SyncPhase::Failed);
                match &err {
                    SyncError::Store(ReconciliationError::DedupConflict { .. }) => {
                        error!(account_id = %account.id, error = %err, "dedup conflict; nothing recorded")
                    }
                    _ => warn!(account_id = %account.id, error = %err, "sync failed"),
                }
                Ok(SyncOutcome::Failed { report, error: err })
            }
        }
    }

    async fn run(
        &self,
        account: &BankAccount,
        provider: &dyn BankProvider,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        report.enter(SyncPhase::Fetching);
        let (from, to) = (report.from, report.to);
        let raw: Vec<RawTransaction> = self
            .call_provider(&account.bank_code, || {
                provider.fetch_transactions(account, from, to)
            })
            .await
            .map_err(|source| SyncError::Fetch {
                account_id: account.id.clone(),
                source,
            })?;
        report.fetched = raw.len();

        report.enter(SyncPhase::Normalizing);
        let existing = self.store.dedup_keys(&account.id).await?;
        let batch = self.normalizer.normalize(account, raw, &existing);
        report.duplicates = batch.duplicates;
        report.rejected = batch.rejected.len();
        report.new = batch.fresh.len();
        if !batch.fresh.is_empty() {
            self.store
                .record_transactions(&account.id, &batch.fresh)
                .await?;
        }

        report.enter(SyncPhase::Matching);
        self.match_transactions(account, &batch.fresh, report).await;
        Ok(())
    }

    /// Run `op` under the fetch timeout, retrying transient failures with
    /// exponential backoff until `retry_max_elapsed` is spent.
    async fn call_provider<T, F, Fut>(&self, bank: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = self.config.fetch_timeout;
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.config.retry_max_elapsed),
            ..Default::default()
        };

        backoff::future::retry(policy, || {
            let call = op();
            async move {
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout {
                        bank: bank.to_string(),
                        timeout,
                    }),
                };
                result.map_err(|err| {
                    if err.is_transient() {
                        warn!(bank, error = %err, "provider call failed; retrying");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }

    /// Evaluate open transactions against the property's free dues and write
    /// the verdicts. Per-transaction failures are logged and counted; the rest
    /// of the batch continues.
    async fn match_transactions(
        &self,
        account: &BankAccount,
        txns: &[BankTransaction],
        report: &mut SyncReport,
    ) {
        if txns.is_empty() {
            return;
        }

        let mut available = match self.available_dues(account).await {
            Ok(dues) => dues,
            Err(err) => {
                warn!(
                    account_id = %account.id,
                    error = %err,
                    "could not load outstanding dues; transactions left unmatched"
                );
                report.match_failures += txns.len();
                return;
            }
        };

        for txn in txns {
            let result = self.engine.evaluate(txn, &available);
            match self.store.apply_match(&result, self.clock.now()).await {
                Ok(_) => match &result.outcome {
                    MatchOutcome::AutoMatched(hit) => {
                        report.auto_matched += 1;
                        available.retain(|due| due.due_id != hit.due_id);
                        info!(
                            transaction_id = %txn.id,
                            due_id = %hit.due_id,
                            confidence = %hit.confidence,
                            reason = hit.reason(),
                            "auto-matched"
                        );
                        self.notifier.notify_matched(&MatchNotice {
                            resident_id: hit.resident_id.clone(),
                            due_id: hit.due_id.clone(),
                            transaction_id: txn.id.clone(),
                            amount: txn.amount,
                            method: MatchMethod::Auto,
                        });
                    }
                    MatchOutcome::PendingReview(_) => report.pending_review += 1,
                    MatchOutcome::Unmatched => report.unmatched += 1,
                },
                Err(ReconciliationError::AlreadyMatched { due_id, held_by }) => {
                    warn!(
                        transaction_id = %txn.id,
                        %due_id,
                        %held_by,
                        "due was taken concurrently; transaction left unmatched"
                    );
                    available.retain(|due| due.due_id != due_id);
                    report.unmatched += 1;
                }
                Err(err) => {
                    warn!(transaction_id = %txn.id, error = %err, "failed to record match");
                    report.match_failures += 1;
                }
            }
        }
    }

    async fn available_dues(&self, account: &BankAccount) -> anyhow::Result<Vec<CandidateReceivable>> {
        let dues = self
            .receivables
            .list_outstanding_dues(&account.property_id)
            .await?;
        let held = self.store.active_due_ids().await?;
        Ok(dues
            .into_iter()
            .filter(|due| !held.contains(&due.due_id))
            .collect())
    }

    /// Sync every stored account concurrently. Each entry pairs the account id
    /// with that account's outcome.
    pub async fn sync_all(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> SyncResult<Vec<(Id, SyncResult<SyncOutcome>)>> {
        let accounts = self.store.list_accounts().await?;
        let runs = accounts.iter().map(|account| async move {
            (account.id.clone(), self.sync_account(&account.id, range).await)
        });
        Ok(futures::future::join_all(runs).await)
    }

    /// Re-run matching over an account's open (unmatched or pending) transactions,
    /// for example after new dues were issued.
    pub async fn rematch_account(&self, account_id: &Id) -> SyncResult<SyncReport> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        let account = self.load_account(account_id).await?;
        let today = self.clock.today();
        let mut report = SyncReport::new(account.id.clone(), today, today);

        let open: Vec<BankTransaction> = self
            .store
            .list_transactions(&account.id)
            .await?
            .into_iter()
            .filter(|txn| txn.state.is_open() && txn.is_incoming())
            .collect();

        report.enter(SyncPhase::Matching);
        self.match_transactions(&account, &open, &mut report).await;
        report.enter(SyncPhase::Done);
        info!(
            account_id = %account.id,
            evaluated = open.len(),
            auto_matched = report.auto_matched,
            pending_review = report.pending_review,
            "rematch finished"
        );
        Ok(report)
    }

    /// Current balance as reported by the account's bank.
    pub async fn fetch_balance(&self, account_id: &Id) -> SyncResult<Decimal> {
        let account = self.load_account(account_id).await?;
        let provider = self.providers.get(&account.bank_code)?;
        self.call_provider(&account.bank_code, || provider.fetch_balance(&account))
            .await
            .map_err(|source| SyncError::Fetch {
                account_id: account.id.clone(),
                source,
            })
    }
}
