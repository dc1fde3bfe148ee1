#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use bankmatch::clock::FixedClock;
use bankmatch::config::{MatchingConfig, SyncConfig};
use bankmatch::matching::AutoMatchEngine;
use bankmatch::models::{
    BankAccount, CandidateReceivable, Direction, FixedIdGenerator, Id,
};
use bankmatch::notify::{ChannelNotifier, MatchNotice};
use bankmatch::providers::{MemoryProvider, ProviderRegistry, RawTransaction};
use bankmatch::receivables::StaticReceivables;
use bankmatch::reconcile::ReconciliationService;
use bankmatch::storage::{MemoryStore, ReconciliationStore};
use bankmatch::sync::{SyncContext, SyncOrchestrator, SyncOutcome, SyncReport};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedReceiver;

pub const BANK_CODE: &str = "0010";
pub const ACCOUNT_IBAN: &str = "TR120001000000000000000001";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

pub fn january() -> (NaiveDate, NaiveDate) {
    (day(1), day(31))
}

/// Amount from minor units: `try_amount(85000)` is 850.00.
pub fn try_amount(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

pub fn property_id() -> Id {
    Id::from_string("site-1")
}

pub fn bank_account() -> BankAccount {
    BankAccount::new(property_id(), BANK_CODE, ACCOUNT_IBAN, "TRY")
        .with_id(Id::from_string("acc-1"))
        .with_name("Site Aidat Hesabı")
}

pub fn incoming(d: u32, minor: i64, description: &str) -> RawTransaction {
    RawTransaction::new(day(d), try_amount(minor), Direction::In).with_description(description)
}

pub fn outgoing(d: u32, minor: i64, description: &str) -> RawTransaction {
    RawTransaction::new(day(d), try_amount(minor), Direction::Out).with_description(description)
}

pub fn due(id: &str, resident: &str, name: &str, unit: &str, minor: i64) -> CandidateReceivable {
    CandidateReceivable::new(
        Id::from_string(id),
        Id::from_string(resident),
        name,
        unit,
        try_amount(minor),
        day(1),
    )
}

/// An orchestrator wired to in-memory parts, with one registered account.
pub struct Harness {
    pub account: BankAccount,
    pub store: Arc<dyn ReconciliationStore>,
    pub provider: Arc<MemoryProvider>,
    pub receivables: Arc<StaticReceivables>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: SyncOrchestrator,
    pub notices: UnboundedReceiver<MatchNotice>,
    notifier: Arc<ChannelNotifier>,
}

impl Harness {
    pub async fn new(provider: MemoryProvider, dues: Vec<CandidateReceivable>) -> Result<Self> {
        Self::build(
            Arc::new(MemoryStore::new()),
            provider,
            dues,
            SyncConfig::default(),
        )
        .await
    }

    pub async fn build(
        store: Arc<dyn ReconciliationStore>,
        provider: MemoryProvider,
        dues: Vec<CandidateReceivable>,
        config: SyncConfig,
    ) -> Result<Self> {
        let account = bank_account();
        if store.get_account(&account.id).await?.is_none() {
            store.save_account(&account).await?;
        }

        let provider = Arc::new(provider);
        let receivables =
            Arc::new(StaticReceivables::new().with_dues(&account.property_id, dues));
        let clock = Arc::new(FixedClock::new(now()));
        let (notifier, notices) = ChannelNotifier::new();
        let notifier = Arc::new(notifier);

        let registry = ProviderRegistry::new().with(BANK_CODE, provider.clone());
        let engine = AutoMatchEngine::new(MatchingConfig::default())?;
        let context = SyncContext::new(
            store.clone(),
            Arc::new(registry),
            receivables.clone(),
            Arc::new(engine),
        )
        .with_notifier(notifier.clone())
        .with_clock(clock.clone())
        .with_ids(Arc::new(FixedIdGenerator::default()))
        .with_config(config);

        Ok(Self {
            account,
            store,
            provider,
            receivables,
            clock,
            orchestrator: SyncOrchestrator::new(context),
            notices,
            notifier,
        })
    }

    pub fn service(&self) -> ReconciliationService {
        ReconciliationService::new(self.store.clone(), self.receivables.clone())
            .with_notifier(self.notifier.clone())
            .with_clock(self.clock.clone())
    }

    /// Sync January and insist the run completed.
    pub async fn sync(&self) -> Result<SyncReport> {
        match self
            .orchestrator
            .sync_account(&self.account.id, Some(january()))
            .await?
        {
            SyncOutcome::Completed(report) => Ok(report),
            other => anyhow::bail!("sync did not complete: {other:?}"),
        }
    }

    pub fn drain_notices(&mut self) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }
}
