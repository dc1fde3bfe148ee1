//! Statement sync: fetch, normalize, persist, match.

mod orchestrator;

pub use orchestrator::SyncOrchestrator;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::matching::AutoMatchEngine;
use crate::models::{Id, IdGenerator, UuidIdGenerator};
use crate::notify::{MatchNotifier, NoopNotifier};
use crate::providers::ProviderRegistry;
use crate::receivables::CandidateReceivableSource;
use crate::storage::ReconciliationStore;

/// Stages of one sync run, in order. A run ends in `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Requested,
    Fetching,
    Normalizing,
    Matching,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Requested => "REQUESTED",
            SyncPhase::Fetching => "FETCHING",
            SyncPhase::Normalizing => "NORMALIZING",
            SyncPhase::Matching => "MATCHING",
            SyncPhase::Done => "DONE",
            SyncPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// What a run did, phase by phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub account_id: Id,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub phases: Vec<SyncPhase>,
    pub fetched: usize,
    pub new: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub auto_matched: usize,
    pub pending_review: usize,
    pub unmatched: usize,
    /// Transactions the matcher could not be run for; they stay as they were.
    pub match_failures: usize,
}

impl SyncReport {
    pub fn new(account_id: Id, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            account_id,
            from,
            to,
            phases: vec![SyncPhase::Requested],
            fetched: 0,
            new: 0,
            duplicates: 0,
            rejected: 0,
            auto_matched: 0,
            pending_review: 0,
            unmatched: 0,
            match_failures: 0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phases.last().copied().unwrap_or(SyncPhase::Requested)
    }

    pub(crate) fn enter(&mut self, phase: SyncPhase) {
        tracing::debug!(account_id = %self.account_id, phase = %phase, "sync phase");
        self.phases.push(phase);
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncReport),
    SkippedInactive { account_id: Id },
    Failed { report: SyncReport, error: SyncError },
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) | SyncOutcome::Failed { report, .. } => Some(report),
            SyncOutcome::SkippedInactive { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

/// Everything a [`SyncOrchestrator`] needs, with injectable time and ids.
pub struct SyncContext {
    pub store: Arc<dyn ReconciliationStore>,
    pub providers: Arc<ProviderRegistry>,
    pub receivables: Arc<dyn CandidateReceivableSource>,
    pub engine: Arc<AutoMatchEngine>,
    pub notifier: Arc<dyn MatchNotifier>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        providers: Arc<ProviderRegistry>,
        receivables: Arc<dyn CandidateReceivableSource>,
        engine: Arc<AutoMatchEngine>,
    ) -> Self {
        Self {
            store,
            providers,
            receivables,
            engine,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            config: SyncConfig::default(),
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

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
