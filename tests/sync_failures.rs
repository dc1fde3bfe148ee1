mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bankmatch::config::SyncConfig;
use bankmatch::error::{ProviderError, ReconciliationError, SyncError};
use bankmatch::models::Id;
use bankmatch::providers::MemoryProvider;
use bankmatch::storage::MemoryStore;
use bankmatch::sync::{SyncOutcome, SyncPhase};
use support::{incoming, january, Harness, ACCOUNT_IBAN, BANK_CODE};

fn one_line() -> MemoryProvider {
    MemoryProvider::new(BANK_CODE)
        .with_transactions(ACCOUNT_IBAN, [incoming(5, 85000, "AIDAT D.12")])
}

fn quick_config(fetch_timeout: Duration, retry_max_elapsed: Duration) -> SyncConfig {
    SyncConfig {
        fetch_timeout,
        retry_max_elapsed,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn auth_failure_fails_the_run_without_retry_or_writes() -> Result<()> {
    let harness = Harness::new(one_line(), Vec::new()).await?;
    harness.provider.fail_next(ProviderError::Auth {
        bank: BANK_CODE.to_string(),
        message: "token expired".to_string(),
    });

    let outcome = harness
        .orchestrator
        .sync_account(&harness.account.id, Some(january()))
        .await?;
    match outcome {
        SyncOutcome::Failed { report, error } => {
            assert_eq!(report.phase(), SyncPhase::Failed);
            assert!(matches!(
                error,
                SyncError::Fetch {
                    source: ProviderError::Auth { .. },
                    ..
                }
            ));
        }
        other => panic!("expected failed run, got {other:?}"),
    }
    assert_eq!(harness.provider.fetch_count(), 1);
    assert!(harness
        .store
        .list_transactions(&harness.account.id)
        .await?
        .is_empty());

    // Retrying later is safe and picks the data up.
    let report = harness.sync().await?;
    assert_eq!(report.new, 1);
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried() -> Result<()> {
    let harness = Harness::build(
        Arc::new(MemoryStore::new()),
        one_line(),
        Vec::new(),
        quick_config(Duration::from_secs(5), Duration::from_secs(10)),
    )
    .await?;
    harness.provider.fail_next(ProviderError::Unreachable {
        bank: BANK_CODE.to_string(),
        message: "connection reset".to_string(),
    });

    let report = harness.sync().await?;
    assert_eq!(report.new, 1);
    assert_eq!(harness.provider.fetch_count(), 2);
    Ok(())
}

#[tokio::test]
async fn fetch_timeout_writes_nothing() -> Result<()> {
    let harness = Harness::build(
        Arc::new(MemoryStore::new()),
        one_line().with_delay(Duration::from_millis(500)),
        Vec::new(),
        quick_config(Duration::from_millis(20), Duration::ZERO),
    )
    .await?;

    let outcome = harness
        .orchestrator
        .sync_account(&harness.account.id, Some(january()))
        .await?;
    match outcome {
        SyncOutcome::Failed { error, .. } => assert!(matches!(
            error,
            SyncError::Fetch {
                source: ProviderError::Timeout { .. },
                ..
            }
        )),
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert!(harness
        .store
        .list_transactions(&harness.account.id)
        .await?
        .is_empty());
    assert!(harness.store.dedup_keys(&harness.account.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn inactive_account_is_skipped() -> Result<()> {
    let harness = Harness::new(one_line(), Vec::new()).await?;
    harness
        .store
        .set_account_active(&harness.account.id, false)
        .await?;

    let outcome = harness
        .orchestrator
        .sync_account(&harness.account.id, Some(january()))
        .await?;
    assert!(matches!(outcome, SyncOutcome::SkippedInactive { .. }));
    assert_eq!(harness.provider.fetch_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_account_cannot_start() -> Result<()> {
    let harness = Harness::new(one_line(), Vec::new()).await?;
    let err = harness
        .orchestrator
        .sync_account(&Id::from_string("missing"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Store(ReconciliationError::AccountNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn sync_all_reports_each_account() -> Result<()> {
    let harness = Harness::new(one_line(), Vec::new()).await?;

    let results = harness.orchestrator.sync_all(Some(january())).await?;
    assert_eq!(results.len(), 1);
    let (account_id, outcome) = &results[0];
    assert_eq!(account_id, &harness.account.id);
    assert!(outcome.as_ref().is_ok_and(|o| o.is_completed()));
    Ok(())
}
