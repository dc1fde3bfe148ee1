mod support;

use anyhow::Result;
use bankmatch::models::{Confidence, Id, MatchMethod, MatchState, MatchStatus};
use bankmatch::providers::MemoryProvider;
use support::{due, incoming, outgoing, Harness, ACCOUNT_IBAN, BANK_CODE};

const RESIDENT_IBAN: &str = "TR330006100519786457841326";

fn provider(lines: impl IntoIterator<Item = bankmatch::providers::RawTransaction>) -> MemoryProvider {
    MemoryProvider::new(BANK_CODE).with_transactions(ACCOUNT_IBAN, lines)
}

fn conf(value: f64) -> Confidence {
    Confidence::new(value).unwrap()
}

#[tokio::test]
async fn counterparty_iban_auto_matches() -> Result<()> {
    let mut harness = Harness::new(
        provider([incoming(5, 85000, "EFT").with_counterparty_iban("TR33 0006 1005 1978 6457 8413 26")]),
        vec![due("due-1", "res-1", "Ayşe Kaya", "D.12", 85000).with_iban(RESIDENT_IBAN)],
    )
    .await?;

    let report = harness.sync().await?;
    assert_eq!(report.auto_matched, 1);

    let stored = harness.store.list_transactions(&harness.account.id).await?;
    let txn = &stored[0];
    assert_eq!(txn.status(), MatchStatus::AutoMatched);
    assert_eq!(txn.state.due_id(), Some(&Id::from_string("due-1")));
    assert_eq!(txn.state.confidence(), Some(conf(0.99)));

    let notices = harness.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].resident_id.as_str(), "res-1");
    assert_eq!(notices[0].method, MatchMethod::Auto);
    assert_eq!(notices[0].amount, support::try_amount(85000));
    Ok(())
}

#[tokio::test]
async fn resident_name_and_amount_auto_match() -> Result<()> {
    let harness = Harness::new(
        provider([incoming(5, 120000, "AIDAT MEHMET DEMIR OCAK")]),
        vec![
            due("due-1", "res-1", "Mehmet Demir", "D.4", 120000),
            due("due-2", "res-2", "Ayşe Kaya", "D.5", 120000),
        ],
    )
    .await?;

    harness.sync().await?;
    let stored = harness.store.list_transactions(&harness.account.id).await?;
    let txn = &stored[0];
    match &txn.state {
        MatchState::AutoMatched {
            due_id, confidence, ..
        } => {
            assert_eq!(due_id.as_str(), "due-1");
            assert_eq!(*confidence, conf(0.90));
        }
        other => panic!("expected auto match, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn turkish_letters_fold_when_matching_names() -> Result<()> {
    let harness = Harness::new(
        provider([incoming(5, 85000, "HAVALE AYŞE KAYA").with_counterparty("İSMAİL KAYA")]),
        vec![due("due-1", "res-1", "Ismail Kaya", "D.9", 85000)],
    )
    .await?;

    harness.sync().await?;
    let stored = harness.store.list_transactions(&harness.account.id).await?;
    let txn = &stored[0];
    assert_eq!(txn.status(), MatchStatus::AutoMatched);
    Ok(())
}

#[tokio::test]
async fn ambiguous_amount_goes_to_review() -> Result<()> {
    let harness = Harness::new(
        provider([incoming(5, 85000, "HAVALE")]),
        vec![
            due("due-1", "res-1", "Ayşe Kaya", "D.12", 85000),
            due("due-2", "res-2", "Ali Veli", "D.14", 85000),
        ],
    )
    .await?;

    let report = harness.sync().await?;
    assert_eq!(report.pending_review, 1);

    let pending = harness.store.list_pending(Some(&harness.account.id)).await?;
    assert_eq!(pending.len(), 1);
    let suggestions = pending[0].state.suggestions();
    assert_eq!(suggestions.len(), 2);
    assert!(suggestions.iter().all(|s| s.confidence == conf(0.60)));
    assert!(suggestions.iter().all(|s| s.confidence.value() < 0.90));
    Ok(())
}

#[tokio::test]
async fn iban_hit_beats_amount_only_hit() -> Result<()> {
    let harness = Harness::new(
        provider([incoming(5, 85000, "EFT").with_counterparty_iban(RESIDENT_IBAN)]),
        vec![
            due("due-a", "res-a", "Ali Veli", "D.1", 85000),
            due("due-b", "res-b", "Ayşe Kaya", "D.2", 90000).with_iban(RESIDENT_IBAN),
        ],
    )
    .await?;

    harness.sync().await?;
    let stored = harness.store.list_transactions(&harness.account.id).await?;
    let txn = &stored[0];
    assert_eq!(txn.state.due_id().map(Id::as_str), Some("due-b"));
    Ok(())
}

#[tokio::test]
async fn a_due_is_credited_once_per_batch() -> Result<()> {
    let harness = Harness::new(
        provider([
            incoming(5, 85000, "EFT").with_counterparty_iban(RESIDENT_IBAN).with_reference("R1"),
            incoming(6, 85000, "EFT").with_counterparty_iban(RESIDENT_IBAN).with_reference("R2"),
        ]),
        vec![due("due-1", "res-1", "Ayşe Kaya", "D.12", 85000).with_iban(RESIDENT_IBAN)],
    )
    .await?;

    let report = harness.sync().await?;
    assert_eq!(report.auto_matched, 1);
    assert_eq!(report.unmatched, 1);

    let holder = harness
        .store
        .active_match_for_due(&Id::from_string("due-1"))
        .await?
        .expect("due should be held");
    assert_eq!(holder.provider_reference.as_deref(), Some("R1"));
    Ok(())
}

#[tokio::test]
async fn outgoing_and_unknown_payments_stay_unmatched() -> Result<()> {
    let harness = Harness::new(
        provider([
            outgoing(5, 85000, "MEHMET DEMIR IADE"),
            incoming(6, 12345, "KALINCA ODEME"),
        ]),
        vec![due("due-1", "res-1", "Mehmet Demir", "D.4", 85000)],
    )
    .await?;

    let report = harness.sync().await?;
    assert_eq!(report.unmatched, 2);
    assert_eq!(report.auto_matched, 0);
    let unmatched = harness.store.list_unmatched(None).await?;
    assert_eq!(unmatched.len(), 2);
    Ok(())
}

#[tokio::test]
async fn rematch_picks_up_newly_issued_dues() -> Result<()> {
    let harness = Harness::new(
        provider([incoming(5, 120000, "AIDAT MEHMET DEMIR OCAK")]),
        Vec::new(),
    )
    .await?;
    harness.sync().await?;
    assert_eq!(harness.store.list_unmatched(None).await?.len(), 1);

    harness
        .receivables
        .set_dues(
            &harness.account.property_id,
            vec![due("due-1", "res-1", "Mehmet Demir", "D.4", 120000)],
        )
        .await;
    let report = harness.orchestrator.rematch_account(&harness.account.id).await?;
    assert_eq!(report.auto_matched, 1);
    assert!(harness.store.list_unmatched(None).await?.is_empty());
    Ok(())
}
