//! Turns raw provider output into transaction records, dropping anything the
//! store already has.
//!
//! A record's dedup key is the bank's own reference when there is one
//! (`ref:<reference>`), otherwise a UUIDv5 over the fields that identify a
//! movement (`h:<uuid>`). Keys are per account, so the same reference at two
//! banks never collides.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::warn;

use crate::clock::Clock;
use crate::matching::text::{fold_turkish, is_iban_shaped, normalize_iban};
use crate::models::{BankAccount, BankTransaction, DedupKey, Id, IdGenerator, MatchState};
use crate::providers::RawTransaction;

/// Characters of the description that feed the content hash.
const DESCRIPTION_KEY_CHARS: usize = 32;

/// Largest gap between booking and value date still accepted.
const MAX_VALUE_DATE_GAP_DAYS: i64 = 7;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("currency {found} does not match account currency {expected}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("value date {value_date} is more than 7 days from transaction date {date}")]
    ValueDateOutOfRange {
        date: NaiveDate,
        value_date: NaiveDate,
    },

    #[error("record has neither a description nor a counterparty")]
    MissingDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub raw: RawTransaction,
    pub error: ValidationError,
}

/// Result of normalizing one fetched batch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// New records, in provider order, ready to persist.
    pub fresh: Vec<BankTransaction>,
    /// Records whose key the store (or an earlier line of this batch) already had.
    pub duplicates: usize,
    pub rejected: Vec<RejectedRecord>,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|value| !value.is_empty())
}

/// Dedup key for a raw record on an account.
pub fn dedup_key(account_id: &Id, raw: &RawTransaction) -> DedupKey {
    if let Some(reference) = non_empty(raw.reference.as_deref()) {
        return DedupKey::new(format!("ref:{reference}"));
    }

    let mut amount = raw.amount.round_dp(2);
    amount.rescale(2);
    let description: String = fold_turkish(&collapse_whitespace(&raw.description))
        .chars()
        .take(DESCRIPTION_KEY_CHARS)
        .collect();
    let material = format!(
        "{}|{}|{}|{}|{}",
        account_id,
        raw.date.format("%Y-%m-%d"),
        amount,
        raw.direction,
        description
    );
    DedupKey::new(format!("h:{}", Id::from_external(&material)))
}

pub struct TransactionNormalizer {
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl TransactionNormalizer {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { ids, clock }
    }

    /// Split `raw` into fresh records, duplicates and invalid records.
    ///
    /// Pure apart from id generation: nothing is written and `existing` is not
    /// modified. The first occurrence of a key within the batch wins.
    pub fn normalize(
        &self,
        account: &BankAccount,
        raw: Vec<RawTransaction>,
        existing: &HashSet<DedupKey>,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen: HashSet<DedupKey> = HashSet::new();

        for record in raw {
            if let Err(error) = validate(account, &record) {
                warn!(
                    account_id = %account.id,
                    reference = ?record.reference,
                    error = %error,
                    "skipping invalid statement line"
                );
                batch.rejected.push(RejectedRecord { raw: record, error });
                continue;
            }

            let key = dedup_key(&account.id, &record);
            if existing.contains(&key) || !seen.insert(key.clone()) {
                batch.duplicates += 1;
                continue;
            }

            batch.fresh.push(self.build(account, record, key));
        }

        batch
    }

    fn build(&self, account: &BankAccount, raw: RawTransaction, key: DedupKey) -> BankTransaction {
        let counterparty_iban = raw
            .counterparty_iban
            .as_deref()
            .map(normalize_iban)
            .filter(|iban| !iban.is_empty())
            .and_then(|iban| {
                if is_iban_shaped(&iban) {
                    Some(iban)
                } else {
                    warn!(account_id = %account.id, iban = %iban, "dropping malformed counterparty IBAN");
                    None
                }
            });

        BankTransaction {
            id: self.ids.new_id(),
            account_id: account.id.clone(),
            dedup_key: key,
            transaction_date: raw.date,
            value_date: raw.value_date.unwrap_or(raw.date),
            direction: raw.direction,
            amount: raw.amount,
            currency: raw
                .currency
                .as_deref()
                .map(|c| c.trim().to_ascii_uppercase())
                .unwrap_or_else(|| account.currency.clone()),
            counterparty_name: non_empty(raw.counterparty_name.as_deref()),
            counterparty_iban,
            description: collapse_whitespace(&raw.description),
            provider_reference: non_empty(raw.reference.as_deref()),
            state: MatchState::Unmatched,
            last_change: None,
            created_at: self.clock.now(),
        }
    }
}

fn validate(account: &BankAccount, raw: &RawTransaction) -> Result<(), ValidationError> {
    if raw.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(raw.amount));
    }

    if let Some(currency) = raw.currency.as_deref() {
        if !currency.trim().eq_ignore_ascii_case(&account.currency) {
            return Err(ValidationError::CurrencyMismatch {
                expected: account.currency.clone(),
                found: currency.to_string(),
            });
        }
    }

    if let Some(value_date) = raw.value_date {
        if (value_date - raw.date).num_days().abs() > MAX_VALUE_DATE_GAP_DAYS {
            return Err(ValidationError::ValueDateOutOfRange {
                date: raw.date,
                value_date,
            });
        }
    }

    if raw.description.trim().is_empty() && non_empty(raw.counterparty_name.as_deref()).is_none() {
        return Err(ValidationError::MissingDetails);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Direction, FixedIdGenerator};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn account() -> BankAccount {
        BankAccount::new(Id::from_string("site-1"), "0010", "TR120001000000000000000001", "TRY")
            .with_id(Id::from_string("acc-1"))
    }

    fn normalizer() -> TransactionNormalizer {
        TransactionNormalizer::new(
            Arc::new(FixedIdGenerator::default()),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 20, 8, 0, 0).unwrap())),
        )
    }

    fn incoming(amount: i64, description: &str) -> RawTransaction {
        RawTransaction::new(day(5), Decimal::new(amount, 2), Direction::In)
            .with_description(description)
    }

    #[test]
    fn reference_wins_over_content_hash() {
        let raw = incoming(85000, "AIDAT").with_reference(" ZR-77 ");
        assert_eq!(dedup_key(&Id::from_string("acc-1"), &raw).as_str(), "ref:ZR-77");
    }

    #[test]
    fn content_hash_ignores_spacing_and_case() {
        let acc = Id::from_string("acc-1");
        let a = incoming(85000, "aidat  ocak   d.101");
        let b = RawTransaction::new(day(5), Decimal::new(850, 0), Direction::In)
            .with_description("AIDAT OCAK D.101");
        assert_eq!(dedup_key(&acc, &a), dedup_key(&acc, &b));
        assert!(dedup_key(&acc, &a).as_str().starts_with("h:"));

        let other_account = dedup_key(&Id::from_string("acc-2"), &a);
        assert_ne!(dedup_key(&acc, &a), other_account);
    }

    #[test]
    fn skips_existing_and_repeated_keys() {
        let existing: HashSet<DedupKey> =
            [DedupKey::new("ref:OLD")].into_iter().collect();
        let raw = vec![
            incoming(100, "A").with_reference("OLD"),
            incoming(100, "B").with_reference("NEW"),
            incoming(100, "C").with_reference("NEW"),
        ];
        let batch = normalizer().normalize(&account(), raw, &existing);
        assert_eq!(batch.fresh.len(), 1);
        assert_eq!(batch.fresh[0].description, "B");
        assert_eq!(batch.duplicates, 2);
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn invalid_records_are_reported_not_fatal() {
        let raw = vec![
            incoming(0, "ZERO"),
            incoming(100, "USD").with_currency("USD"),
            incoming(100, "LATE").with_value_date(day(20)),
            incoming(100, "  "),
            incoming(100, "OK"),
        ];
        let batch = normalizer().normalize(&account(), raw, &HashSet::new());
        assert_eq!(batch.fresh.len(), 1);
        let errors: Vec<_> = batch.rejected.iter().map(|r| r.error.clone()).collect();
        assert!(matches!(errors[0], ValidationError::NonPositiveAmount(_)));
        assert!(matches!(errors[1], ValidationError::CurrencyMismatch { .. }));
        assert!(matches!(errors[2], ValidationError::ValueDateOutOfRange { .. }));
        assert_eq!(errors[3], ValidationError::MissingDetails);
    }

    #[test]
    fn canonicalizes_fields() {
        let raw = vec![incoming(120000, "  AIDAT   MEHMET DEMIR ")
            .with_counterparty("  ")
            .with_counterparty_iban("tr33 0006 1005 1978 6457 8413 26")
            .with_currency("try")];
        let batch = normalizer().normalize(&account(), raw, &HashSet::new());
        let txn = &batch.fresh[0];
        assert_eq!(txn.description, "AIDAT MEHMET DEMIR");
        assert_eq!(txn.counterparty_name, None);
        assert_eq!(txn.counterparty_iban.as_deref(), Some("TR330006100519786457841326"));
        assert_eq!(txn.currency, "TRY");
        assert_eq!(txn.value_date, txn.transaction_date);
        assert_eq!(txn.id.as_str(), "id-1");
    }

    #[test]
    fn malformed_counterparty_iban_is_dropped() {
        let raw = vec![incoming(100, "EFT").with_counterparty_iban("12345")];
        let batch = normalizer().normalize(&account(), raw, &HashSet::new());
        assert_eq!(batch.fresh[0].counterparty_iban, None);
    }
}
