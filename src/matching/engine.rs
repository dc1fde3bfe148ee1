use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{ConfigError, MatchingConfig};
use crate::models::{BankTransaction, CandidateReceivable, Confidence, Id, Suggestion};

use super::text::{contains_phrase, contains_unit, normalize_iban, tokens};

pub const OUTGOING_REASON: &str = "outgoing transactions are not matched against dues";
pub const NO_CANDIDATES_REASON: &str = "no outstanding dues for this property";
pub const NO_HITS_REASON: &str = "no due matched by IBAN, name, amount or unit number";

/// One rule in the matching sequence, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTier {
    Iban,
    NameAndAmount,
    AmountOnly,
    UnitNumber,
}

impl MatchTier {
    pub fn reason(self) -> &'static str {
        match self {
            MatchTier::Iban => "counterparty IBAN matches resident IBAN",
            MatchTier::NameAndAmount => "resident name and amount match",
            MatchTier::AmountOnly => "amount matches pending due",
            MatchTier::UnitNumber => "unit number found in description",
        }
    }

    /// Tiers that credit a due without operator review.
    pub fn is_definitive(self) -> bool {
        matches!(self, MatchTier::Iban | MatchTier::NameAndAmount)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefinitiveMatch {
    pub due_id: Id,
    pub resident_id: Id,
    pub amount: Decimal,
    pub confidence: Confidence,
    pub tier: MatchTier,
}

impl DefinitiveMatch {
    pub fn reason(&self) -> &'static str {
        self.tier.reason()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    AutoMatched(DefinitiveMatch),
    PendingReview(Vec<Suggestion>),
    Unmatched,
}

/// Engine verdict for one transaction. Nothing is persisted here.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub transaction_id: Id,
    pub outcome: MatchOutcome,
    /// Human-readable explanation, set for `Unmatched` outcomes.
    pub reason: Option<String>,
}

impl MatchResult {
    fn unmatched(transaction_id: &Id, reason: &str) -> Self {
        Self {
            transaction_id: transaction_id.clone(),
            outcome: MatchOutcome::Unmatched,
            reason: Some(reason.to_string()),
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match &self.outcome {
            MatchOutcome::AutoMatched(m) => Some(m.confidence),
            _ => None,
        }
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match &self.outcome {
            MatchOutcome::PendingReview(suggestions) => suggestions,
            _ => &[],
        }
    }
}

/// Tiered matcher: IBAN, then name + amount, then weak suggestions.
#[derive(Debug, Clone)]
pub struct AutoMatchEngine {
    config: MatchingConfig,
    iban: Confidence,
    name_amount: Confidence,
    amount_only: Confidence,
    unit_number: Confidence,
}

impl AutoMatchEngine {
    pub fn new(config: MatchingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let confidence = |field: &'static str, value: f64| {
            Confidence::new(value).map_err(|_| ConfigError::OutOfRange { field, value })
        };
        Ok(Self {
            iban: confidence("iban_confidence", config.iban_confidence)?,
            name_amount: confidence("name_amount_confidence", config.name_amount_confidence)?,
            amount_only: confidence("amount_only_confidence", config.amount_only_confidence)?,
            unit_number: confidence("unit_number_confidence", config.unit_number_confidence)?,
            config,
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    fn tier_confidence(&self, tier: MatchTier) -> Confidence {
        match tier {
            MatchTier::Iban => self.iban,
            MatchTier::NameAndAmount => self.name_amount,
            MatchTier::AmountOnly => self.amount_only,
            MatchTier::UnitNumber => self.unit_number,
        }
    }

    fn amount_matches(&self, txn: &BankTransaction, candidate: &CandidateReceivable) -> bool {
        (txn.amount - candidate.pending_amount).abs() <= self.config.amount_tolerance
    }

    /// Evaluate one transaction against the property's outstanding dues.
    pub fn evaluate(
        &self,
        txn: &BankTransaction,
        candidates: &[CandidateReceivable],
    ) -> MatchResult {
        if !txn.is_incoming() {
            return MatchResult::unmatched(&txn.id, OUTGOING_REASON);
        }

        let candidates: Vec<&CandidateReceivable> = candidates
            .iter()
            .filter(|c| {
                c.currency
                    .as_deref()
                    .is_none_or(|currency| currency.eq_ignore_ascii_case(&txn.currency))
            })
            .collect();
        if candidates.is_empty() {
            return MatchResult::unmatched(&txn.id, NO_CANDIDATES_REASON);
        }

        if let Some(hit) = self.definitive(txn, &candidates) {
            debug!(
                transaction_id = %txn.id,
                due_id = %hit.due_id,
                tier = ?hit.tier,
                confidence = %hit.confidence,
                "definitive match"
            );
            return MatchResult {
                transaction_id: txn.id.clone(),
                outcome: MatchOutcome::AutoMatched(hit),
                reason: None,
            };
        }

        let suggestions = self.suggestions(txn, &candidates);
        if suggestions.is_empty() {
            debug!(transaction_id = %txn.id, "no tier matched");
            return MatchResult::unmatched(&txn.id, NO_HITS_REASON);
        }

        debug!(
            transaction_id = %txn.id,
            count = suggestions.len(),
            "suggestions for review"
        );
        MatchResult {
            transaction_id: txn.id.clone(),
            outcome: MatchOutcome::PendingReview(suggestions),
            reason: None,
        }
    }

    fn definitive(
        &self,
        txn: &BankTransaction,
        candidates: &[&CandidateReceivable],
    ) -> Option<DefinitiveMatch> {
        let counterparty_iban = txn
            .counterparty_iban
            .as_deref()
            .map(normalize_iban)
            .filter(|iban| !iban.is_empty());

        if let Some(iban) = counterparty_iban {
            let hit = candidates
                .iter()
                .filter(|c| {
                    c.resident_iban
                        .as_deref()
                        .is_some_and(|resident| normalize_iban(resident) == iban)
                })
                .min_by(|a, b| definitive_order(a, b));
            if let Some(candidate) = hit {
                return Some(self.definitive_match(candidate, MatchTier::Iban));
            }
        }

        let description = tokens(&txn.description);
        let counterparty = txn
            .counterparty_name
            .as_deref()
            .map(tokens)
            .unwrap_or_default();
        candidates
            .iter()
            .filter(|c| self.amount_matches(txn, c))
            .filter(|c| {
                let name = tokens(&c.resident_name);
                contains_phrase(&description, &name) || contains_phrase(&counterparty, &name)
            })
            .min_by(|a, b| definitive_order(a, b))
            .map(|candidate| self.definitive_match(candidate, MatchTier::NameAndAmount))
    }

    fn definitive_match(&self, candidate: &CandidateReceivable, tier: MatchTier) -> DefinitiveMatch {
        DefinitiveMatch {
            due_id: candidate.due_id.clone(),
            resident_id: candidate.resident_id.clone(),
            amount: candidate.pending_amount,
            confidence: self.tier_confidence(tier),
            tier,
        }
    }

    fn suggestions(
        &self,
        txn: &BankTransaction,
        candidates: &[&CandidateReceivable],
    ) -> Vec<Suggestion> {
        let description = tokens(&txn.description);
        let mut best: HashMap<&Id, (MatchTier, &CandidateReceivable)> = HashMap::new();

        for candidate in candidates {
            let mut hits = Vec::new();
            if self.amount_matches(txn, candidate) {
                hits.push(MatchTier::AmountOnly);
            }
            if contains_unit(&description, &candidate.unit_number) {
                hits.push(MatchTier::UnitNumber);
            }

            for tier in hits {
                let entry = best.entry(&candidate.due_id).or_insert((tier, *candidate));
                if self.tier_confidence(tier) > self.tier_confidence(entry.0) {
                    entry.0 = tier;
                }
            }
        }

        let mut ranked: Vec<(Confidence, &CandidateReceivable, MatchTier)> = best
            .into_values()
            .map(|(tier, candidate)| (self.tier_confidence(tier), candidate, tier))
            .collect();
        ranked.sort_by(|(conf_a, a, _), (conf_b, b, _)| {
            conf_b
                .partial_cmp(conf_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.due_date.cmp(&b.due_date))
                .then_with(|| a.due_id.cmp(&b.due_id))
        });

        ranked
            .into_iter()
            .map(|(confidence, candidate, tier)| Suggestion {
                due_id: candidate.due_id.clone(),
                confidence,
                reason: tier.reason().to_string(),
            })
            .collect()
    }
}

/// Earliest due first, then the smaller pending amount, then due id.
fn definitive_order(a: &CandidateReceivable, b: &CandidateReceivable) -> Ordering {
    a.due_date
        .cmp(&b.due_date)
        .then_with(|| a.pending_amount.cmp(&b.pending_amount))
        .then_with(|| a.due_id.cmp(&b.due_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DedupKey, Direction, MatchState};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn txn(amount: Decimal, description: &str) -> BankTransaction {
        BankTransaction {
            id: Id::from_string("txn-1"),
            account_id: Id::from_string("acc-1"),
            dedup_key: DedupKey::new("ref:1"),
            transaction_date: date(10),
            value_date: date(10),
            direction: Direction::In,
            amount,
            currency: "TRY".to_string(),
            counterparty_name: None,
            counterparty_iban: None,
            description: description.to_string(),
            provider_reference: Some("1".to_string()),
            state: MatchState::Unmatched,
            last_change: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap(),
        }
    }

    fn due(id: &str, name: &str, unit: &str, amount: Decimal, day: u32) -> CandidateReceivable {
        CandidateReceivable::new(id, format!("res-{id}"), name, unit, amount, date(day))
    }

    fn engine() -> AutoMatchEngine {
        AutoMatchEngine::new(MatchingConfig::default()).unwrap()
    }

    #[test]
    fn outgoing_is_never_matched() {
        let mut t = txn(Decimal::new(85000, 2), "AIDAT");
        t.direction = Direction::Out;
        let result = engine().evaluate(&t, &[due("d1", "Ali Veli", "1", Decimal::new(85000, 2), 1)]);
        assert_eq!(result.outcome, MatchOutcome::Unmatched);
        assert_eq!(result.reason.as_deref(), Some(OUTGOING_REASON));
    }

    #[test]
    fn iban_tie_breaks_on_due_date_then_amount() {
        let mut t = txn(Decimal::new(1000, 0), "EFT");
        t.counterparty_iban = Some("TR33 0006 1005 1978 6457 8413 26".to_string());
        let iban = "TR330006100519786457841326";
        let candidates = vec![
            due("late", "Ali Veli", "1", Decimal::new(1000, 0), 20).with_iban(iban),
            due("big", "Ali Veli", "1", Decimal::new(2000, 0), 5).with_iban(iban),
            due("small", "Ali Veli", "1", Decimal::new(500, 0), 5).with_iban(iban),
        ];
        match engine().evaluate(&t, &candidates).outcome {
            MatchOutcome::AutoMatched(hit) => {
                assert_eq!(hit.due_id.as_str(), "small");
                assert_eq!(hit.tier, MatchTier::Iban);
            }
            other => panic!("expected auto match, got {other:?}"),
        }
    }

    #[test]
    fn counterparty_name_counts_for_name_tier() {
        let mut t = txn(Decimal::new(120000, 2), "HAVALE");
        t.counterparty_name = Some("AYŞE KAYA".to_string());
        let candidates = vec![due("d1", "Ayşe Kaya", "A5", Decimal::new(120000, 2), 1)];
        let result = engine().evaluate(&t, &candidates);
        assert!(matches!(
            result.outcome,
            MatchOutcome::AutoMatched(DefinitiveMatch { tier: MatchTier::NameAndAmount, .. })
        ));
    }

    #[test]
    fn name_without_amount_is_not_definitive() {
        let t = txn(Decimal::new(100000, 2), "AIDAT MEHMET DEMIR");
        let candidates = vec![due("d1", "Mehmet Demir", "B2", Decimal::new(120000, 2), 1)];
        assert_eq!(engine().evaluate(&t, &candidates).outcome, MatchOutcome::Unmatched);
    }

    #[test]
    fn suggestions_keep_max_confidence_per_due() {
        let t = txn(Decimal::new(85000, 2), "D.101 AIDAT");
        let candidates = vec![
            due("d1", "Ali Veli", "D101", Decimal::new(85000, 2), 3),
            due("d2", "Veli Ali", "C4", Decimal::new(85000, 2), 1),
        ];
        let result = engine().evaluate(&t, &candidates);
        let suggestions = result.suggestions();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].due_id.as_str(), "d1");
        assert_eq!(suggestions[0].confidence.value(), 0.70);
        assert_eq!(suggestions[1].due_id.as_str(), "d2");
        assert_eq!(suggestions[1].confidence.value(), 0.60);
    }

    #[test]
    fn tolerance_is_inclusive() {
        let t = txn(Decimal::new(84999, 2), "ODEME");
        let candidates = vec![due("d1", "Ali Veli", "1", Decimal::new(85000, 2), 1)];
        assert_eq!(engine().evaluate(&t, &candidates).suggestions().len(), 1);

        let t = txn(Decimal::new(84998, 2), "ODEME");
        assert_eq!(engine().evaluate(&t, &candidates).outcome, MatchOutcome::Unmatched);
    }

    #[test]
    fn candidates_in_other_currencies_are_ignored() {
        let t = txn(Decimal::new(85000, 2), "ODEME");
        let candidates =
            vec![due("d1", "Ali Veli", "1", Decimal::new(85000, 2), 1).with_currency("EUR")];
        let result = engine().evaluate(&t, &candidates);
        assert_eq!(result.reason.as_deref(), Some(NO_CANDIDATES_REASON));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MatchingConfig {
            iban_confidence: 1.2,
            ..MatchingConfig::default()
        };
        assert!(AutoMatchEngine::new(config).is_err());
    }
}
