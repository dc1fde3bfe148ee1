use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Id;

/// An outstanding resident due, as reported by the ledger.
///
/// Read-only here: the engine never changes amounts or closes dues, it only
/// records which transaction settled which due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReceivable {
    pub due_id: Id,
    pub resident_id: Id,
    pub resident_name: String,
    pub unit_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident_iban: Option<String>,
    pub pending_amount: Decimal,
    pub due_date: NaiveDate,
    /// When set, transactions in any other currency are not considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CandidateReceivable {
    pub fn new(
        due_id: impl Into<Id>,
        resident_id: impl Into<Id>,
        resident_name: impl Into<String>,
        unit_number: impl Into<String>,
        pending_amount: Decimal,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            due_id: due_id.into(),
            resident_id: resident_id.into(),
            resident_name: resident_name.into(),
            unit_number: unit_number.into(),
            resident_iban: None,
            pending_amount,
            due_date,
            currency: None,
        }
    }

    pub fn with_iban(mut self, iban: impl Into<String>) -> Self {
        self.resident_iban = Some(iban.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}
