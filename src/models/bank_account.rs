use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

use super::{Id, IdGenerator, UuidIdGenerator};

/// A property's bank account, bound to exactly one bank provider.
///
/// Stored as `accounts/{id}/account.json`. Everything except `active` is fixed
/// once the account is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Id,
    pub property_id: Id,
    /// Bank identifier used to pick the provider from the registry (e.g. "0010").
    pub bank_code: String,
    pub iban: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default)]
    pub name: String,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn new(
        property_id: Id,
        bank_code: impl Into<String>,
        iban: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self::new_with_generator(
            &UuidIdGenerator,
            &SystemClock,
            property_id,
            bank_code,
            iban,
            currency,
        )
    }

    pub fn new_with_generator(
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
        property_id: Id,
        bank_code: impl Into<String>,
        iban: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: ids.new_id(),
            property_id,
            bank_code: bank_code.into(),
            iban: iban.into(),
            account_number: None,
            name: String::new(),
            currency: currency.into(),
            active: true,
            created_at: clock.now(),
        }
    }

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_account_number(mut self, number: impl Into<String>) -> Self {
        self.account_number = Some(number.into());
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.iban
        } else {
            &self.name
        }
    }
}
