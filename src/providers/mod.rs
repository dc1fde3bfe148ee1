//! Bank provider adapters.
//!
//! One adapter per bank, all behind [`BankProvider`]. The registry picks the
//! adapter for an account by its bank code; there is no failover between banks.

mod memory;
mod registry;
mod statement_api;

pub use memory::MemoryProvider;
pub use registry::ProviderRegistry;
pub use statement_api::StatementApiProvider;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models::{BankAccount, Direction};

/// A statement line in the shape every adapter produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
    /// Unsigned; `direction` carries the sign.
    pub amount: Decimal,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_iban: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl RawTransaction {
    pub fn new(date: NaiveDate, amount: Decimal, direction: Direction) -> Self {
        Self {
            date,
            value_date: None,
            amount,
            direction,
            currency: None,
            counterparty_name: None,
            counterparty_iban: None,
            description: String::new(),
            reference: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_counterparty(mut self, name: impl Into<String>) -> Self {
        self.counterparty_name = Some(name.into());
        self
    }

    pub fn with_counterparty_iban(mut self, iban: impl Into<String>) -> Self {
        self.counterparty_iban = Some(iban.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_value_date(mut self, value_date: NaiveDate) -> Self {
        self.value_date = Some(value_date);
        self
    }
}

/// Fetches statement data for accounts at one bank.
#[async_trait::async_trait]
pub trait BankProvider: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Statement lines with a transaction date in `[from, to]`.
    async fn fetch_transactions(
        &self,
        account: &BankAccount,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawTransaction>, ProviderError>;

    async fn fetch_balance(&self, account: &BankAccount) -> Result<Decimal, ProviderError>;

    /// Cheap credential check. Adapters without one report success.
    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A Turkish bank known to the system, by EFT code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BankInfo {
    pub code: &'static str,
    pub name: &'static str,
}

pub const SUPPORTED_BANKS: &[BankInfo] = &[
    BankInfo { code: "0010", name: "Ziraat Bankası" },
    BankInfo { code: "0012", name: "Halkbank" },
    BankInfo { code: "0015", name: "Vakıfbank" },
    BankInfo { code: "0032", name: "TEB" },
    BankInfo { code: "0046", name: "Akbank" },
    BankInfo { code: "0062", name: "Garanti BBVA" },
    BankInfo { code: "0064", name: "İş Bankası" },
    BankInfo { code: "0067", name: "Yapı Kredi" },
    BankInfo { code: "0099", name: "ING" },
    BankInfo { code: "0111", name: "QNB Finansbank" },
    BankInfo { code: "0123", name: "HSBC" },
    BankInfo { code: "0134", name: "Denizbank" },
];

pub fn bank_info(code: &str) -> Option<&'static BankInfo> {
    SUPPORTED_BANKS.iter().find(|bank| bank.code == code)
}
