use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::matching::text::normalize_iban;
use crate::models::BankAccount;

use super::{BankProvider, RawTransaction};

/// Statement contents for one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

/// Provider backed by in-memory statements keyed by IBAN.
///
/// Serves statement exports loaded from disk and doubles as a scriptable fake:
/// failures can be queued and responses delayed.
pub struct MemoryProvider {
    name: String,
    statements: Mutex<HashMap<String, StatementData>>,
    failures: Mutex<VecDeque<ProviderError>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Load a statement export: a JSON object of IBAN -> `{ balance, transactions }`.
    pub async fn from_json_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read statement file {}", path.display()))?;
        let statements: HashMap<String, StatementData> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse statement file {}", path.display()))?;

        let provider = Self::new(name);
        for (iban, statement) in statements {
            provider.set_statement(&iban, statement);
        }
        Ok(provider)
    }

    pub fn with_transactions(
        self,
        iban: &str,
        transactions: impl IntoIterator<Item = RawTransaction>,
    ) -> Self {
        for txn in transactions {
            self.push_transaction(iban, txn);
        }
        self
    }

    pub fn with_balance(self, iban: &str, balance: Decimal) -> Self {
        self.lock_statements()
            .entry(normalize_iban(iban))
            .or_default()
            .balance = Some(balance);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_statement(&self, iban: &str, statement: StatementData) {
        self.lock_statements()
            .insert(normalize_iban(iban), statement);
    }

    /// Add a line as if the bank had just booked it.
    pub fn push_transaction(&self, iban: &str, txn: RawTransaction) {
        self.lock_statements()
            .entry(normalize_iban(iban))
            .or_default()
            .transactions
            .push(txn);
    }

    /// Make the next fetch fail with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: ProviderError) {
        self.failures
            .lock()
            .expect("memory provider failures lock poisoned")
            .push_back(err);
    }

    /// Number of fetch calls seen, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock_statements(&self) -> std::sync::MutexGuard<'_, HashMap<String, StatementData>> {
        self.statements
            .lock()
            .expect("memory provider statements lock poisoned")
    }

    async fn begin_call(&self) -> Result<(), ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failures
            .lock()
            .expect("memory provider failures lock poisoned")
            .pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl BankProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_transactions(
        &self,
        account: &BankAccount,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawTransaction>, ProviderError> {
        self.begin_call().await?;
        let statements = self.lock_statements();
        Ok(statements
            .get(&normalize_iban(&account.iban))
            .map(|statement| {
                statement
                    .transactions
                    .iter()
                    .filter(|txn| txn.date >= from && txn.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_balance(&self, account: &BankAccount) -> Result<Decimal, ProviderError> {
        self.begin_call().await?;
        self.lock_statements()
            .get(&normalize_iban(&account.iban))
            .and_then(|statement| statement.balance)
            .ok_or_else(|| ProviderError::Malformed {
                bank: self.name.clone(),
                message: format!("no balance reported for {}", account.iban),
            })
    }
}
