//! JSON statement API adapter.
//!
//! Talks to a bank (or an aggregator in front of it) exposing:
//! - `GET /accounts/{iban}/transactions?from=YYYY-MM-DD&to=YYYY-MM-DD`
//! - `GET /accounts/{iban}/balance`
//! - `GET /auth/check`
//!
//! Authentication is a bearer token taken from the credential store.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::credentials::CredentialStore;
use crate::error::ProviderError;
use crate::matching::text::normalize_iban;
use crate::models::{BankAccount, Direction};

use super::{bank_info, BankProvider, RawTransaction};

const DEFAULT_BASE_URL: &str = "https://statements.bank.local";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body quoted back in error messages.
const MAX_ERROR_BODY: usize = 200;

pub struct StatementApiProvider {
    bank_code: String,
    name: String,
    token: SecretString,
    base_url: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementLine {
    booking_date: NaiveDate,
    #[serde(default)]
    value_date: Option<NaiveDate>,
    /// Signed unless `direction` is given.
    amount: Decimal,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    counterparty_name: Option<String>,
    #[serde(default)]
    counterparty_iban: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    reference: Option<String>,
}

/// Lines are kept raw so one unreadable line does not sink the statement.
#[derive(Debug, Deserialize)]
struct StatementResponse {
    transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

impl StatementApiProvider {
    pub fn new(bank_code: impl Into<String>, token: SecretString) -> Self {
        let bank_code = bank_code.into();
        let name = bank_info(&bank_code)
            .map(|info| info.name.to_string())
            .unwrap_or_else(|| format!("bank {bank_code}"));
        Self {
            bank_code,
            name,
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: Client::new(),
        }
    }

    /// Override API base URL (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create from a credential store, reading the bearer token under `key`.
    pub async fn from_credentials(
        bank_code: &str,
        store: &dyn CredentialStore,
        key: &str,
    ) -> Result<Self> {
        let token = store
            .get(key)
            .await?
            .with_context(|| format!("Missing credential {key}"))?;
        Ok(Self::new(bank_code, token))
    }

    fn account_path(account: &BankAccount, suffix: &str) -> String {
        format!("/accounts/{}/{suffix}", normalize_iban(&account.iban))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.send_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.send_error(err))?;

        if !status.is_success() {
            return Err(self.status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|err| ProviderError::Malformed {
            bank: self.bank_code.clone(),
            message: err.to_string(),
        })
    }

    fn send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                bank: self.bank_code.clone(),
                timeout: self.timeout,
            }
        } else {
            ProviderError::Unreachable {
                bank: self.bank_code.clone(),
                message: err.to_string(),
            }
        }
    }

    fn status_error(&self, status: StatusCode, body: &str) -> ProviderError {
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
                bank: self.bank_code.clone(),
                message,
            },
            _ => ProviderError::Rejected {
                bank: self.bank_code.clone(),
                status: status.as_u16(),
                message,
            },
        }
    }

    fn to_raw(line: serde_json::Value) -> Result<RawTransaction, String> {
        let line: StatementLine = serde_json::from_value(line).map_err(|err| err.to_string())?;
        let direction = match line.direction.as_deref().map(str::to_ascii_uppercase) {
            Some(d) if d == "IN" || d == "CREDIT" => Direction::In,
            Some(d) if d == "OUT" || d == "DEBIT" => Direction::Out,
            Some(other) => return Err(format!("unknown direction {other:?}")),
            None if line.amount.is_sign_negative() => Direction::Out,
            None => Direction::In,
        };

        Ok(RawTransaction {
            date: line.booking_date,
            value_date: line.value_date,
            amount: line.amount.abs(),
            direction,
            currency: line.currency,
            counterparty_name: line.counterparty_name,
            counterparty_iban: line.counterparty_iban,
            description: line.description.unwrap_or_default(),
            reference: line.reference,
        })
    }
}

#[async_trait::async_trait]
impl BankProvider for StatementApiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_transactions(
        &self,
        account: &BankAccount,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawTransaction>, ProviderError> {
        let response: StatementResponse = self
            .get(
                &Self::account_path(account, "transactions"),
                &[
                    ("from", from.format("%Y-%m-%d").to_string()),
                    ("to", to.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;

        let mut lines = Vec::with_capacity(response.transactions.len());
        for (index, line) in response.transactions.into_iter().enumerate() {
            match Self::to_raw(line) {
                Ok(raw) => lines.push(raw),
                Err(reason) => warn!(
                    bank = %self.bank_code,
                    account_id = %account.id,
                    line = index,
                    reason = %reason,
                    "skipping unreadable statement line"
                ),
            }
        }
        Ok(lines)
    }

    async fn fetch_balance(&self, account: &BankAccount) -> Result<Decimal, ProviderError> {
        let response: BalanceResponse = self
            .get(&Self::account_path(account, "balance"), &[])
            .await?;
        Ok(response.balance)
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        let _: serde_json::Value = self.get("/auth/check", &[]).await?;
        Ok(())
    }
}
