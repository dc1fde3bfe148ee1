use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{BankConfig, ProviderKind};
use crate::credentials::CredentialStore;
use crate::error::SyncError;

use super::{bank_info, BankProvider, MemoryProvider, StatementApiProvider};

/// Bank code -> provider. Built once at startup and shared.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn BankProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for a bank code.
    pub fn register(&mut self, bank_code: impl Into<String>, provider: Arc<dyn BankProvider>) {
        self.providers.insert(bank_code.into(), provider);
    }

    pub fn with(mut self, bank_code: impl Into<String>, provider: Arc<dyn BankProvider>) -> Self {
        self.register(bank_code, provider);
        self
    }

    pub fn get(&self, bank_code: &str) -> Result<Arc<dyn BankProvider>, SyncError> {
        self.providers
            .get(bank_code)
            .cloned()
            .ok_or_else(|| SyncError::UnknownProvider(bank_code.to_string()))
    }

    pub fn bank_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Build the registry from `[[banks]]` entries.
    pub async fn from_config(
        banks: &[BankConfig],
        credentials: &dyn CredentialStore,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for bank in banks {
            if bank_info(&bank.code).is_none() {
                warn!(bank_code = %bank.code, "bank code is not in the supported bank list");
            }

            let provider: Arc<dyn BankProvider> = match bank.kind {
                ProviderKind::StatementApi => {
                    let provider = StatementApiProvider::from_credentials(
                        &bank.code,
                        credentials,
                        &bank.credential_key(),
                    )
                    .await
                    .with_context(|| format!("Failed to set up provider for bank {}", bank.code))?;
                    match &bank.base_url {
                        Some(url) => Arc::new(provider.with_base_url(url)),
                        None => Arc::new(provider),
                    }
                }
                ProviderKind::StatementFile => {
                    let path = bank.statement_file.as_deref().with_context(|| {
                        format!("Bank {} has kind statement_file but no statement_file", bank.code)
                    })?;
                    Arc::new(MemoryProvider::from_json_file(&bank.code, path).await?)
                }
            };
            registry.register(bank.code.clone(), provider);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialStore;

    #[test]
    fn unknown_bank_code_is_an_error() {
        let registry = ProviderRegistry::new().with("0010", Arc::new(MemoryProvider::new("ziraat")));
        assert!(registry.get("0010").is_ok());
        assert!(matches!(
            registry.get("0062"),
            Err(SyncError::UnknownProvider(code)) if code == "0062"
        ));
    }

    #[tokio::test]
    async fn statement_api_requires_a_token() {
        let banks = vec![BankConfig {
            code: "0010".to_string(),
            kind: ProviderKind::StatementApi,
            base_url: None,
            credential_key: None,
            statement_file: None,
        }];
        let empty = StaticCredentialStore::new();
        assert!(ProviderRegistry::from_config(&banks, &empty).await.is_err());

        let creds = StaticCredentialStore::new().with("0010/token", "t");
        let registry = ProviderRegistry::from_config(&banks, &creds).await.unwrap();
        assert_eq!(registry.bank_codes(), vec!["0010"]);
    }
}
