//! Bank credential lookup.
//!
//! Credentials reach this crate already decrypted. They are held as
//! [`SecretString`] and never written to the data directory.
//!
//! Keys are free-form; providers ask for what they need (for example the
//! statement API adapter asks for `{bank_code}/token` unless the bank entry in
//! the config names another key).

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::RwLock;

/// A read-mostly key/value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// In-process credentials handed over by the caller.
#[derive(Default)]
pub struct StaticCredentialStore {
    values: RwLock<HashMap<String, SecretString>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .get_mut()
            .insert(key.into(), SecretString::from(value.into()));
        self
    }

    pub async fn insert(&self, key: impl Into<String>, value: SecretString) {
        self.values.write().await.insert(key.into(), value);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self.values.read().await.get(key).cloned())
    }
}

/// Reads `BANKMATCH_<KEY>` from the environment, with the key upper-cased and
/// every non-alphanumeric character replaced by `_` (`0010/token` becomes
/// `BANKMATCH_0010_TOKEN`).
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    prefix: Option<String>,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn var_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", self.prefix.as_deref().unwrap_or("BANKMATCH"), suffix)
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(std::env::var(self.var_name(key))
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::from))
    }
}
