use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{field} ({value}) must be at least the auto-match floor ({floor})")]
    BelowFloor {
        field: &'static str,
        value: f64,
        floor: f64,
    },

    #[error("{field} ({value}) must stay below the auto-match floor ({floor})")]
    AboveFloor {
        field: &'static str,
        value: f64,
        floor: f64,
    },

    #[error("amount tolerance must not be negative, got {0}")]
    NegativeTolerance(Decimal),
}

/// Matching thresholds. The defaults are the values the engine has always used;
/// they are not tuned constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest |transaction amount - pending amount| still treated as equal.
    pub amount_tolerance: Decimal,

    /// Lowest confidence allowed to credit a due without an operator.
    pub auto_match_floor: f64,

    pub iban_confidence: f64,
    pub name_amount_confidence: f64,
    pub amount_only_confidence: f64,
    pub unit_number_confidence: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: Decimal::new(1, 2),
            auto_match_floor: 0.90,
            iban_confidence: 0.99,
            name_amount_confidence: 0.90,
            amount_only_confidence: 0.60,
            unit_number_confidence: 0.70,
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("auto_match_floor", self.auto_match_floor),
            ("iban_confidence", self.iban_confidence),
            ("name_amount_confidence", self.name_amount_confidence),
            ("amount_only_confidence", self.amount_only_confidence),
            ("unit_number_confidence", self.unit_number_confidence),
        ];
        for (field, value) in all {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }

        let floor = self.auto_match_floor;
        for (field, value) in [
            ("iban_confidence", self.iban_confidence),
            ("name_amount_confidence", self.name_amount_confidence),
        ] {
            if value < floor {
                return Err(ConfigError::BelowFloor {
                    field,
                    value,
                    floor,
                });
            }
        }
        for (field, value) in [
            ("amount_only_confidence", self.amount_only_confidence),
            ("unit_number_confidence", self.unit_number_confidence),
        ] {
            if value >= floor {
                return Err(ConfigError::AboveFloor {
                    field,
                    value,
                    floor,
                });
            }
        }

        if self.amount_tolerance.is_sign_negative() {
            return Err(ConfigError::NegativeTolerance(self.amount_tolerance));
        }
        Ok(())
    }
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_max_elapsed() -> Duration {
    Duration::from_secs(60)
}

/// Sync run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound for a single provider call.
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fetch_timeout: Duration,

    /// Total time spent retrying transient provider failures before the run fails.
    #[serde(
        default = "default_retry_max_elapsed",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_max_elapsed: Duration,

    /// Days of history fetched when no explicit range is given.
    pub lookback_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            retry_max_elapsed: default_retry_max_elapsed(),
            lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// JSON statement API over HTTPS.
    StatementApi,
    /// Statement export read from a local JSON file.
    StatementFile,
}

/// One `[[banks]]` entry: which adapter serves a bank code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    pub code: String,
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Key looked up in the credential store; defaults to `{code}/token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_key: Option<String>,
    /// Statement export for `statement_file`; relative paths resolve against the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_file: Option<PathBuf>,
}

impl BankConfig {
    pub fn credential_key(&self) -> String {
        self.credential_key
            .clone()
            .unwrap_or_else(|| format!("{}/token", self.code))
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from the config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    pub matching: MatchingConfig,

    pub sync: SyncConfig,

    pub banks: Vec<BankConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .matching
            .validate()
            .with_context(|| format!("Invalid [matching] section in {}", path.display()))?;

        Ok(config)
    }

    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub matching: MatchingConfig,
    pub sync: SyncConfig,
    pub banks: Vec<BankConfig>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./bankmatch.toml` if it exists in current directory
/// 2. `~/.local/share/bankmatch/bankmatch.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("bankmatch.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("bankmatch").join("bankmatch.toml");
    }

    local_config
}

impl ResolvedConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Like [`ResolvedConfig::load`], falling back to defaults rooted next to
    /// where the config file would live.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }

    fn from_config(config: Config, config_dir: &Path) -> Self {
        let data_dir = config.resolve_data_dir(config_dir);
        let banks = config
            .banks
            .into_iter()
            .map(|mut bank| {
                bank.statement_file = bank.statement_file.map(|path| {
                    if path.is_absolute() {
                        path
                    } else {
                        data_dir.join(path)
                    }
                });
                bank
            })
            .collect();

        Self {
            data_dir,
            matching: config.matching,
            sync: config.sync,
            banks,
        }
    }
}
