use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::core_types::{CoinId, DEFAULT_EXCHANGE_COIN_ID};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub topup: TopupConfig,
}

/// Remote CLC ledger endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    #[serde(default = "default_exchange_coin_id")]
    pub exchange_coin_id: CoinId,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_exchange_coin_id() -> CoinId {
    DEFAULT_EXCHANGE_COIN_ID
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// When the internal balance is credited relative to the ledger merge.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// Credit only once the merge has been accepted by the ledger.
    #[default]
    AfterMerge,
    /// Credit before merging; retries are deduplicated by settlement token.
    BeforeMerge,
}

/// Hex encoding used for deposit addresses and holder comparison.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublicKeyFormat {
    /// 32-byte x coordinate, 64 hex chars (even-y normalized keys)
    #[default]
    XOnly,
    /// 64-byte x||y, 128 hex chars
    Raw,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopupConfig {
    #[serde(default)]
    pub credit_policy: CreditPolicy,
    #[serde(default)]
    pub public_key_format: PublicKeyFormat,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_polls() -> u32 {
    100
}

impl Default for TopupConfig {
    fn default() -> Self {
        Self {
            credit_policy: CreditPolicy::default(),
            public_key_format: PublicKeyFormat::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}
