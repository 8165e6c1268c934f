//! Configuration for the wallet session.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! Env files are read first: `./.env`, then `~/.wallet-session/.env`.

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::contract::ContractMethods;
use crate::error::{ConfigError, ContractError};
use crate::provider::{ContractArtifact, DevnetOptions};
use crate::settings::Settings;

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const MAX_DEVNET_ACCOUNTS: usize = 20;

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub chain: ChainConfig,
    pub devnet: DevnetConfig,
    pub contract: ContractConfig,
    pub sign_message: String,
}

/// Networks the session accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainConfig {
    pub supported_chain_ids: Vec<u64>,
}

impl ChainConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let supported_chain_ids = match helpers::optional_env("WALLET_SUPPORTED_CHAIN_IDS")? {
            Some(raw) => parse_chain_ids(&raw, "WALLET_SUPPORTED_CHAIN_IDS")?,
            None => settings.chain.supported_chain_ids.clone(),
        };
        if supported_chain_ids.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "WALLET_SUPPORTED_CHAIN_IDS".to_string(),
                message: "at least one chain id is required".to_string(),
            });
        }
        Ok(Self {
            supported_chain_ids,
        })
    }
}

fn parse_chain_ids(raw: &str, key: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{part}' is not a chain id: {e}"),
            })
        })
        .collect()
}

/// In-process development chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevnetConfig {
    pub chain_id: u64,
    pub account_count: usize,
    pub initial_balance_eth: u64,
    /// 0 = mine only on transactions.
    pub block_interval_ms: u64,
    pub preauthorized: bool,
}

impl DevnetConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let chain_id = helpers::parse_env("DEVNET_CHAIN_ID", "a positive integer")?
            .unwrap_or(settings.devnet.chain_id);

        let account_count = helpers::parse_env("DEVNET_ACCOUNTS", "a positive integer")?
            .unwrap_or(settings.devnet.accounts);
        if account_count == 0 || account_count > MAX_DEVNET_ACCOUNTS {
            return Err(ConfigError::InvalidValue {
                key: "DEVNET_ACCOUNTS".to_string(),
                message: format!("must be between 1 and {MAX_DEVNET_ACCOUNTS}"),
            });
        }

        let initial_balance_eth =
            helpers::parse_env("DEVNET_INITIAL_BALANCE_ETH", "a whole number of ether")?
                .unwrap_or(settings.devnet.initial_balance_eth);

        let block_interval_ms =
            helpers::parse_env("DEVNET_BLOCK_INTERVAL_MS", "a non-negative integer")?
                .unwrap_or(settings.devnet.block_interval_ms);

        let preauthorized = helpers::parse_bool_env("DEVNET_PREAUTHORIZED")?
            .unwrap_or(settings.devnet.preauthorized);

        Ok(Self {
            chain_id,
            account_count,
            initial_balance_eth,
            block_interval_ms,
            preauthorized,
        })
    }

    pub fn block_interval(&self) -> Option<Duration> {
        (self.block_interval_ms > 0).then(|| Duration::from_millis(self.block_interval_ms))
    }

    pub fn options(&self) -> DevnetOptions {
        DevnetOptions {
            chain_id: self.chain_id,
            account_count: self.account_count,
            initial_balance_wei: u128::from(self.initial_balance_eth) * WEI_PER_ETH,
            preauthorized: self.preauthorized,
            reject_prompts: false,
        }
    }
}

/// Contract deployed by the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractConfig {
    pub artifact_path: Option<PathBuf>,
    pub initial_value: String,
    pub methods: ContractMethods,
}

impl ContractConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let artifact_path = helpers::optional_env("CONTRACT_ARTIFACT_PATH")?
            .map(PathBuf::from)
            .or_else(|| settings.contract.artifact_path.clone());

        let initial_value = helpers::optional_env("CONTRACT_INITIAL_VALUE")?
            .unwrap_or_else(|| settings.contract.initial_value.clone());

        let read = helpers::optional_env("CONTRACT_READ_METHOD")?
            .unwrap_or_else(|| settings.contract.read_method.clone());
        let write = helpers::optional_env("CONTRACT_WRITE_METHOD")?
            .unwrap_or_else(|| settings.contract.write_method.clone());

        Ok(Self {
            artifact_path,
            initial_value,
            methods: ContractMethods { read, write },
        })
    }

    /// The configured artifact, or the built-in greeting contract.
    pub fn load_artifact(&self) -> Result<ContractArtifact, ContractError> {
        let artifact = match &self.artifact_path {
            Some(path) => ContractArtifact::from_json_file(path)?,
            None => ContractArtifact::greeting(),
        };
        for method in [&self.methods.read, &self.methods.write] {
            if artifact.function(method).is_none() {
                return Err(ContractError::InvalidArtifact(format!(
                    "abi has no function named {method}"
                )));
            }
        }
        Ok(artifact)
    }
}

impl Config {
    /// Load from env with an optional TOML config file overlay.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_env();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;

        Self::resolve(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.wallet-session/config.toml` (missing file is
    /// silently ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            chain: ChainConfig::resolve(settings)?,
            devnet: DevnetConfig::resolve(settings)?,
            contract: ContractConfig::resolve(settings)?,
            sign_message: helpers::optional_env("WALLET_SIGN_MESSAGE")?
                .unwrap_or_else(|| settings.sign_message.clone()),
        })
    }
}
