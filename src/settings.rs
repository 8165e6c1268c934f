//! User settings persisted in `~/.wallet-session/config.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File-backed settings. Every field has a default so partial files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub devnet: DevnetSettings,

    #[serde(default)]
    pub contract: ContractSettings,

    /// Message signed by the "sign message" action.
    #[serde(default = "default_sign_message")]
    pub sign_message: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chain: ChainSettings::default(),
            devnet: DevnetSettings::default(),
            contract: ContractSettings::default(),
            sign_message: default_sign_message(),
        }
    }
}

fn default_sign_message() -> String {
    "Hello Fastcampus".to_string()
}

/// Networks the session accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Mainnet, Ropsten, Rinkeby, Goerli, Kovan and the local dev chain.
    #[serde(default = "default_supported_chain_ids")]
    pub supported_chain_ids: Vec<u64>,
}

fn default_supported_chain_ids() -> Vec<u64> {
    vec![1, 3, 4, 5, 42, 31337]
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            supported_chain_ids: default_supported_chain_ids(),
        }
    }
}

/// In-process development chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevnetSettings {
    #[serde(default = "default_devnet_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_devnet_accounts")]
    pub accounts: usize,

    #[serde(default = "default_initial_balance_eth")]
    pub initial_balance_eth: u64,

    /// Mine an empty block this often. 0 = only mine on transactions.
    #[serde(default)]
    pub block_interval_ms: u64,

    /// Wallet already remembers an authorization for this site.
    #[serde(default)]
    pub preauthorized: bool,
}

fn default_devnet_chain_id() -> u64 {
    31337
}

fn default_devnet_accounts() -> usize {
    3
}

fn default_initial_balance_eth() -> u64 {
    10_000
}

impl Default for DevnetSettings {
    fn default() -> Self {
        Self {
            chain_id: default_devnet_chain_id(),
            accounts: default_devnet_accounts(),
            initial_balance_eth: default_initial_balance_eth(),
            block_interval_ms: 0,
            preauthorized: false,
        }
    }
}

/// Contract deployed by the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSettings {
    /// Compiled `{abi, bytecode}` JSON. Built-in greeting contract if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,

    #[serde(default = "default_initial_value")]
    pub initial_value: String,

    #[serde(default = "default_read_method")]
    pub read_method: String,

    #[serde(default = "default_write_method")]
    pub write_method: String,
}

fn default_initial_value() -> String {
    "Hello, Hardhat!".to_string()
}

fn default_read_method() -> String {
    "greet".to_string()
}

fn default_write_method() -> String {
    "setGreeting".to_string()
}

impl Default for ContractSettings {
    fn default() -> Self {
        Self {
            artifact_path: None,
            initial_value: default_initial_value(),
            read_method: default_read_method(),
            write_method: default_write_method(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.wallet-session/config.toml).
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::base_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be read or parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Overlay every value in `other` that differs from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let (Ok(defaults), Ok(theirs), Ok(mut ours)) = (
            serde_json::to_value(Self::default()),
            serde_json::to_value(other),
            serde_json::to_value(&*self),
        ) else {
            return;
        };

        merge_non_default(&mut ours, &theirs, &defaults);

        if let Ok(merged) = serde_json::from_value(ours) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}
