//! Error types for the wallet session subsystem.
//!
//! Every error raised by a provider call is a [`ProviderError`]; the
//! classifier in [`crate::classify`] dispatches on its variant, never on the
//! message text.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the injected provider and the chain behind it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no injected provider detected")]
    NoProvider,

    #[error("the user rejected the request")]
    UserRejected,

    #[error("unsupported chain id {chain_id} (supported: {supported:?})")]
    UnsupportedChain { chain_id: u64, supported: Vec<u64> },

    #[error("transaction {hash} failed: {reason}")]
    TransactionFailed { hash: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }
}

/// Fail-fast conditions of the contract lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("Contract not deployed")]
    NotDeployed,

    #[error("Value cannot be empty")]
    EmptyValue,

    #[error("deployment receipt is missing a contract address")]
    MissingContractAddress,

    #[error("invalid contract artifact: {0}")]
    InvalidArtifact(String),
}
