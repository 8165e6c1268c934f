//! Injected provider boundary.
//!
//! The traits here are the whole capability set the session controller,
//! the chain-state synchronizers and the contract manager consume from a
//! wallet. Every call is asynchronous and may fail with a [`ProviderError`].
//!
//! Event handlers are dispatched by reference identity: whoever calls
//! [`Provider::subscribe`] must keep the [`EventHandler`] it registered and
//! hand the same one back to [`Provider::unsubscribe`].

pub mod devnet;
pub mod signing;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContractError, ProviderError};

pub use self::devnet::{DevnetOptions, DevnetProvider, Fault};

/// A 20-byte account address, stored lowercase with its `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, ProviderError> {
        let trimmed = raw.trim();
        let Some(hex) = trimmed.strip_prefix("0x") else {
            return Err(ProviderError::Other(format!(
                "invalid address '{trimmed}': must be 0x-prefixed"
            )));
        };
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProviderError::Other(format!(
                "invalid address '{trimmed}': expected 40 hex characters"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub(crate) fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Provider event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Block,
    AccountsChanged,
    ChainChanged,
    Connect,
    Disconnect,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::AccountsChanged => "accountsChanged",
            Self::ChainChanged => "chainChanged",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to event handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Block(u64),
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Connect { chain_id: u64 },
    Disconnect,
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Block(_) => EventKind::Block,
            Self::AccountsChanged(_) => EventKind::AccountsChanged,
            Self::ChainChanged(_) => EventKind::ChainChanged,
            Self::Connect { .. } => EventKind::Connect,
            Self::Disconnect => EventKind::Disconnect,
        }
    }
}

/// A registered event callback. Two handlers are the same handler only if
/// they are clones of one another.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&ChainEvent) + Send + Sync>);

impl EventHandler {
    pub fn new(f: impl Fn(&ChainEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, event: &ChainEvent) {
        (self.0)(event)
    }

    pub fn same(&self, other: &EventHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// Compiled contract bundle: structured interface description plus bytecode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractArtifact {
    #[serde(default, rename = "contractName")]
    pub name: Option<String>,
    pub abi: Value,
    pub bytecode: String,
}

impl ContractArtifact {
    /// The greeting contract the demo page deploys.
    pub fn greeting() -> Self {
        Self {
            name: Some("Greeting".to_string()),
            abi: serde_json::json!([
                {
                    "type": "constructor",
                    "stateMutability": "nonpayable",
                    "inputs": [{ "name": "_greeting", "type": "string" }]
                },
                {
                    "type": "function",
                    "name": "greet",
                    "stateMutability": "view",
                    "inputs": [],
                    "outputs": [{ "name": "", "type": "string" }]
                },
                {
                    "type": "function",
                    "name": "setGreeting",
                    "stateMutability": "nonpayable",
                    "inputs": [{ "name": "_greeting", "type": "string" }],
                    "outputs": []
                }
            ]),
            bytecode: "0x608060405234801561001057600080fd5b50604051610473380380610473".to_string(),
        }
    }

    /// Load a `{abi, bytecode}` JSON artifact produced by the compiler toolchain.
    pub fn from_json_file(path: &Path) -> Result<Self, ContractError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ContractError::InvalidArtifact(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ContractError> {
        let artifact: Self = serde_json::from_str(data)
            .map_err(|e| ContractError::InvalidArtifact(format!("invalid JSON: {e}")))?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if !self.abi.is_array() {
            return Err(ContractError::InvalidArtifact(
                "abi must be a JSON array".to_string(),
            ));
        }
        let code = self.bytecode.trim().trim_start_matches("0x");
        if code.is_empty() {
            return Err(ContractError::InvalidArtifact(
                "bytecode is empty".to_string(),
            ));
        }
        if !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ContractError::InvalidArtifact(
                "bytecode must be hex".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up a function entry in the ABI.
    pub fn function(&self, name: &str) -> Option<&Value> {
        self.abi.as_array()?.iter().find(|entry| {
            entry.get("type").and_then(Value::as_str) == Some("function")
                && entry.get("name").and_then(Value::as_str) == Some(name)
        })
    }

    /// Whether `name` is a read-only (view/pure) function.
    pub fn is_view(&self, name: &str) -> Option<bool> {
        let entry = self.function(name)?;
        let mutability = entry
            .get("stateMutability")
            .and_then(Value::as_str)
            .unwrap_or("nonpayable");
        Some(matches!(mutability, "view" | "pure"))
    }
}

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub method: String,
    pub args: Vec<Value>,
}

/// Result of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: String,
    pub block_number: u64,
    pub from: Address,
    pub contract_address: Option<Address>,
}

/// A submitted transaction that has not been mined yet.
#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn hash(&self) -> &str;

    /// Suspend until the transaction is mined or fails. No timeout.
    async fn wait(&self) -> Result<TransactionReceipt, ProviderError>;
}

/// A capability bound to one account.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> &Address;

    /// EIP-191 personal signature, `0x`-prefixed hex.
    async fn sign_message(&self, message: &str) -> Result<String, ProviderError>;
}

/// The injected wallet / chain provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Prompt the user for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Accounts the user already authorized. Never prompts.
    async fn authorized_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    async fn signer(&self, address: &Address) -> Result<Arc<dyn Signer>, ProviderError>;

    async fn block_number(&self) -> Result<u64, ProviderError>;

    /// Balance in wei.
    async fn balance(&self, address: &Address) -> Result<u128, ProviderError>;

    /// Pending transaction count (next nonce).
    async fn transaction_count(&self, address: &Address) -> Result<u64, ProviderError>;

    fn subscribe(&self, kind: EventKind, handler: EventHandler);

    fn unsubscribe(&self, kind: EventKind, handler: &EventHandler);

    async fn deploy_contract(
        &self,
        artifact: &ContractArtifact,
        args: Vec<Value>,
        signer: &dyn Signer,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError>;

    /// Read-only contract call.
    async fn call(
        &self,
        to: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ProviderError>;

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn Signer,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_normalized() {
        let address = Address::parse("0x9431Cf5DA0CE60664661341db650763B08286B18").unwrap();
        assert_eq!(address.as_str(), "0x9431cf5da0ce60664661341db650763b08286b18");
        assert!(Address::parse("0x123").is_err());
        assert!(Address::parse("9431cf5da0ce60664661341db650763b08286b18").is_err());
    }

    #[test]
    fn handler_identity_is_by_reference() {
        let a = EventHandler::new(|_| {});
        let b = EventHandler::new(|_| {});
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn greeting_artifact_knows_its_methods() {
        let artifact = ContractArtifact::greeting();
        artifact.validate().unwrap();
        assert_eq!(artifact.is_view("greet"), Some(true));
        assert_eq!(artifact.is_view("setGreeting"), Some(false));
        assert_eq!(artifact.is_view("missing"), None);
    }

    #[test]
    fn artifact_rejects_empty_bytecode() {
        let err = ContractArtifact::from_json(r#"{"abi": [], "bytecode": "0x"}"#).unwrap_err();
        assert!(matches!(err, ContractError::InvalidArtifact(_)));
    }

    #[test]
    fn event_kind_names_match_provider_events() {
        assert_eq!(EventKind::Block.as_str(), "block");
        assert_eq!(ChainEvent::ChainChanged(1).kind(), EventKind::ChainChanged);
        assert_eq!(EventKind::AccountsChanged.to_string(), "accountsChanged");
    }
}
