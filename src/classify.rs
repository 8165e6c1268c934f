//! User-facing error taxonomy.
//!
//! [`classify`] is a pure mapping from an error to a [`ClassifiedError`].
//! Only the rendered message is kept; the source error is dropped.

use serde::Serialize;

use crate::error::{ContractError, ProviderError};

/// Classified error kinds shown to the user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoProvider,
    UnsupportedChain,
    UserRejected,
    Transaction,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoProvider => "no_provider",
            Self::UnsupportedChain => "unsupported_chain",
            Self::UserRejected => "user_rejected",
            Self::Transaction => "transaction",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error ready for the notification sink.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub const NO_PROVIDER_MESSAGE: &str =
    "No Ethereum browser extension detected. Please install MetaMask extension.";
pub const UNSUPPORTED_CHAIN_MESSAGE: &str = "You're connected to an unsupported network.";
pub const USER_REJECTED_MESSAGE: &str =
    "Please authorize this website to access your Ethereum account.";

/// Classify an error raised by the provider adapter.
pub fn classify(error: &ProviderError) -> ClassifiedError {
    match error {
        ProviderError::NoProvider => ClassifiedError::new(ErrorKind::NoProvider, NO_PROVIDER_MESSAGE),
        ProviderError::UnsupportedChain { .. } => {
            ClassifiedError::new(ErrorKind::UnsupportedChain, UNSUPPORTED_CHAIN_MESSAGE)
        }
        ProviderError::UserRejected => {
            ClassifiedError::new(ErrorKind::UserRejected, USER_REJECTED_MESSAGE)
        }
        ProviderError::TransactionFailed { reason, .. } => ClassifiedError::new(
            ErrorKind::Transaction,
            format!("Transaction failed: {reason}"),
        ),
        other => ClassifiedError::new(ErrorKind::Unknown, other.to_string()),
    }
}

/// Contract fail-fast conditions pass their own message through.
pub fn classify_contract(error: &ContractError) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::Unknown, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_variant_not_message() {
        let rejected = classify(&ProviderError::UserRejected);
        assert_eq!(rejected.kind, ErrorKind::UserRejected);
        assert_eq!(rejected.message, USER_REJECTED_MESSAGE);

        // An "Other" error that merely mentions rejection stays unknown.
        let other = classify(&ProviderError::Other("user rejected something".into()));
        assert_eq!(other.kind, ErrorKind::Unknown);
        assert_eq!(other.message, "user rejected something");
    }

    #[test]
    fn unsupported_chain_and_no_provider_messages() {
        let unsupported = classify(&ProviderError::UnsupportedChain {
            chain_id: 7,
            supported: vec![31337],
        });
        assert_eq!(unsupported.kind, ErrorKind::UnsupportedChain);
        assert_eq!(unsupported.message, UNSUPPORTED_CHAIN_MESSAGE);

        let missing = classify(&ProviderError::NoProvider);
        assert_eq!(missing.kind, ErrorKind::NoProvider);
        assert!(missing.message.contains("install"));
    }

    #[test]
    fn unknown_passes_message_verbatim() {
        let rpc = classify(&ProviderError::rpc(-32000, "nonce too low"));
        assert_eq!(rpc.kind, ErrorKind::Unknown);
        assert_eq!(rpc.message, "RPC error -32000: nonce too low");

        let empty = classify_contract(&ContractError::EmptyValue);
        assert_eq!(empty.kind, ErrorKind::Unknown);
        assert_eq!(empty.message, "Value cannot be empty");
    }

    #[test]
    fn transaction_failures_are_their_own_kind() {
        let failed = classify(&ProviderError::TransactionFailed {
            hash: "0xabc".into(),
            reason: "execution reverted".into(),
        });
        assert_eq!(failed.kind, ErrorKind::Transaction);
        assert_eq!(failed.message, "Transaction failed: execution reverted");
        assert_eq!(failed.kind.as_str(), "transaction");
    }
}
