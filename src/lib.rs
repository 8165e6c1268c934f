//! Wallet session controller and chain-state synchronization.
//!
//! A [`SessionController`](session::SessionController) owns the connection to
//! an injected wallet ([`Provider`](provider::Provider)). Chain values shown
//! next to it (block number, balance, next nonce) live in
//! [`ChainStateSync`](sync::ChainStateSync), which re-keys itself on every
//! session change and discards results from superseded subscriptions. The
//! [`ContractManager`](contract::ContractManager) deploys a contract at most
//! once per session and performs confirmed writes. Every user-visible
//! failure is passed through [`classify`](classify::classify) and delivered
//! to a [`Notifier`](notify::Notifier).

pub mod bootstrap;
pub mod classify;
pub mod cli;
pub mod config;
pub mod contract;
pub mod display;
pub mod error;
pub mod notify;
pub mod provider;
pub mod session;
pub mod settings;
pub mod sync;

pub use classify::{ClassifiedError, ErrorKind};
pub use contract::{ContractHandle, ContractManager, DeployOutcome};
pub use error::{ConfigError, ContractError, ProviderError};
pub use session::{Session, SessionController, SessionStatus};
pub use sync::{ChainObservation, ChainStateSync};
