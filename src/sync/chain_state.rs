//! Wallet status views: block number, balance and next nonce, plus the
//! chain id read once per connection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::notify::Notifier;
use crate::provider::{Address, ChainEvent};
use crate::session::{Session, SessionController, SessionListener};
use crate::sync::{ChainObservation, ObservationKey, ObservationSource, Subscription};

/// Latest block height. Updates come straight from the `block` payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockNumberSource;

#[async_trait]
impl ObservationSource for BlockNumberSource {
    type Value = u64;

    fn name(&self) -> &'static str {
        "block_number"
    }

    async fn fetch(&self, key: &ObservationKey) -> Result<u64, ProviderError> {
        key.handle.provider().block_number().await
    }

    fn from_event(&self, event: &ChainEvent) -> Option<u64> {
        match event {
            ChainEvent::Block(number) => Some(*number),
            _ => None,
        }
    }
}

/// Account balance in wei, refetched on every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSource;

#[async_trait]
impl ObservationSource for BalanceSource {
    type Value = u128;

    fn name(&self) -> &'static str {
        "balance"
    }

    async fn fetch(&self, key: &ObservationKey) -> Result<u128, ProviderError> {
        key.handle.provider().balance(&key.account).await
    }
}

/// Pending transaction count, refetched on every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceSource;

#[async_trait]
impl ObservationSource for NonceSource {
    type Value = u64;

    fn name(&self) -> &'static str {
        "next_nonce"
    }

    async fn fetch(&self, key: &ObservationKey) -> Result<u64, ProviderError> {
        key.handle.provider().transaction_count(&key.account).await
    }
}

/// Everything the wallet status panel shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalletStatus {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub block_number: ChainObservation<u64>,
    pub balance: ChainObservation<u128>,
    pub next_nonce: ChainObservation<u64>,
}

/// Keeps the status observations keyed on the current session.
pub struct ChainStateSync {
    block_number: Subscription<BlockNumberSource>,
    balance: Subscription<BalanceSource>,
    next_nonce: Subscription<NonceSource>,
    identity: Mutex<(Option<Address>, Option<u64>)>,
}

impl std::fmt::Debug for ChainStateSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStateSync")
            .field("status", &self.snapshot())
            .finish()
    }
}

impl ChainStateSync {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            block_number: Subscription::new(BlockNumberSource, Arc::clone(&notifier)),
            balance: Subscription::new(BalanceSource, Arc::clone(&notifier)),
            next_nonce: Subscription::new(NonceSource, notifier),
            identity: Mutex::new((None, None)),
        }
    }

    /// Create, register with the controller and key on its current session.
    pub fn attach(controller: &SessionController) -> Arc<Self> {
        let sync = Arc::new(Self::new(controller.notifier()));
        controller.add_listener(&sync);
        sync.apply(&controller.session());
        sync
    }

    pub fn apply(&self, session: &Session) {
        *self
            .identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            (session.account().cloned(), session.chain_id());

        let key = ObservationKey::from_session(session);
        self.block_number.set_key(key.clone());
        self.balance.set_key(key.clone());
        self.next_nonce.set_key(key);
    }

    pub fn teardown(&self) {
        self.apply(&Session::default());
    }

    /// Refetch all three observations and wait for them.
    pub async fn refresh(&self) {
        futures::join!(
            self.block_number.refresh(),
            self.balance.refresh(),
            self.next_nonce.refresh()
        );
    }

    /// Chain id of the current connection. Read once when it connected.
    pub fn chain_id(&self) -> Option<u64> {
        self.identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .1
    }

    pub fn block_number(&self) -> &Subscription<BlockNumberSource> {
        &self.block_number
    }

    pub fn balance(&self) -> &Subscription<BalanceSource> {
        &self.balance
    }

    pub fn next_nonce(&self) -> &Subscription<NonceSource> {
        &self.next_nonce
    }

    pub fn snapshot(&self) -> WalletStatus {
        let (account, chain_id) = self
            .identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        WalletStatus {
            account,
            chain_id,
            block_number: self.block_number.current(),
            balance: self.balance.current(),
            next_nonce: self.next_nonce.current(),
        }
    }
}

impl SessionListener for ChainStateSync {
    fn session_changed(&self, session: &Session) {
        self.apply(session);
    }
}
