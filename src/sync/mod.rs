//! Chain observations kept fresh by `block` events.
//!
//! A [`Subscription`] owns one observation slot. Whenever its key (account,
//! chain id, provider handle) changes it bumps the slot's generation, clears
//! the published value, unsubscribes the handler it registered for the old
//! key and registers a new one. Fetch results carry the generation they were
//! started under and are dropped unless it is still current, so a slow
//! response for an abandoned key can never overwrite a newer one.

pub mod chain_state;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::classify::{ClassifiedError, classify};
use crate::error::ProviderError;
use crate::notify::Notifier;
use crate::provider::{Address, ChainEvent, EventHandler, EventKind};
use crate::session::{ProviderHandle, Session};

pub use self::chain_state::{
    BalanceSource, BlockNumberSource, ChainStateSync, NonceSource, WalletStatus,
};

/// What an observation is refreshed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationKey {
    pub account: Address,
    pub chain_id: u64,
    pub handle: ProviderHandle,
}

impl ObservationKey {
    /// `None` unless the session is connected.
    pub fn from_session(session: &Session) -> Option<Self> {
        Some(Self {
            account: session.account()?.clone(),
            chain_id: session.chain_id()?,
            handle: session.handle()?.clone(),
        })
    }
}

/// A published chain value.
///
/// `value` is `None` while there is no key, before the first fetch lands,
/// and after a failed fetch (in which case `error` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainObservation<T> {
    pub value: Option<T>,
    pub generation: u64,
    pub error: Option<ClassifiedError>,
}

impl<T> ChainObservation<T> {
    fn empty(generation: u64) -> Self {
        Self {
            value: None,
            generation,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> Default for ChainObservation<T> {
    fn default() -> Self {
        Self::empty(0)
    }
}

/// How one kind of chain value is read.
#[async_trait]
pub trait ObservationSource: Send + Sync + 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn fetch(&self, key: &ObservationKey) -> Result<Self::Value, ProviderError>;

    /// Value carried by the event itself, if any. When this returns `Some`
    /// the event does not trigger a fetch.
    fn from_event(&self, _event: &ChainEvent) -> Option<Self::Value> {
        None
    }
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    key: Option<ObservationKey>,
    handler: Option<EventHandler>,
}

struct Slot<S: ObservationSource> {
    source: S,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SlotState>,
    tx: watch::Sender<ChainObservation<S::Value>>,
    discarded: AtomicU64,
}

/// One observation slot driven by a source.
pub struct Subscription<S: ObservationSource> {
    slot: Arc<Slot<S>>,
}

impl<S: ObservationSource> fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.slot.source.name())
            .field("observation", &*self.slot.tx.borrow())
            .finish()
    }
}

impl<S: ObservationSource> Subscription<S> {
    pub fn new(source: S, notifier: Arc<dyn Notifier>) -> Self {
        let (tx, _) = watch::channel(ChainObservation::default());
        Self {
            slot: Arc::new(Slot {
                source,
                notifier,
                state: Mutex::new(SlotState::default()),
                tx,
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Re-key the slot. A no-op when the key is unchanged.
    ///
    /// Tears down the previous subscription (exact handler it registered),
    /// clears the value, and for `Some(key)` subscribes to `block` and starts
    /// the initial fetch on the current tokio runtime.
    pub fn set_key(&self, key: Option<ObservationKey>) {
        let name = self.slot.source.name();
        let mut state = self.slot.state();
        if state.key == key {
            return;
        }

        if let (Some(old), Some(handler)) = (state.key.take(), state.handler.take()) {
            old.handle.provider().unsubscribe(EventKind::Block, &handler);
        }
        state.generation += 1;
        let generation = state.generation;
        self.slot.tx.send_replace(ChainObservation::empty(generation));
        tracing::debug!(observation = name, generation, keyed = key.is_some(), "observation re-keyed");

        let Some(key) = key else {
            return;
        };
        let handler = self.slot.block_handler(generation);
        key.handle
            .provider()
            .subscribe(EventKind::Block, handler.clone());
        state.handler = Some(handler);
        state.key = Some(key.clone());
        drop(state);

        self.slot.spawn_fetch(generation, key);
    }

    /// Unsubscribe and clear.
    pub fn teardown(&self) {
        self.set_key(None);
    }

    /// Fetch now for the current key and wait for the result to be applied.
    pub async fn refresh(&self) {
        let (generation, key) = {
            let state = self.slot.state();
            (state.generation, state.key.clone())
        };
        if let Some(key) = key {
            Arc::clone(&self.slot).fetch_and_publish(generation, key).await;
        }
    }

    pub fn current(&self) -> ChainObservation<S::Value> {
        self.slot.tx.borrow().clone()
    }

    pub fn value(&self) -> Option<S::Value> {
        self.slot.tx.borrow().value.clone()
    }

    pub fn generation(&self) -> u64 {
        self.slot.state().generation
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.state().handler.is_some()
    }

    pub fn watch(&self) -> watch::Receiver<ChainObservation<S::Value>> {
        self.slot.tx.subscribe()
    }

    /// Results dropped because their generation was no longer current.
    pub fn discarded(&self) -> u64 {
        self.slot.discarded.load(Ordering::Relaxed)
    }
}

impl<S: ObservationSource> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<S: ObservationSource> Slot<S> {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn block_handler(self: &Arc<Self>, generation: u64) -> EventHandler {
        let weak = Arc::downgrade(self);
        EventHandler::new(move |event| {
            let Some(slot) = weak.upgrade() else {
                return;
            };
            if let Some(value) = slot.source.from_event(event) {
                slot.publish(generation, Ok(value));
                return;
            }
            let key = {
                let state = slot.state();
                if state.generation != generation {
                    return;
                }
                state.key.clone()
            };
            if let Some(key) = key {
                slot.spawn_fetch(generation, key);
            }
        })
    }

    fn spawn_fetch(self: &Arc<Self>, generation: u64, key: ObservationKey) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(Arc::clone(self).fetch_and_publish(generation, key));
            }
            Err(_) => {
                tracing::warn!(
                    observation = self.source.name(),
                    "no async runtime; refresh skipped"
                );
            }
        }
    }

    async fn fetch_and_publish(self: Arc<Self>, generation: u64, key: ObservationKey) {
        let result = self.source.fetch(&key).await;
        self.publish(generation, result);
    }

    /// Apply a result if `generation` is still current.
    fn publish(&self, generation: u64, result: Result<S::Value, ProviderError>) {
        let name = self.source.name();
        let failure = {
            let state = self.state();
            if state.generation != generation {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    observation = name,
                    stale = generation,
                    current = state.generation,
                    "discarding stale observation"
                );
                return;
            }
            match result {
                Ok(value) => {
                    self.tx.send_if_modified(|observation| {
                        let changed = observation.value.as_ref() != Some(&value)
                            || observation.error.is_some();
                        observation.value = Some(value);
                        observation.error = None;
                        changed
                    });
                    None
                }
                Err(error) => {
                    let classified = classify(&error);
                    self.tx.send_replace(ChainObservation {
                        value: None,
                        generation,
                        error: Some(classified.clone()),
                    });
                    Some((error, classified))
                }
            }
        };

        if let Some((error, classified)) = failure {
            tracing::warn!(observation = name, %error, "observation fetch failed");
            self.notifier.error(&classified);
        }
    }
}
