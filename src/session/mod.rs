//! Wallet session controller.
//!
//! Owns the single process-wide [`Session`] and is its only writer. Every
//! transition is published twice: on a `watch` channel for async consumers
//! and synchronously to registered [`SessionListener`]s, which is how the
//! chain-state synchronizers and the contract manager re-key or tear down.
//!
//! ```text
//! Disconnected --activate--> Connecting --ok--> Connected
//!                                 |                 |
//!                                 +--error--> Errored --notified--> Disconnected
//! Connected --deactivate / disconnect / empty accountsChanged--> Disconnected
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::classify::{ClassifiedError, classify};
use crate::error::ProviderError;
use crate::notify::Notifier;
use crate::provider::{Address, ChainEvent, EventHandler, EventKind, Provider, Signer};

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to the active provider connection.
///
/// A fresh handle (new id) is minted on every connect and whenever the
/// connected account or chain changes, so consumers can use it as a refresh
/// key and detect results that belong to a superseded connection.
#[derive(Clone)]
pub struct ProviderHandle {
    id: Uuid,
    provider: Arc<dyn Provider>,
}

impl ProviderHandle {
    pub(crate) fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }
}

impl PartialEq for ProviderHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProviderHandle {}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderHandle").field(&self.id).finish()
    }
}

/// Snapshot of the wallet connection.
///
/// `account`, `chain_id` and `handle` are present exactly when the status is
/// [`SessionStatus::Connected`]; the constructors are the only way to build
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    account: Option<Address>,
    chain_id: Option<u64>,
    handle: Option<ProviderHandle>,
    connected_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_status(SessionStatus::Disconnected)
    }
}

impl Session {
    fn with_status(status: SessionStatus) -> Self {
        Self {
            status,
            account: None,
            chain_id: None,
            handle: None,
            connected_at: None,
        }
    }

    fn connected(
        account: Address,
        chain_id: u64,
        handle: ProviderHandle,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: SessionStatus::Connected,
            account: Some(account),
            chain_id: Some(chain_id),
            handle: Some(handle),
            connected_at: Some(connected_at),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn account(&self) -> Option<&Address> {
        self.account.as_ref()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn handle(&self) -> Option<&ProviderHandle> {
        self.handle.as_ref()
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }
}

/// Synchronous observer of session transitions.
///
/// Called once per transition, in the order transitions happen. Delivery
/// holds the controller's transition lock, so a listener must not call
/// `activate`/`deactivate` synchronously; spawn instead.
pub trait SessionListener: Send + Sync {
    fn session_changed(&self, session: &Session);
}

#[derive(Default)]
struct ControllerState {
    session: Session,
    /// Bumped on every transition; async attempts check it before applying.
    epoch: u64,
    connected_handlers: Vec<(EventKind, EventHandler)>,
    inactive_handlers: Vec<(EventKind, EventHandler)>,
    eager_attempted: bool,
    manual_cycle: bool,
}

/// Proof that the caller holds the transition lock.
type Transition<'a> = MutexGuard<'a, ()>;

struct Inner {
    provider: Option<Arc<dyn Provider>>,
    supported_chains: Vec<u64>,
    notifier: Arc<dyn Notifier>,
    /// Serializes a transition's commit with its subscribe/unsubscribe and
    /// publish, so fan-out is delivered in commit order.
    transitions: Mutex<()>,
    state: Mutex<ControllerState>,
    session_tx: watch::Sender<Session>,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
}

/// Drives the session state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session())
            .field("supported_chains", &self.inner.supported_chains)
            .finish()
    }
}

impl SessionController {
    /// `provider` is `None` when no wallet is injected.
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        supported_chains: Vec<u64>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (session_tx, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                supported_chains,
                notifier,
                transitions: Mutex::new(()),
                state: Mutex::new(ControllerState::default()),
                session_tx,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn session(&self) -> Session {
        self.inner.state().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state().session.status
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.session_tx.subscribe()
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    pub fn supported_chains(&self) -> &[u64] {
        &self.inner.supported_chains
    }

    /// Register a listener. The controller keeps only a weak reference.
    pub fn add_listener<L: SessionListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn SessionListener> = Arc::downgrade(listener) as Weak<dyn SessionListener>;
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(weak);
    }

    /// Whether the listener for out-of-band authorization is installed.
    pub fn is_listening_for_authorization(&self) -> bool {
        !self.inner.state().inactive_handlers.is_empty()
    }

    /// Prompt the wallet for access and connect.
    ///
    /// Does nothing (and calls nothing on the provider) while `Connected` or
    /// `Connecting`. A failure is classified, passed to the notifier once,
    /// and the session ends `Disconnected`.
    pub async fn activate(&self) -> Result<Session, ClassifiedError> {
        let epoch = {
            let transition = self.inner.transition();
            let epoch = {
                let mut state = self.inner.state();
                if matches!(
                    state.session.status,
                    SessionStatus::Connected | SessionStatus::Connecting
                ) {
                    tracing::debug!(status = %state.session.status, "activate ignored");
                    return Ok(state.session.clone());
                }
                state.manual_cycle = true;
                state.epoch += 1;
                state.session = Session::with_status(SessionStatus::Connecting);
                state.epoch
            };
            self.inner.stop_authorization_listener(&transition);
            self.inner
                .publish(&transition, Session::with_status(SessionStatus::Connecting));

            if self.inner.provider.is_none() {
                return Err(self.inner.fail(&transition, ProviderError::NoProvider));
            }
            epoch
        };
        let Some(provider) = self.inner.provider.clone() else {
            return Err(classify(&ProviderError::NoProvider));
        };

        let outcome = async {
            let accounts = provider.request_accounts().await?;
            let account = accounts
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::Other("wallet returned no accounts".to_string()))?;
            let chain_id = provider.chain_id().await?;
            self.inner.check_supported(chain_id)?;
            Ok::<_, ProviderError>((account, chain_id))
        }
        .await;

        let transition = self.inner.transition();
        match outcome {
            Ok((account, chain_id)) => Ok(self
                .inner
                .connect(&transition, epoch, provider, account, chain_id)
                .unwrap_or_else(|| self.session())),
            Err(error) if self.inner.is_current(epoch) => {
                Err(self.inner.fail(&transition, error))
            }
            Err(error) => {
                tracing::debug!(%error, "activation superseded before it failed");
                Err(classify(&error))
            }
        }
    }

    /// Disconnect. No-op while already `Disconnected`.
    pub fn deactivate(&self) {
        let transition = self.inner.transition();
        self.inner.state().manual_cycle = true;
        self.inner.stop_authorization_listener(&transition);
        self.inner.disconnect(&transition, "deactivated");
    }

    /// Silent reconnect using an authorization the wallet remembers.
    ///
    /// Runs at most once per controller. Returns whether it connected.
    /// Failure is expected and never reaches the notifier; instead the
    /// controller starts listening for the user authorizing this site
    /// through the wallet itself.
    pub async fn eager_connect(&self) -> bool {
        let epoch = {
            let transition = self.inner.transition();
            let Some(epoch) = ({
                let mut state = self.inner.state();
                if state.eager_attempted || state.session.status != SessionStatus::Disconnected {
                    None
                } else {
                    state.eager_attempted = true;
                    state.epoch += 1;
                    state.session = Session::with_status(SessionStatus::Connecting);
                    Some(state.epoch)
                }
            }) else {
                return false;
            };
            self.inner
                .publish(&transition, Session::with_status(SessionStatus::Connecting));
            if self.inner.provider.is_none() {
                self.inner.revert_silently(&transition, epoch);
                return false;
            }
            epoch
        };
        let Some(provider) = self.inner.provider.clone() else {
            return false;
        };

        let authorized = self.inner.authorized(&provider).await;
        let transition = self.inner.transition();
        match authorized {
            Ok((account, chain_id)) => {
                let connected = self
                    .inner
                    .connect(&transition, epoch, Arc::clone(&provider), account, chain_id)
                    .is_some();
                if connected {
                    tracing::info!("eager connect restored the previous session");
                }
                connected
            }
            Err(error) => {
                tracing::debug!(%error, "eager connect did not succeed");
                self.inner.revert_silently(&transition, epoch);
                self.inner
                    .start_authorization_listener(&transition, &provider);
                false
            }
        }
    }

    /// Sign `message` with the connected account.
    pub async fn sign_message(&self, message: &str) -> Result<String, ClassifiedError> {
        let result = async {
            let signer = self.signer().await?;
            signer.sign_message(message).await
        }
        .await;

        match result {
            Ok(signature) => {
                tracing::info!(signature = %signature, "message signed");
                self.inner.notifier.info(&format!("Signature: {signature}"));
                Ok(signature)
            }
            Err(error) => {
                let classified = classify(&error);
                self.inner.notifier.error(&classified);
                Err(classified)
            }
        }
    }

    /// Signer for the connected account.
    pub async fn signer(&self) -> Result<Arc<dyn Signer>, ProviderError> {
        let session = self.session();
        let (Some(account), Some(handle)) = (session.account(), session.handle()) else {
            return Err(ProviderError::NotConnected);
        };
        handle.provider().signer(account).await
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self) -> Transition<'_> {
        self.transitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.state().epoch == epoch
    }

    fn check_supported(&self, chain_id: u64) -> Result<(), ProviderError> {
        if self.supported_chains.contains(&chain_id) {
            Ok(())
        } else {
            Err(ProviderError::UnsupportedChain {
                chain_id,
                supported: self.supported_chains.clone(),
            })
        }
    }

    async fn authorized(
        &self,
        provider: &Arc<dyn Provider>,
    ) -> Result<(Address, u64), ProviderError> {
        let account = provider
            .authorized_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("no previously authorized account".to_string()))?;
        let chain_id = provider.chain_id().await?;
        self.check_supported(chain_id)?;
        Ok((account, chain_id))
    }

    fn publish(&self, _transition: &Transition<'_>, session: Session) {
        self.session_tx.send_replace(session.clone());

        let listeners: Vec<Arc<dyn SessionListener>> = {
            let mut listeners = self
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.session_changed(&session);
        }
    }

    fn detach(&self, _transition: &Transition<'_>, handlers: Vec<(EventKind, EventHandler)>) {
        let Some(provider) = &self.provider else {
            return;
        };
        for (kind, handler) in handlers {
            provider.unsubscribe(kind, &handler);
        }
    }

    /// Apply a successful connect attempt unless it was superseded.
    fn connect(
        self: &Arc<Self>,
        transition: &Transition<'_>,
        epoch: u64,
        provider: Arc<dyn Provider>,
        account: Address,
        chain_id: u64,
    ) -> Option<Session> {
        let handle = ProviderHandle::new(Arc::clone(&provider));
        let session = Session::connected(account, chain_id, handle, Utc::now());
        let handlers = self.connected_handlers();

        let inactive = {
            let mut state = self.state();
            if state.epoch != epoch {
                tracing::debug!("connect attempt superseded; result discarded");
                return None;
            }
            state.epoch += 1;
            state.session = session.clone();
            state.connected_handlers = handlers.clone();
            std::mem::take(&mut state.inactive_handlers)
        };
        self.detach(transition, inactive);
        for (kind, handler) in handlers {
            provider.subscribe(kind, handler);
        }

        tracing::info!(
            account = %session.account.as_ref().map(Address::as_str).unwrap_or_default(),
            chain_id,
            "wallet connected"
        );
        self.publish(transition, session.clone());
        Some(session)
    }

    /// Errored, notify, then Disconnected.
    fn fail(&self, transition: &Transition<'_>, error: ProviderError) -> ClassifiedError {
        let classified = classify(&error);
        tracing::warn!(kind = %classified.kind, %error, "wallet session error");

        let handlers = {
            let mut state = self.state();
            state.epoch += 1;
            state.session = Session::with_status(SessionStatus::Errored);
            std::mem::take(&mut state.connected_handlers)
        };
        self.detach(transition, handlers);
        self.publish(transition, Session::with_status(SessionStatus::Errored));

        self.notifier.error(&classified);

        {
            let mut state = self.state();
            state.epoch += 1;
            state.session = Session::default();
        }
        self.publish(transition, Session::default());
        classified
    }

    fn disconnect(&self, transition: &Transition<'_>, reason: &str) {
        let handlers = {
            let mut state = self.state();
            if state.session.status == SessionStatus::Disconnected {
                return;
            }
            state.epoch += 1;
            state.session = Session::default();
            std::mem::take(&mut state.connected_handlers)
        };
        self.detach(transition, handlers);
        tracing::info!(reason, "wallet disconnected");
        self.publish(transition, Session::default());
    }

    fn revert_silently(&self, transition: &Transition<'_>, epoch: u64) {
        {
            let mut state = self.state();
            if state.epoch != epoch {
                return;
            }
            state.epoch += 1;
            state.session = Session::default();
        }
        self.publish(transition, Session::default());
    }

    fn connected_handlers(self: &Arc<Self>) -> Vec<(EventKind, EventHandler)> {
        let accounts = {
            let weak = Arc::downgrade(self);
            EventHandler::new(move |event| {
                if let Some(inner) = weak.upgrade()
                    && let ChainEvent::AccountsChanged(accounts) = event
                {
                    inner.on_accounts_changed(accounts);
                }
            })
        };
        let chain = {
            let weak = Arc::downgrade(self);
            EventHandler::new(move |event| {
                if let Some(inner) = weak.upgrade()
                    && let ChainEvent::ChainChanged(chain_id) = event
                {
                    inner.on_chain_changed(*chain_id);
                }
            })
        };
        let disconnect = {
            let weak = Arc::downgrade(self);
            EventHandler::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    let transition = inner.transition();
                    inner.disconnect(&transition, "wallet disconnected");
                }
            })
        };
        vec![
            (EventKind::AccountsChanged, accounts),
            (EventKind::ChainChanged, chain),
            (EventKind::Disconnect, disconnect),
        ]
    }

    fn on_accounts_changed(&self, accounts: &[Address]) {
        let transition = self.transition();
        let Some(account) = accounts.first() else {
            self.disconnect(&transition, "wallet revoked access");
            return;
        };
        let session = {
            let mut state = self.state();
            let current = &state.session;
            let (Some(chain_id), Some(handle)) = (current.chain_id, current.handle.as_ref()) else {
                return;
            };
            if current.account.as_ref() == Some(account) {
                return;
            }
            let session = Session::connected(
                account.clone(),
                chain_id,
                ProviderHandle::new(Arc::clone(&handle.provider)),
                current.connected_at.unwrap_or_else(Utc::now),
            );
            state.epoch += 1;
            state.session = session.clone();
            session
        };
        tracing::info!(account = %account, "wallet account changed");
        self.publish(&transition, session);
    }

    fn on_chain_changed(&self, chain_id: u64) {
        let transition = self.transition();
        if let Err(error) = self.check_supported(chain_id) {
            if self.state().session.status == SessionStatus::Connected {
                self.fail(&transition, error);
            }
            return;
        }
        let session = {
            let mut state = self.state();
            let current = &state.session;
            let (Some(account), Some(handle)) = (current.account.as_ref(), current.handle.as_ref())
            else {
                return;
            };
            if current.chain_id == Some(chain_id) {
                return;
            }
            let session = Session::connected(
                account.clone(),
                chain_id,
                ProviderHandle::new(Arc::clone(&handle.provider)),
                current.connected_at.unwrap_or_else(Utc::now),
            );
            state.epoch += 1;
            state.session = session.clone();
            session
        };
        tracing::info!(chain_id, "wallet chain changed");
        self.publish(&transition, session);
    }

    fn start_authorization_listener(
        self: &Arc<Self>,
        _transition: &Transition<'_>,
        provider: &Arc<dyn Provider>,
    ) {
        let handlers = {
            let mut state = self.state();
            if state.manual_cycle
                || !state.inactive_handlers.is_empty()
                || state.session.status != SessionStatus::Disconnected
            {
                return;
            }
            let weak = Arc::downgrade(self);
            let handler = EventHandler::new(move |event| {
                let authorized = match event {
                    ChainEvent::Connect { .. } => true,
                    ChainEvent::AccountsChanged(accounts) => !accounts.is_empty(),
                    _ => false,
                };
                if !authorized {
                    return;
                }
                let (Some(inner), Ok(runtime)) =
                    (weak.upgrade(), tokio::runtime::Handle::try_current())
                else {
                    return;
                };
                runtime.spawn(async move { inner.reconnect_from_wallet().await });
            });
            state.inactive_handlers = vec![
                (EventKind::Connect, handler.clone()),
                (EventKind::AccountsChanged, handler),
            ];
            state.inactive_handlers.clone()
        };
        for (kind, handler) in handlers {
            provider.subscribe(kind, handler);
        }
        tracing::debug!("listening for out-of-band wallet authorization");
    }

    fn stop_authorization_listener(&self, transition: &Transition<'_>) {
        let handlers = std::mem::take(&mut self.state().inactive_handlers);
        if !handlers.is_empty() {
            tracing::debug!("stopped listening for out-of-band wallet authorization");
        }
        self.detach(transition, handlers);
    }

    async fn reconnect_from_wallet(self: Arc<Self>) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let epoch = {
            let transition = self.transition();
            let epoch = {
                let mut state = self.state();
                if state.session.status != SessionStatus::Disconnected
                    || state.inactive_handlers.is_empty()
                {
                    return;
                }
                state.epoch += 1;
                state.session = Session::with_status(SessionStatus::Connecting);
                state.epoch
            };
            self.publish(&transition, Session::with_status(SessionStatus::Connecting));
            epoch
        };

        let authorized = self.authorized(&provider).await;
        let transition = self.transition();
        match authorized {
            Ok((account, chain_id)) => {
                self.connect(&transition, epoch, provider, account, chain_id);
            }
            Err(error) if self.is_current(epoch) => {
                self.fail(&transition, error);
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::notify::RecordingNotifier;
    use crate::provider::{DevnetOptions, DevnetProvider, Fault};

    struct Recorder(Mutex<Vec<SessionStatus>>);

    impl SessionListener for Recorder {
        fn session_changed(&self, session: &Session) {
            self.0.lock().unwrap().push(session.status());
        }
    }

    fn setup(options: DevnetOptions) -> (DevnetProvider, SessionController, Arc<RecordingNotifier>) {
        let devnet = DevnetProvider::new(options).unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = SessionController::new(
            Some(Arc::new(devnet.clone())),
            vec![1, 31337],
            notifier.clone(),
        );
        (devnet, controller, notifier)
    }

    #[tokio::test]
    async fn activate_connects_and_is_idempotent() {
        let (devnet, controller, _) = setup(DevnetOptions::default());

        let session = controller.activate().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);
        assert_eq!(session.chain_id(), Some(31337));
        assert_eq!(session.account(), Some(&devnet.accounts()[0]));
        assert_eq!(devnet.prompt_count(), 1);

        let again = controller.activate().await.unwrap();
        assert_eq!(again, session);
        assert_eq!(devnet.prompt_count(), 1);
        assert_eq!(devnet.subscribe_count(EventKind::AccountsChanged), 1);
    }

    #[tokio::test]
    async fn missing_provider_is_classified() {
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = SessionController::new(None, vec![1], notifier.clone());

        let err = controller.activate().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoProvider);
        assert_eq!(controller.status(), SessionStatus::Disconnected);
        assert_eq!(notifier.errors().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_chain_reverts_to_disconnected() {
        let (_, controller, notifier) = setup(DevnetOptions {
            chain_id: 99,
            ..DevnetOptions::default()
        });
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        controller.add_listener(&recorder);

        let err = controller.activate().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedChain);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                SessionStatus::Connecting,
                SessionStatus::Errored,
                SessionStatus::Disconnected
            ]
        );
        assert_eq!(notifier.errors(), vec![err]);
    }

    #[tokio::test]
    async fn deactivate_releases_event_handlers() {
        let (devnet, controller, _) = setup(DevnetOptions::default());
        controller.activate().await.unwrap();
        assert_eq!(devnet.listener_count(EventKind::ChainChanged), 1);

        controller.deactivate();
        let session = controller.session();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.account().is_none() && session.chain_id().is_none());
        assert_eq!(devnet.listener_count(EventKind::ChainChanged), 0);
        assert_eq!(devnet.listener_count(EventKind::Disconnect), 0);

        controller.deactivate();
        assert_eq!(devnet.unsubscribe_count(EventKind::ChainChanged), 1);
    }

    #[tokio::test]
    async fn eager_connect_is_silent_on_failure() {
        let (devnet, controller, notifier) = setup(DevnetOptions::default());
        assert!(!controller.eager_connect().await);
        assert_eq!(controller.status(), SessionStatus::Disconnected);
        assert!(notifier.notices().is_empty());
        assert_eq!(devnet.prompt_count(), 0);
        assert!(controller.is_listening_for_authorization());

        // Only attempted once.
        assert!(!controller.eager_connect().await);
    }

    #[tokio::test]
    async fn eager_connect_uses_prior_authorization() {
        let (devnet, controller, _) = setup(DevnetOptions {
            preauthorized: true,
            ..DevnetOptions::default()
        });
        assert!(controller.eager_connect().await);
        assert!(controller.session().is_connected());
        assert_eq!(devnet.prompt_count(), 0);
        assert!(!controller.is_listening_for_authorization());
    }

    #[tokio::test]
    async fn account_switch_mints_a_new_handle() {
        let (devnet, controller, _) = setup(DevnetOptions::default());
        let first = controller.activate().await.unwrap();

        devnet.switch_account(1);
        let second = controller.session();
        assert_eq!(second.account(), Some(&devnet.accounts()[1]));
        assert_ne!(first.handle(), second.handle());
        assert!(first.connected_at().is_some());
        assert_eq!(second.connected_at(), first.connected_at());

        devnet.revoke_authorization();
        assert_eq!(controller.status(), SessionStatus::Disconnected);
        assert!(controller.session().connected_at().is_none());
    }

    #[tokio::test]
    async fn switching_to_unsupported_chain_errors_out() {
        let (devnet, controller, notifier) = setup(DevnetOptions::default());
        controller.activate().await.unwrap();

        devnet.switch_chain(1);
        assert_eq!(controller.session().chain_id(), Some(1));

        devnet.switch_chain(5);
        assert_eq!(controller.status(), SessionStatus::Disconnected);
        assert_eq!(notifier.errors()[0].kind, ErrorKind::UnsupportedChain);
        assert_eq!(devnet.listener_count(EventKind::ChainChanged), 0);
    }

    #[tokio::test]
    async fn sign_message_requires_connection() {
        let (devnet, controller, notifier) = setup(DevnetOptions::default());
        let err = controller.sign_message("Hello Fastcampus").await.unwrap_err();
        assert_eq!(err.message, "Wallet not connected");

        controller.activate().await.unwrap();
        let signature = controller.sign_message("Hello Fastcampus").await.unwrap();
        let signer = crate::provider::signing::recover_personal("Hello Fastcampus", &signature)
            .unwrap();
        assert_eq!(signer, devnet.accounts()[0]);
        assert_eq!(notifier.errors().len(), 1);

        devnet.fail_next(Fault::RejectPrompt);
        let rejected = controller.sign_message("again").await.unwrap_err();
        assert_eq!(rejected.kind, ErrorKind::UserRejected);
    }
}
