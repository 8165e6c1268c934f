//! Contract lifecycle: deploy once per session, read, write with
//! confirmation.
//!
//! The manager holds at most one [`ContractHandle`]. It is set by the first
//! successful [`ContractManager::deploy`] of a session and dropped when the
//! session disconnects or moves to another chain. Deploys and writes that
//! complete after their session was superseded are discarded.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::classify::{ClassifiedError, classify, classify_contract};
use crate::error::{ContractError, ProviderError};
use crate::notify::Notifier;
use crate::provider::{Address, ContractArtifact, Provider, Signer, TransactionRequest};
use crate::session::{Session, SessionController, SessionListener};

/// A deployed contract. Transactions are signed by whichever account the
/// session holds when they are sent, never by the deploying account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    address: Address,
    chain_id: u64,
    session_id: Uuid,
}

impl ContractHandle {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Provider and signer of one session snapshot.
async fn session_signer(
    session: &Session,
) -> Result<(Arc<dyn Provider>, Arc<dyn Signer>), ProviderError> {
    let (Some(account), Some(handle)) = (session.account(), session.handle()) else {
        return Err(ProviderError::NotConnected);
    };
    let provider = Arc::clone(handle.provider());
    let signer = provider.signer(account).await?;
    Ok((provider, signer))
}

/// Result of a deploy that actually ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub address: Address,
    pub value: String,
}

/// Method names used against the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractMethods {
    pub read: String,
    pub write: String,
}

impl Default for ContractMethods {
    fn default() -> Self {
        Self {
            read: "greet".to_string(),
            write: "setGreeting".to_string(),
        }
    }
}

#[derive(Debug, Default)]
enum DeployState {
    #[default]
    Idle,
    Deploying,
    Deployed(ContractHandle),
}

#[derive(Debug, Default)]
struct ManagerState {
    deploy: DeployState,
    /// Bumped when the session drops; in-flight work checks it.
    epoch: u64,
    /// Chain the current deploy targets.
    chain_id: Option<u64>,
}

pub struct ContractManager {
    controller: SessionController,
    artifact: Arc<ContractArtifact>,
    methods: ContractMethods,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ManagerState>,
    value_tx: watch::Sender<Option<String>>,
}

impl std::fmt::Debug for ContractManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractManager")
            .field("contract", &self.handle())
            .field("value", &self.last_value())
            .finish()
    }
}

impl ContractManager {
    pub fn new(
        controller: SessionController,
        artifact: ContractArtifact,
        methods: ContractMethods,
    ) -> Self {
        let notifier = controller.notifier();
        let (value_tx, _) = watch::channel(None);
        Self {
            controller,
            artifact: Arc::new(artifact),
            methods,
            notifier,
            state: Mutex::new(ManagerState::default()),
            value_tx,
        }
    }

    /// Create and register for session changes.
    pub fn attach(
        controller: &SessionController,
        artifact: ContractArtifact,
        methods: ContractMethods,
    ) -> Arc<Self> {
        let manager = Arc::new(Self::new(controller.clone(), artifact, methods));
        controller.add_listener(&manager);
        manager
    }

    pub fn handle(&self) -> Option<ContractHandle> {
        match &self.state().deploy {
            DeployState::Deployed(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Last value read from the contract.
    pub fn last_value(&self) -> Option<String> {
        self.value_tx.borrow().clone()
    }

    /// Changes only when a read observes a different value.
    pub fn watch_value(&self) -> watch::Receiver<Option<String>> {
        self.value_tx.subscribe()
    }

    fn label(&self) -> &str {
        self.artifact.name.as_deref().unwrap_or("Contract")
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, error: &ProviderError) -> ClassifiedError {
        let classified = classify(error);
        self.notifier.error(&classified);
        classified
    }

    fn reject(&self, error: ContractError) -> ClassifiedError {
        let classified = classify_contract(&error);
        self.notifier.error(&classified);
        classified
    }

    /// Deploy with `constructor_arg` unless a contract already exists, a
    /// deploy is in flight, or there is no connected signer. Returns `None`
    /// when nothing was deployed.
    pub async fn deploy(
        &self,
        constructor_arg: &str,
    ) -> Result<Option<DeployOutcome>, ClassifiedError> {
        let session = self.controller.session();
        let (Some(session_id), Some(chain_id)) =
            (session.handle().map(|h| h.id()), session.chain_id())
        else {
            tracing::debug!("deploy skipped: no signer available");
            return Ok(None);
        };
        let epoch = {
            let mut state = self.state();
            if !matches!(state.deploy, DeployState::Idle) {
                tracing::debug!("deploy skipped: contract already deployed or deploying");
                return Ok(None);
            }
            state.deploy = DeployState::Deploying;
            state.chain_id = Some(chain_id);
            state.epoch
        };

        let result = async {
            let (provider, signer) = session_signer(&session).await?;
            let pending = provider
                .deploy_contract(
                    &self.artifact,
                    vec![Value::from(constructor_arg)],
                    signer.as_ref(),
                )
                .await?;
            tracing::info!(tx = pending.hash(), from = %signer.address(), "deployment submitted");
            pending.wait().await
        }
        .await;

        let receipt = match result {
            Ok(done) => done,
            Err(error) => {
                let mut state = self.state();
                if state.epoch == epoch {
                    state.deploy = DeployState::Idle;
                    state.chain_id = None;
                }
                drop(state);
                return Err(self.report(&error));
            }
        };

        let Some(address) = receipt.contract_address else {
            let mut state = self.state();
            if state.epoch == epoch {
                state.deploy = DeployState::Idle;
                state.chain_id = None;
            }
            drop(state);
            return Err(self.reject(ContractError::MissingContractAddress));
        };

        let handle = ContractHandle {
            address: address.clone(),
            chain_id,
            session_id,
        };
        {
            let mut state = self.state();
            if state.epoch != epoch {
                tracing::warn!(%address, "deploy finished after the session ended; discarded");
                return Ok(None);
            }
            state.deploy = DeployState::Deployed(handle);
        }

        tracing::info!(%address, block = receipt.block_number, "contract deployed");
        self.notifier
            .info(&format!("{} deployed to: {address}", self.label()));

        let value = self.read().await?;
        Ok(Some(DeployOutcome { address, value }))
    }

    /// Read the current on-chain value. Publishes only when it changed.
    pub async fn read(&self) -> Result<String, ClassifiedError> {
        let Some(handle) = self.handle() else {
            return Err(self.reject(ContractError::NotDeployed));
        };
        let Some(provider) = self.current_provider() else {
            return Err(self.report(&ProviderError::NotConnected));
        };

        let value = provider
            .call(&handle.address, &self.methods.read, Vec::new())
            .await
            .map_err(|error| self.report(&error))?;
        let value = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };

        if self.handle().is_some_and(|current| current.session_id == handle.session_id) {
            let changed = self.value_tx.send_if_modified(|last| {
                if last.as_deref() == Some(value.as_str()) {
                    false
                } else {
                    *last = Some(value.clone());
                    true
                }
            });
            if changed {
                tracing::debug!(value = %value, "contract value updated");
            }
        }
        Ok(value)
    }

    /// Submit `new_value`, wait for it to be mined, then read it back.
    pub async fn write(&self, new_value: &str) -> Result<String, ClassifiedError> {
        let Some(handle) = self.handle() else {
            return Err(self.reject(ContractError::NotDeployed));
        };
        if new_value.is_empty() {
            return Err(self.reject(ContractError::EmptyValue));
        }

        let session = self.controller.session();
        let receipt = async {
            let (provider, signer) = session_signer(&session).await?;
            let request = TransactionRequest {
                from: signer.address().clone(),
                to: handle.address.clone(),
                method: self.methods.write.clone(),
                args: vec![Value::from(new_value)],
            };
            let pending = provider.send_transaction(request, signer.as_ref()).await?;
            tracing::info!(tx = pending.hash(), from = %signer.address(), "transaction submitted");
            pending.wait().await
        }
        .await
        .map_err(|error| self.report(&error))?;
        tracing::info!(tx = %receipt.hash, block = receipt.block_number, "transaction confirmed");

        if self.handle().is_none_or(|current| current.session_id != handle.session_id) {
            tracing::warn!(tx = %receipt.hash, "write confirmed after the session ended");
            return Ok(new_value.to_string());
        }

        let value = self.read().await?;
        self.notifier
            .info(&format!("Success! {} is now: {value}", self.label()));
        Ok(value)
    }

    /// Provider of the live session. Account switches keep the contract.
    fn current_provider(&self) -> Option<Arc<dyn Provider>> {
        let session = self.controller.session();
        session.handle().map(|handle| Arc::clone(handle.provider()))
    }

    fn clear(&self) {
        {
            let mut state = self.state();
            if matches!(state.deploy, DeployState::Idle) {
                return;
            }
            state.epoch += 1;
            state.deploy = DeployState::Idle;
            state.chain_id = None;
        }
        self.value_tx.send_replace(None);
        tracing::debug!("contract handle released with the session");
    }
}

impl SessionListener for ContractManager {
    /// The contract lives on one chain; an account switch keeps it.
    fn session_changed(&self, session: &Session) {
        let other_chain = self
            .state()
            .chain_id
            .is_some_and(|chain_id| session.chain_id() != Some(chain_id));
        if !session.is_connected() || other_chain {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::notify::RecordingNotifier;
    use crate::provider::{DevnetOptions, DevnetProvider};

    async fn connected() -> (DevnetProvider, SessionController, Arc<RecordingNotifier>) {
        let devnet = DevnetProvider::new(DevnetOptions::default()).unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = SessionController::new(
            Some(Arc::new(devnet.clone())),
            vec![31337],
            notifier.clone(),
        );
        controller.activate().await.unwrap();
        (devnet, controller, notifier)
    }

    #[tokio::test]
    async fn write_fails_fast_without_contract_or_value() {
        let (_, controller, notifier) = connected().await;
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );

        let err = manager.write("hi").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "Contract not deployed");

        manager.deploy("Hello, Hardhat!").await.unwrap().unwrap();
        let err = manager.write("").await.unwrap_err();
        assert_eq!(err.message, "Value cannot be empty");
        assert_eq!(notifier.errors().len(), 2);
        assert_eq!(manager.last_value().as_deref(), Some("Hello, Hardhat!"));
    }

    #[tokio::test]
    async fn deploy_without_session_is_a_no_op() {
        let devnet = DevnetProvider::new(DevnetOptions::default()).unwrap();
        let controller = SessionController::new(
            Some(Arc::new(devnet.clone())),
            vec![31337],
            Arc::new(RecordingNotifier::new()),
        );
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );
        assert_eq!(manager.deploy("x").await.unwrap(), None);
        assert_eq!(devnet.current_block(), 0);
    }

    #[tokio::test]
    async fn reverted_write_keeps_previous_value() {
        let (devnet, controller, notifier) = connected().await;
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );
        manager.deploy("first").await.unwrap();

        devnet.fail_next(crate::provider::Fault::Revert("execution reverted".into()));
        let err = manager.write("second").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transaction);
        assert_eq!(manager.last_value().as_deref(), Some("first"));
        assert_eq!(manager.read().await.unwrap(), "first");
        assert_eq!(notifier.errors().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_drops_the_handle() {
        let (_, controller, _) = connected().await;
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );
        manager.deploy("x").await.unwrap();
        assert!(manager.handle().is_some());

        controller.deactivate();
        assert!(manager.handle().is_none());
        assert!(manager.last_value().is_none());
    }

    #[tokio::test]
    async fn account_switch_keeps_contract_chain_switch_drops_it() {
        let devnet = DevnetProvider::new(DevnetOptions::default()).unwrap();
        let controller = SessionController::new(
            Some(Arc::new(devnet.clone())),
            vec![1, 31337],
            Arc::new(RecordingNotifier::new()),
        );
        controller.activate().await.unwrap();
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );
        manager.deploy("x").await.unwrap();
        assert_eq!(manager.handle().map(|h| h.chain_id()), Some(31337));

        devnet.switch_account(1);
        assert!(manager.handle().is_some());
        assert_eq!(manager.read().await.unwrap(), "x");

        devnet.switch_chain(1);
        assert!(controller.session().is_connected());
        assert!(manager.handle().is_none());
        assert!(manager.deploy("y").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn write_after_account_switch_is_sent_by_the_new_account() {
        let devnet = DevnetProvider::new(DevnetOptions::default()).unwrap();
        let controller = SessionController::new(
            Some(Arc::new(devnet.clone())),
            vec![31337],
            Arc::new(RecordingNotifier::new()),
        );
        controller.activate().await.unwrap();
        let manager = ContractManager::attach(
            &controller,
            ContractArtifact::greeting(),
            ContractMethods::default(),
        );
        manager.deploy("x").await.unwrap().unwrap();
        let accounts = devnet.accounts();
        assert_eq!(devnet.transaction_count(&accounts[0]).await.unwrap(), 1);

        devnet.switch_account(1);
        assert_eq!(manager.write("y").await.unwrap(), "y");

        assert_eq!(devnet.transaction_count(&accounts[0]).await.unwrap(), 1);
        assert_eq!(devnet.transaction_count(&accounts[1]).await.unwrap(), 1);
        assert_eq!(manager.read().await.unwrap(), "y");
    }
}
