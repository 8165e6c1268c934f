//! Deploy-once, read and confirmed writes through a live session.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

use wallet_session::ErrorKind;
use wallet_session::contract::{ContractManager, ContractMethods};
use wallet_session::notify::RecordingNotifier;
use wallet_session::provider::{ContractArtifact, DevnetOptions, DevnetProvider, Fault, Provider};
use wallet_session::session::{SessionController, SessionStatus};
use wallet_session::sync::ChainStateSync;

struct Harness {
    devnet: DevnetProvider,
    controller: SessionController,
    sync: Arc<ChainStateSync>,
    contract: Arc<ContractManager>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let devnet = DevnetProvider::new(DevnetOptions::default()).unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let provider: Arc<dyn Provider> = Arc::new(devnet.clone());
    let controller = SessionController::new(Some(provider), vec![31337], notifier.clone());
    let sync = ChainStateSync::attach(&controller);
    let contract = ContractManager::attach(
        &controller,
        ContractArtifact::greeting(),
        ContractMethods::default(),
    );
    Harness {
        devnet,
        controller,
        sync,
        contract,
        notifier,
    }
}

async fn until_pending(devnet: &DevnetProvider) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while devnet.pending_transactions() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("transaction never submitted");
}

#[tokio::test]
async fn test_greeting_scenario() {
    let h = harness();

    let session = assert_ok!(h.controller.activate().await);
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.chain_id(), Some(31337));
    h.sync.refresh().await;
    let connected_at_block = h.sync.block_number().value().unwrap();

    let outcome = assert_ok!(h.contract.deploy("Hello, Hardhat!").await).unwrap();
    assert!(outcome.address.as_str().starts_with("0x"));
    assert_eq!(outcome.value, "Hello, Hardhat!");
    assert!(h.sync.block_number().value().unwrap() > connected_at_block);

    let mut values = h.contract.watch_value();
    values.mark_unchanged();
    h.devnet.hold_confirmations();
    let contract = Arc::clone(&h.contract);
    let write = tokio::spawn(async move { contract.write("New greeting").await });
    until_pending(&h.devnet).await;
    tokio::task::yield_now().await;
    assert!(!write.is_finished());
    assert_eq!(h.contract.last_value().as_deref(), Some("Hello, Hardhat!"));
    assert!(!values.has_changed().unwrap());

    h.devnet.release_confirmations();
    let confirmed = assert_ok!(write.await.unwrap());
    assert_eq!(confirmed, "New greeting");
    assert_eq!(assert_ok!(h.contract.read().await), "New greeting");
    assert_eq!(values.borrow_and_update().as_deref(), Some("New greeting"));

    let infos = h.notifier.infos();
    assert_eq!(
        infos,
        vec![
            format!("Greeting deployed to: {}", outcome.address),
            "Success! Greeting is now: New greeting".to_string(),
        ]
    );
    assert!(h.notifier.errors().is_empty());
}

#[tokio::test]
async fn test_concurrent_deploys_produce_one_contract() {
    let h = harness();
    assert_ok!(h.controller.activate().await);

    let results = futures::future::join_all([
        h.contract.deploy("Hello, Hardhat!"),
        h.contract.deploy("Hello, Hardhat!"),
        h.contract.deploy("Hello, Hardhat!"),
    ])
    .await;

    let deployed: Vec<_> = results.into_iter().filter_map(|r| r.unwrap()).collect();
    assert_eq!(deployed.len(), 1);
    assert_eq!(h.devnet.current_block(), 1);
    assert_eq!(
        h.contract.handle().map(|c| c.address().clone()),
        Some(deployed[0].address.clone())
    );

    // Later calls are no-ops too.
    assert_eq!(assert_ok!(h.contract.deploy("again").await), None);
    assert_eq!(h.devnet.current_block(), 1);
}

#[tokio::test]
async fn test_deploy_finishing_after_disconnect_is_discarded() {
    let h = harness();
    assert_ok!(h.controller.activate().await);

    h.devnet.hold_confirmations();
    let contract = Arc::clone(&h.contract);
    let deploy = tokio::spawn(async move { contract.deploy("Hello, Hardhat!").await });
    until_pending(&h.devnet).await;

    h.controller.deactivate();
    h.devnet.release_confirmations();

    assert_eq!(assert_ok!(deploy.await.unwrap()), None);
    assert!(h.contract.handle().is_none());
    assert!(h.contract.last_value().is_none());

    // A new session may deploy again.
    assert_ok!(h.controller.activate().await);
    let outcome = assert_ok!(h.contract.deploy("second").await).unwrap();
    assert_eq!(outcome.value, "second");
}

#[tokio::test]
async fn test_rejected_deploy_leaves_no_handle() {
    let h = harness();
    assert_ok!(h.controller.activate().await);

    h.devnet.fail_next(Fault::RejectPrompt);
    let error = assert_err!(h.contract.deploy("Hello, Hardhat!").await);
    assert_eq!(error.kind, ErrorKind::UserRejected);
    assert!(h.contract.handle().is_none());

    // The guard resets so the user can try again.
    assert!(assert_ok!(h.contract.deploy("Hello, Hardhat!").await).is_some());
}
