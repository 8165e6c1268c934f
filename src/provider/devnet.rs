//! In-process development chain with an injected-wallet front.
//!
//! Behaves like a local Hardhat node behind a browser extension: a handful
//! of funded accounts, automine (one block per transaction), `block` events,
//! and the wallet-side events (`accountsChanged`, `chainChanged`, `connect`,
//! `disconnect`). Tests drive its fault injection and gates to reproduce
//! rejections, reverts and slow responses deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde_json::Value;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::error::ProviderError;
use crate::provider::signing::{address_of, keccak256, personal_sign};
use crate::provider::{
    Address, ChainEvent, ContractArtifact, EventHandler, EventKind, PendingTransaction, Provider,
    Signer, TransactionReceipt, TransactionRequest,
};

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const GAS_PRICE_WEI: u128 = 1_000_000_000;
const DEPLOY_GAS: u128 = 473_000;
const CALL_GAS: u128 = 30_000;
const MAX_ACCOUNTS: usize = 20;

/// Well-known development keys; further accounts are derived.
const DEV_KEYS: &[&str] = &[
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

/// Startup parameters for [`DevnetProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnetOptions {
    pub chain_id: u64,
    pub account_count: usize,
    pub initial_balance_wei: u128,
    /// The wallet already remembers an authorization for this site.
    pub preauthorized: bool,
    /// Every account prompt is declined.
    pub reject_prompts: bool,
}

impl Default for DevnetOptions {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            account_count: 3,
            initial_balance_wei: 10_000 * WEI_PER_ETH,
            preauthorized: false,
            reject_prompts: false,
        }
    }
}

/// One-shot failures queued for the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Next prompt (accounts, signature, deploy, transaction) is declined.
    RejectPrompt,
    /// Next chain read fails with an RPC error.
    Rpc { code: i64, message: String },
    /// Next mined transaction reverts.
    Revert(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Prompt,
    Read,
    Mine,
}

impl Fault {
    fn applies_to(&self, op: Op) -> bool {
        matches!(
            (self, op),
            (Fault::RejectPrompt, Op::Prompt) | (Fault::Rpc { .. }, Op::Read) | (Fault::Revert(_), Op::Mine)
        )
    }
}

#[derive(Debug)]
struct DeployedContract {
    artifact: ContractArtifact,
    value: String,
}

#[derive(Debug)]
enum TxKind {
    Deploy {
        address: Address,
        artifact: ContractArtifact,
        initial: String,
    },
    Call {
        to: Address,
        value: String,
    },
}

#[derive(Debug)]
struct QueuedTx {
    hash: String,
    from: Address,
    kind: TxKind,
}

#[derive(Debug, Default, Clone, Copy)]
struct ListenerCounts {
    subscribed: u64,
    unsubscribed: u64,
}

#[derive(Debug)]
struct ChainState {
    chain_id: u64,
    block_number: u64,
    accounts: Vec<Address>,
    selected: usize,
    balances: HashMap<Address, u128>,
    nonces: HashMap<Address, u64>,
    authorized: bool,
    reject_prompts: bool,
    automine: bool,
    contracts: HashMap<Address, DeployedContract>,
    mempool: VecDeque<QueuedTx>,
    receipts: HashMap<String, Result<TransactionReceipt, ProviderError>>,
    faults: VecDeque<Fault>,
    prompts: u64,
}

impl ChainState {
    fn take_fault(&mut self, op: Op) -> Option<Fault> {
        let index = self.faults.iter().position(|fault| fault.applies_to(op))?;
        self.faults.remove(index)
    }

    fn selected_account(&self) -> Address {
        self.accounts[self.selected].clone()
    }

    fn next_nonce(&mut self, from: &Address) -> u64 {
        let nonce = self.nonces.entry(from.clone()).or_insert(0);
        let current = *nonce;
        *nonce += 1;
        current
    }

    /// Execute one queued transaction into a new block.
    fn mine_one(&mut self, tx: QueuedTx) -> u64 {
        self.block_number += 1;
        let block_number = self.block_number;

        let gas = match tx.kind {
            TxKind::Deploy { .. } => DEPLOY_GAS,
            TxKind::Call { .. } => CALL_GAS,
        };
        let cost = gas * GAS_PRICE_WEI;
        let balance = self.balances.entry(tx.from.clone()).or_insert(0);

        let outcome = if *balance < cost {
            Err("insufficient funds for gas".to_string())
        } else {
            *balance -= cost;
            match self.take_fault(Op::Mine) {
                Some(Fault::Revert(reason)) => Err(reason),
                _ => Ok(()),
            }
        };

        let receipt = outcome
            .map(|()| match tx.kind {
                TxKind::Deploy {
                    address,
                    artifact,
                    initial,
                } => {
                    self.contracts.insert(
                        address.clone(),
                        DeployedContract {
                            artifact,
                            value: initial,
                        },
                    );
                    Some(address)
                }
                TxKind::Call { to, value } => {
                    if let Some(contract) = self.contracts.get_mut(&to) {
                        contract.value = value;
                    }
                    None
                }
            })
            .map(|contract_address| TransactionReceipt {
                hash: tx.hash.clone(),
                block_number,
                from: tx.from.clone(),
                contract_address,
            })
            .map_err(|reason| ProviderError::TransactionFailed {
                hash: tx.hash.clone(),
                reason,
            });

        self.receipts.insert(tx.hash, receipt);
        block_number
    }
}

struct Shared {
    state: Mutex<ChainState>,
    keys: HashMap<Address, SigningKey>,
    listeners: Mutex<HashMap<EventKind, Vec<EventHandler>>>,
    counts: Mutex<HashMap<EventKind, ListenerCounts>>,
    reads_open: watch::Sender<bool>,
    mined: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ChainEvent) {
        let handlers = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        tracing::trace!(event = %event.kind(), listeners = handlers.len(), "devnet emit");
        for handler in handlers {
            handler.call(&event);
        }
    }

    async fn wait_for_reads(&self) -> Result<(), ProviderError> {
        let mut rx = self.reads_open.subscribe();
        rx.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| ProviderError::Other("devnet shut down".to_string()))
    }

    fn check_read_fault(&self) -> Result<(), ProviderError> {
        match self.state().take_fault(Op::Read) {
            Some(Fault::Rpc { code, message }) => Err(ProviderError::Rpc { code, message }),
            _ => Ok(()),
        }
    }

    fn check_prompt(&self) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.prompts += 1;
        if state.reject_prompts || state.take_fault(Op::Prompt).is_some() {
            return Err(ProviderError::UserRejected);
        }
        Ok(())
    }

    /// Mine everything in the mempool (when automining), then emit.
    fn mine_pending(&self) {
        let blocks: Vec<u64> = {
            let mut state = self.state();
            if !state.automine {
                return;
            }
            let mut blocks = Vec::new();
            while let Some(tx) = state.mempool.pop_front() {
                blocks.push(state.mine_one(tx));
            }
            blocks
        };
        if blocks.is_empty() {
            return;
        }
        self.mined.notify_waiters();
        for number in blocks {
            tracing::debug!(block = number, "devnet mined transaction block");
            self.emit(ChainEvent::Block(number));
        }
    }

    fn enqueue(&self, from: &Address, kind: impl FnOnce(u64) -> TxKind) -> String {
        let hash = {
            let mut state = self.state();
            let nonce = state.next_nonce(from);
            let kind = kind(nonce);
            let mut seed = from.as_str().as_bytes().to_vec();
            seed.extend_from_slice(&nonce.to_be_bytes());
            seed.extend_from_slice(&state.chain_id.to_be_bytes());
            let hash = format!("0x{}", hex::encode(keccak256(&seed)));
            state.mempool.push_back(QueuedTx {
                hash: hash.clone(),
                from: from.clone(),
                kind,
            });
            hash
        };
        self.mine_pending();
        hash
    }

    fn receipt(&self, hash: &str) -> Option<Result<TransactionReceipt, ProviderError>> {
        self.state().receipts.get(hash).cloned()
    }
}

/// Development chain plus wallet. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DevnetProvider {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DevnetProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("DevnetProvider")
            .field("chain_id", &state.chain_id)
            .field("block_number", &state.block_number)
            .field("accounts", &state.accounts.len())
            .finish()
    }
}

fn derive_key(index: usize) -> Result<SigningKey, ProviderError> {
    let bytes = match DEV_KEYS.get(index) {
        Some(key) => hex::decode(key).map_err(|e| ProviderError::Other(e.to_string()))?,
        None => keccak256(format!("wallet-session devnet account {index}").as_bytes()).to_vec(),
    };
    SigningKey::from_slice(&bytes)
        .map_err(|e| ProviderError::Other(format!("invalid devnet key {index}: {e}")))
}

fn contract_address(from: &Address, nonce: u64) -> Address {
    let mut seed = from.as_str().as_bytes().to_vec();
    seed.extend_from_slice(&nonce.to_be_bytes());
    let digest = keccak256(&seed);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::from_bytes(&out)
}

impl DevnetProvider {
    pub fn new(options: DevnetOptions) -> Result<Self, ProviderError> {
        if options.account_count == 0 || options.account_count > MAX_ACCOUNTS {
            return Err(ProviderError::Other(format!(
                "account_count must be between 1 and {MAX_ACCOUNTS}"
            )));
        }

        let mut keys = HashMap::new();
        let mut accounts = Vec::with_capacity(options.account_count);
        for index in 0..options.account_count {
            let key = derive_key(index)?;
            let address = address_of(key.verifying_key())?;
            accounts.push(address.clone());
            keys.insert(address, key);
        }

        let balances = accounts
            .iter()
            .map(|a| (a.clone(), options.initial_balance_wei))
            .collect();

        let (reads_open, _) = watch::channel(true);
        let state = ChainState {
            chain_id: options.chain_id,
            block_number: 0,
            accounts,
            selected: 0,
            balances,
            nonces: HashMap::new(),
            authorized: options.preauthorized,
            reject_prompts: options.reject_prompts,
            automine: true,
            contracts: HashMap::new(),
            mempool: VecDeque::new(),
            receipts: HashMap::new(),
            faults: VecDeque::new(),
            prompts: 0,
        };

        tracing::debug!(
            chain_id = options.chain_id,
            accounts = options.account_count,
            "devnet started"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                keys,
                listeners: Mutex::new(HashMap::new()),
                counts: Mutex::new(HashMap::new()),
                reads_open,
                mined: Notify::new(),
            }),
        })
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.shared.state().accounts.clone()
    }

    pub fn current_block(&self) -> u64 {
        self.shared.state().block_number
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        self.shared
            .state()
            .balances
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_authorized(&self) -> bool {
        self.shared.state().authorized
    }

    /// Mine an empty block.
    pub fn mine(&self) -> u64 {
        let number = {
            let mut state = self.shared.state();
            state.block_number += 1;
            state.block_number
        };
        self.shared.emit(ChainEvent::Block(number));
        number
    }

    /// Mine an empty block every `period` until the handle is aborted.
    pub fn spawn_interval_mining(&self, period: Duration) -> JoinHandle<()> {
        let provider = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                provider.mine();
            }
        })
    }

    /// Number of wallet prompts shown so far.
    pub fn prompt_count(&self) -> u64 {
        self.shared.state().prompts
    }

    pub fn fail_next(&self, fault: Fault) {
        self.shared.state().faults.push_back(fault);
    }

    pub fn set_reject_prompts(&self, reject: bool) {
        self.shared.state().reject_prompts = reject;
    }

    /// Park every chain read until [`release_reads`](Self::release_reads).
    pub fn hold_reads(&self) {
        self.shared.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.shared.reads_open.send_replace(true);
    }

    /// Keep submitted transactions in the mempool until released.
    pub fn hold_confirmations(&self) {
        self.shared.state().automine = false;
    }

    pub fn release_confirmations(&self) {
        self.shared.state().automine = true;
        self.shared.mine_pending();
    }

    pub fn pending_transactions(&self) -> usize {
        self.shared.state().mempool.len()
    }

    /// Select another account in the wallet.
    pub fn switch_account(&self, index: usize) -> Option<Address> {
        let (address, authorized) = {
            let mut state = self.shared.state();
            if index >= state.accounts.len() {
                return None;
            }
            state.selected = index;
            (state.selected_account(), state.authorized)
        };
        if authorized {
            self.shared
                .emit(ChainEvent::AccountsChanged(vec![address.clone()]));
        }
        Some(address)
    }

    pub fn switch_chain(&self, chain_id: u64) {
        self.shared.state().chain_id = chain_id;
        self.shared.emit(ChainEvent::ChainChanged(chain_id));
    }

    /// The user grants access through the extension's own popup.
    pub fn authorize_externally(&self) {
        let (chain_id, account) = {
            let mut state = self.shared.state();
            state.authorized = true;
            (state.chain_id, state.selected_account())
        };
        self.shared.emit(ChainEvent::Connect { chain_id });
        self.shared.emit(ChainEvent::AccountsChanged(vec![account]));
    }

    /// The user revokes this site's access.
    pub fn revoke_authorization(&self) {
        self.shared.state().authorized = false;
        self.shared.emit(ChainEvent::AccountsChanged(Vec::new()));
    }

    /// The wallet loses its connection to the chain.
    pub fn disconnect_wallet(&self) {
        self.shared.emit(ChainEvent::Disconnect);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn subscribe_count(&self, kind: EventKind) -> u64 {
        self.counts(kind).subscribed
    }

    pub fn unsubscribe_count(&self, kind: EventKind) -> u64 {
        self.counts(kind).unsubscribed
    }

    fn counts(&self, kind: EventKind) -> ListenerCounts {
        self.shared
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    fn known_account(&self, address: &Address) -> Result<(), ProviderError> {
        if self.shared.keys.contains_key(address) {
            Ok(())
        } else {
            Err(ProviderError::rpc(-32000, format!("unknown account {address}")))
        }
    }
}

struct DevnetSigner {
    address: Address,
    key: SigningKey,
    shared: Arc<Shared>,
}

#[async_trait]
impl Signer for DevnetSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn sign_message(&self, message: &str) -> Result<String, ProviderError> {
        self.shared.check_prompt()?;
        personal_sign(&self.key, message)
    }
}

struct DevnetPending {
    hash: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl PendingTransaction for DevnetPending {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn wait(&self) -> Result<TransactionReceipt, ProviderError> {
        loop {
            let mined = self.shared.mined.notified();
            if let Some(receipt) = self.shared.receipt(&self.hash) {
                return receipt;
            }
            mined.await;
        }
    }
}

#[async_trait]
impl Provider for DevnetProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.shared.check_prompt()?;
        let mut state = self.shared.state();
        state.authorized = true;
        Ok(vec![state.selected_account()])
    }

    async fn authorized_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let state = self.shared.state();
        if state.authorized {
            Ok(vec![state.selected_account()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.shared.state().chain_id)
    }

    async fn signer(&self, address: &Address) -> Result<Arc<dyn Signer>, ProviderError> {
        let key = self
            .shared
            .keys
            .get(address)
            .cloned()
            .ok_or_else(|| ProviderError::rpc(-32000, format!("unknown account {address}")))?;
        Ok(Arc::new(DevnetSigner {
            address: address.clone(),
            key,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.shared.wait_for_reads().await?;
        self.shared.check_read_fault()?;
        Ok(self.shared.state().block_number)
    }

    async fn balance(&self, address: &Address) -> Result<u128, ProviderError> {
        self.shared.wait_for_reads().await?;
        self.shared.check_read_fault()?;
        Ok(self.balance_of(address))
    }

    async fn transaction_count(&self, address: &Address) -> Result<u64, ProviderError> {
        self.shared.wait_for_reads().await?;
        self.shared.check_read_fault()?;
        Ok(self
            .shared
            .state()
            .nonces
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .push(handler);
        self.shared
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .subscribed += 1;
    }

    fn unsubscribe(&self, kind: EventKind, handler: &EventHandler) {
        let removed = {
            let mut listeners = self
                .shared
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(list) = listeners.get_mut(&kind) else {
                return;
            };
            match list.iter().position(|h| h.same(handler)) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.shared
                .counts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entry(kind)
                .or_default()
                .unsubscribed += 1;
        } else {
            tracing::debug!(event = %kind, "unsubscribe for unknown handler ignored");
        }
    }

    async fn deploy_contract(
        &self,
        artifact: &ContractArtifact,
        args: Vec<Value>,
        signer: &dyn Signer,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError> {
        let from = signer.address().clone();
        self.known_account(&from)?;
        artifact
            .validate()
            .map_err(|e| ProviderError::rpc(-32602, e.to_string()))?;
        self.shared.check_prompt()?;

        let initial = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let artifact = artifact.clone();
        let hash = self.shared.enqueue(&from, |nonce| TxKind::Deploy {
            address: contract_address(&from, nonce),
            artifact,
            initial,
        });

        Ok(Box::new(DevnetPending {
            hash,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn call(
        &self,
        to: &Address,
        method: &str,
        _args: Vec<Value>,
    ) -> Result<Value, ProviderError> {
        self.shared.wait_for_reads().await?;
        self.shared.check_read_fault()?;

        let state = self.shared.state();
        let contract = state
            .contracts
            .get(to)
            .ok_or_else(|| ProviderError::rpc(-32000, format!("no contract at {to}")))?;
        match contract.artifact.is_view(method) {
            Some(true) => Ok(Value::String(contract.value.clone())),
            Some(false) => Err(ProviderError::rpc(
                -32000,
                format!("{method} is not a view function"),
            )),
            None => Err(ProviderError::rpc(
                -32601,
                format!("method {method} not found"),
            )),
        }
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        signer: &dyn Signer,
    ) -> Result<Box<dyn PendingTransaction>, ProviderError> {
        if signer.address() != &request.from {
            return Err(ProviderError::Other(
                "signer does not match transaction sender".to_string(),
            ));
        }
        self.known_account(&request.from)?;

        {
            let state = self.shared.state();
            let contract = state.contracts.get(&request.to).ok_or_else(|| {
                ProviderError::rpc(-32000, format!("no contract at {}", request.to))
            })?;
            if contract.artifact.is_view(&request.method) != Some(false) {
                return Err(ProviderError::rpc(
                    -32000,
                    format!("{} is not a state-changing function", request.method),
                ));
            }
        }
        self.shared.check_prompt()?;

        let value = request
            .args
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let to = request.to.clone();
        let hash = self
            .shared
            .enqueue(&request.from, |_| TxKind::Call { to, value });

        Ok(Box::new(DevnetPending {
            hash,
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn devnet() -> DevnetProvider {
        DevnetProvider::new(DevnetOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn accounts_are_funded_and_prompt_authorizes() {
        let chain = devnet();
        let accounts = chain.accounts();
        assert_eq!(accounts.len(), 3);
        assert_eq!(
            accounts[0].as_str(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(chain.balance_of(&accounts[0]), 10_000 * WEI_PER_ETH);

        assert!(chain.authorized_accounts().await.unwrap().is_empty());
        let granted = chain.request_accounts().await.unwrap();
        assert_eq!(granted, vec![accounts[0].clone()]);
        assert_eq!(chain.authorized_accounts().await.unwrap(), granted);
    }

    #[tokio::test]
    async fn rejected_prompt_surfaces_user_rejection() {
        let chain = devnet();
        chain.fail_next(Fault::RejectPrompt);
        assert_eq!(
            chain.request_accounts().await,
            Err(ProviderError::UserRejected)
        );
        assert!(chain.request_accounts().await.is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_removes_exact_handler() {
        let chain = devnet();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let handler = EventHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let lookalike = EventHandler::new(|_| {});

        chain.subscribe(EventKind::Block, handler.clone());
        chain.mine();
        chain.unsubscribe(EventKind::Block, &lookalike);
        assert_eq!(chain.listener_count(EventKind::Block), 1);

        chain.unsubscribe(EventKind::Block, &handler);
        chain.mine();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(chain.subscribe_count(EventKind::Block), 1);
        assert_eq!(chain.unsubscribe_count(EventKind::Block), 1);
    }

    #[tokio::test]
    async fn deploy_and_set_through_automine() {
        let chain = devnet();
        let account = chain.accounts()[0].clone();
        let signer = chain.signer(&account).await.unwrap();

        let pending = chain
            .deploy_contract(
                &ContractArtifact::greeting(),
                vec![Value::from("Hello, Hardhat!")],
                signer.as_ref(),
            )
            .await
            .unwrap();
        let receipt = pending.wait().await.unwrap();
        let address = receipt.contract_address.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(
            chain.call(&address, "greet", vec![]).await.unwrap(),
            Value::from("Hello, Hardhat!")
        );

        let request = TransactionRequest {
            from: account.clone(),
            to: address.clone(),
            method: "setGreeting".to_string(),
            args: vec![Value::from("New greeting")],
        };
        chain
            .send_transaction(request, signer.as_ref())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(
            chain.call(&address, "greet", vec![]).await.unwrap(),
            Value::from("New greeting")
        );
        assert_eq!(chain.transaction_count(&account).await.unwrap(), 2);
        assert!(chain.balance_of(&account) < 10_000 * WEI_PER_ETH);
    }

    #[tokio::test]
    async fn held_confirmation_keeps_transaction_pending() {
        let chain = devnet();
        let account = chain.accounts()[0].clone();
        let signer = chain.signer(&account).await.unwrap();

        chain.hold_confirmations();
        let pending = chain
            .deploy_contract(
                &ContractArtifact::greeting(),
                vec![Value::from("x")],
                signer.as_ref(),
            )
            .await
            .unwrap();
        assert_eq!(chain.pending_transactions(), 1);
        assert_eq!(chain.current_block(), 0);

        let waiter = tokio::spawn(async move { pending.wait().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        chain.release_confirmations();
        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.block_number, 1);
    }

    #[tokio::test]
    async fn revert_fault_fails_the_receipt() {
        let chain = devnet();
        let account = chain.accounts()[0].clone();
        let signer = chain.signer(&account).await.unwrap();
        chain.fail_next(Fault::Revert("execution reverted".into()));

        let result = chain
            .deploy_contract(
                &ContractArtifact::greeting(),
                vec![Value::from("x")],
                signer.as_ref(),
            )
            .await
            .unwrap()
            .wait()
            .await;
        assert!(matches!(
            result,
            Err(ProviderError::TransactionFailed { ref reason, .. }) if reason == "execution reverted"
        ));
    }

    #[tokio::test]
    async fn signatures_recover_to_the_account() {
        let chain = devnet();
        let account = chain.accounts()[1].clone();
        let signer = chain.signer(&account).await.unwrap();
        let signature = signer.sign_message("Hello Fastcampus").await.unwrap();
        let recovered =
            crate::provider::signing::recover_personal("Hello Fastcampus", &signature).unwrap();
        assert_eq!(recovered, account);
    }
}
