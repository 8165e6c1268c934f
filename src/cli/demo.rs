//! `wallet-session demo|status|config`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::contract::ContractManager;
use crate::display::{short_account, status_line};
use crate::notify::TracingNotifier;
use crate::provider::{DevnetProvider, Provider};
use crate::session::SessionController;
use crate::sync::ChainStateSync;

struct Wallet {
    devnet: DevnetProvider,
    controller: SessionController,
    sync: Arc<ChainStateSync>,
    contract: Arc<ContractManager>,
    miner: Option<JoinHandle<()>>,
}

impl Wallet {
    fn start(config: &Config, reject: bool, chain_id: Option<u64>) -> anyhow::Result<Self> {
        let mut options = config.devnet.options();
        options.reject_prompts = reject;
        if let Some(chain_id) = chain_id {
            options.chain_id = chain_id;
        }
        let devnet = DevnetProvider::new(options)?;
        let provider: Arc<dyn Provider> = Arc::new(devnet.clone());

        let controller = SessionController::new(
            Some(provider),
            config.chain.supported_chain_ids.clone(),
            Arc::new(TracingNotifier::new().with_stderr()),
        );
        let sync = ChainStateSync::attach(&controller);
        let artifact = config.contract.load_artifact()?;
        let contract =
            ContractManager::attach(&controller, artifact, config.contract.methods.clone());
        let miner = config
            .devnet
            .block_interval()
            .map(|period| devnet.spawn_interval_mining(period));

        Ok(Self {
            devnet,
            controller,
            sync,
            contract,
            miner,
        })
    }

    /// Eager connect, falling back to the prompt. Returns whether connected.
    async fn connect(&self) -> bool {
        if self.controller.eager_connect().await {
            step("eager connect", "restored previous authorization");
            return true;
        }
        step("eager connect", "no previous authorization");
        match self.controller.activate().await {
            Ok(session) => {
                let account = session.account().map(short_account).unwrap_or_default();
                let since = session
                    .connected_at()
                    .map(|at| at.format("%H:%M:%S").to_string())
                    .unwrap_or_default();
                step("activate", &format!("connected as {account} at {since}"));
                true
            }
            Err(error) => {
                fail("activate", &error.message);
                false
            }
        }
    }

    async fn print_status(&self) {
        self.sync.refresh().await;
        println!("  {}", status_line(&self.sync.snapshot()));
    }

    fn stop(self) {
        self.controller.deactivate();
        if let Some(miner) = self.miner {
            miner.abort();
        }
    }
}

fn step(name: &str, detail: &str) {
    println!("  [ok]   {name}: {detail}");
}

fn fail(name: &str, detail: &str) {
    println!("  [FAIL] {name}: {detail}");
}

/// Scripted walkthrough of the whole session lifecycle.
pub async fn run_demo_command(
    config: &Config,
    reject: bool,
    chain_id: Option<u64>,
    blocks: u64,
    new_value: &str,
) -> anyhow::Result<()> {
    println!("Wallet session demo");
    println!("===================\n");

    let wallet = Wallet::start(config, reject, chain_id)?;
    if !wallet.connect().await {
        wallet.stop();
        return Ok(());
    }
    wallet.print_status().await;

    for _ in 0..blocks {
        wallet.devnet.mine();
        wallet.print_status().await;
    }

    match wallet.contract.deploy(&config.contract.initial_value).await {
        Ok(Some(outcome)) => step(
            "deploy",
            &format!("{} (value: {})", outcome.address, outcome.value),
        ),
        Ok(None) => step("deploy", "skipped"),
        Err(error) => fail("deploy", &error.message),
    }
    wallet.print_status().await;

    match wallet.contract.write(new_value).await {
        Ok(value) => step("write", &format!("value is now {value}")),
        Err(error) => fail("write", &error.message),
    }
    wallet.print_status().await;

    match wallet.controller.sign_message(&config.sign_message).await {
        Ok(signature) => step("sign message", &signature),
        Err(error) => fail("sign message", &error.message),
    }

    wallet.controller.deactivate();
    step("deactivate", wallet.controller.status().as_str());
    println!("  {}", status_line(&wallet.sync.snapshot()));
    wallet.stop();
    Ok(())
}

/// Connect and print the status line for the next `blocks` blocks.
pub async fn run_status_command(config: &Config, blocks: u64) -> anyhow::Result<()> {
    let mut wallet = Wallet::start(config, false, None)?;
    if wallet.miner.is_none() {
        wallet.miner = Some(wallet.devnet.spawn_interval_mining(Duration::from_secs(1)));
    }
    if !wallet.connect().await {
        wallet.stop();
        return Ok(());
    }

    let mut heights = wallet.sync.block_number().watch();
    wallet.print_status().await;
    for _ in 0..blocks {
        heights.changed().await?;
        wallet.print_status().await;
    }
    wallet.stop();
    Ok(())
}

pub fn run_config_command(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
