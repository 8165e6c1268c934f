use clap::Parser;
use tracing_subscriber::EnvFilter;

use wallet_session::cli::{Cli, Command, run_config_command, run_demo_command, run_status_command};
use wallet_session::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::from_env_with_toml(cli.config.as_deref())?;

    match cli.command {
        Command::Demo {
            reject,
            chain_id,
            blocks,
            new_value,
        } => run_demo_command(&config, reject, chain_id, blocks, &new_value).await,
        Command::Status { blocks } => run_status_command(&config, blocks).await,
        Command::Config => run_config_command(&config),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wallet_session=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
