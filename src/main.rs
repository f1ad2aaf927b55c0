use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ord_harness::diagnose;
use ord_harness::{HarnessConfig, Orchestrator};

#[derive(Parser)]
#[command(
    name = "ord-harness",
    about = "Local development harness for a Bitcoin node and the ord inscription indexer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the node and the indexer, in that order, with a health check
    Start,
    /// Stop the indexer and the node, in that order
    Stop,
    /// Publish a file as an inscription, end to end
    Publish {
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        fee_rate: u64,
    },
    /// Create a wallet (defaults to the currently selected name) and select it
    CreateWallet { name: Option<String> },
    /// Select a different wallet for subsequent operations
    SwitchWallet { name: String },
    /// Show the active wallet's spendable balance
    Balance,
    /// Mine blocks directly through the node (regtest only)
    Mine { count: u64 },
    /// Wipe all indexer on-disk state for the active network
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = HarnessConfig::from_env();
    let mut orchestrator = Orchestrator::new(config);

    let (context, result) = match cli.command {
        Command::Start => (
            "Starting services",
            orchestrator.start_services().await.map(|_| String::new()),
        ),
        Command::Stop => (
            "Stopping services",
            orchestrator.stop_services().await.map(|_| String::new()),
        ),
        Command::Publish { file, fee_rate } => (
            "Publishing",
            orchestrator
                .publish(&file, fee_rate)
                .await
                .map(|record| format!("Published as {}", record.inscription_id)),
        ),
        Command::CreateWallet { name } => (
            "Creating wallet",
            orchestrator
                .create_wallet(name)
                .await
                .map(|name| format!("Wallet '{}' ready", name)),
        ),
        Command::SwitchWallet { name } => (
            "Switching wallet",
            orchestrator
                .switch_wallet(&name)
                .map(|_| format!("Now using wallet '{}'", name)),
        ),
        Command::Balance => (
            "Fetching balance",
            orchestrator
                .balance()
                .await
                .map(|sats| format!("{} sats spendable", sats)),
        ),
        Command::Mine { count } => (
            "Mining",
            orchestrator
                .mine_blocks(count)
                .await
                .map(|height| format!("Chain height now {}", height)),
        ),
        Command::Reset => (
            "Resetting",
            orchestrator.reset().await.map(|_| String::new()),
        ),
    };

    match result {
        Ok(message) => {
            if !message.is_empty() {
                println!("{}", message);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let remedy = diagnose::diagnose(context, &e.to_string());
            log::error!("{}", remedy.message);
            if let Some(suggestion) = remedy.suggestion {
                log::error!("  {}", suggestion);
            }
            if let Some(command) = remedy.command {
                log::error!("  Try: {}", command);
            }
            ExitCode::FAILURE
        }
    }
}
