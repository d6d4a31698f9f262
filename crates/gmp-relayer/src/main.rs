//! GMP task relayer.
//!
//! For every configured chain the relayer polls the GMP API for tasks after
//! its checkpoint and relays each one to the destination chain:
//!
//! 1. Fetch `GET {gmp_api_url}/chains/{chain}/tasks?after={checkpoint}`
//! 2. Decode the base64 payload and pick the destination
//! 3. Submit the transaction (logged only in dry run)
//! 4. Fire the approve / execute callback
//! 5. Persist the task id as the new checkpoint

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gmp_ops::{ChainRelayer, RelayEvent, Relayer};
use gmp_store::{CheckpointStore, FileStore};
use gmp_sync::GmpTaskSource;
use gmp_tx::{ChainSubmitter, EvmSender};
use gmp_types::{ChainConfig, CompletionCallbacks, FnCallbacks};

use crate::config::RelayerConfig;

#[derive(Parser, Debug)]
#[command(name = "gmp-relayer")]
#[command(about = "Relay GMP API tasks to destination chains")]
struct Cli {
    #[arg(long, short, env = "GMP_RELAYER_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Broadcast transactions, overriding `dry_run` in the config.
    #[arg(long)]
    live: bool,

    /// Only relay these chains (repeatable).
    #[arg(long = "chain")]
    chains: Vec<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Signing key for live mode.
    #[arg(long, env = "EVM_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the poll loops until interrupted (default).
    Run,
    /// Print the stored checkpoint of each chain.
    Status,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn logging_callbacks(chain: &str) -> Arc<dyn CompletionCallbacks> {
    let approve_chain = chain.to_string();
    let execute_chain = chain.to_string();
    Arc::new(FnCallbacks::new(
        move || info!(chain = %approve_chain, "gateway approval relayed"),
        move || info!(chain = %execute_chain, "contract execution relayed"),
    ))
}

fn submitter_for(
    chain: &ChainConfig,
    dry_run: bool,
    private_key: Option<&str>,
) -> anyhow::Result<ChainSubmitter> {
    if dry_run {
        return Ok(ChainSubmitter::dry_run(chain));
    }
    let Some(key) = private_key else {
        bail!("live mode requires EVM_PRIVATE_KEY");
    };
    let sender = EvmSender::from_chain(chain, key)
        .with_context(|| format!("failed to set up signer for chain {}", chain.name))?;
    info!(chain = %chain.name, address = %sender.address(), "live submission enabled");
    Ok(ChainSubmitter::live(chain, Arc::new(sender)))
}

async fn print_status(store: &FileStore, chains: &[ChainConfig]) -> anyhow::Result<()> {
    for chain in chains {
        let checkpoint = store
            .load(&chain.name)
            .await
            .with_context(|| format!("failed to read checkpoint for {}", chain.name))?;
        match checkpoint {
            Some(id) => println!("{}\t{}", chain.name, id),
            None => println!("{}\t-", chain.name),
        }
    }
    Ok(())
}

async fn run(
    config: &RelayerConfig,
    chains: Vec<ChainConfig>,
    store: Arc<FileStore>,
    cli: &Cli,
) -> anyhow::Result<()> {
    let dry_run = config.dry_run && !cli.live;
    if dry_run {
        warn!("dry run: transactions will be logged, not broadcast");
    }

    let source = Arc::new(GmpTaskSource::new(&config.source_config()?)?);

    let mut relayer = Relayer::new().with_event_handler(Arc::new(|event: RelayEvent| {
        if let RelayEvent::CycleFinished { chain, report } = event {
            if report.fetched > 0 {
                info!(
                    chain = %chain,
                    confirmed = report.confirmed,
                    failed = report.failed,
                    checkpoint = ?report.checkpoint,
                    "cycle summary"
                );
            }
        }
    }));

    for chain in chains {
        let submitter = submitter_for(&chain, dry_run, cli.private_key.as_deref())?;
        let callbacks = logging_callbacks(&chain.name);
        relayer.add_chain(ChainRelayer::new(
            chain,
            source.clone(),
            store.clone(),
            submitter,
            callbacks,
        ));
    }

    let handle = relayer.spawn();
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    handle.shutdown_and_join().await;
    store.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = RelayerConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let chains = config.select_chains(&cli.chains)?;
    info!(
        chains = chains.len(),
        api = %config.gmp_api_url,
        checkpoint_dir = %config.checkpoint_dir.display(),
        "loaded configuration"
    );

    let store = Arc::new(FileStore::new(config.checkpoint_dir.clone()));
    store.init().await?;

    match cli.command.as_ref() {
        Some(Command::Status) => print_status(&store, &chains).await,
        Some(Command::Run) | None => run(&config, chains, store, &cli).await,
    }
}
