//! syncd: serves sairedis requests from Redis against the virtual switch.
//!
//! A warm start restores the switch images left by the last warm shutdown.
//! On SIGINT/SIGTERM the daemon stops after the request in progress; with
//! `--warm` it saves its state first.

use anyhow::Context;
use clap::Parser;
use sonic_sai::Catalog;
use sonic_sairedis::channel::RedisServerChannel;
use sonic_syncd::{FileStateStore, ShutdownKind, Syncd, SyncdConfig, VirtualSwitch};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// SAI execution daemon
#[derive(Parser, Debug)]
#[command(name = "syncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short = 'f', long, default_value = "/etc/sonic/syncd.toml")]
    config: PathBuf,

    /// Restore saved state on start and save it on shutdown
    #[arg(short = 'w', long)]
    warm: bool,

    /// Attribute catalog (YAML), overrides the configuration file
    #[arg(short = 'c', long)]
    catalog: Option<PathBuf>,

    /// Warm-restart state directory, overrides the configuration file
    #[arg(short = 's', long)]
    state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("syncd: failed to set logger: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "syncd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = if args.config.exists() {
        SyncdConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "no configuration file, using defaults");
        SyncdConfig::default()
    };
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog);
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = state_dir;
    }

    let catalog = match &config.catalog {
        Some(path) => Some(Arc::new(
            Catalog::load(path).with_context(|| format!("loading catalog {}", path.display()))?,
        )),
        None => None,
    };

    let driver = match &catalog {
        Some(catalog) => VirtualSwitch::with_catalog(catalog.clone()),
        None => VirtualSwitch::new(),
    };
    let store = FileStateStore::new(config.state_dir.clone());
    let channel = RedisServerChannel::connect(config.channel.clone())
        .await
        .with_context(|| format!("connecting to {}", config.channel.url))?;

    let mut syncd = Syncd::new(Arc::new(driver), Arc::new(store), config);
    if let Some(catalog) = catalog {
        syncd = syncd.with_catalog(catalog);
    }
    let handle = syncd.start(Arc::new(channel), args.warm)?;

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    let kind = if args.warm {
        ShutdownKind::Warm
    } else {
        ShutdownKind::Cold
    };
    info!(?kind, "shutting down");
    handle.shutdown(kind).await?;
    Ok(())
}
