//! saiplayer: replays a sairedis record log against a running syncd.
//!
//! Every recorded request is resubmitted in order; object ids from the
//! recording are rewritten to the ids the daemon hands out now, and every
//! response is compared with the recorded one.

use anyhow::{bail, Context};
use clap::Parser;
use sonic_sai::Catalog;
use sonic_sairedis::channel::RedisClientChannel;
use sonic_sairedis::{Codec, RecordReader, RedisChannelConfig, Replayer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// SAI record log player
#[derive(Parser, Debug)]
#[command(name = "saiplayer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Record log to replay
    record: PathBuf,

    /// Attribute catalog (YAML); requests are validated against it when given
    #[arg(short = 'c', long)]
    catalog: Option<PathBuf>,

    /// Redis URL of the channel
    #[arg(long, default_value = "redis://127.0.0.1:6379/1")]
    redis_url: String,

    /// Key prefix of the channel
    #[arg(long, default_value = "SAIREDIS")]
    prefix: String,

    /// Per-request response timeout in milliseconds
    #[arg(short = 't', long, default_value = "60000")]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: Level,

    /// Print every mismatching frame pair
    #[arg(short = 'v', long)]
    verbose: bool,
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
        eprintln!("saiplayer: failed to set logger: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!(error = %format!("{e:#}"), "saiplayer failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let entries = RecordReader::read(&args.record)
        .with_context(|| format!("reading {}", args.record.display()))?;
    if entries.is_empty() {
        bail!("{} holds no records", args.record.display());
    }

    let codec = match &args.catalog {
        Some(path) => {
            let catalog = Catalog::load(path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            Codec::new(Arc::new(catalog))
        }
        None => Codec::unchecked(),
    };

    let config = RedisChannelConfig {
        url: args.redis_url.clone(),
        prefix: args.prefix.clone(),
        ..RedisChannelConfig::default()
    };
    let channel = RedisClientChannel::connect(config)
        .await
        .context("connecting to the channel")?;

    info!(
        record = %args.record.display(),
        records = entries.len(),
        "replaying"
    );
    let mut replayer = Replayer::new(
        Arc::new(channel),
        codec,
        Duration::from_millis(args.timeout_ms),
    );
    let report = replayer.run(&entries).await?;

    println!(
        "requests: {}  matched: {}  mismatched: {}  timed out: {}  unanswered: {}",
        report.requests,
        report.matched,
        report.mismatches.len(),
        report.timeouts,
        report.unanswered
    );
    for mismatch in &report.mismatches {
        warn!(
            correlation_id = mismatch.correlation_id,
            op = %mismatch.operation,
            "response mismatch"
        );
        if args.verbose {
            println!("#{} {}", mismatch.correlation_id, mismatch.operation);
            println!("  expected {}", mismatch.expected);
            println!("  actual   {}", mismatch.actual);
        }
    }
    Ok(report.is_clean())
}
