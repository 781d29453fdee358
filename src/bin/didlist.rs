//! didlist CLI: runs the stream-to-list pipeline.

use didlist::clock::{Clock, SystemClock};
use didlist::config::Config;
use didlist::config::secrets::redacted;
use didlist::engine::{Lister, Supervisor, SupervisorConfig};
use didlist::model::QueueStats;
use didlist::queue::{DEFAULT_CAPACITY, QueueConfig};
use didlist::remote::XrpcListClient;
use didlist::storage::{self, DEFAULT_ADDED_FILE, DEFAULT_PENDING_FILE, SnapshotStore};
use didlist::stream::{DEFAULT_FEED_URL, StreamListener};
use didlist::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser)]
#[command(name = "didlist", about = "Feed identifiers from an event stream into a moderation list")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap, then read events and submit new identifiers until interrupted
    Run(RunArgs),
    /// Show how many identifiers each snapshot holds
    Stats {
        #[arg(long, default_value = DEFAULT_PENDING_FILE)]
        pending: PathBuf,
        #[arg(long, default_value = DEFAULT_ADDED_FILE)]
        added: PathBuf,
        /// Print one JSON object instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pending snapshot file
    #[arg(long, default_value = DEFAULT_PENDING_FILE)]
    pending: PathBuf,
    /// Added snapshot file
    #[arg(long, default_value = DEFAULT_ADDED_FILE)]
    added: PathBuf,
    /// Jetstream websocket to subscribe to
    #[arg(long, default_value = DEFAULT_FEED_URL)]
    feed_url: String,
    /// Read newline-delimited JSON events from this file instead of the
    /// websocket (`-` for stdin)
    #[arg(long)]
    events: Option<PathBuf>,
    /// Seconds between submission passes
    #[arg(long, default_value_t = 60)]
    submit_interval: u64,
    /// Seconds between snapshot saves
    #[arg(long, default_value_t = 30 * 60)]
    save_interval: u64,
    /// Seconds between queue size log lines (0 disables)
    #[arg(long, default_value_t = 10)]
    stats_interval: u64,
    /// Maximum pending identifiers
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,
    /// Keep queueing events while submissions are rate limited
    #[arg(long)]
    ingest_while_limited: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Stats {
            pending,
            added,
            json,
        } => cmd_stats(&pending, &added, json).await,
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig::from_config(&config, "didlist"))?;

    info!(
        user = %config.username,
        password = %redacted(&config.password),
        list = %config.list,
        service = %config.service,
        otlp = guard.is_exporting(),
        "starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = XrpcListClient::new(
        config.service.clone(),
        config.username.clone(),
        config.password,
        Arc::clone(&clock),
    )?;
    let lister = Lister::new(
        Arc::new(client),
        SnapshotStore::new(&args.pending, &args.added),
        clock,
        &config.list,
        QueueConfig {
            capacity: args.capacity,
        },
    );

    // Auth failure or an unreadable snapshot ends the process here.
    lister.bootstrap().await?;

    let supervisor = Supervisor::new(
        lister.clone(),
        SupervisorConfig {
            submit_interval: Duration::from_secs(args.submit_interval.max(1)),
            save_interval: Duration::from_secs(args.save_interval.max(1)),
            stats_interval: (args.stats_interval > 0)
                .then(|| Duration::from_secs(args.stats_interval)),
        },
    );
    let sup = supervisor.clone();
    let handle = tokio::spawn(async move { sup.run().await });

    let listener = StreamListener::new(lister).pause_when_limited(!args.ingest_while_limited);

    let stream_result = tokio::select! {
        result = read_events(&listener, &args.feed_url, args.events.as_deref()) => Some(result),
        _ = shutdown_signal() => None,
    };

    supervisor.shutdown();
    let saved = handle.await?;
    guard.force_flush();
    saved?;

    match stream_result {
        None => {
            info!("shut down cleanly");
            Ok(())
        }
        Some(result) => {
            result?;
            anyhow::bail!("event stream ended")
        }
    }
}

async fn read_events(
    listener: &StreamListener,
    feed_url: &str,
    path: Option<&Path>,
) -> didlist::error::Result<()> {
    match path {
        None => listener.connect(feed_url).await,
        Some(path) if path == Path::new("-") => {
            listener.run(BufReader::new(tokio::io::stdin())).await
        }
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            listener.run(BufReader::new(file)).await
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn cmd_stats(pending: &Path, added: &Path, json: bool) -> anyhow::Result<()> {
    let pending_ids = storage::load(pending).await?;
    let added_ids = storage::load(added).await?;

    if json {
        let stats = QueueStats {
            added: added_ids.as_ref().map_or(0, Vec::len),
            pending: pending_ids.as_ref().map_or(0, Vec::len),
            in_flight: 0,
        };
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    for (name, path, ids) in [("pending", pending, pending_ids), ("added", added, added_ids)] {
        match ids {
            Some(ids) => println!("{name:<8}  {:>8}  {}", ids.len(), path.display()),
            None => println!("{name:<8}  {:>8}  {} (missing)", "-", path.display()),
        }
    }
    Ok(())
}
