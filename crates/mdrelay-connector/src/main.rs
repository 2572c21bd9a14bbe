//! mdrelay-connector: bridges one exchange market feed to the relay server
//!
//! Forwards trades, tickers and exchange server time unchanged. Runs as a
//! daemon unless `-f` is given.

#[cfg(unix)]
mod daemon;

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mdrelay_connector_lib::{
    create_market_source, run_server, NatsRelay, ServerState, Supervisor,
};
use mdrelay_metadata::{Environment, Feed, SupervisorConfig};

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser, Debug)]
#[command(name = "mdrelay-connector")]
#[command(about = "Relays one exchange market feed to the relay server")]
struct Args {
    /// Run in the foreground (not as a daemon)
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Data directory; created if missing and used as working directory
    #[arg(short = 'c', long = "data-dir", default_value = "Data")]
    data_dir: PathBuf,

    /// Path to feed configuration file
    #[arg(long, env = "MDRELAY_FEED")]
    feed: PathBuf,

    /// Path to environment configuration file
    #[arg(long, env = "MDRELAY_ENV")]
    env: PathBuf,

    /// Health server bind address (no health server when unset)
    #[arg(long)]
    health_addr: Option<SocketAddr>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), BoxError> {
    // Config paths are resolved before entering the data directory
    let (feed, env_config) = load_configs(&args.feed, &args.env)?;
    enter_data_dir(&args.data_dir)?;

    if !args.foreground {
        detach(&feed)?;
    }

    init_tracing();
    info!(feed = %feed.name, env = %env_config.name, "Loaded configuration");

    let (supervisor_config, adjusted) = env_config.supervisor.clone().validated();
    if adjusted {
        warn!(
            retry_delay_secs = supervisor_config.retry_delay_secs,
            read_timeout_secs = supervisor_config.read_timeout_secs,
            ping_interval_secs = supervisor_config.ping_interval_secs,
            "Supervisor settings adjusted to valid values"
        );
    }

    // Built by hand so the fork above happens while single-threaded
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(relay_feed(
        feed,
        env_config,
        supervisor_config,
        args.health_addr,
    ));
    Ok(())
}

fn load_configs(feed_path: &Path, env_path: &Path) -> Result<(Feed, Environment), BoxError> {
    let feed_path = std::fs::canonicalize(feed_path)
        .map_err(|e| format!("feed config {}: {}", feed_path.display(), e))?;
    let env_path = std::fs::canonicalize(env_path)
        .map_err(|e| format!("env config {}: {}", env_path.display(), e))?;

    let feed = Feed::load(&feed_path)?;
    let env_config = Environment::load(&env_path)?;
    Ok((feed, env_config))
}

fn enter_data_dir(dir: &Path) -> Result<(), BoxError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Could not create data directory {}: {}", dir.display(), e))?;
    std::env::set_current_dir(dir)
        .map_err(|e| format!("Could not enter data directory {}: {}", dir.display(), e))?;
    Ok(())
}

#[cfg(unix)]
fn detach(feed: &Feed) -> Result<(), BoxError> {
    let log_file = feed.log_file_name();
    println!("Starting as daemon...");
    daemon::daemonize(Path::new(&log_file))
        .map_err(|e| format!("Could not daemonize with log file {}: {}", log_file, e))?;
    Ok(())
}

#[cfg(not(unix))]
fn detach(_feed: &Feed) -> Result<(), BoxError> {
    eprintln!("warning: daemon mode is not supported on this platform, running in foreground");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

async fn relay_feed(
    feed: Feed,
    env_config: Environment,
    supervisor_config: SupervisorConfig,
    health_addr: Option<SocketAddr>,
) {
    let market = create_market_source(&feed, &supervisor_config);
    let relay = NatsRelay::new(env_config.relay.clone(), env_config.subject_prefix());
    let mut supervisor = Supervisor::new(
        market,
        relay,
        env_config.relay.port,
        supervisor_config.retry_delay(),
    );
    info!(
        feed = %feed.name,
        channel = %supervisor.channel(),
        relay = %env_config.relay.url(env_config.relay.port),
        "Starting market relay"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    if let Some(addr) = health_addr {
        let state = ServerState::new(supervisor.channel(), supervisor.status_handle());
        tokio::spawn(async move {
            if let Err(e) = run_server(addr, state).await {
                error!(addr = %addr, error = %e, "Health server failed");
            }
        });
        info!(addr = %addr, "Health server started");
    }

    supervisor.run(shutdown_rx).await;
}

/// Listen for SIGTERM or ctrl-c
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received"),
                _ = ctrl_c() => info!("ctrl-c received"),
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on ctrl-c. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
