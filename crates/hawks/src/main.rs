//! Hawks binary entry point.
//!
//! Usage: hawks --device-id <id> [--debug]
//!
//! Spawned by the daemon, which also runs the pub/sub sidecar whose socket
//! is passed in `UNBOUND_ABLY_SOCKET`.

use anyhow::Context;
use clap::Parser;
use hawks::logging::{self, LogConfig};
use hawks::{AblyChannelConsumer, AblyConsumerOptions, Courier, HawksConfig, Paths};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Hawks: Stateless courier for encrypted remote commands.
#[derive(Parser, Debug)]
#[command(name = "hawks", version)]
#[command(about = "Stateless, crash-safe courier for encrypted remote commands")]
struct Args {
    /// Device ID whose command channel is consumed.
    #[arg(long)]
    device_id: String,

    /// Path to the daemon socket.
    #[arg(long, env = "HAWKS_SOCKET")]
    socket: Option<PathBuf>,

    /// Path to the pub/sub sidecar socket.
    #[arg(long, env = "UNBOUND_ABLY_SOCKET")]
    ably_socket: Option<PathBuf>,

    /// Daemon response timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Grace period for an in-flight command at shutdown, in seconds.
    #[arg(long)]
    shutdown_timeout_secs: Option<u64>,

    /// Maximum frame size in bytes.
    #[arg(long)]
    max_frame_bytes: Option<usize>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn build_config(args: Args) -> anyhow::Result<HawksConfig> {
    let mut config = HawksConfig::new(args.device_id)?;

    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(ably_socket) = args.ably_socket {
        config.ably_socket_path = ably_socket;
    }
    if let Some(secs) = args.timeout_secs {
        config.daemon_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.shutdown_timeout_secs {
        config.shutdown_timeout = Duration::from_secs(secs);
    }
    if let Some(max) = args.max_frame_bytes {
        config.max_frame_bytes = max;
    }
    config.debug = args.debug;

    config.validate()?;
    Ok(config)
}

/// Fires once on SIGINT or SIGTERM.
fn spawn_signal_listener() -> anyhow::Result<oneshot::Receiver<()>> {
    let (tx, rx) = oneshot::channel();

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        let _ = tx.send(());
    });

    Ok(rx)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    logging::init(&LogConfig::new(args.debug, Some(paths.log_file())))
        .context("failed to initialize logging")?;

    info!(pid = std::process::id(), "Hawks starting...");

    let config = build_config(args)?;

    info!(
        device_id = %config.device_id,
        socket = %config.socket_path.display(),
        ably_socket = %config.ably_socket_path.display(),
        channel = %config.channel_name(),
        timeout_secs = config.daemon_timeout.as_secs(),
        shutdown_timeout_secs = config.shutdown_timeout.as_secs(),
        max_frame_bytes = config.max_frame_bytes,
        "Configuration loaded"
    );

    let channel = AblyChannelConsumer::connect(AblyConsumerOptions::from_config(&config))
        .await
        .context("failed to subscribe to command channel")?;

    let shutdown = spawn_signal_listener()?;
    let mut courier = Courier::new(config, channel);
    courier.run(shutdown).await?;

    info!("Hawks stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Hawks exited with error");
            eprintln!("hawks: {message}");
            ExitCode::FAILURE
        }
    }
}
