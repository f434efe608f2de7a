use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UnixListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netdhcp_docker::DockerClient;
use netdhcp_plugin::{router, serve, NetworkDriver, DEFAULT_SOCKET};

#[derive(Debug, Parser)]
#[command(name = "net-dhcp")]
#[command(author, version, about = "Docker network driver for DHCP addressing on existing bridges", long_about = None)]
struct Args {
    /// Log level or filter directive.
    #[arg(long, default_value = "info")]
    log: String,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Bind UNIX socket for the driver API.
    #[arg(long, default_value = DEFAULT_SOCKET)]
    sock: PathBuf,

    /// How long the persistent DHCP manager may wait for a joined
    /// container to come up.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    await_timeout: Duration,
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log).context("failed to parse log level")?;
    let registry = tracing_subscriber::registry().with(filter);

    match &args.logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context("failed to open log file for writing")?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let docker = DockerClient::from_env().context("failed to create docker client")?;
    let driver = Arc::new(NetworkDriver::new(docker, args.await_timeout));
    let state = driver.state();

    if let Some(parent) = args.sock.parent() {
        std::fs::create_dir_all(parent).context("failed to create socket directory")?;
    }
    let _ = std::fs::remove_file(&args.sock);
    let listener = UnixListener::bind(&args.sock)
        .with_context(|| format!("failed to bind {}", args.sock.display()))?;
    info!(socket = %args.sock.display(), "starting server");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(listener, router(driver), shutdown.clone()));

    shutdown_signal().await;
    info!("shutting down");

    // Stop accepting, drain in-flight handlers, then stop the managers.
    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("server error: {e}"),
        Err(e) => error!("server task failed: {e}"),
    }

    for (endpoint, manager) in state.drain_managers() {
        if let Err(e) = manager.stop().await {
            warn!(endpoint = %endpoint, "failed to stop DHCP manager: {e}");
        }
    }

    if let Err(e) = std::fs::remove_file(&args.sock) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove socket {}: {e}", args.sock.display());
        }
    }

    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
