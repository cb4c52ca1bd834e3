mod server;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_core::{logging, Config};

use server::VigilServer;

/// If a task blocks past this after cancellation, the process is forced out.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Annotated-HLS ingestion pipeline")]
struct Cli {
    /// Override the LOG_LEVEL environment setting.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().map_err(|e| anyhow::anyhow!("load configuration: {e}"))?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    logging::init_logging(&config.logging())?;
    info!(?config, "vigil starting");

    let cancel = CancellationToken::new();

    // Signals fan out through the root token.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    // Supervisor: a wedged task must not keep the process alive forever.
    let supervisor_cancel = cancel.clone();
    tokio::spawn(async move {
        supervisor_cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
        warn!("shutdown timed out, forcing exit");
        std::process::exit(1);
    });

    VigilServer::new(config).start(cancel).await?;

    info!("vigil stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
