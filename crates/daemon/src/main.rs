// SPDX-License-Identifier: MIT

//! `ltapd`: the log-capture agent binary. Loads configuration, starts
//! every component, and runs until SIGTERM/SIGINT trigger a bounded
//! shutdown (spec.md §1 Non-goals: CLI flag parsing, YAML loading, and
//! logger setup live here, outside the core crates).

use ltap_daemon::{Application, Settings};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let settings = Settings::from_env();
    info!(config_path = %settings.config_path.display(), "starting ltapd");

    let application = match Application::new(settings).await {
        Ok(application) => application,
        Err(error) => {
            error!(%error, "failed to start ltapd");
            return Err(error.into());
        }
    };

    application.start().await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    application.shutdown().await;
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
