//! Command-line entry point.
//!
//! `ephemeral-pg` provisions one database, prints its connection string on
//! stdout, and keeps it alive until Ctrl-C or `SIGTERM`, after which the
//! instance is torn down. Flags and `EPHEMERAL_PG_*` variables are merged
//! by [`ProvisionConfig::load`].

use anyhow::{Context, Result};
use ortho_config::OrthoConfig;
use tracing::{info, warn};

use crate::{config::ProvisionConfig, logging, provisioner::Provisioner};

/// Load configuration, then provision and hold an instance.
///
/// # Errors
///
/// Returns an error when configuration cannot be merged or provisioning fails.
pub async fn run() -> Result<()> {
    logging::init("info");
    let cfg = ProvisionConfig::load().context("failed to load configuration")?;
    run_with_config(&cfg).await
}

/// Provision an instance described by `cfg` and hold it until shutdown.
///
/// # Errors
///
/// Returns an error when `cfg` is invalid, provisioning fails, or teardown
/// reports a failure.
pub async fn run_with_config(cfg: &ProvisionConfig) -> Result<()> {
    let strategy = cfg.strategy();
    let request = cfg.to_request()?;

    let mut instance = Provisioner::new(cfg.backend())
        .provision(&request)
        .await
        .with_context(|| format!("failed to provision with the {strategy} strategy"))?;

    print_connection_string(instance.connection_string().as_str());
    info!(strategy = %strategy, "press Ctrl-C to tear the database down");

    shutdown_signal().await;

    instance.teardown().await.context("teardown failed")?;
    info!("database removed");
    Ok(())
}

#[expect(
    clippy::print_stdout,
    reason = "the connection string is the program's output"
)]
fn print_connection_string(url: &str) {
    println!("{url}");
}

/// Waits for a shutdown signal, completing when termination is requested.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(err) = res {
                            warn!(error = %err, "failed to listen for Ctrl-C");
                        }
                    },
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
    }
}
