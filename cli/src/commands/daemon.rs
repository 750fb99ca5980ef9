// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Maintenance daemon
//!
//! Periodically reconciles server records with the container runtime and
//! expires finished deploy tasks and stale clipboard entries. Runs in the
//! foreground until Ctrl+C or SIGTERM.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use crate::context::Services;

#[derive(Args)]
pub struct DaemonArgs {
    /// Run a single maintenance pass and exit
    #[arg(long)]
    once: bool,

    /// Override the configured sweep interval (seconds)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

pub async fn run(args: DaemonArgs, config_path: Option<PathBuf>) -> Result<()> {
    let services = Services::from_config_path(config_path).await?;
    let maintenance = services.config.spec.maintenance.clone();
    let interval = args
        .interval
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| maintenance.sweep_interval());

    if args.once {
        maintenance_pass(&services, maintenance.task_retention()).await;
        println!("{}", "✓ Maintenance pass complete".green());
        return Ok(());
    }

    info!(interval_secs = interval.as_secs(), "Maintenance daemon started");

    let mut ticker = tokio::time::interval(interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                maintenance_pass(&services, maintenance.task_retention()).await;
            }
            _ = &mut shutdown => break,
        }
    }

    services.lifecycle.tracker().teardown();
    info!("Maintenance daemon shutting down");
    Ok(())
}

async fn maintenance_pass(services: &Services, task_retention: Duration) {
    match services.lifecycle.sweep_missing().await {
        Ok(missing) if missing.is_empty() => {}
        Ok(missing) => warn!(count = missing.len(), "Servers whose containers are gone"),
        Err(e) => error!(error = %e, "Missing-container sweep failed"),
    }

    let pruned_tasks = services.lifecycle.tracker().prune_finished(task_retention);
    let pruned_clipboard = services.files.prune_clipboard();
    info!(
        pruned_tasks,
        pruned_clipboard,
        "Maintenance pass complete"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
