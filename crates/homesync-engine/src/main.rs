use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use homesync_core::{EntityKind, LocalStore, PreferenceStore};
use homesync_engine::config::{Command, Config};
use homesync_engine::{
    descriptor, fetch_server_info, HttpTransport, OfflineGate, Orchestrator, RequestScope,
    SyncError, SyncResult,
};
use homesync_store_local::{FilePreferences, FileStore};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let dir = config.effective_data_dir();
    info!("Starting homesync");
    info!("  Server: {}", config.server_url);
    info!("  Cache dir: {}", dir.display());

    let prefs: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferences::new(dir.join("preferences.json")));
    let store: Arc<dyn LocalStore> = Arc::new(
        FileStore::open(&dir, prefs)
            .await
            .with_context(|| format!("Failed to open cache at {}", dir.display()))?,
    );

    let gate = OfflineGate::new();
    let transport = Arc::new(
        HttpTransport::new(&config.transport_config(), gate.clone())
            .context("Invalid server configuration")?,
    );
    let orchestrator = Orchestrator::new(transport.clone(), store.clone(), gate)
        .with_manifest_path(config.manifest_path.clone());

    let result = run(&config.command, &orchestrator, transport.as_ref()).await;

    store.close().await?;
    result
}

async fn run(
    command: &Command,
    orchestrator: &Orchestrator,
    transport: &HttpTransport,
) -> anyhow::Result<()> {
    match command {
        Command::Refresh { force, kinds } => {
            let kinds = if kinds.is_empty() {
                EntityKind::ALL.to_vec()
            } else {
                kinds.clone()
            };
            let scope = RequestScope::new("cli-refresh");

            let outcome = tokio::select! {
                outcome = orchestrator.refresh(&kinds, *force, scope.token()) => outcome,
                _ = shutdown_signal() => {
                    scope.token().cancel();
                    Err(SyncError::Cancelled)
                }
            };
            report_refresh(outcome, orchestrator)?;
        }
        Command::Status => {
            let tables = orchestrator.status().await?;
            if tables.is_empty() {
                println!("cache is empty");
            }
            for table in tables {
                println!(
                    "{:<28} {:>6} rows  token {:<22} fetched {}",
                    table.kind.name(),
                    table.rows,
                    table.change_token.as_deref().unwrap_or("-"),
                    table
                        .fetched_at
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Command::Kinds => {
            for kind in EntityKind::ALL {
                println!("{:<28} {}", kind.name(), descriptor(kind).path);
            }
        }
        Command::Invalidate { kinds } => {
            let dropped = orchestrator.invalidate(kinds).await?;
            println!("invalidated {} of {} kinds", dropped, kinds.len());
        }
        Command::Clear => {
            orchestrator.clear().await?;
            println!("cache cleared");
        }
        Command::Ping => {
            let server = fetch_server_info(transport).await?;
            println!(
                "{} reachable, version {}",
                transport.base_url(),
                server.version().unwrap_or("unknown")
            );
        }
    }
    Ok(())
}

fn report_refresh(
    outcome: SyncResult<homesync_engine::RefreshReport>,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    match outcome {
        Ok(report) => {
            println!(
                "{} changed, {} unchanged",
                report.changed.len(),
                report.unchanged.len()
            );
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            warn!("Refresh interrupted");
            Ok(())
        }
        Err(err) => {
            if orchestrator.offline_gate().is_offline() {
                warn!("Offline, cached data left as is");
            }
            Err(err.into())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, cancelling");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, cancelling");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
