use crate::cli::Command;
use anyhow::{bail, Context, Result};
use colored::*;
use config_engine::AppConfig;
use eunio_sync::{EunioSync, NetworkMonitor, SyncReport, WatchNetworkMonitor};
use logger_redacted::correlation_id;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open the configured SQLite store and gateway.
pub async fn connect(config: &AppConfig, offline: bool) -> Result<EunioSync> {
    let network: Arc<dyn NetworkMonitor> = Arc::new(if offline {
        WatchNetworkMonitor::offline()
    } else {
        WatchNetworkMonitor::online()
    });

    let sync = EunioSync::open(
        config.database.clone(),
        config.remote.clone(),
        network,
        config.retry.clone(),
        config.sync.clone(),
    )
    .await
    .with_context(|| format!("Failed to open local database {}", config.database.db_path))?;

    Ok(sync)
}

/// Run one command, writing human-readable output to `out`.
pub async fn execute(sync: &EunioSync, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Sync { collection } => {
            let report = match collection {
                Some(collection) => sync.service.sync_collection(collection).await?,
                None => sync.service.sync_all().await?,
            };
            write_report(out, &report)?;
            ensure_success(&report)
        }
        Command::Status => {
            let counts = sync.service.pending_counts().await?;
            let total: usize = counts.iter().map(|(_, count)| count).sum();
            for (collection, count) in counts {
                writeln!(out, "{:<12} {}", collection.as_str(), count)?;
            }
            let network = if sync.engine().is_online() {
                "online".green()
            } else {
                "offline".yellow()
            };
            writeln!(out, "{} pending, {}", total, network)?;
            Ok(())
        }
        Command::Retry { user } => {
            let report = sync.logs.retry_failed(&user).await?;
            write_report(out, &report)?;
            ensure_success(&report)
        }
        Command::Backup { user, output } => {
            let json = sync.settings.backup(&user).await?;
            write_payload(out, output.as_deref(), &json)
        }
        Command::Restore { user, input } => {
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read backup {}", input.display()))?;
            let restored = sync.settings.restore(&user, &json).await?;
            info!(user = %correlation_id(&user), version = restored.version, "Settings restored");
            writeln!(out, "{} settings restored", "✓".green())?;
            Ok(())
        }
        Command::Export { user, output } => {
            let json = sync.settings.export(&user).await?;
            write_payload(out, output.as_deref(), &json)
        }
        Command::History { user, limit } => {
            let entries = sync.settings.history(&user, limit).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
            Ok(())
        }
        Command::Reset { user, .. } => {
            let removed = sync.service.reset_local_data(&user).await?;
            writeln!(out, "{} local records removed", removed)?;
            Ok(())
        }
    }
}

fn write_report(out: &mut dyn Write, report: &SyncReport) -> Result<()> {
    writeln!(
        out,
        "{} records: {} synced, {} failed",
        report.total_records, report.success_count, report.failure_count
    )?;
    for error in &report.errors {
        writeln!(out, "  {} {}", "✗".red(), error)?;
    }
    Ok(())
}

fn ensure_success(report: &SyncReport) -> Result<()> {
    if !report.is_success() {
        bail!("{} record(s) failed to sync", report.failure_count);
    }
    Ok(())
}

fn write_payload(out: &mut dyn Write, path: Option<&Path>, json: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(out, "Wrote {}", path.display())?;
        }
        None => writeln!(out, "{}", json)?,
    }
    Ok(())
}
