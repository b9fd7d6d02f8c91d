//! Command handlers. Each opens the backend and the durable store from
//! config, does one thing, and prints the result to stdout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use captur_core::{AppConfig, LocationFix, RawFix};
use captur_grid::{GridSettings, VisitationGridManager, VisitedRetention};
use captur_sync::{
    reports_geojson, start_periodic_sync, DurableLocationLogger, ExplorationSession, FileStore,
    FixReport, IdentityCache, LogOutcome, ReportService, RestBackend,
};

fn open_backend(config: &AppConfig) -> anyhow::Result<Arc<RestBackend>> {
    Ok(Arc::new(RestBackend::from_config(config)?))
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<FileStore>> {
    let store = FileStore::open(&config.store_dir)
        .await
        .with_context(|| format!("opening store at {}", config.store_dir.display()))?;
    Ok(Arc::new(store))
}

pub(crate) fn grid_settings(config: &AppConfig) -> GridSettings {
    GridSettings {
        initial_radius_km: config.initial_radius_km,
        retention: if config.reset_visited_on_expansion {
            VisitedRetention::ResetOnExpansion
        } else {
            VisitedRetention::Retain
        },
        ..GridSettings::default()
    }
}

pub(crate) async fn run_sync(config: &AppConfig) -> anyhow::Result<()> {
    let logger = DurableLocationLogger::new(open_backend(config)?, open_store(config).await?);
    let report = logger.sync_pending().await;
    println!(
        "attempted {}  synced {}  still pending {}  discarded {}",
        report.attempted, report.synced, report.failed, report.discarded
    );
    if !report.is_complete() {
        println!("could not sync all locations; they stay queued for the next run");
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplayTally {
    pub lines: usize,
    pub unreadable: usize,
    pub rejected: usize,
    pub persisted: usize,
    pub queued: usize,
    pub dropped: usize,
    pub new_cells: usize,
    pub rewards: usize,
}

impl ReplayTally {
    pub fn record(&mut self, report: &FixReport) {
        match report {
            FixReport::Rejected(_) => self.rejected += 1,
            FixReport::Accepted {
                logged,
                grid,
                rewarded,
            } => {
                match logged {
                    LogOutcome::Persisted => self.persisted += 1,
                    LogOutcome::Queued { .. } => self.queued += 1,
                    LogOutcome::Dropped => self.dropped += 1,
                }
                if grid.newly_visited {
                    self.new_cells += 1;
                }
                if *rewarded {
                    self.rewards += 1;
                }
            }
        }
    }
}

/// Parses one JSON-lines record; blank lines yield `None`.
pub(crate) fn parse_fix_line(line: &str) -> Option<Result<RawFix, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

pub(crate) async fn run_replay(config: &AppConfig, file: &Path) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let mut session = ExplorationSession::new(
        open_backend(config)?,
        open_store(config).await?,
        grid_settings(config),
        config.history_limit,
    );
    let start = session.start().await;
    tracing::info!(
        history = start.history_len,
        synced = start.synced.synced,
        "session started"
    );

    let mut tally = ReplayTally::default();
    for (number, line) in contents.lines().enumerate() {
        let Some(parsed) = parse_fix_line(line) else {
            continue;
        };
        tally.lines += 1;
        match parsed {
            Ok(raw) => tally.record(&session.handle_fix(raw).await),
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "skipping unreadable line");
                tally.unreadable += 1;
            }
        }
    }

    println!(
        "fixes {}  unreadable {}  rejected {}",
        tally.lines, tally.unreadable, tally.rejected
    );
    println!(
        "persisted {}  queued {}  lost {}",
        tally.persisted, tally.queued, tally.dropped
    );
    println!(
        "new cells {}  total visited {}  rewards {}",
        tally.new_cells,
        session.grid().visited_count(),
        tally.rewards
    );
    Ok(())
}

pub(crate) fn print_overlay(lng: f64, lat: f64, radius_km: Option<f64>) -> anyhow::Result<()> {
    let origin = LocationFix::new(lat, lng)?;
    let mut settings = GridSettings::default();
    if let Some(radius_km) = radius_km {
        anyhow::ensure!(
            radius_km.is_finite() && radius_km > settings.min_radius_km(),
            "--radius-km must be greater than {} km",
            settings.min_radius_km()
        );
        settings.initial_radius_km = radius_km;
    }
    let mut manager = VisitationGridManager::new(settings);
    manager.initialize(&origin);
    println!("{}", serde_json::to_string_pretty(&manager.overlay_geojson())?);
    Ok(())
}

pub(crate) async fn set_offline(config: &AppConfig, enabled: bool) -> anyhow::Result<()> {
    let logger = DurableLocationLogger::new(open_backend(config)?, open_store(config).await?);
    logger.set_debug_offline(enabled).await?;
    println!("debug offline mode {}", if enabled { "on" } else { "off" });
    Ok(())
}

pub(crate) async fn run_daemon(config: &AppConfig) -> anyhow::Result<()> {
    let logger = Arc::new(DurableLocationLogger::new(
        open_backend(config)?,
        open_store(config).await?,
    ));
    logger.sync_pending().await;

    let every = Duration::from_secs(config.sync_interval_secs);
    let mut scheduler = start_periodic_sync(Arc::clone(&logger), every).await?;
    tracing::info!(every_secs = config.sync_interval_secs, "daemon running; Ctrl-C to stop");

    shutdown_signal().await;
    scheduler.shutdown().await?;
    Ok(())
}

pub(crate) async fn print_reports(config: &AppConfig) -> anyhow::Result<()> {
    let service = ReportService::new(open_backend(config)?, Arc::new(IdentityCache::new()));
    let reports = service.active_reports(chrono::Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&reports_geojson(&reports))?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping periodic sync");
}
