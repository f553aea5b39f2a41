//! Windowed resync pipeline: select the recent window, fill resource gaps,
//! replace the destination window, then run the aggregation routines.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use trsync_core::{fill_gaps, GapFillStats, Window};
use trsync_storage::{DestinationStore, PgStore, SourceStore, StoreRole};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod report;
pub mod schedule;
pub mod triggers;

pub use config::{PostSyncRoutines, Settings, SyncConfig};
pub use error::{RunError, TriggerError};
pub use triggers::{TriggerOutcome, TriggerStatus};

pub const CRATE_NAME: &str = "trsync-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Replace the destination window and run the routines.
    Apply,
    /// Select, fetch and resolve only; nothing is written.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    SkippedEmptyWindow,
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub source_table: String,
    pub destination_table: String,
    pub window: Window,
    pub minimum_date: Option<NaiveDate>,
    pub rows_fetched: usize,
    pub rows_deleted: u64,
    pub rows_inserted: u64,
    pub gap_fill: GapFillStats,
    pub triggers: Vec<TriggerOutcome>,
    pub report_dir: Option<String>,
}

impl SyncRunSummary {
    pub fn failed_triggers(&self) -> usize {
        self.triggers.iter().filter(|t| t.failed()).count()
    }
}

/// Read the `window_days` most recent distinct dates of the source table.
pub async fn select_window(
    source: &dyn SourceStore,
    table: &str,
    window_days: usize,
) -> Result<Window, RunError> {
    let dates = source
        .recent_dates(table, window_days)
        .await
        .map_err(RunError::from_source)?;
    let window = Window::from_dates(dates, window_days);
    if window.is_empty() {
        warn!(table, "source has no dated rows; nothing to resync");
    } else if window.len() < window_days {
        warn!(
            table,
            available = window.len(),
            requested = window_days,
            "fewer distinct dates than requested; using all of them"
        );
    }
    Ok(window)
}

pub struct SyncPipeline {
    config: SyncConfig,
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
}

impl SyncPipeline {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn DestinationStore>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
        }
    }

    /// Connect to both PostgreSQL databases named in `config`.
    pub async fn connect(config: SyncConfig) -> Result<Self, RunError> {
        let source = connect_store(&config, StoreRole::Source).await?;
        let destination = connect_store(&config, StoreRole::Destination).await?;
        Ok(Self::new(config, Arc::new(source), Arc::new(destination)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self, mode: RunMode) -> Result<SyncRunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync_run",
            %run_id,
            source = %self.config.source_table,
            destination = %self.config.destination_table
        );
        self.run_inner(run_id, mode).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, mode: RunMode) -> Result<SyncRunSummary, RunError> {
        let started_at = Utc::now();
        let config = &self.config;

        let window = select_window(
            self.source.as_ref(),
            &config.source_table,
            config.window_days,
        )
        .await?;
        let mut summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: started_at,
            status: RunStatus::SkippedEmptyWindow,
            source_table: config.source_table.clone(),
            destination_table: config.destination_table.clone(),
            minimum_date: window.minimum_date(),
            window,
            rows_fetched: 0,
            rows_deleted: 0,
            rows_inserted: 0,
            gap_fill: GapFillStats::default(),
            triggers: Vec::new(),
            report_dir: None,
        };
        let Some(minimum_date) = summary.minimum_date else {
            summary.finished_at = Utc::now();
            return Ok(summary);
        };
        info!(
            dates = ?summary.window.dates(),
            %minimum_date,
            "selected resync window"
        );

        let dataset = self
            .source
            .fetch_window(&config.source_table, summary.window.dates())
            .await
            .map_err(RunError::from_source)?;
        summary.rows_fetched = dataset.len();
        info!(rows = dataset.len(), "fetched window rows");

        let filled = fill_gaps(&dataset);
        summary.gap_fill = filled.stats;
        info!(
            normalized = filled.stats.normalized,
            inferred = filled.stats.inferred,
            sentinel = filled.stats.sentinel,
            unresolved = filled.stats.unresolved,
            "resolved resources"
        );

        if mode == RunMode::DryRun {
            summary.status = RunStatus::DryRun;
        } else {
            let rows = filled
                .records
                .iter()
                .map(|resolved| resolved.record.clone())
                .collect::<Vec<_>>();
            let outcome = self
                .destination
                .replace_window(&config.destination_table, minimum_date, &rows)
                .await
                .map_err(RunError::from_destination)?;
            summary.rows_deleted = outcome.deleted;
            summary.rows_inserted = outcome.inserted;
            info!(
                deleted = outcome.deleted,
                inserted = outcome.inserted,
                %minimum_date,
                table = %config.destination_table,
                "replaced destination rows with trans_date on or after boundary"
            );

            summary.triggers =
                triggers::run_post_sync(self.destination.as_ref(), &config.routines).await;
            summary.status = RunStatus::Completed;
        }

        summary.finished_at = Utc::now();
        if let Some(reports_root) = &config.reports_dir {
            let report_dir = report::run_report_dir(reports_root, &summary);
            summary.report_dir = Some(report_dir.display().to_string());
            let written = report::write_run_report(&report_dir, &summary, &filled.records).await;
            if let Err(err) = written {
                warn!(error = %format!("{err:#}"), "writing run report failed");
                summary.report_dir = None;
            }
        }

        Ok(summary)
    }
}

async fn connect_store(config: &SyncConfig, role: StoreRole) -> Result<PgStore, RunError> {
    let url = match role {
        StoreRole::Source => &config.source_url,
        StoreRole::Destination => &config.destination_url,
    };
    PgStore::connect(url, role, config.pool_settings())
        .await
        .map_err(RunError::Connection)
}
