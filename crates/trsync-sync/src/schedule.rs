//! Cron-driven repeated runs inside one process.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::{RunMode, SyncPipeline};

/// Build a scheduler with one job per configured cron expression, or `None`
/// when no schedule is configured. Ticks that arrive while a run is still in
/// progress are skipped.
pub async fn maybe_build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if pipeline.config().schedule.is_empty() {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let running = Arc::new(Mutex::new(()));
    for cron in pipeline.config().schedule.clone() {
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            let running = Arc::clone(&running);
            Box::pin(async move {
                let Ok(_guard) = running.try_lock() else {
                    warn!("previous sync still running; skipping this tick");
                    return;
                };
                match pipeline.run_once(RunMode::Apply).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        inserted = summary.rows_inserted,
                        failed_triggers = summary.failed_triggers(),
                        "scheduled sync complete"
                    ),
                    Err(err) => error!(kind = err.kind(), error = %err, "scheduled sync failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        info!(%cron, "scheduled sync job");
    }
    Ok(Some(sched))
}

/// Run the scheduler until ctrl-c.
pub async fn run_scheduled(pipeline: Arc<SyncPipeline>) -> Result<()> {
    let Some(mut sched) = maybe_build_scheduler(pipeline).await? else {
        anyhow::bail!("no cron expressions configured under \"schedule\"");
    };
    sched.start().await.context("starting scheduler")?;
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use trsync_storage::MemoryStore;

    use crate::config::{Settings, SyncConfig};

    fn pipeline_with_schedule(schedule: Vec<String>) -> Arc<SyncPipeline> {
        let config = SyncConfig::from_settings(
            Settings {
                source_url: "postgres://src".into(),
                destination_url: "postgres://dst".into(),
                source_table: "src".into(),
                destination_table: "dst".into(),
                schedule,
                ..Settings::default()
            },
            Path::new("setting.json"),
        )
        .expect("valid config");
        Arc::new(SyncPipeline::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_schedule_builds_no_scheduler() {
        let sched = maybe_build_scheduler(pipeline_with_schedule(Vec::new()))
            .await
            .expect("build");
        assert!(sched.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_is_reported() {
        let err = maybe_build_scheduler(pipeline_with_schedule(vec!["not a cron".into()]))
            .await
            .err()
            .expect("invalid cron should fail");
        assert!(format!("{err:#}").contains("not a cron"));
    }
}
