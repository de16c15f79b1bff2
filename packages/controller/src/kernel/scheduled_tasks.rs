//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Currently a single task: the expiry sweeper, which reclaims jobs whose
//! TTL has lapsed by driving them through the normal deprovision pipeline.

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::jobs::JobEngine;

/// Start all scheduled tasks
pub async fn start_scheduler(engine: JobEngine) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Expiry sweeper - runs every 5 minutes
    let sweep_job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
        let engine = engine.clone();
        Box::pin(async move {
            if let Err(e) = run_expiry_sweep(&engine).await {
                tracing::error!("Expiry sweep task failed: {:#}", e);
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (expiry sweep every 5 minutes)");
    Ok(scheduler)
}

/// Run one expiry sweep
///
/// Deprovisions every active or cleanup_failed job whose expires_at is in
/// the past, one at a time so the fabric sees at most one sweep-driven
/// deploy at once.
async fn run_expiry_sweep(engine: &JobEngine) -> Result<()> {
    let cleaned = engine
        .cleanup_expired()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if cleaned.is_empty() {
        tracing::debug!("No expired jobs to reclaim");
    } else {
        tracing::info!("Reclaimed {} expired jobs: {:?}", cleaned.len(), cleaned);
    }
    Ok(())
}
