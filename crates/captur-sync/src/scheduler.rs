//! Periodic drain of the pending location queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::backend::RemoteBackend;
use crate::logger::DurableLocationLogger;
use crate::store::KeyValueStore;

/// Builds and starts a scheduler that runs
/// [`DurableLocationLogger::sync_pending`] every `every`.
///
/// The returned [`JobScheduler`] must be kept alive; shutting it down stops
/// the job. Sync failures are logged by the logger and never stop the
/// schedule.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be created, the
/// job cannot be registered, or the scheduler fails to start.
pub async fn start_periodic_sync<B, S>(
    logger: Arc<DurableLocationLogger<B, S>>,
    every: Duration,
) -> Result<JobScheduler, JobSchedulerError>
where
    B: RemoteBackend + 'static,
    S: KeyValueStore + 'static,
{
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let logger = Arc::clone(&logger);
        Box::pin(async move {
            tracing::debug!("scheduler: starting pending location sync");
            let report = logger.sync_pending().await;
            if !report.is_complete() {
                tracing::warn!(
                    failed = report.failed,
                    "scheduler: some locations are still pending"
                );
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(every_secs = every.as_secs(), "periodic sync scheduled");
    Ok(scheduler)
}
