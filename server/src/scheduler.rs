//! Fixed-interval background jobs.
//!
//! Each job runs on the blocking pool and is awaited before the next tick is
//! taken, so a slow run delays the schedule instead of overlapping itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::reconcile::TickReport;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn a background task that runs `job` every `interval`.
///
/// The first run happens immediately. Errors are logged and the schedule
/// continues; there is no retry other than the next tick. A zero interval is
/// raised to one millisecond.
pub fn spawn_periodic<F>(name: &'static str, interval: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Result<TickReport, String> + Send + Sync + 'static,
{
    let job = Arc::new(job);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let job = job.clone();
            match tokio::task::spawn_blocking(move || job()).await {
                Ok(Ok(report)) => {
                    if report.changed() {
                        tracing::info!("{}: {}", name, report);
                    } else {
                        tracing::debug!("{}: {}", name, report);
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("{} error: {}", name, e);
                }
                Err(e) => {
                    tracing::error!("{} task join error: {}", name, e);
                }
            }
        }
    })
}
