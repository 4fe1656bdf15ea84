//! Periodic expiry sweep for [`ModelCache`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::ModelCache;
use crate::model::ModelLoader;

/// Shortest period the sweeper runs at; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running sweeper. Dropping it stops the sweep.
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep and wait for the task to finish.
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }

    /// Whether the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task calling [`ModelCache::purge_expired`] every `period`.
///
/// The first sweep happens one full period after spawning. Requires a
/// tokio runtime context.
pub fn spawn_sweeper<L: ModelLoader>(cache: Arc<ModelCache<L>>, period: Duration) -> SweepHandle {
    let period = period.max(MIN_SWEEP_INTERVAL);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match cache.purge_expired() {
                Ok(0) => debug!("sweep found nothing to evict"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "cache sweep failed"),
            }
        }
    });
    SweepHandle { task }
}
