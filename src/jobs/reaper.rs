// Retention reaper: evicts finished jobs once their retention window lapses.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::JobStore;

/// Spawn the background eviction loop. Started once at process startup and
/// runs for the lifetime of the process; there is no stop trigger.
pub fn spawn(store: Arc<JobStore>, interval: Duration, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so sweeps start one
        // full interval after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.reap_terminal_older_than(retention);
            if removed > 0 {
                info!("Reaped {} finished job(s) past retention", removed);
            } else {
                debug!("Reaper sweep: nothing to evict");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, JobUpdate};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reaper_evicts_only_stale_terminal_jobs() {
        let store = Arc::new(JobStore::new());

        let done = Uuid::new_v4();
        store.create(done, "https://youtu.be/done").unwrap();
        store
            .update(
                done,
                JobUpdate {
                    status: Some(JobStatus::Error),
                    progress: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();

        let running = Uuid::new_v4();
        store.create(running, "https://youtu.be/running").unwrap();

        // Let the terminal record age past the (tiny) retention window
        tokio::time::sleep(Duration::from_millis(20)).await;
        let handle = spawn(
            store.clone(),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.get_status(done).is_none());
        assert!(store.get_status(running).is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_reaper_leaves_jobs_within_retention() {
        let store = Arc::new(JobStore::new());

        let done = Uuid::new_v4();
        store.create(done, "https://youtu.be/fresh").unwrap();
        store
            .update(
                done,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();

        let handle = spawn(
            store.clone(),
            Duration::from_millis(10),
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.get_status(done).is_some());
        handle.abort();
    }
}
