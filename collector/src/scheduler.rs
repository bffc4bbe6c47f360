use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector::Collector;
use crate::status::{LastRun, StatusTracker};

/// Fires a collection run every interval until shutdown.
///
/// Runs are spawned without waiting for earlier ones, and each is cut off
/// after one interval.
pub struct Scheduler {
    collector: Arc<Collector>,
    interval: Duration,
    status: Option<Arc<StatusTracker>>,
}

impl Scheduler {
    pub fn new(collector: Arc<Collector>, interval: Duration) -> Self {
        Self {
            collector,
            interval,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Arc<StatusTracker>) -> Self {
        self.status = Some(status);
        self
    }

    /// Tick until `shutdown` is cancelled, then wait for in-flight runs.
    pub async fn run(&self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = JoinSet::new();

        info!(
            interval_secs = self.interval.as_secs(),
            "collector started, first run in one interval"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    runs.spawn(execute_run(
                        Arc::clone(&self.collector),
                        self.interval,
                        self.status.clone(),
                    ));
                }
                Some(result) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "collection run panicked");
                    }
                }
            }
        }

        let remaining = runs.len();
        if remaining > 0 {
            info!(remaining, "waiting for in-flight runs to finish");
            while let Some(result) = runs.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "collection run panicked during drain");
                }
            }
        }
    }
}

async fn execute_run(
    collector: Arc<Collector>,
    deadline: Duration,
    status: Option<Arc<StatusTracker>>,
) {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let t = Instant::now();
    if let Some(status) = &status {
        status.run_started().await;
    }
    info!(run_id = %run_id, "collection run started");

    let result = tokio::time::timeout(deadline, collector.run_once(run_id)).await;
    let duration_ms = t.elapsed().as_millis() as u64;
    let result = match result {
        Ok(Ok(summary)) => {
            info!(
                run_id = %run_id,
                listed = summary.listed,
                recorded = summary.recorded,
                new_identities = summary.new_identities,
                skipped = summary.skipped,
                duration_ms,
                "collection run finished"
            );
            Ok(summary)
        }
        Ok(Err(e)) => {
            error!(run_id = %run_id, error = %e, duration_ms, "collection run failed");
            Err(e.to_string())
        }
        Err(_) => {
            warn!(
                run_id = %run_id,
                timeout_secs = deadline.as_secs(),
                "collection run timed out, abandoning it"
            );
            Err(format!("timed out after {}s", deadline.as_secs()))
        }
    };

    if let Some(status) = &status {
        status
            .run_finished(LastRun::finished(run_id, started_at, duration_ms, result))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use cri_api::RuntimeClient;
    use usage_store::UsageStore;

    use super::*;
    use crate::enumerator::{Enumerator, SandboxQuery};
    use crate::testing::{FakeRuntime, MemoryStore, sandbox};

    const INTERVAL: Duration = Duration::from_secs(60);

    fn scheduler(runtime: &Arc<FakeRuntime>, store: &Arc<MemoryStore>) -> Scheduler {
        let enumerator = Enumerator::new(
            runtime.clone() as Arc<dyn RuntimeClient>,
            &SandboxQuery::default(),
        );
        let collector = Collector::new(enumerator, store.clone() as Arc<dyn UsageStore>);
        Scheduler::new(Arc::new(collector), INTERVAL)
    }

    fn start(scheduler: Scheduler) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });
        (shutdown, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn one_sample_per_tick() {
        let runtime = Arc::new(FakeRuntime::new(vec![sandbox("a", "web", "shop", 1)]));
        let store = Arc::new(MemoryStore::default());
        let (shutdown, handle) = start(scheduler(&runtime, &store));

        // No run before the first interval has elapsed.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runtime.list_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2 + 60 * 2)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(runtime.list_calls(), 3);
        assert_eq!(store.sample_count().await.unwrap(), 3);
        assert_eq!(store.identities().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_enumeration_does_not_stop_ticking() {
        let runtime = Arc::new(FakeRuntime::new(vec![sandbox("a", "web", "shop", 1)]));
        runtime.fail_list(true);
        let store = Arc::new(MemoryStore::default());
        let (shutdown, handle) = start(scheduler(&runtime, &store));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(runtime.list_calls(), 1);
        assert_eq!(store.sample_count().await.unwrap(), 0);

        runtime.fail_list(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(runtime.list_calls(), 2);
        assert_eq!(store.sample_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_in_flight_run() {
        let runtime = Arc::new(FakeRuntime::new(vec![sandbox("a", "web", "shop", 1)]));
        runtime.set_list_delay(Duration::from_secs(30));
        let store = Arc::new(MemoryStore::default());
        let (shutdown, handle) = start(scheduler(&runtime, &store));

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(runtime.list_calls(), 1);
        assert_eq!(store.sample_count().await.unwrap(), 0);

        shutdown.cancel();
        handle.await.unwrap();

        // The run started before shutdown completed; no new run was started.
        assert_eq!(runtime.list_calls(), 1);
        assert_eq!(store.sample_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_run_is_cut_off_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status.json");
        let runtime = Arc::new(FakeRuntime::new(vec![sandbox("a", "web", "shop", 1)]));
        runtime.set_list_delay(Duration::from_secs(90));
        let store = Arc::new(MemoryStore::default());
        let status = Arc::new(StatusTracker::new(status_path.clone()));
        let (shutdown, handle) = start(scheduler(&runtime, &store).with_status(status));

        // First run starts at 60s and is abandoned at 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(store.sample_count().await.unwrap(), 0);
        let status: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&status_path).unwrap()).unwrap();
        assert!(
            status["last_run"]["error"]
                .as_str()
                .unwrap()
                .contains("timed out"),
            "got: {status}"
        );
    }
}
