use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::UsageStore;

pub const DEFAULT_COMPACT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawn the background compaction loop.
///
/// Runs [`UsageStore::compact`] every `interval` (first run one interval
/// after start) until `shutdown` is cancelled. Failures are logged and the
/// loop carries on.
pub fn spawn_compaction(
    store: Arc<dyn UsageStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let t = Instant::now();
                    match store.compact().await {
                        Ok(()) => info!(
                            duration_ms = t.elapsed().as_millis() as u64,
                            "usage store compacted"
                        ),
                        Err(e) => warn!(error = %e, "usage store compaction failed"),
                    }
                }
            }
        }
    })
}
