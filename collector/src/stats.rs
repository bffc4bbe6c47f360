use std::sync::Arc;

use cri_api::{PodSandboxStats, RuntimeClient, RuntimeError, StatsFilter};
use tracing::debug;

/// Per-sandbox stats failure. Always soft: the run skips the sandbox.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("sandbox stats: {0}")]
    Runtime(#[source] RuntimeError),

    #[error("expected stats for exactly one sandbox {id}, got {count}")]
    Cardinality { id: String, count: usize },
}

pub struct StatsFetcher {
    client: Arc<dyn RuntimeClient>,
}

impl StatsFetcher {
    pub fn new(client: Arc<dyn RuntimeClient>) -> Self {
        Self { client }
    }

    /// Fetch stats for exactly one sandbox.
    pub async fn fetch(&self, sandbox_id: &str) -> Result<PodSandboxStats, StatsError> {
        let mut stats = self
            .client
            .list_sandbox_stats(&StatsFilter::for_id(sandbox_id))
            .await
            .map_err(StatsError::Runtime)?;
        let count = stats.len();
        match stats.pop() {
            Some(stats) if count == 1 => {
                log_usage(&stats);
                Ok(stats)
            }
            _ => Err(StatsError::Cardinality {
                id: sandbox_id.to_string(),
                count,
            }),
        }
    }
}

fn log_usage(stats: &PodSandboxStats) {
    let Some(linux) = &stats.linux else {
        return;
    };
    if let Some(cpu) = &linux.cpu {
        debug!(
            id = %stats.id,
            usage_core_nano_seconds = cpu.usage_core_nano_seconds,
            usage_nano_cores = cpu.usage_nano_cores,
            "cpu usage"
        );
    }
    if let Some(memory) = &linux.memory {
        debug!(
            id = %stats.id,
            working_set_bytes = memory.working_set_bytes,
            usage_bytes = memory.usage_bytes,
            rss_bytes = memory.rss_bytes,
            "memory usage"
        );
    }
}
