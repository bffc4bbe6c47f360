use async_trait::async_trait;

use crate::error::Result;
use crate::filter::{SandboxFilter, StatsFilter};
use crate::types::{PodSandboxStats, RuntimeVersion, SandboxDescriptor};

/// Read-only view of a container runtime, as much of it as usage
/// collection needs.
///
/// Implementations may block on a remote call; callers that put a deadline
/// on these futures only stop waiting, the remote side may keep running.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Human-readable name for this client implementation (e.g. "crictl").
    fn name(&self) -> &str;
    /// Query the runtime's version. Used as a connectivity probe at startup.
    async fn version(&self) -> Result<RuntimeVersion>;
    /// List pod sandboxes matching the coarse server-side filter.
    async fn list_sandboxes(&self, filter: &SandboxFilter) -> Result<Vec<SandboxDescriptor>>;
    /// List usage statistics for the sandboxes matching `filter`.
    async fn list_sandbox_stats(&self, filter: &StatsFilter) -> Result<Vec<PodSandboxStats>>;
}
