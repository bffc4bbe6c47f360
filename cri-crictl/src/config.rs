use std::path::PathBuf;
use std::time::Duration;

/// Endpoints probed in order when none is configured.
pub const DEFAULT_RUNTIME_ENDPOINTS: &[&str] = &[
    "unix:///run/containerd/containerd.sock",
    "unix:///run/crio/crio.sock",
    "unix:///var/run/cri-dockerd.sock",
];

/// Per-call timeout handed to crictl when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct CrictlConfig {
    /// Path to the crictl binary. Resolved from `PATH` when unset.
    pub binary: Option<PathBuf>,
    /// CRI endpoint (e.g. `unix:///run/containerd/containerd.sock`).
    /// When unset, [`DEFAULT_RUNTIME_ENDPOINTS`] are probed in order.
    pub runtime_endpoint: Option<String>,
    /// Connection/request timeout passed to crictl.
    pub timeout: Duration,
}

impl Default for CrictlConfig {
    fn default() -> Self {
        Self {
            binary: None,
            runtime_endpoint: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
