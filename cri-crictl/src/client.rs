use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use cri_api::{
    PodSandboxStats, RuntimeClient, RuntimeError, RuntimeVersion, SandboxDescriptor,
    SandboxFilter, StatsFilter,
};
use tracing::{debug, info, warn};

use crate::command::exec;
use crate::config::{CrictlConfig, DEFAULT_RUNTIME_ENDPOINTS};
use crate::prerequisites::{check_prerequisites, socket_path};
use crate::wire;

/// [`RuntimeClient`] that shells out to `crictl` against one CRI endpoint.
#[derive(Debug, Clone)]
pub struct CrictlClient {
    binary: PathBuf,
    endpoint: String,
    timeout: Duration,
}

impl CrictlClient {
    /// Build a client without checking anything. Prefer [`CrictlClient::connect`].
    pub fn new(binary: PathBuf, endpoint: String, timeout: Duration) -> Self {
        Self {
            binary,
            endpoint,
            timeout,
        }
    }

    /// Check prerequisites and probe the runtime with `crictl version`.
    ///
    /// Without a configured endpoint the default endpoints are probed in
    /// order and the first that answers is used.
    pub async fn connect(config: CrictlConfig) -> cri_api::Result<Self> {
        let binary = check_prerequisites(&config)?;

        if let Some(endpoint) = config.runtime_endpoint {
            let client = Self::new(binary, endpoint, config.timeout);
            let version = client
                .version()
                .await
                .map_err(|e| RuntimeError::Unavailable(format!("{}: {e}", client.endpoint)))?;
            info!(
                endpoint = %client.endpoint,
                runtime = %version.runtime_name,
                runtime_version = %version.runtime_version,
                "connected to container runtime"
            );
            return Ok(client);
        }

        warn!(
            endpoints = ?DEFAULT_RUNTIME_ENDPOINTS,
            "runtime endpoint not set, probing default endpoints; set it explicitly instead"
        );
        let mut failures = Vec::new();
        for endpoint in DEFAULT_RUNTIME_ENDPOINTS {
            if let Some(socket) = socket_path(endpoint)
                && !socket.exists()
            {
                debug!(endpoint, "socket missing, skipping");
                failures.push(format!("{endpoint}: socket not found"));
                continue;
            }
            let client = Self::new(binary.clone(), (*endpoint).to_string(), config.timeout);
            match client.version().await {
                Ok(version) => {
                    info!(
                        endpoint,
                        runtime = %version.runtime_name,
                        runtime_version = %version.runtime_version,
                        "connected to container runtime"
                    );
                    return Ok(client);
                }
                Err(e) => {
                    debug!(endpoint, error = %e, "endpoint probe failed");
                    failures.push(format!("{endpoint}: {e}"));
                }
            }
        }
        Err(RuntimeError::Unavailable(failures.join("; ")))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Global flags followed by the subcommand arguments.
    fn command_args(&self, sub: &[String]) -> Vec<String> {
        let mut args = vec![
            "--runtime-endpoint".to_string(),
            self.endpoint.clone(),
            "--timeout".to_string(),
            format!("{}s", self.timeout.as_secs().max(1)),
        ];
        args.extend_from_slice(sub);
        args
    }

    async fn run(&self, sub: &[String]) -> cri_api::Result<String> {
        exec(&self.binary, &self.command_args(sub))
            .await
            .map_err(|e| RuntimeError::Request(e.to_string()))
    }
}

fn pods_args(filter: &SandboxFilter) -> Vec<String> {
    let mut args = vec!["pods".to_string(), "-o".to_string(), "json".to_string()];
    if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
        args.push("--id".to_string());
        args.push(id.to_string());
    }
    if let Some(state) = filter.state {
        args.push("--state".to_string());
        args.push(state.as_filter_str().to_string());
    }
    for (key, value) in &filter.label_selector {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    args
}

fn statsp_args(filter: &StatsFilter) -> Vec<String> {
    let mut args = vec!["statsp".to_string(), "-o".to_string(), "json".to_string()];
    if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
        args.push("--id".to_string());
        args.push(id.to_string());
    }
    args
}

#[async_trait]
impl RuntimeClient for CrictlClient {
    fn name(&self) -> &str {
        "crictl"
    }

    async fn version(&self) -> cri_api::Result<RuntimeVersion> {
        let out = self.run(&["version".to_string()]).await?;
        wire::parse_version(&out)
    }

    async fn list_sandboxes(&self, filter: &SandboxFilter) -> cri_api::Result<Vec<SandboxDescriptor>> {
        debug!(?filter, "list pod sandboxes");
        let out = self.run(&pods_args(filter)).await?;
        wire::decode_pods(&out)
    }

    async fn list_sandbox_stats(
        &self,
        filter: &StatsFilter,
    ) -> cri_api::Result<Vec<PodSandboxStats>> {
        debug!(?filter, "list pod sandbox stats");
        let out = self.run(&statsp_args(filter)).await?;
        wire::decode_stats(&out)
    }
}
