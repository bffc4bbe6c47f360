use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use cri_api::{RuntimeClient, SandboxDescriptor, SandboxState};
use cri_crictl::{CrictlClient, CrictlConfig};
use serde::Serialize;
use tracing::{info, warn};

use super::{OutputFormat, format_unix_nanos, render_table};
use crate::config::{self, DEFAULT_RUNTIME_TIMEOUT_SECS};
use crate::enumerator::{Enumerator, SandboxQuery, Selection};
use crate::error::{CollectorError, CollectorResult};
use crate::stats::StatsFetcher;

const TRUNCATED_ID_LEN: usize = 13;

#[derive(Args)]
pub struct PodsArgs {
    /// CRI endpoint, e.g. unix:///run/containerd/containerd.sock
    #[arg(long, short = 'r', env = "CONTAINER_RUNTIME_ENDPOINT")]
    runtime_endpoint: Option<String>,
    /// Filter by pod id
    #[arg(long)]
    id: Option<String>,
    /// Filter by pod name regular expression
    #[arg(long)]
    name: Option<String>,
    /// Filter by pod namespace regular expression
    #[arg(long)]
    namespace: Option<String>,
    /// Filter by pod state (ready or notready)
    #[arg(long, short = 's')]
    state: Option<String>,
    /// Filter by key=value label (repeatable)
    #[arg(long)]
    label: Vec<String>,
    /// Show the most recently created pod
    #[arg(long, short = 'l')]
    latest: bool,
    /// Show the last n recently created pods
    #[arg(long, short = 'n', default_value_t = 0)]
    last: usize,
    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Only print pod ids
    #[arg(long, short = 'q')]
    quiet: bool,
    /// Do not truncate output
    #[arg(long)]
    no_trunc: bool,
    /// Also fetch and log cpu/memory stats for every listed pod
    #[arg(long)]
    stats: bool,
}

impl PodsArgs {
    fn query(&self) -> CollectorResult<SandboxQuery> {
        let state = match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<SandboxState>()
                    .map_err(|e| CollectorError::Config(e.to_string()))?,
            ),
            None => None,
        };
        Ok(SandboxQuery {
            id: self.id.clone().filter(|id| !id.is_empty()),
            state,
            labels: config::parse_label_pairs(&self.label)?,
            name_pattern: self.name.clone(),
            namespace_pattern: self.namespace.clone(),
            selection: Selection::from_flags(self.latest, self.last),
        })
    }
}

#[derive(Serialize)]
struct PodList<'a> {
    items: &'a [SandboxDescriptor],
}

/// List sandboxes once with the collector's filter semantics.
pub async fn run_pods(args: PodsArgs) -> CollectorResult<()> {
    let query = args.query()?;
    let client = CrictlClient::connect(CrictlConfig {
        binary: None,
        runtime_endpoint: args.runtime_endpoint.clone().filter(|e| !e.is_empty()),
        timeout: Duration::from_secs(DEFAULT_RUNTIME_TIMEOUT_SECS),
    })
    .await?;
    let client: Arc<dyn RuntimeClient> = Arc::new(client);

    let sandboxes = Enumerator::new(Arc::clone(&client), &query).list().await?;

    if args.stats {
        log_stats(&StatsFetcher::new(client), &sandboxes).await;
    }

    let out = match args.output {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&PodList { items: &sandboxes })
                .map_err(|e| CollectorError::Internal(format!("encode pods: {e}")))?;
            json.push('\n');
            json
        }
        OutputFormat::Table if args.quiet => sandboxes
            .iter()
            .map(|s| format!("{}\n", s.id))
            .collect(),
        OutputFormat::Table => pods_table(&sandboxes, args.no_trunc),
    };
    print!("{out}");
    Ok(())
}

async fn log_stats(fetcher: &StatsFetcher, sandboxes: &[SandboxDescriptor]) {
    for sandbox in sandboxes {
        match fetcher.fetch(&sandbox.id).await {
            Ok(stats) => {
                let linux = stats.linux.unwrap_or_default();
                let cpu = linux.cpu.unwrap_or_default();
                let memory = linux.memory.unwrap_or_default();
                info!(
                    id = %sandbox.id,
                    name = %sandbox.name,
                    namespace = %sandbox.namespace,
                    uid = %sandbox.uid,
                    usage_core_nano_seconds = cpu.usage_core_nano_seconds,
                    working_set_bytes = memory.working_set_bytes,
                    "sandbox stats"
                );
            }
            Err(e) => warn!(id = %sandbox.id, error = %e, "failed to get sandbox stats"),
        }
    }
}

fn pods_table(sandboxes: &[SandboxDescriptor], no_trunc: bool) -> String {
    let rows: Vec<Vec<String>> = sandboxes
        .iter()
        .map(|s| {
            let id = if no_trunc {
                s.id.clone()
            } else {
                s.id.chars().take(TRUNCATED_ID_LEN).collect()
            };
            vec![
                id,
                format_unix_nanos(s.created_at),
                s.state.as_cri_str().to_string(),
                s.name.clone(),
                s.namespace.clone(),
                s.attempt.to_string(),
            ]
        })
        .collect();
    render_table(
        &["POD ID", "CREATED", "STATE", "NAME", "NAMESPACE", "ATTEMPT"],
        &rows,
    )
}
