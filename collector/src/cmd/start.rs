use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use cri_api::RuntimeClient;
use cri_crictl::CrictlClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use usage_store::{SqliteStore, UsageStore, spawn_compaction};

use crate::collector::Collector;
use crate::config::{self, CollectorConfig, FileConfig};
use crate::enumerator::Enumerator;
use crate::error::{CollectorError, CollectorResult};
use crate::lock;
use crate::paths::CollectorPaths;
use crate::scheduler::Scheduler;
use crate::status::{CollectorMode, StatusTracker};

#[derive(Args)]
pub struct StartArgs {
    /// YAML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Directory for usage.db, usage.lock and status.json
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// CRI endpoint, e.g. unix:///run/containerd/containerd.sock
    #[arg(long, short = 'r', env = "CONTAINER_RUNTIME_ENDPOINT")]
    runtime_endpoint: Option<String>,
    /// Seconds between collection runs (also the per-run deadline)
    #[arg(long)]
    poll_interval_secs: Option<u64>,
    /// Only collect sandboxes with these labels (key=value, comma separated, repeatable)
    #[arg(long = "filter-label")]
    filter_labels: Vec<String>,
}

impl StartArgs {
    /// CLI values win over the YAML file.
    fn apply_to(&self, file: &mut FileConfig) -> CollectorResult<()> {
        if let Some(base_dir) = &self.base_dir {
            file.base_dir.clone_from(base_dir);
        }
        if let Some(endpoint) = &self.runtime_endpoint {
            file.runtime.endpoint = Some(endpoint.clone());
        }
        if let Some(secs) = self.poll_interval_secs {
            file.poll_interval_secs = secs;
        }
        file.filter
            .labels
            .extend(config::parse_label_pairs(&self.filter_labels)?);
        Ok(())
    }
}

/// Build the config from file and flags, then run until SIGTERM/SIGINT.
pub async fn run_start(args: StartArgs) -> CollectorResult<()> {
    let mut file = match &args.config {
        Some(path) => config::load(path).await?,
        None => FileConfig::default(),
    };
    args.apply_to(&mut file)?;
    let config = file.validate()?;
    run(config).await
}

async fn run(config: CollectorConfig) -> CollectorResult<()> {
    tokio::fs::create_dir_all(&config.base_dir)
        .await
        .map_err(|e| {
            CollectorError::Config(format!("create dir {}: {e}", config.base_dir.display()))
        })?;
    let paths = CollectorPaths::new(config.base_dir.clone());

    let _lock = lock::acquire(paths.lock()).await?;

    let client: Arc<dyn RuntimeClient> =
        Arc::new(CrictlClient::connect(config.crictl.clone()).await?);

    let store: Arc<dyn UsageStore> = Arc::new(SqliteStore::open(paths.database()).await?);
    info!(path = %paths.database().display(), "usage store opened");

    let status = Arc::new(StatusTracker::new(paths.status()));
    status.write_initial().await;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone(), Arc::clone(&status)));

    let compaction = spawn_compaction(
        Arc::clone(&store),
        config.compact_interval,
        shutdown.clone(),
    );

    let collector = Arc::new(Collector::new(
        Enumerator::new(client, &config.query),
        store,
    ));
    Scheduler::new(collector, config.poll_interval)
        .with_status(Arc::clone(&status))
        .run(shutdown.clone())
        .await;

    if let Err(e) = compaction.await {
        error!(error = %e, "compaction task panicked");
    }
    status.set_mode(CollectorMode::Stopped).await;
    info!(base_dir = %paths.base_dir().display(), "collector stopped");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken, status: Arc<StatusTracker>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();

    tokio::select! {
        _ = recv_signal(&mut sigterm) => info!("received SIGTERM, stopping"),
        _ = recv_signal(&mut sigint) => info!("received SIGINT, stopping"),
        _ = shutdown.cancelled() => return,
    }
    status.set_mode(CollectorMode::Stopping).await;
    shutdown.cancel();
}

/// Await a signal if registered, or pend forever if registration failed.
async fn recv_signal(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}
