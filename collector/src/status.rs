use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::collector::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorMode {
    Running,
    Stopping,
    Stopped,
}

/// Outcome of the most recently finished run.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub run_id: Uuid,
    #[serde(serialize_with = "serialize_iso")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub listed: usize,
    pub recorded: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LastRun {
    pub fn finished(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        result: Result<RunSummary, String>,
    ) -> Self {
        let (summary, error) = match result {
            Ok(summary) => (summary, None),
            Err(e) => (RunSummary::default(), Some(e)),
        };
        Self {
            run_id,
            started_at,
            duration_ms,
            listed: summary.listed,
            recorded: summary.recorded,
            skipped: summary.skipped,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct CollectorStatus<'a> {
    mode: CollectorMode,
    active_runs: usize,
    total_runs: u64,
    last_run: Option<&'a LastRun>,
    #[serde(serialize_with = "serialize_iso")]
    started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_iso")]
    updated_at: DateTime<Utc>,
}

/// Serialize as RFC 3339 UTC with millisecond precision.
fn serialize_iso<S: serde::Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Persists daemon state to `status.json`, atomically on every change.
///
/// Share via `Arc<StatusTracker>`.
pub struct StatusTracker {
    started_at: DateTime<Utc>,
    path: PathBuf,
    state: Mutex<MutableState>,
}

struct MutableState {
    mode: CollectorMode,
    active_runs: usize,
    total_runs: u64,
    last_run: Option<LastRun>,
}

impl StatusTracker {
    pub fn new(path: PathBuf) -> Self {
        Self {
            started_at: Utc::now(),
            path,
            state: Mutex::new(MutableState {
                mode: CollectorMode::Running,
                active_runs: 0,
                total_runs: 0,
                last_run: None,
            }),
        }
    }

    pub async fn write_initial(&self) {
        let state = self.state.lock().await;
        self.write_status(&state).await;
    }

    pub async fn set_mode(&self, mode: CollectorMode) {
        let mut state = self.state.lock().await;
        state.mode = mode;
        self.write_status(&state).await;
    }

    pub async fn run_started(&self) {
        let mut state = self.state.lock().await;
        state.active_runs += 1;
        state.total_runs += 1;
        self.write_status(&state).await;
    }

    pub async fn run_finished(&self, run: LastRun) {
        let mut state = self.state.lock().await;
        state.active_runs = state.active_runs.saturating_sub(1);
        state.last_run = Some(run);
        self.write_status(&state).await;
    }

    /// Write to a temp file in the same directory, then rename.
    async fn write_status(&self, state: &MutableState) {
        let status = CollectorStatus {
            mode: state.mode,
            active_runs: state.active_runs,
            total_runs: state.total_runs,
            last_run: state.last_run.as_ref(),
            started_at: self.started_at,
            updated_at: Utc::now(),
        };

        let json = match serde_json::to_string_pretty(&status) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize status");
                return;
            }
        };

        let tmp = self.path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&tmp, json.as_bytes()).await {
            warn!(error = %e, path = %tmp.display(), "failed to write status temp file");
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(error = %e, path = %self.path.display(), "failed to rename status file");
        }
    }
}
