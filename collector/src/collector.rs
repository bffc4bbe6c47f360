use std::sync::Arc;

use cri_api::SandboxDescriptor;
use serde::Serialize;
use tracing::{debug, info, warn};
use usage_store::{IdentityOutcome, UsageStore};
use uuid::Uuid;

use crate::enumerator::Enumerator;
use crate::error::CollectorResult;
use crate::record;
use crate::stats::StatsFetcher;

/// Why a sandbox produced no sample in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The runtime reported no uid for the sandbox.
    MissingUid,
    Stats,
    Identity,
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxOutcome {
    Recorded { identity: IdentityOutcome },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub listed: usize,
    pub recorded: usize,
    pub new_identities: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn tally(&mut self, outcome: SandboxOutcome) {
        match outcome {
            SandboxOutcome::Recorded { identity } => {
                self.recorded += 1;
                if identity == IdentityOutcome::Inserted {
                    self.new_identities += 1;
                }
            }
            SandboxOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// One collection pass: enumerate, fetch stats, persist identity and sample.
///
/// Immutable after construction, so overlapping runs share it through an `Arc`.
pub struct Collector {
    enumerator: Enumerator,
    stats: StatsFetcher,
    store: Arc<dyn UsageStore>,
}

impl Collector {
    pub fn new(enumerator: Enumerator, store: Arc<dyn UsageStore>) -> Self {
        let stats = StatsFetcher::new(Arc::clone(enumerator.client()));
        Self {
            enumerator,
            stats,
            store,
        }
    }

    /// An enumeration failure ends the run before anything is written.
    /// Per-sandbox failures are counted as skips.
    pub async fn run_once(&self, run_id: Uuid) -> CollectorResult<RunSummary> {
        let sandboxes = self.enumerator.list().await?;
        let mut summary = RunSummary {
            listed: sandboxes.len(),
            ..RunSummary::default()
        };
        debug!(run_id = %run_id, count = sandboxes.len(), "sandboxes listed");

        for sandbox in &sandboxes {
            summary.tally(self.handle_sandbox(run_id, sandbox).await);
        }
        Ok(summary)
    }

    pub async fn handle_sandbox(&self, run_id: Uuid, sandbox: &SandboxDescriptor) -> SandboxOutcome {
        if sandbox.uid.is_empty() {
            warn!(
                run_id = %run_id,
                id = %sandbox.id,
                name = %sandbox.name,
                namespace = %sandbox.namespace,
                "sandbox has no uid, skipping"
            );
            return SandboxOutcome::Skipped(SkipReason::MissingUid);
        }

        if let Err(e) = self.stats.fetch(&sandbox.id).await {
            warn!(
                run_id = %run_id,
                id = %sandbox.id,
                name = %sandbox.name,
                namespace = %sandbox.namespace,
                uid = %sandbox.uid,
                error = %e,
                "failed to get sandbox stats, skipping"
            );
            return SandboxOutcome::Skipped(SkipReason::Stats);
        }

        let (identity, sample) = record::build(sandbox, record::wall_clock_secs());

        let identity = match self.store.ensure_identity(&identity).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    id = %sandbox.id,
                    name = %sandbox.name,
                    namespace = %sandbox.namespace,
                    uid = %sandbox.uid,
                    error = %e,
                    "failed to record pod identity, skipping sample"
                );
                return SandboxOutcome::Skipped(SkipReason::Identity);
            }
        };

        if let Err(e) = self.store.append_sample(&sample).await {
            warn!(
                run_id = %run_id,
                id = %sandbox.id,
                name = %sandbox.name,
                namespace = %sandbox.namespace,
                uid = %sandbox.uid,
                error = %e,
                "failed to append usage sample"
            );
            return SandboxOutcome::Skipped(SkipReason::Sample);
        }

        if identity == IdentityOutcome::Inserted {
            info!(
                run_id = %run_id,
                id = %sandbox.id,
                name = %sandbox.name,
                namespace = %sandbox.namespace,
                uid = %sandbox.uid,
                "new pod recorded"
            );
        } else {
            debug!(
                run_id = %run_id,
                id = %sandbox.id,
                name = %sandbox.name,
                namespace = %sandbox.namespace,
                uid = %sandbox.uid,
                state = %sample.state,
                "usage sample recorded"
            );
        }
        SandboxOutcome::Recorded { identity }
    }
}
