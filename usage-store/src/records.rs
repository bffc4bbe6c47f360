use cri_api::SandboxState;
use serde::Serialize;

/// First-seen marker for a pod uid. Written at most once per uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub uid: String,
    /// Wall-clock UNIX seconds of the first successful observation.
    pub first_seen_at: i64,
}

/// One observation of a sandbox's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSample {
    pub uid: String,
    /// Wall-clock UNIX seconds at collection time.
    pub observed_at: i64,
    pub state: SandboxState,
}

/// A persisted sample together with its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSample {
    pub id: i64,
    #[serde(flatten)]
    pub sample: UsageSample,
}

/// Result of [`crate::UsageStore::ensure_identity`]. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    Inserted,
    /// A record for the uid was already present, either found by the
    /// existence check or reported by the unique constraint on insert.
    AlreadyExists,
}
