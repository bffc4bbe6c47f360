use chrono::Utc;
use cri_api::SandboxDescriptor;
use usage_store::{IdentityRecord, UsageSample};

/// Current UTC wall clock in UNIX seconds.
pub fn wall_clock_secs() -> i64 {
    Utc::now().timestamp()
}

/// Build the identity and sample for one observation. Both carry `observed_at`.
pub fn build(sandbox: &SandboxDescriptor, observed_at: i64) -> (IdentityRecord, UsageSample) {
    (
        IdentityRecord {
            uid: sandbox.uid.clone(),
            first_seen_at: observed_at,
        },
        UsageSample {
            uid: sandbox.uid.clone(),
            observed_at,
            state: sandbox.state,
        },
    )
}
