use async_trait::async_trait;

use crate::error::Result;
use crate::records::{IdentityOutcome, IdentityRecord, StoredSample, UsageSample};

/// Storage contract for usage collection.
///
/// Implementations own all locking: any number of tasks may call any method
/// concurrently, including `ensure_identity` for the same uid.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Insert the identity record unless one already exists for its uid.
    ///
    /// A failed existence check is returned as an error, never treated as
    /// "exists". A unique-constraint violation on insert means another writer
    /// won the race and is reported as [`IdentityOutcome::AlreadyExists`].
    async fn ensure_identity(&self, record: &IdentityRecord) -> Result<IdentityOutcome>;
    /// Append a sample. Always inserts a new row; returns its id.
    async fn append_sample(&self, sample: &UsageSample) -> Result<i64>;
    /// Reclaim free space.
    async fn compact(&self) -> Result<()>;

    async fn identity(&self, uid: &str) -> Result<Option<IdentityRecord>>;
    /// All identities ordered by first-seen time, then uid.
    async fn identities(&self) -> Result<Vec<IdentityRecord>>;
    /// Samples for one uid in insertion order.
    async fn samples(&self, uid: &str) -> Result<Vec<StoredSample>>;
    async fn sample_count(&self) -> Result<u64>;
}
