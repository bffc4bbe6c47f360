//! Persistence for pod usage collection.
//!
//! Two tables: `identity_records` holds one first-seen row per pod uid,
//! `usage_samples` is an append-only time series. [`UsageStore`] is the
//! contract the collector writes through; [`SqliteStore`] implements it.

mod compaction;
mod error;
mod records;
mod sqlite;
mod store;

pub use compaction::{DEFAULT_COMPACT_INTERVAL, spawn_compaction};
pub use error::{Result, StoreError};
pub use records::{IdentityOutcome, IdentityRecord, StoredSample, UsageSample};
pub use sqlite::SqliteStore;
pub use store::UsageStore;
