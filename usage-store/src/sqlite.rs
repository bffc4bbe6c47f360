use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cri_api::SandboxState;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::records::{IdentityOutcome, IdentityRecord, StoredSample, UsageSample};
use crate::store::UsageStore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identity_records (
    uid TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_records_uid ON identity_records(uid);
CREATE INDEX IF NOT EXISTS idx_identity_records_first_seen_at ON identity_records(first_seen_at);

CREATE TABLE IF NOT EXISTS usage_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    observed_at INTEGER NOT NULL,
    uid TEXT NOT NULL,
    state INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_samples_observed_at ON usage_samples(observed_at);
CREATE INDEX IF NOT EXISTS idx_usage_samples_uid ON usage_samples(uid);
";

/// SQLite-backed [`UsageStore`].
///
/// SQLite allows one writer at a time, so every operation runs on a blocking
/// thread while holding the single connection's mutex. Clones share the
/// connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!(path = %path.display(), "usage store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` on a blocking thread with exclusive access to the connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let open_err = |detail: String| StoreError::Open {
        path: path.display().to_string(),
        detail,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| open_err(e.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|e| open_err(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| open_err(e.to_string()))?;
    conn.execute_batch(SCHEMA)
        .map_err(|e| open_err(format!("schema: {e}")))?;
    Ok(conn)
}

fn ensure_identity_locked(conn: &Connection, record: &IdentityRecord) -> Result<IdentityOutcome> {
    // Only "no row" means absent. Any other failure propagates so the caller
    // never mistakes a broken store for an existing identity.
    let existing: Option<String> = conn
        .query_row(
            "SELECT uid FROM identity_records WHERE uid = ?1",
            params![record.uid],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(IdentityOutcome::AlreadyExists);
    }
    insert_identity(conn, record)
}

/// Insert an identity row, mapping a unique-index violation on `uid` to
/// [`IdentityOutcome::AlreadyExists`].
fn insert_identity(conn: &Connection, record: &IdentityRecord) -> Result<IdentityOutcome> {
    match conn.execute(
        "INSERT INTO identity_records (uid, first_seen_at) VALUES (?1, ?2)",
        params![record.uid, record.first_seen_at],
    ) {
        Ok(_) => Ok(IdentityOutcome::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Ok(IdentityOutcome::AlreadyExists)
        }
        Err(e) => Err(e.into()),
    }
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn ensure_identity(&self, record: &IdentityRecord) -> Result<IdentityOutcome> {
        let record = record.clone();
        self.with_conn(move |conn| ensure_identity_locked(conn, &record))
            .await
    }

    async fn append_sample(&self, sample: &UsageSample) -> Result<i64> {
        let sample = sample.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO usage_samples (observed_at, uid, state) VALUES (?1, ?2, ?3)",
                params![sample.observed_at, sample.uid, sample.state.code()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn compact(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
        .await
    }

    async fn identity(&self, uid: &str) -> Result<Option<IdentityRecord>> {
        let uid = uid.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT uid, first_seen_at FROM identity_records WHERE uid = ?1",
                    params![uid],
                    |row| {
                        Ok(IdentityRecord {
                            uid: row.get(0)?,
                            first_seen_at: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn identities(&self) -> Result<Vec<IdentityRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uid, first_seen_at FROM identity_records ORDER BY first_seen_at, uid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(IdentityRecord {
                        uid: row.get(0)?,
                        first_seen_at: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn samples(&self, uid: &str) -> Result<Vec<StoredSample>> {
        let uid = uid.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, observed_at, uid, state FROM usage_samples WHERE uid = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![uid], row_to_sample)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, observed_at, uid, code)| {
                    let state = SandboxState::from_code(code).ok_or_else(|| {
                        StoreError::Corrupt(format!("usage_samples.id={id}: unknown state {code}"))
                    })?;
                    Ok(StoredSample {
                        id,
                        sample: UsageSample {
                            uid,
                            observed_at,
                            state,
                        },
                    })
                })
                .collect()
        })
        .await
    }

    async fn sample_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM usage_samples", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}
