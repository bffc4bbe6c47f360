use std::path::PathBuf;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{CollectorError, CollectorResult};

/// Take the exclusive instance lock without waiting.
///
/// Fails if another collector already holds it. The guard holds the lock
/// until dropped.
pub async fn acquire(path: PathBuf) -> CollectorResult<Flock<std::fs::File>> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::options()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CollectorError::Lock(format!("open {}: {e}", path.display())))?;
        Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_file, e)| match e {
            Errno::EWOULDBLOCK => CollectorError::Lock(format!(
                "{} is held by another collector",
                path.display()
            )),
            e => CollectorError::Lock(format!("flock {}: {e}", path.display())),
        })
    })
    .await
    .map_err(|e| CollectorError::Internal(format!("lock task: {e}")))?
}
