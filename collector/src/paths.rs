use std::path::PathBuf;

/// Collector paths derived from the base directory.
pub struct CollectorPaths {
    base_dir: PathBuf,
}

impl CollectorPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    pub fn database(&self) -> PathBuf {
        self.base_dir.join("usage.db")
    }

    pub fn lock(&self) -> PathBuf {
        self.base_dir.join("usage.lock")
    }

    pub fn status(&self) -> PathBuf {
        self.base_dir.join("status.json")
    }
}
