#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("config error: {0}")]
    Config(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] cri_api::RuntimeError),

    #[error("list sandboxes: {0}")]
    Enumerate(#[source] cri_api::RuntimeError),

    #[error("store error: {0}")]
    Store(#[from] usage_store::StoreError),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CollectorResult<T> = Result<T, CollectorError>;
