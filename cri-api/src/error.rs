#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime not available: {0}")]
    Unavailable(String),

    #[error("runtime request failed: {0}")]
    Request(String),

    #[error("decode runtime response: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
