//! Error types for the privileged host side

/// Errors from host store and bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("host store parse error: {0}")]
    Parse(String),

    #[error("boundary error: {0}")]
    Boundary(String),
}

/// Result alias for host operations.
pub type Result<T> = std::result::Result<T, Error>;
