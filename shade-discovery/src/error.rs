//! Error types for payment discovery

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ledger query failed
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Operation cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Invalid scan parameters
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Scan task panicked or was aborted
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Core error
    #[error(transparent)]
    Core(#[from] shade_core::Error),
}

impl From<Error> for shade_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            Error::Ledger(msg) => shade_core::Error::Ledger(msg),
            other => shade_core::Error::Other(other.to_string()),
        }
    }
}
