//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Authentication tag or associated data did not verify
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored text field is not valid base64
    #[error("Encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Key material error from the core crate
    #[error(transparent)]
    Core(#[from] shade_core::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for shade_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::DecryptionFailed => shade_core::Error::DecryptionFailed,
            Error::Core(inner) => inner,
            other => shade_core::Error::Storage(other.to_string()),
        }
    }
}
