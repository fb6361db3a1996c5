//! Error types for Shade Core
//!
//! One taxonomy for key derivation, the key manager, the stealth engine and
//! caller input validation. Lower layers (storage, discovery) convert into
//! this type at the wallet boundary.

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Shade Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Salt shorter than the password-hash floor
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// Requested salt length below the floor
    #[error("Invalid salt length: {0} bytes")]
    InvalidSaltLength(usize),

    /// Empty password, or a password that failed to unlock the vault
    #[error("Invalid password")]
    InvalidPassword,

    /// New password rejected by the strength policy
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// Master key of the wrong length
    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    /// Sub-key output length outside 1..=255
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Derived key set failed validation
    #[error("Invalid derived keys: {0}")]
    InvalidDerivedKeys(String),

    /// Ephemeral public key is zero or not a curve point
    #[error("Invalid ephemeral key: {0}")]
    InvalidEphemeralKey(String),

    /// Meta public key is not a curve point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Private key is zero or out of range
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Vault already exists for the account
    #[error("Vault already exists: {0}")]
    AlreadyExists(String),

    /// No vault for the account
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Keys requested while the manager is locked
    #[error("Key manager is locked")]
    Locked,

    /// Vault ciphertext failed authentication
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid ledger address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid hex input
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Input of the wrong length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Malformed ABI payload
    #[error("ABI decode error: {0}")]
    AbiDecode(String),

    /// External signer failure
    #[error("Signer error: {0}")]
    Signer(String),

    /// Ledger access failure
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPassword
                | Error::DecryptionFailed
                | Error::WeakPassword(_)
                | Error::AlreadyExists(_)
                | Error::NotInitialized(_)
                | Error::Locked
                | Error::InvalidAddress(_)
                | Error::InvalidHex(_)
                | Error::InvalidLength { .. }
        )
    }

    /// Get user-friendly error message
    ///
    /// Authentication failures and vault corruption read the same, so the
    /// message cannot be used to tell a wrong password from a damaged record.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidPassword | Error::DecryptionFailed => "Invalid password.".to_string(),
            Error::WeakPassword(reason) => format!("Please choose a stronger password. {}", reason),
            Error::AlreadyExists(_) => {
                "A wallet already exists for this account. Unlock it instead.".to_string()
            }
            Error::NotInitialized(_) => {
                "No wallet was found for this account. Create one first.".to_string()
            }
            Error::Locked => "Your wallet is locked. Unlock it to continue.".to_string(),
            Error::InvalidAddress(_) => {
                "The address is invalid. Please check and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidSalt(_)
            | Error::InvalidSaltLength(_)
            | Error::InvalidMasterKey(_)
            | Error::InvalidKeyLength(_)
            | Error::KeyDerivation(_)
            | Error::InvalidEphemeralKey(_)
            | Error::InvalidPublicKey(_)
            | Error::InvalidPrivateKey(_) => ErrorCategory::Crypto,
            Error::AlreadyExists(_)
            | Error::NotInitialized(_)
            | Error::Locked
            | Error::InvalidDerivedKeys(_) => ErrorCategory::Key,
            Error::InvalidPassword | Error::DecryptionFailed | Error::Signer(_) => {
                ErrorCategory::Auth
            }
            Error::Storage(_) => ErrorCategory::Storage,
            Error::WeakPassword(_)
            | Error::InvalidAddress(_)
            | Error::InvalidHex(_)
            | Error::InvalidLength { .. }
            | Error::AbiDecode(_) => ErrorCategory::Validation,
            Error::Ledger(_) => ErrorCategory::Ledger,
            Error::Other(_) => ErrorCategory::Internal,
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidHex(e.to_string())
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad salt/password/key material, derivation failure
    Crypto,
    /// Vault presence and lock state
    Key,
    /// Password and signer authentication
    Auth,
    /// Persistence failures
    Storage,
    /// Malformed caller input
    Validation,
    /// Ledger access
    Ledger,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Crypto => write!(f, "Crypto"),
            ErrorCategory::Key => write!(f, "Key"),
            ErrorCategory::Auth => write!(f, "Auth"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Validation => write!(f, "Validation"),
            ErrorCategory::Ledger => write!(f, "Ledger"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
