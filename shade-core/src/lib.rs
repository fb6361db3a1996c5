//! Shade wallet core
//!
//! Key derivation (Argon2id + HKDF), the dual-key secp256k1 stealth address
//! engine, ledger addresses, and the ABI codecs for the stealth payment
//! contract and the account-abstraction wrappers that forward calls to it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod abi;
pub mod address;
pub mod commitment;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod forwarding;
pub mod keys;
pub mod password;
pub mod signer;
pub mod stealth;

pub use address::LedgerAddress;
pub use commitment::{MockProof, MockProver};
pub use contract::{PaymentCall, PaymentEvent};
pub use crypto::{constant_time_eq, generate_salt, hash_password, keccak256, KdfConfig};
pub use error::{Error, ErrorCategory, Result};
pub use forwarding::{ForwardedCall, UserOperation};
pub use keys::{
    derive_key_set, derive_master_key, derive_sub_key, derive_unlock_key, KeySet, PublicMetaKeys,
    ScanKeys,
};
pub use password::{evaluate_strength, validate_new_password, PasswordStrength};
pub use signer::{signing_message, ExternalSigner, LocalSigner, SIGNATURE_LENGTH};
pub use stealth::{GeneratedStealth, StealthCheck, StealthMetaAddress};

/// Re-exported so downstream crates can name curve points without a direct dependency
pub use secp256k1::PublicKey;
