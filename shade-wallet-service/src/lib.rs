//! Shade wallet service
//!
//! The key manager state machine and the wallet façade built on it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod key_manager;
pub mod service;

pub use config::{KeyManagerConfig, WalletConfig};
pub use key_manager::{KeyManager, KeyManagerState, KeyManagerStatus, KeysGuard};
pub use service::{UsernameRegistration, WalletService};
