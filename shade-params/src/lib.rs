//! Shade network parameters and protocol constants
//!
//! This crate provides per-network ledger parameters (chain id, payment
//! contract, entry point, deployment block) and the versioned domain
//! separation constants shared by every derivation in the wallet.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod network;

pub use network::{Network, NetworkType, ENTRY_POINT_V07};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Network has no payment contract configured
    #[error("No payment contract deployed on {0}")]
    ContractNotDeployed(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
