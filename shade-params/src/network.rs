//! Shade network definitions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Canonical ERC-4337 v0.7 EntryPoint, identical on every EVM chain.
pub const ENTRY_POINT_V07: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Public testnet (Sepolia)
    Testnet,
    /// Local development node
    Local,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Network::from_type(*self).name)
    }
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkType::Mainnet),
            "testnet" | "sepolia" => Ok(NetworkType::Testnet),
            "local" | "localhost" | "anvil" => Ok(NetworkType::Local),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Stealth payment contract (hex, checksummed), if deployed
    pub payment_contract: Option<Cow<'static, str>>,
    /// Account-abstraction entry point (hex, checksummed)
    pub entry_point: &'static str,
    /// Block the payment contract was deployed at; scans never start earlier
    pub deployment_block: u64,
    /// Maximum block span requested per log query
    pub log_window: u64,
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            chain_id: 1,
            payment_contract: None,
            entry_point: ENTRY_POINT_V07,
            deployment_block: 0,
            log_window: 2_000,
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            chain_id: 11_155_111,
            payment_contract: None,
            entry_point: ENTRY_POINT_V07,
            deployment_block: 0,
            log_window: 5_000,
        }
    }

    /// Get local development parameters
    ///
    /// The payment contract address is the first deployment of the default
    /// development account, so a fresh local node needs no configuration.
    pub const fn local() -> Self {
        Self {
            network_type: NetworkType::Local,
            name: "local",
            chain_id: 31_337,
            payment_contract: Some(Cow::Borrowed(
                "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            )),
            entry_point: ENTRY_POINT_V07,
            deployment_block: 0,
            log_window: 10_000,
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Local => Self::local(),
        }
    }

    /// Override the payment contract (deployments outside the presets)
    pub fn with_payment_contract(mut self, address: impl Into<Cow<'static, str>>) -> Self {
        self.payment_contract = Some(address.into());
        self
    }

    /// Override the deployment block
    pub fn with_deployment_block(mut self, block: u64) -> Self {
        self.deployment_block = block;
        self
    }

    /// Payment contract address, or an error when none is configured
    pub fn require_payment_contract(&self) -> Result<&str> {
        self.payment_contract
            .as_deref()
            .ok_or_else(|| Error::ContractNotDeployed(self.name.to_string()))
    }

    /// Clamp a requested scan start to the deployment block
    pub const fn scan_start(&self, requested: u64) -> u64 {
        if requested < self.deployment_block {
            self.deployment_block
        } else {
            requested
        }
    }
}
