//! Wallet configuration

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use shade_core::{Error, KdfConfig, LedgerAddress, Result};
use shade_discovery::PipelineConfig;
use shade_params::{Network, NetworkType};
use shade_params::domain::DEFAULT_SALT_LENGTH;
use shade_storage_sqlite::VaultAlgorithm;
use std::path::{Path, PathBuf};

/// Vault database file name inside the data directory
pub const VAULT_DB_FILE: &str = "vault.db";

/// Key manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyManagerConfig {
    /// Argon2id cost for both the master and the unlock derivation
    pub kdf: KdfConfig,
    /// Length of freshly generated salts
    pub salt_length: usize,
    /// Cipher for new vault records
    pub algorithm: VaultAlgorithm,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            kdf: KdfConfig::DEFAULT,
            salt_length: DEFAULT_SALT_LENGTH,
            algorithm: VaultAlgorithm::default(),
        }
    }
}

impl KeyManagerConfig {
    /// Cheap parameters for tests
    pub fn insecure_fast() -> Self {
        Self {
            kdf: KdfConfig::INSECURE_FAST,
            ..Self::default()
        }
    }
}

/// Top-level wallet settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network preset
    pub network: NetworkType,
    /// Payment contract, overriding the preset
    pub payment_contract: Option<String>,
    /// Where the vault database lives; the platform data directory if unset
    pub data_dir: Option<PathBuf>,
    /// Key manager settings
    pub key_manager: KeyManagerConfig,
    /// Discovery settings
    pub discovery: PipelineConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Local,
            payment_contract: None,
            data_dir: None,
            key_manager: KeyManagerConfig::default(),
            discovery: PipelineConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Network parameters with overrides applied
    pub fn network(&self) -> Network {
        let network = Network::from_type(self.network);
        match &self.payment_contract {
            Some(address) => network.with_payment_contract(address.clone()),
            None => network,
        }
    }

    /// Parsed payment contract address
    pub fn payment_contract(&self) -> Result<LedgerAddress> {
        let network = self.network();
        let address = network
            .require_payment_contract()
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;
        LedgerAddress::parse(address)
    }

    /// Data directory, falling back to the platform default
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("org", "Shade", "shade")
            .map(|dirs| dirs.data_dir().join(self.network.to_string()))
            .ok_or_else(|| Error::Storage("no home directory for default data dir".to_string()))
    }

    /// Path of the vault database
    pub fn vault_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(VAULT_DB_FILE))
    }

    /// Load from a JSON file, or the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::Storage(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Other(format!("invalid config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.key_manager.kdf, KdfConfig::DEFAULT);
        assert_eq!(config.key_manager.salt_length, 32);
        assert!(config.payment_contract().is_ok());
    }

    #[test]
    fn test_contract_override_and_missing() {
        let mut config = WalletConfig {
            network: NetworkType::Mainnet,
            ..WalletConfig::default()
        };
        assert!(config.payment_contract().is_err());

        config.payment_contract = Some("0x00000000000000000000000000000000000000aa".to_string());
        assert_eq!(
            config.payment_contract().unwrap(),
            LedgerAddress::new({
                let mut bytes = [0u8; 20];
                bytes[19] = 0xaa;
                bytes
            })
        );
    }

    #[test]
    fn test_partial_json() {
        let config: WalletConfig =
            serde_json::from_str(r#"{"network": "testnet", "data_dir": "/tmp/shade"}"#).unwrap();
        assert_eq!(config.network, NetworkType::Testnet);
        assert_eq!(config.vault_path().unwrap(), PathBuf::from("/tmp/shade/vault.db"));
        assert_eq!(config.discovery, PipelineConfig::default());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = WalletConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, WalletConfig::default());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = WalletConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, Error::Other(ref msg) if msg.starts_with("invalid config")));
    }
}
