//! Wallet service
//!
//! Ties the key manager to the stealth engine, payment discovery and the
//! payment contract's write calls. Everything that needs private keys goes
//! through the key manager and fails with [`Error::Locked`] while locked.

use crate::config::WalletConfig;
use crate::key_manager::{KeyManager, KeyManagerStatus};
use shade_core::commitment::generate_secret;
use shade_core::stealth::{self, GeneratedStealth, StealthCheck, StealthMetaAddress};
use shade_core::{Error, LedgerAddress, MockProver, PaymentCall, Result};
use shade_discovery::{
    CancelToken, DiscoveryPipeline, LedgerClient, PipelineResult, ScanProgress, StealthPayment,
};
use shade_storage_sqlite::{SqliteVaultStore, VaultStore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// `registerUsername` call with the secret needed to reproduce its commitment
pub struct UsernameRegistration {
    /// Calldata arguments
    pub call: PaymentCall,
    /// Commitment opening; keep private
    pub secret: Zeroizing<[u8; 32]>,
}

/// Wallet façade
pub struct WalletService {
    config: WalletConfig,
    keys: Arc<KeyManager>,
    ledger: Arc<dyn LedgerClient>,
    payment_contract: LedgerAddress,
    prover: MockProver,
    cancel: CancelToken,
    progress: ScanProgress,
}

impl WalletService {
    /// Service over an existing vault store and ledger
    pub fn new(
        config: WalletConfig,
        store: Arc<dyn VaultStore>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Result<Self> {
        let payment_contract = config.payment_contract()?;
        let keys = Arc::new(KeyManager::new(store, config.key_manager));
        Ok(Self {
            config,
            keys,
            ledger,
            payment_contract,
            prover: MockProver,
            cancel: CancelToken::new(),
            progress: ScanProgress::new(),
        })
    }

    /// Service with the SQLite vault at the configured data directory
    pub fn open(config: WalletConfig, ledger: Arc<dyn LedgerClient>) -> Result<Self> {
        let path = config.vault_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }
        let store = SqliteVaultStore::open(&path)?;
        tracing::debug!(path = %path.display(), "opened vault database");
        Self::new(config, Arc::new(store), ledger)
    }

    /// Key manager
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Key manager snapshot
    pub fn status(&self) -> KeyManagerStatus {
        self.keys.status()
    }

    /// Configuration in use
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Payment contract address
    pub fn payment_contract(&self) -> LedgerAddress {
        self.payment_contract
    }

    /// Our stealth meta-address, for publishing
    pub fn meta_address(&self) -> Result<StealthMetaAddress> {
        Ok(StealthMetaAddress(self.keys.get_public_keys()?))
    }

    /// One-time address for the holder of `recipient`
    pub fn generate_stealth(&self, recipient: &StealthMetaAddress) -> Result<GeneratedStealth> {
        stealth::generate(&recipient.0.viewing, &recipient.0.spending)
    }

    /// Whether `candidate` was generated for us from `ephemeral_public_key`.
    ///
    /// On a match the spendable key is included.
    pub fn check_stealth(
        &self,
        ephemeral_public_key: &[u8],
        candidate: &LedgerAddress,
    ) -> Result<StealthCheck> {
        let keys = self.keys.get_keys()?;
        stealth::check_with_spending_key(
            ephemeral_public_key,
            keys.viewing_private_key(),
            keys.spending_private_key(),
            candidate,
        )
    }

    /// Scan from `from` (clamped to the contract deployment) to the tip.
    ///
    /// Only scan keys are handed to the pipeline; locking the wallet while
    /// a scan runs does not affect it.
    pub async fn scan_payments(&self, from: u64) -> Result<PipelineResult> {
        let account = self.account()?;
        let scan_keys = self.keys.scan_keys()?;
        let start = self.config.network().scan_start(from);

        self.cancel.reset();
        let pipeline = DiscoveryPipeline::new(
            Arc::clone(&self.ledger),
            self.payment_contract,
            self.config.discovery.clone(),
        )
        .with_cancel_token(self.cancel.clone())
        .with_progress(self.progress.clone());

        Ok(pipeline.run_to_tip(&scan_keys, account, start).await?)
    }

    /// Stop a running scan; it returns what it has found so far
    pub fn cancel_scan(&self) {
        self.cancel.cancel();
    }

    /// Progress of the current or last scan
    pub fn scan_progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// `sendToStealth` paying `amount` to a fresh address of `recipient`
    pub fn build_send(
        &self,
        recipient: &StealthMetaAddress,
        amount: u128,
    ) -> Result<(PaymentCall, GeneratedStealth)> {
        let generated = self.generate_stealth(recipient)?;
        let call = PaymentCall::SendToStealth {
            stealth_address: generated.stealth_address,
            amount,
            ephemeral_public_key: generated.ephemeral_bytes().to_vec(),
        };
        Ok((call, generated))
    }

    /// `registerMetaKeys` with our public meta-keys
    pub fn build_register_meta_keys(&self) -> Result<PaymentCall> {
        let public = self.keys.get_public_keys()?;
        Ok(PaymentCall::RegisterMetaKeys {
            viewing_public_key: public.viewing_bytes().to_vec(),
            spending_public_key: public.spending_bytes().to_vec(),
        })
    }

    /// `registerUsername` binding `username` to our account
    pub fn build_register_username(&self, username: &str) -> Result<UsernameRegistration> {
        let account = self.account()?;
        let secret = generate_secret();
        let (values, proof) = self.prover.prove_registration(username, &account, &secret);
        Ok(UsernameRegistration {
            call: PaymentCall::RegisterUsername {
                username_hash: values.username_hash,
                commitment: values.commitment,
                proof: proof.to_bytes(),
            },
            secret,
        })
    }

    /// `claimFromStealth` for a received payment, paying out to `claimant`
    pub fn build_claim(
        &self,
        payment: &StealthPayment,
        claimant: LedgerAddress,
    ) -> Result<PaymentCall> {
        let ephemeral = payment.ephemeral_public_key.as_deref().ok_or_else(|| {
            Error::InvalidEphemeralKey("payment has no ephemeral key".to_string())
        })?;
        let check = self.check_stealth(ephemeral, &payment.stealth_address)?;
        let stealth_key = match (check.is_for_me, check.stealth_private_key) {
            (true, Some(key)) => key,
            _ => {
                return Err(Error::InvalidDerivedKeys(
                    "payment is not addressed to this wallet".to_string(),
                ))
            }
        };

        let (_, proof) = self
            .prover
            .prove_claim(&stealth_key, payment.stealth_address, claimant)?;
        Ok(PaymentCall::ClaimFromStealth {
            stealth_address: payment.stealth_address,
            proof: proof.to_bytes(),
        })
    }

    fn account(&self) -> Result<LedgerAddress> {
        let account_id = self
            .keys
            .account_id()
            .ok_or_else(|| Error::NotInitialized("no account".to_string()))?;
        LedgerAddress::parse(&account_id)
    }
}
