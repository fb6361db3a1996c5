//! Dual-key stealth address engine
//!
//! A sender who knows a recipient's public meta-keys `(V, K)` picks an
//! ephemeral scalar `r`, publishes `R = r·G`, and pays to the address of
//! `P = K + h·G` where `h = H(r·V)`. The recipient recomputes the shared
//! point as `v·R` and recovers the spendable scalar `d = k + h`.

use crate::address::LedgerAddress;
use crate::crypto::{keccak256_concat, SECP};
use crate::keys::PublicMetaKeys;
use crate::{Error, Result};
use secp256k1::{rand::rngs::OsRng, PublicKey, Scalar, SecretKey};
use shade_params::domain::STEALTH_HASH_TAG;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Text prefix of an encoded stealth meta-address
pub const META_ADDRESS_PREFIX: &str = "st:shade:0x";

/// Upper bound on hash-to-scalar retries; each retry fails with probability ~2^-128
const MAX_HASH_TO_SCALAR_ATTEMPTS: u32 = 16;

/// Output of [`generate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedStealth {
    /// One-time payment destination
    pub stealth_address: LedgerAddress,
    /// Ephemeral public key `R`, published with the payment
    pub ephemeral_public_key: PublicKey,
}

impl GeneratedStealth {
    /// Compressed ephemeral key as published on the ledger
    pub fn ephemeral_bytes(&self) -> [u8; 33] {
        self.ephemeral_public_key.serialize()
    }
}

/// Output of [`check`] and [`check_with_spending_key`]
pub struct StealthCheck {
    /// Whether the candidate address was generated for these keys
    pub is_for_me: bool,
    /// Address recomputed from the ephemeral key
    pub derived_address: LedgerAddress,
    /// Spendable private key `d`, present only on a match with a spending key
    pub stealth_private_key: Option<Zeroizing<[u8; 32]>>,
}

impl fmt::Debug for StealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StealthCheck")
            .field("is_for_me", &self.is_for_me)
            .field("derived_address", &self.derived_address)
            .field("has_private_key", &self.stealth_private_key.is_some())
            .finish()
    }
}

/// Generate a one-time address for the holder of `(viewing_pub, spending_pub)`
pub fn generate(viewing_pub: &PublicKey, spending_pub: &PublicKey) -> Result<GeneratedStealth> {
    let ephemeral = SecretKey::new(&mut OsRng);
    generate_with_ephemeral(viewing_pub, spending_pub, &ephemeral)
}

/// Generate from encoded meta-keys, rejecting points that are not on the curve
pub fn generate_from_bytes(viewing_pub: &[u8], spending_pub: &[u8]) -> Result<GeneratedStealth> {
    let meta = PublicMetaKeys::from_slices(viewing_pub, spending_pub)?;
    generate(&meta.viewing, &meta.spending)
}

/// Deterministic generation with a caller-supplied ephemeral scalar
pub fn generate_with_ephemeral(
    viewing_pub: &PublicKey,
    spending_pub: &PublicKey,
    ephemeral: &SecretKey,
) -> Result<GeneratedStealth> {
    let ephemeral_public_key = PublicKey::from_secret_key(&SECP, ephemeral);
    let shared = viewing_pub
        .mul_tweak(&SECP, &Scalar::from(*ephemeral))
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    let h = hash_to_scalar(&shared)?;
    let stealth_point = stealth_public_key(spending_pub, &h)?;

    Ok(GeneratedStealth {
        stealth_address: LedgerAddress::from_public_key(&stealth_point),
        ephemeral_public_key,
    })
}

/// Test whether `candidate` was generated for the viewing key `viewing_priv`.
///
/// Runs the same curve operations whether or not the address matches.
pub fn check(
    ephemeral_public_key: &[u8],
    viewing_priv: &[u8; 32],
    spending_pub: &PublicKey,
    candidate: &LedgerAddress,
) -> Result<StealthCheck> {
    let (_, derived_address) =
        derive_for_recipient(ephemeral_public_key, viewing_priv, spending_pub)?;

    Ok(StealthCheck {
        is_for_me: derived_address.ct_eq(candidate).into(),
        derived_address,
        stealth_private_key: None,
    })
}

/// As [`check`], additionally recovering `d = k_spend + h` on a match.
///
/// `d` is computed unconditionally and discarded when the address does not
/// match, so timing does not reveal ownership.
pub fn check_with_spending_key(
    ephemeral_public_key: &[u8],
    viewing_priv: &[u8; 32],
    spending_priv: &[u8; 32],
    candidate: &LedgerAddress,
) -> Result<StealthCheck> {
    let spending = SecretKey::from_slice(spending_priv)
        .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
    let spending_pub = PublicKey::from_secret_key(&SECP, &spending);

    let (h, derived_address) =
        derive_for_recipient(ephemeral_public_key, viewing_priv, &spending_pub)?;
    let stealth_key = spending
        .add_tweak(&h)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    let d = Zeroizing::new(stealth_key.secret_bytes());

    let is_for_me: bool = derived_address.ct_eq(candidate).into();
    Ok(StealthCheck {
        is_for_me,
        derived_address,
        stealth_private_key: if is_for_me { Some(d) } else { None },
    })
}

/// Address controlled by a recovered stealth private key
pub fn stealth_key_address(stealth_private_key: &[u8; 32]) -> Result<LedgerAddress> {
    let secret = SecretKey::from_slice(stealth_private_key)
        .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
    Ok(LedgerAddress::from_public_key(&PublicKey::from_secret_key(
        &SECP, &secret,
    )))
}

/// Parse an ephemeral key, rejecting zero and off-curve encodings
pub fn parse_ephemeral_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.is_empty() || bytes.iter().all(|&b| b == 0) {
        return Err(Error::InvalidEphemeralKey("zero key".to_string()));
    }
    PublicKey::from_slice(bytes).map_err(|e| Error::InvalidEphemeralKey(e.to_string()))
}

fn derive_for_recipient(
    ephemeral_public_key: &[u8],
    viewing_priv: &[u8; 32],
    spending_pub: &PublicKey,
) -> Result<(Scalar, LedgerAddress)> {
    let ephemeral = parse_ephemeral_key(ephemeral_public_key)?;
    let viewing = SecretKey::from_slice(viewing_priv)
        .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;

    let shared = ephemeral
        .mul_tweak(&SECP, &Scalar::from(viewing))
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    let h = hash_to_scalar(&shared)?;
    let stealth_point = stealth_public_key(spending_pub, &h)?;

    Ok((h, LedgerAddress::from_public_key(&stealth_point)))
}

fn stealth_public_key(spending_pub: &PublicKey, h: &Scalar) -> Result<PublicKey> {
    spending_pub
        .add_exp_tweak(&SECP, h)
        .map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Hash a shared point to a non-zero scalar below the curve order
pub fn hash_to_scalar(shared: &PublicKey) -> Result<Scalar> {
    let encoded = shared.serialize();
    for counter in 0..MAX_HASH_TO_SCALAR_ATTEMPTS {
        let digest = Zeroizing::new(keccak256_concat(&[
            STEALTH_HASH_TAG,
            &encoded,
            &counter.to_be_bytes(),
        ]));
        if digest.iter().all(|&b| b == 0) {
            continue;
        }
        if let Ok(scalar) = Scalar::from_be_bytes(*digest) {
            return Ok(scalar);
        }
        tracing::debug!("hash-to-scalar attempt {} out of range, retrying", counter);
    }
    Err(Error::KeyDerivation(
        "shared secret did not hash to a valid scalar".to_string(),
    ))
}

/// Published pair of meta public keys in text form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StealthMetaAddress(pub PublicMetaKeys);

impl StealthMetaAddress {
    /// Parse `st:shade:0x<viewing><spending>` (two compressed keys)
    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix(META_ADDRESS_PREFIX).ok_or_else(|| {
            Error::InvalidAddress(format!("meta-address must start with {}", META_ADDRESS_PREFIX))
        })?;
        let bytes = hex::decode(hex_part)?;
        if bytes.len() != 66 {
            return Err(Error::InvalidLength {
                expected: 66,
                actual: bytes.len(),
            });
        }
        Ok(Self(PublicMetaKeys::from_slices(&bytes[..33], &bytes[33..])?))
    }
}

impl fmt::Display for StealthMetaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            META_ADDRESS_PREFIX,
            hex::encode(self.0.viewing_bytes()),
            hex::encode(self.0.spending_bytes())
        )
    }
}

impl FromStr for StealthMetaAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
