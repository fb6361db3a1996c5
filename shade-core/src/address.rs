//! Ledger address encoding
//!
//! 20-byte account addresses derived as the last 20 bytes of the Keccak-256
//! hash of an uncompressed public key, with EIP-55 mixed-case checksums in
//! their text form.

use crate::crypto::keccak256;
use crate::{Error, Result};
use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use subtle::{Choice, ConstantTimeEq};

/// Ledger account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LedgerAddress([u8; 20]);

impl LedgerAddress {
    /// The all-zero address
    pub const ZERO: LedgerAddress = LedgerAddress([0u8; 20]);

    /// Wrap raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address controlled by a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let uncompressed = public_key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// From a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 20] = bytes.try_into().map_err(|_| Error::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// From a left-padded 32-byte ABI word; the 12 padding bytes must be zero
    pub fn from_word(word: &[u8; 32]) -> Result<Self> {
        if word[..12].iter().any(|&b| b != 0) {
            return Err(Error::InvalidAddress(
                "ABI word has non-zero padding".to_string(),
            ));
        }
        Self::from_slice(&word[12..])
    }

    /// Parse a `0x`-prefixed hex address.
    ///
    /// All-lowercase and all-uppercase forms are accepted as-is; mixed case
    /// must carry a valid EIP-55 checksum.
    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if hex_part.len() != 40 {
            return Err(Error::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                hex_part.len()
            )));
        }

        let bytes = hex::decode(hex_part).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let address = Self::from_slice(&bytes)?;

        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.checksum_hex()[2..] != *hex_part {
            return Err(Error::InvalidAddress(format!("bad checksum: {}", s)));
        }

        Ok(address)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Left-padded 32-byte ABI word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// EIP-55 checksummed `0x` form
    pub fn checksum_hex(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl ConstantTimeEq for LedgerAddress {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksum_hex())
    }
}

impl fmt::Debug for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAddress({})", self.checksum_hex())
    }
}

impl FromStr for LedgerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for LedgerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.checksum_hex())
    }
}

impl<'de> Deserialize<'de> for LedgerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
