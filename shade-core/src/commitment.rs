//! Username commitments and proof public values
//!
//! The payment contract re-derives a fixed set of public values from a
//! proof and compares them against its own state. Proof generation itself
//! is mocked: [`MockProver`] packs the public values with a witness the
//! contract-side mock verifier can check.

use crate::abi::{encode, AbiReader, Token};
use crate::address::LedgerAddress;
use crate::crypto::{keccak256, keccak256_concat, random_secret};
use crate::signer::{recover_digest_signer, sign_digest};
use crate::{Error, Result};
use zeroize::Zeroizing;

/// Hash of a normalized (trimmed, lowercased) username
pub fn username_hash(username: &str) -> [u8; 32] {
    keccak256(username.trim().to_lowercase().as_bytes())
}

/// `keccak256(username_hash || pad32(account) || secret)`
pub fn commitment(username_hash: &[u8; 32], account: &LedgerAddress, secret: &[u8; 32]) -> [u8; 32] {
    keccak256_concat(&[username_hash, &account.to_word(), secret])
}

/// Fresh commitment secret
pub fn generate_secret() -> Zeroizing<[u8; 32]> {
    random_secret()
}

/// Public values of a username registration proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationPublicValues {
    /// `username_hash(username)`
    pub username_hash: [u8; 32],
    /// Commitment the contract stores
    pub commitment: [u8; 32],
}

/// Public values of a claim proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPublicValues {
    /// Stealth address being claimed
    pub stealth_address: LedgerAddress,
    /// Account that receives the funds (`msg.sender`)
    pub claimant: LedgerAddress,
}

impl ClaimPublicValues {
    fn digest(&self) -> [u8; 32] {
        keccak256_concat(&[&self.stealth_address.to_word(), &self.claimant.to_word()])
    }
}

/// Opaque proof: public values plus witness bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProof {
    /// Public values as 32-byte words
    pub public_values: Vec<[u8; 32]>,
    /// Witness (empty for registrations, a stealth-key signature for claims)
    pub witness: Vec<u8>,
}

impl MockProof {
    /// `abi.encode(bytes32[] publicValues, bytes witness)`
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&[
            Token::Array(self.public_values.iter().map(|v| Token::FixedBytes(*v)).collect()),
            Token::Bytes(self.witness.clone()),
        ])
    }

    /// Inverse of [`MockProof::to_bytes`]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let reader = AbiReader::new(data);
        let (len, items) = reader.array(0)?;
        let public_values = (0..len)
            .map(|i| items.fixed_bytes(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            public_values,
            witness: reader.bytes(1)?.to_vec(),
        })
    }
}

/// Stand-in for a zero-knowledge prover
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProver;

impl MockProver {
    /// Registration proof over `(username_hash, commitment)`
    pub fn prove_registration(
        &self,
        username: &str,
        account: &LedgerAddress,
        secret: &[u8; 32],
    ) -> (RegistrationPublicValues, MockProof) {
        let hash = username_hash(username);
        let values = RegistrationPublicValues {
            username_hash: hash,
            commitment: commitment(&hash, account, secret),
        };
        let proof = MockProof {
            public_values: vec![values.username_hash, values.commitment],
            witness: Vec::new(),
        };
        (values, proof)
    }

    /// Claim proof: public values plus a signature by the stealth private key
    pub fn prove_claim(
        &self,
        stealth_private_key: &[u8; 32],
        stealth_address: LedgerAddress,
        claimant: LedgerAddress,
    ) -> Result<(ClaimPublicValues, MockProof)> {
        let values = ClaimPublicValues {
            stealth_address,
            claimant,
        };
        let witness = sign_digest(stealth_private_key, &values.digest())?;
        let proof = MockProof {
            public_values: vec![stealth_address.to_word(), claimant.to_word()],
            witness: witness.to_vec(),
        };
        Ok((values, proof))
    }

    /// Contract-side check of a registration proof
    pub fn verify_registration(&self, proof: &MockProof, expected: &RegistrationPublicValues) -> bool {
        proof.public_values == [expected.username_hash, expected.commitment]
    }

    /// Contract-side check of a claim proof
    pub fn verify_claim(&self, proof: &MockProof, expected: &ClaimPublicValues) -> Result<bool> {
        if proof.public_values != [expected.stealth_address.to_word(), expected.claimant.to_word()] {
            return Ok(false);
        }
        match recover_digest_signer(&expected.digest(), &proof.witness) {
            Ok(signer) => Ok(signer == expected.stealth_address),
            Err(Error::Signer(_)) | Err(Error::InvalidLength { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
