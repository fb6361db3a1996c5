//! Stealth payment contract calls and events
//!
//! Builds and parses calldata for the four write functions and decodes the
//! `StealthPaymentSent` event.

use crate::abi::{encode_call, selector, AbiReader, Token};
use crate::address::LedgerAddress;
use crate::crypto::keccak256;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// `sendToStealth(address,uint256,bytes)`
pub static SEND_TO_STEALTH: Lazy<[u8; 4]> =
    Lazy::new(|| selector("sendToStealth(address,uint256,bytes)"));

/// `registerMetaKeys(bytes,bytes)`
pub static REGISTER_META_KEYS: Lazy<[u8; 4]> =
    Lazy::new(|| selector("registerMetaKeys(bytes,bytes)"));

/// `registerUsername(bytes32,bytes32,bytes)`
pub static REGISTER_USERNAME: Lazy<[u8; 4]> =
    Lazy::new(|| selector("registerUsername(bytes32,bytes32,bytes)"));

/// `claimFromStealth(address,bytes)`
pub static CLAIM_FROM_STEALTH: Lazy<[u8; 4]> =
    Lazy::new(|| selector("claimFromStealth(address,bytes)"));

/// Topic 0 of `StealthPaymentSent(address indexed, address indexed, uint256)`
pub static STEALTH_PAYMENT_SENT: Lazy<[u8; 32]> =
    Lazy::new(|| keccak256(b"StealthPaymentSent(address,address,uint256)"));

/// A call to the stealth payment contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCall {
    /// Bind a username hash to a commitment, with its proof
    RegisterUsername {
        /// `keccak256(username)`
        username_hash: [u8; 32],
        /// Commitment over username hash, account and secret
        commitment: [u8; 32],
        /// Opaque proof bytes
        proof: Vec<u8>,
    },
    /// Publish the caller's public meta-keys
    RegisterMetaKeys {
        /// Compressed meta-viewing key
        viewing_public_key: Vec<u8>,
        /// Compressed meta-spending key
        spending_public_key: Vec<u8>,
    },
    /// Pay to a stealth address
    SendToStealth {
        /// One-time destination
        stealth_address: LedgerAddress,
        /// Amount in base units
        amount: u128,
        /// Compressed ephemeral key `R`
        ephemeral_public_key: Vec<u8>,
    },
    /// Claim funds held for a stealth address
    ClaimFromStealth {
        /// Stealth address being claimed
        stealth_address: LedgerAddress,
        /// Opaque proof bytes
        proof: Vec<u8>,
    },
}

impl PaymentCall {
    /// Function selector of this call
    pub fn selector(&self) -> [u8; 4] {
        match self {
            PaymentCall::RegisterUsername { .. } => *REGISTER_USERNAME,
            PaymentCall::RegisterMetaKeys { .. } => *REGISTER_META_KEYS,
            PaymentCall::SendToStealth { .. } => *SEND_TO_STEALTH,
            PaymentCall::ClaimFromStealth { .. } => *CLAIM_FROM_STEALTH,
        }
    }

    /// ABI-encoded calldata
    pub fn encode(&self) -> Vec<u8> {
        let tokens = match self {
            PaymentCall::RegisterUsername {
                username_hash,
                commitment,
                proof,
            } => vec![
                Token::FixedBytes(*username_hash),
                Token::FixedBytes(*commitment),
                Token::Bytes(proof.clone()),
            ],
            PaymentCall::RegisterMetaKeys {
                viewing_public_key,
                spending_public_key,
            } => vec![
                Token::Bytes(viewing_public_key.clone()),
                Token::Bytes(spending_public_key.clone()),
            ],
            PaymentCall::SendToStealth {
                stealth_address,
                amount,
                ephemeral_public_key,
            } => vec![
                Token::Address(*stealth_address),
                Token::Uint(*amount),
                Token::Bytes(ephemeral_public_key.clone()),
            ],
            PaymentCall::ClaimFromStealth {
                stealth_address,
                proof,
            } => vec![Token::Address(*stealth_address), Token::Bytes(proof.clone())],
        };
        encode_call(self.selector(), &tokens)
    }

    /// Parse calldata for any of the four functions
    pub fn decode(data: &[u8]) -> Result<Self> {
        let sel = crate::abi::call_selector(data)
            .ok_or_else(|| Error::AbiDecode("payload shorter than a selector".to_string()))?;

        if sel == *SEND_TO_STEALTH {
            Self::decode_send_to_stealth(data)
        } else if sel == *REGISTER_META_KEYS {
            let args = AbiReader::for_call(data, sel)?;
            Ok(PaymentCall::RegisterMetaKeys {
                viewing_public_key: args.bytes(0)?.to_vec(),
                spending_public_key: args.bytes(1)?.to_vec(),
            })
        } else if sel == *REGISTER_USERNAME {
            let args = AbiReader::for_call(data, sel)?;
            Ok(PaymentCall::RegisterUsername {
                username_hash: args.fixed_bytes(0)?,
                commitment: args.fixed_bytes(1)?,
                proof: args.bytes(2)?.to_vec(),
            })
        } else if sel == *CLAIM_FROM_STEALTH {
            let args = AbiReader::for_call(data, sel)?;
            Ok(PaymentCall::ClaimFromStealth {
                stealth_address: args.address(0)?,
                proof: args.bytes(1)?.to_vec(),
            })
        } else {
            Err(Error::AbiDecode(format!(
                "unknown payment selector 0x{}",
                hex::encode(sel)
            )))
        }
    }

    /// Parse `sendToStealth` calldata only
    pub fn decode_send_to_stealth(data: &[u8]) -> Result<Self> {
        let args = AbiReader::for_call(data, *SEND_TO_STEALTH)?;
        Ok(PaymentCall::SendToStealth {
            stealth_address: args.address(0)?,
            amount: args.uint(1)?,
            ephemeral_public_key: args.bytes(2)?.to_vec(),
        })
    }
}

/// Decoded `StealthPaymentSent` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Indexed stealth address
    pub stealth_address: LedgerAddress,
    /// Indexed payer
    pub sender: LedgerAddress,
    /// Amount in base units
    pub amount: u128,
}

impl PaymentEvent {
    /// Decode from log topics and data
    pub fn decode(topics: &[[u8; 32]], data: &[u8]) -> Result<Self> {
        match topics {
            [topic0, stealth, sender, ..] if *topic0 == *STEALTH_PAYMENT_SENT => Ok(Self {
                stealth_address: LedgerAddress::from_word(stealth)?,
                sender: LedgerAddress::from_word(sender)?,
                amount: AbiReader::new(data).uint(0)?,
            }),
            [_, _, _, ..] => Err(Error::AbiDecode("not a StealthPaymentSent log".to_string())),
            _ => Err(Error::AbiDecode(format!(
                "expected 3 topics, got {}",
                topics.len()
            ))),
        }
    }

    /// Topics and data as emitted by the contract
    pub fn encode(&self) -> (Vec<[u8; 32]>, Vec<u8>) {
        (
            vec![
                *STEALTH_PAYMENT_SENT,
                self.stealth_address.to_word(),
                self.sender.to_word(),
            ],
            crate::abi::uint_word(self.amount).to_vec(),
        )
    }
}
