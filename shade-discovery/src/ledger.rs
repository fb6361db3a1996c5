//! Ledger boundary
//!
//! Read-only queries the discovery pipeline needs from a ledger node. The
//! RPC transport lives outside this crate; [`MemoryLedger`] is an in-process
//! implementation that executes payment calldata against a simulated
//! payment contract.

use crate::calldata;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shade_core::contract::{PaymentCall, PaymentEvent};
use shade_core::crypto::keccak256_concat;
use shade_core::LedgerAddress;
use std::collections::HashMap;

/// Transaction hash
pub type TxHash = [u8; 32];

/// Raw event log as returned by a ledger node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Block that included the transaction
    pub block_number: u64,
    /// Emitting transaction
    pub transaction_hash: TxHash,
    /// Position of the log within its block
    pub log_index: u32,
    /// Indexed topics, topic 0 first
    pub topics: Vec<[u8; 32]>,
    /// Non-indexed data
    pub data: Vec<u8>,
}

/// Decoded `StealthPaymentSent` log with its position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentLog {
    /// Block that included the transaction
    pub block_number: u64,
    /// Emitting transaction
    pub transaction_hash: TxHash,
    /// Position of the log within its block
    pub log_index: u32,
    /// Event fields
    pub event: PaymentEvent,
}

impl PaymentLog {
    /// Decode a raw log
    pub fn decode(raw: &RawLog) -> shade_core::Result<Self> {
        Ok(Self {
            block_number: raw.block_number,
            transaction_hash: raw.transaction_hash,
            log_index: raw.log_index,
            event: PaymentEvent::decode(&raw.topics, &raw.data)?,
        })
    }
}

/// On-ledger state of a stealth payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentStatus {
    /// Amount held for the stealth address
    pub amount: u128,
    /// Whether it has been claimed
    pub claimed: bool,
    /// Payer
    pub sender: LedgerAddress,
    /// Timestamp of the payment (unix seconds)
    pub timestamp: u64,
}

/// Read access to the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Number of the most recent block
    async fn latest_block(&self) -> Result<u64>;

    /// `StealthPaymentSent` logs in the inclusive range `[from, to]`
    async fn payment_logs(&self, from: u64, to: u64) -> Result<Vec<RawLog>>;

    /// Top-level input of a transaction
    async fn transaction_input(&self, tx_hash: &TxHash) -> Result<Vec<u8>>;

    /// Timestamp of a block (unix seconds)
    async fn block_timestamp(&self, number: u64) -> Result<u64>;

    /// Contract-side status of a stealth address
    async fn payment_status(&self, stealth_address: &LedgerAddress) -> Result<PaymentStatus>;
}

#[derive(Debug, Default)]
struct MemoryLedgerState {
    block: u64,
    logs: Vec<RawLog>,
    inputs: HashMap<TxHash, Vec<u8>>,
    timestamps: HashMap<u64, u64>,
    payments: HashMap<LedgerAddress, PaymentStatus>,
}

/// In-process ledger with a simulated payment contract.
///
/// Each submitted transaction lands in its own block; block timestamps are
/// `genesis_time + 12 * number`.
#[derive(Debug)]
pub struct MemoryLedger {
    payment_contract: LedgerAddress,
    genesis_time: u64,
    state: RwLock<MemoryLedgerState>,
}

impl MemoryLedger {
    /// Seconds between blocks
    pub const BLOCK_TIME: u64 = 12;

    /// Empty ledger whose payment contract lives at `payment_contract`
    pub fn new(payment_contract: LedgerAddress) -> Self {
        Self {
            payment_contract,
            genesis_time: 1_700_000_000,
            state: RwLock::new(MemoryLedgerState::default()),
        }
    }

    /// Payment contract address
    pub fn payment_contract(&self) -> LedgerAddress {
        self.payment_contract
    }

    /// Execute `input` as a transaction from `from` sent to `to`.
    ///
    /// Any `sendToStealth` calls reachable through the supported forwarding
    /// shapes emit a payment log. Returns the transaction hash.
    pub fn submit(&self, from: LedgerAddress, to: LedgerAddress, input: Vec<u8>) -> TxHash {
        let mut state = self.state.write();
        state.block += 1;
        let block = state.block;
        let timestamp = self.genesis_time + Self::BLOCK_TIME * block;
        let tx_hash = keccak256_concat(&[&block.to_be_bytes(), from.as_bytes(), &input]);

        state.timestamps.insert(block, timestamp);
        let calls: Vec<PaymentCall> = if to == self.payment_contract {
            PaymentCall::decode_send_to_stealth(&input).into_iter().collect()
        } else {
            calldata::reachable_payment_calls(&input, &self.payment_contract)
        };

        for (log_index, call) in calls.into_iter().enumerate() {
            if let PaymentCall::SendToStealth {
                stealth_address,
                amount,
                ..
            } = call
            {
                let event = PaymentEvent {
                    stealth_address,
                    sender: from,
                    amount,
                };
                let (topics, data) = event.encode();
                state.logs.push(RawLog {
                    block_number: block,
                    transaction_hash: tx_hash,
                    log_index: log_index as u32,
                    topics,
                    data,
                });
                let status = state.payments.entry(stealth_address).or_default();
                status.amount += amount;
                status.sender = from;
                status.timestamp = timestamp;
            }
        }

        state.inputs.insert(tx_hash, input);
        tx_hash
    }

    /// Mark a stealth address as claimed
    pub fn mark_claimed(&self, stealth_address: &LedgerAddress) {
        if let Some(status) = self.state.write().payments.get_mut(stealth_address) {
            status.claimed = true;
        }
    }

    /// Advance the chain by `blocks` empty blocks
    pub fn mine(&self, blocks: u64) {
        let mut state = self.state.write();
        for _ in 0..blocks {
            state.block += 1;
            let block = state.block;
            state
                .timestamps
                .insert(block, self.genesis_time + Self::BLOCK_TIME * block);
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.state.read().block)
    }

    async fn payment_logs(&self, from: u64, to: u64) -> Result<Vec<RawLog>> {
        if from > to {
            return Err(Error::InvalidRange(format!("{} > {}", from, to)));
        }
        Ok(self
            .state
            .read()
            .logs
            .iter()
            .filter(|log| (from..=to).contains(&log.block_number))
            .cloned()
            .collect())
    }

    async fn transaction_input(&self, tx_hash: &TxHash) -> Result<Vec<u8>> {
        self.state
            .read()
            .inputs
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| Error::Ledger(format!("unknown transaction 0x{}", hex::encode(tx_hash))))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        self.state
            .read()
            .timestamps
            .get(&number)
            .copied()
            .ok_or_else(|| Error::Ledger(format!("unknown block {}", number)))
    }

    async fn payment_status(&self, stealth_address: &LedgerAddress) -> Result<PaymentStatus> {
        Ok(self
            .state
            .read()
            .payments
            .get(stealth_address)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(stealth: u8, amount: u128) -> Vec<u8> {
        PaymentCall::SendToStealth {
            stealth_address: LedgerAddress::new([stealth; 20]),
            amount,
            ephemeral_public_key: vec![2; 33],
        }
        .encode()
    }

    #[tokio::test]
    async fn test_direct_payment_emits_log() {
        let contract = LedgerAddress::new([0xcc; 20]);
        let ledger = MemoryLedger::new(contract);
        let payer = LedgerAddress::new([1; 20]);

        let tx = ledger.submit(payer, contract, send(9, 500));
        assert_eq!(ledger.latest_block().await.unwrap(), 1);

        let logs = ledger.payment_logs(0, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        let log = PaymentLog::decode(&logs[0]).unwrap();
        assert_eq!(log.transaction_hash, tx);
        assert_eq!(log.event.sender, payer);
        assert_eq!(log.event.amount, 500);

        let status = ledger.payment_status(&LedgerAddress::new([9; 20])).await.unwrap();
        assert_eq!(status.amount, 500);
        assert!(!status.claimed);
        assert_eq!(
            status.timestamp,
            ledger.block_timestamp(1).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_other_targets_emit_nothing() {
        let contract = LedgerAddress::new([0xcc; 20]);
        let ledger = MemoryLedger::new(contract);
        ledger.submit(LedgerAddress::new([1; 20]), LedgerAddress::new([0xdd; 20]), send(9, 500));
        assert!(ledger.payment_logs(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_range_and_lookup_errors() {
        let ledger = MemoryLedger::new(LedgerAddress::new([0xcc; 20]));
        ledger.mine(3);
        assert_eq!(ledger.latest_block().await.unwrap(), 3);
        assert!(ledger.payment_logs(5, 1).await.is_err());
        assert!(ledger.transaction_input(&[0u8; 32]).await.is_err());
        assert!(ledger.block_timestamp(99).await.is_err());

        let addr = LedgerAddress::new([4; 20]);
        ledger.mark_claimed(&addr);
        assert_eq!(ledger.payment_status(&addr).await.unwrap(), PaymentStatus::default());
    }
}
