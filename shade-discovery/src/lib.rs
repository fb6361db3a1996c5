//! Stealth payment discovery
//!
//! Scans the payment contract's logs and attributes payments to an account:
//! payments it sent are recognized by sender, payments it received by
//! recovering the ephemeral key from the transaction input (directly or
//! through account-abstraction forwarding) and running the stealth check.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calldata;
pub mod cancel;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod progress;

pub use calldata::{extract_ephemeral_key, EphemeralKeyLookup, Payload, PayloadKind};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use ledger::{LedgerClient, MemoryLedger, PaymentLog, PaymentStatus, RawLog, TxHash};
pub use pipeline::{
    DiscoveryPipeline, PaymentDirection, PerfCounters, PerfSnapshot, PipelineConfig,
    PipelineResult, StealthPayment,
};
pub use progress::{ScanProgress, ScanStage};
