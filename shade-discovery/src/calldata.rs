//! Ephemeral key recovery from transaction input
//!
//! A payment can reach the contract directly or wrapped in account
//! abstraction layers. The top-level input is matched against each known
//! shape in a fixed order:
//!
//! 1. [`Payload::DirectCall`]: `sendToStealth` itself
//! 2. [`Payload::UserOpBundle`]: `handleOps`, whose operations carry an
//!    `execute` or `executeBatch` call in their `callData`
//! 3. [`Payload::SingleForward`]: `execute` sent straight to a smart account
//! 4. [`Payload::BatchForward`]: `executeBatch` in either encoding
//!
//! Only forwarded calls whose target is the payment contract are decoded as
//! payments. Anything that does not decode is [`EphemeralKeyLookup::NotFound`].

use shade_core::contract::PaymentCall;
use shade_core::forwarding::{
    decode_execute, decode_execute_batch, decode_execute_batch_arrays, decode_handle_ops,
    ForwardedCall, UserOperation,
};
use shade_core::LedgerAddress;

/// Decoded shape of a transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `sendToStealth` called on the payment contract
    DirectCall(PaymentCall),
    /// Entry-point bundle of user operations
    UserOpBundle(Vec<UserOperation>),
    /// Single forwarded call
    SingleForward(ForwardedCall),
    /// Batch of forwarded calls
    BatchForward(Vec<ForwardedCall>),
}

/// Discriminant of [`Payload`], for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// See [`Payload::DirectCall`]
    DirectCall,
    /// See [`Payload::UserOpBundle`]
    UserOpBundle,
    /// See [`Payload::SingleForward`]
    SingleForward,
    /// See [`Payload::BatchForward`]
    BatchForward,
}

impl Payload {
    /// Match `input` against the known shapes in priority order
    pub fn decode(input: &[u8]) -> Option<Self> {
        if let Ok(call) = PaymentCall::decode_send_to_stealth(input) {
            return Some(Payload::DirectCall(call));
        }
        if let Ok((ops, _beneficiary)) = decode_handle_ops(input) {
            return Some(Payload::UserOpBundle(ops));
        }
        Self::decode_forward(input)
    }

    fn decode_forward(input: &[u8]) -> Option<Self> {
        if let Ok(call) = decode_execute(input) {
            return Some(Payload::SingleForward(call));
        }
        decode_execute_batch(input)
            .or_else(|_| decode_execute_batch_arrays(input))
            .ok()
            .map(Payload::BatchForward)
    }

    /// Shape of this payload
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::DirectCall(_) => PayloadKind::DirectCall,
            Payload::UserOpBundle(_) => PayloadKind::UserOpBundle,
            Payload::SingleForward(_) => PayloadKind::SingleForward,
            Payload::BatchForward(_) => PayloadKind::BatchForward,
        }
    }

    /// Every `sendToStealth` call this payload delivers to `payment_contract`
    pub fn payment_calls(&self, payment_contract: &LedgerAddress) -> Vec<PaymentCall> {
        match self {
            Payload::DirectCall(call) => vec![call.clone()],
            Payload::UserOpBundle(ops) => ops
                .iter()
                .filter_map(|op| Self::decode_forward(&op.call_data))
                .flat_map(|inner| inner.payment_calls(payment_contract))
                .collect(),
            Payload::SingleForward(call) => forwarded_payment(call, payment_contract)
                .into_iter()
                .collect(),
            Payload::BatchForward(calls) => calls
                .iter()
                .filter_map(|call| forwarded_payment(call, payment_contract))
                .collect(),
        }
    }
}

fn forwarded_payment(call: &ForwardedCall, payment_contract: &LedgerAddress) -> Option<PaymentCall> {
    if call.target != *payment_contract {
        return None;
    }
    PaymentCall::decode_send_to_stealth(&call.data).ok()
}

/// `sendToStealth` calls reachable from a transaction input
pub fn reachable_payment_calls(input: &[u8], payment_contract: &LedgerAddress) -> Vec<PaymentCall> {
    Payload::decode(input)
        .map(|payload| payload.payment_calls(payment_contract))
        .unwrap_or_default()
}

/// Outcome of looking for the ephemeral key of one payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EphemeralKeyLookup {
    /// Key recovered
    Found {
        /// Encoded ephemeral public key `R` as the payer supplied it
        ephemeral_public_key: Vec<u8>,
        /// Outermost shape the payment was wrapped in
        via: PayloadKind,
    },
    /// Input carries no payment to this stealth address; skip it
    NotFound,
}

/// Recover the ephemeral key published with the payment to `stealth_address`.
///
/// When one transaction pays several stealth addresses, the call whose
/// destination equals `stealth_address` is used.
pub fn extract_ephemeral_key(
    input: &[u8],
    payment_contract: &LedgerAddress,
    stealth_address: &LedgerAddress,
) -> EphemeralKeyLookup {
    let Some(payload) = Payload::decode(input) else {
        tracing::trace!("transaction input matches no payment shape");
        return EphemeralKeyLookup::NotFound;
    };
    let via = payload.kind();

    payload
        .payment_calls(payment_contract)
        .into_iter()
        .find_map(|call| match call {
            PaymentCall::SendToStealth {
                stealth_address: destination,
                ephemeral_public_key,
                ..
            } if destination == *stealth_address => Some(EphemeralKeyLookup::Found {
                ephemeral_public_key,
                via,
            }),
            _ => None,
        })
        .unwrap_or(EphemeralKeyLookup::NotFound)
}
