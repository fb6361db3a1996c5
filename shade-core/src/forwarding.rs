//! Account-abstraction call forwarding
//!
//! Codecs for smart-account `execute` / `executeBatch` calls and for the
//! ERC-4337 v0.7 `handleOps` bundle that carries them.

use crate::abi::{encode_call, selector, AbiReader, CopyBudget, Token};
use crate::address::LedgerAddress;
use crate::Result;
use once_cell::sync::Lazy;

/// `execute(address,uint256,bytes)`
pub static EXECUTE: Lazy<[u8; 4]> = Lazy::new(|| selector("execute(address,uint256,bytes)"));

/// `executeBatch((address,uint256,bytes)[])`
pub static EXECUTE_BATCH: Lazy<[u8; 4]> =
    Lazy::new(|| selector("executeBatch((address,uint256,bytes)[])"));

/// `executeBatch(address[],uint256[],bytes[])`
pub static EXECUTE_BATCH_ARRAYS: Lazy<[u8; 4]> =
    Lazy::new(|| selector("executeBatch(address[],uint256[],bytes[])"));

/// `handleOps(PackedUserOperation[],address)`
pub static HANDLE_OPS: Lazy<[u8; 4]> = Lazy::new(|| {
    selector("handleOps((address,uint256,bytes,bytes,bytes32,uint256,bytes32,bytes,bytes)[],address)")
});

/// One call a smart account forwards to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedCall {
    /// Call target
    pub target: LedgerAddress,
    /// Native value attached
    pub value: u128,
    /// Inner calldata
    pub data: Vec<u8>,
}

impl ForwardedCall {
    /// Construct
    pub fn new(target: LedgerAddress, value: u128, data: Vec<u8>) -> Self {
        Self {
            target,
            value,
            data,
        }
    }

    fn token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.target),
            Token::Uint(self.value),
            Token::Bytes(self.data.clone()),
        ])
    }
}

/// ERC-4337 v0.7 packed user operation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserOperation {
    /// Smart account
    pub sender: LedgerAddress,
    /// 192-bit key and 64-bit sequence, raw word
    pub nonce: [u8; 32],
    /// Account factory call, empty once deployed
    pub init_code: Vec<u8>,
    /// Calldata the entry point sends to the account
    pub call_data: Vec<u8>,
    /// Packed verification and call gas limits
    pub account_gas_limits: [u8; 32],
    /// Pre-verification gas, raw word
    pub pre_verification_gas: [u8; 32],
    /// Packed fee caps
    pub gas_fees: [u8; 32],
    /// Paymaster and its data
    pub paymaster_and_data: Vec<u8>,
    /// Account signature
    pub signature: Vec<u8>,
}

impl UserOperation {
    /// Operation for `sender` carrying `call_data`; other fields zeroed
    pub fn new(sender: LedgerAddress, call_data: Vec<u8>) -> Self {
        Self {
            sender,
            call_data,
            ..Default::default()
        }
    }

    fn token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.sender),
            Token::FixedBytes(self.nonce),
            Token::Bytes(self.init_code.clone()),
            Token::Bytes(self.call_data.clone()),
            Token::FixedBytes(self.account_gas_limits),
            Token::FixedBytes(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees),
            Token::Bytes(self.paymaster_and_data.clone()),
            Token::Bytes(self.signature.clone()),
        ])
    }

    fn decode(op: &AbiReader<'_>, budget: &mut CopyBudget) -> Result<Self> {
        Ok(Self {
            sender: op.address(0)?,
            nonce: op.fixed_bytes(1)?,
            init_code: budget.take(op.bytes(2)?)?,
            call_data: budget.take(op.bytes(3)?)?,
            account_gas_limits: op.fixed_bytes(4)?,
            pre_verification_gas: op.fixed_bytes(5)?,
            gas_fees: op.fixed_bytes(6)?,
            paymaster_and_data: budget.take(op.bytes(7)?)?,
            signature: budget.take(op.bytes(8)?)?,
        })
    }
}

/// `execute(target, value, data)` calldata
pub fn encode_execute(call: &ForwardedCall) -> Vec<u8> {
    encode_call(
        *EXECUTE,
        &[
            Token::Address(call.target),
            Token::Uint(call.value),
            Token::Bytes(call.data.clone()),
        ],
    )
}

/// `executeBatch((address,uint256,bytes)[])` calldata
pub fn encode_execute_batch(calls: &[ForwardedCall]) -> Vec<u8> {
    encode_call(
        *EXECUTE_BATCH,
        &[Token::Array(calls.iter().map(ForwardedCall::token).collect())],
    )
}

/// `executeBatch(address[],uint256[],bytes[])` calldata
pub fn encode_execute_batch_arrays(calls: &[ForwardedCall]) -> Vec<u8> {
    encode_call(
        *EXECUTE_BATCH_ARRAYS,
        &[
            Token::Array(calls.iter().map(|c| Token::Address(c.target)).collect()),
            Token::Array(calls.iter().map(|c| Token::Uint(c.value)).collect()),
            Token::Array(calls.iter().map(|c| Token::Bytes(c.data.clone())).collect()),
        ],
    )
}

/// `handleOps(ops, beneficiary)` calldata
pub fn encode_handle_ops(ops: &[UserOperation], beneficiary: LedgerAddress) -> Vec<u8> {
    encode_call(
        *HANDLE_OPS,
        &[
            Token::Array(ops.iter().map(UserOperation::token).collect()),
            Token::Address(beneficiary),
        ],
    )
}

/// Parse `execute` calldata
pub fn decode_execute(data: &[u8]) -> Result<ForwardedCall> {
    let args = AbiReader::for_call(data, *EXECUTE)?;
    Ok(ForwardedCall {
        target: args.address(0)?,
        value: args.uint(1)?,
        data: args.bytes(2)?.to_vec(),
    })
}

/// Parse tuple-form `executeBatch` calldata
pub fn decode_execute_batch(data: &[u8]) -> Result<Vec<ForwardedCall>> {
    let args = AbiReader::for_call(data, *EXECUTE_BATCH)?;
    let (len, items) = args.array(0)?;
    let mut budget = CopyBudget::for_payload(data);

    (0..len)
        .map(|i| -> Result<ForwardedCall> {
            let call = items.tail(i)?;
            Ok(ForwardedCall {
                target: call.address(0)?,
                value: call.uint(1)?,
                data: budget.take(call.bytes(2)?)?,
            })
        })
        .collect()
}

/// Parse parallel-array `executeBatch` calldata.
///
/// An empty value array means every call carries zero value.
pub fn decode_execute_batch_arrays(data: &[u8]) -> Result<Vec<ForwardedCall>> {
    let args = AbiReader::for_call(data, *EXECUTE_BATCH_ARRAYS)?;
    let (targets_len, targets) = args.array(0)?;
    let (values_len, values) = args.array(1)?;
    let (datas_len, datas) = args.array(2)?;
    let mut budget = CopyBudget::for_payload(data);

    if datas_len != targets_len || (values_len != 0 && values_len != targets_len) {
        return Err(crate::Error::AbiDecode(format!(
            "executeBatch length mismatch: {} targets, {} values, {} payloads",
            targets_len, values_len, datas_len
        )));
    }

    (0..targets_len)
        .map(|i| -> Result<ForwardedCall> {
            Ok(ForwardedCall {
                target: targets.address(i)?,
                value: if values_len == 0 { 0 } else { values.uint(i)? },
                data: budget.take(datas.bytes(i)?)?,
            })
        })
        .collect()
}

/// Parse `handleOps` calldata into its user operations
pub fn decode_handle_ops(data: &[u8]) -> Result<(Vec<UserOperation>, LedgerAddress)> {
    let args = AbiReader::for_call(data, *HANDLE_OPS)?;
    let (len, items) = args.array(0)?;
    let mut budget = CopyBudget::for_payload(data);
    let ops = (0..len)
        .map(|i| -> Result<UserOperation> {
            UserOperation::decode(&items.tail(i)?, &mut budget)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((ops, args.address(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{uint_word, WORD_SIZE};

    /// `handleOps` whose `ops` offsets all name one operation, and whose
    /// four `bytes` fields all name one tail of `tail_len` bytes
    fn aliased_handle_ops(ops: usize, tail_len: usize) -> Vec<u8> {
        let mut data = HANDLE_OPS.to_vec();
        data.extend_from_slice(&uint_word(0x40));
        data.extend_from_slice(&[0u8; 32]);
        data.extend_from_slice(&uint_word(ops as u128));
        for _ in 0..ops {
            data.extend_from_slice(&uint_word((ops * WORD_SIZE) as u128));
        }
        let tail = uint_word((9 * WORD_SIZE) as u128);
        for field in 0..9 {
            match field {
                2 | 3 | 7 | 8 => data.extend_from_slice(&tail),
                _ => data.extend_from_slice(&[0u8; 32]),
            }
        }
        data.extend_from_slice(&uint_word(tail_len as u128));
        data.extend(std::iter::repeat(0x55).take(tail_len));
        data
    }

    /// Tuple-form `executeBatch` whose calls all share one payload
    fn aliased_execute_batch(calls: usize, tail_len: usize) -> Vec<u8> {
        let mut data = EXECUTE_BATCH.to_vec();
        data.extend_from_slice(&uint_word(0x20));
        data.extend_from_slice(&uint_word(calls as u128));
        for _ in 0..calls {
            data.extend_from_slice(&uint_word((calls * WORD_SIZE) as u128));
        }
        data.extend_from_slice(&[0u8; 32]);
        data.extend_from_slice(&[0u8; 32]);
        data.extend_from_slice(&uint_word((3 * WORD_SIZE) as u128));
        data.extend_from_slice(&uint_word(tail_len as u128));
        data.extend(std::iter::repeat(0x55).take(tail_len));
        data
    }

    fn calls() -> Vec<ForwardedCall> {
        vec![
            ForwardedCall::new(LedgerAddress::new([1; 20]), 0, vec![0xde, 0xad]),
            ForwardedCall::new(LedgerAddress::new([2; 20]), 99, vec![0x55; 100]),
        ]
    }

    #[test]
    fn test_execute() {
        let call = &calls()[1];
        assert_eq!(decode_execute(&encode_execute(call)).unwrap(), *call);
    }

    #[test]
    fn test_execute_batch_both_shapes() {
        let calls = calls();
        assert_eq!(decode_execute_batch(&encode_execute_batch(&calls)).unwrap(), calls);
        assert_eq!(
            decode_execute_batch_arrays(&encode_execute_batch_arrays(&calls)).unwrap(),
            calls
        );
    }

    #[test]
    fn test_execute_batch_arrays_empty_values() {
        let calls = calls();
        let data = encode_call(
            *EXECUTE_BATCH_ARRAYS,
            &[
                Token::Array(calls.iter().map(|c| Token::Address(c.target)).collect()),
                Token::Array(vec![]),
                Token::Array(calls.iter().map(|c| Token::Bytes(c.data.clone())).collect()),
            ],
        );
        let decoded = decode_execute_batch_arrays(&data).unwrap();
        assert!(decoded.iter().all(|c| c.value == 0));
        assert_eq!(decoded[1].data, calls[1].data);
    }

    #[test]
    fn test_execute_batch_arrays_length_mismatch() {
        let data = encode_call(
            *EXECUTE_BATCH_ARRAYS,
            &[
                Token::Array(vec![Token::Address(LedgerAddress::ZERO)]),
                Token::Array(vec![]),
                Token::Array(vec![]),
            ],
        );
        assert!(decode_execute_batch_arrays(&data).is_err());
    }

    #[test]
    fn test_handle_ops() {
        let mut op = UserOperation::new(LedgerAddress::new([7; 20]), encode_execute_batch(&calls()));
        op.signature = vec![0x1b; 65];
        op.nonce[31] = 3;
        let beneficiary = LedgerAddress::new([9; 20]);

        let data = encode_handle_ops(&[op.clone(), op.clone()], beneficiary);
        let (ops, decoded_beneficiary) = decode_handle_ops(&data).unwrap();
        assert_eq!(ops, vec![op.clone(), op]);
        assert_eq!(decoded_beneficiary, beneficiary);
    }

    #[test]
    fn test_handle_ops_aliased_offsets_rejected() {
        // Sharing a tail is tolerated while the copies fit the payload
        let (ops, _) = decode_handle_ops(&aliased_handle_ops(1, 32)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].call_data, vec![0x55; 32]);
        assert_eq!(ops[0].signature, ops[0].init_code);

        let data = aliased_handle_ops(200, 6_000);
        assert!(data.len() < 20_000);
        let err = decode_handle_ops(&data).unwrap_err();
        assert!(matches!(err, crate::Error::AbiDecode(_)));
    }

    #[test]
    fn test_execute_batch_aliased_offsets_rejected() {
        let calls = decode_execute_batch(&aliased_execute_batch(2, 40)).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);

        let data = aliased_execute_batch(200, 6_000);
        let err = decode_execute_batch(&data).unwrap_err();
        assert!(matches!(err, crate::Error::AbiDecode(_)));
    }

    #[test]
    fn test_selector_mismatch_is_error() {
        let data = encode_execute(&calls()[0]);
        assert!(decode_execute_batch(&data).is_err());
        assert!(decode_handle_ops(&data).is_err());
    }
}
