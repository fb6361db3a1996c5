//! Minimal Solidity ABI codec
//!
//! Covers the argument shapes the payment contract and account-abstraction
//! wrappers use: addresses, uints up to 128 bits, `bytes32`, `bytes`,
//! dynamic arrays and tuples. Decoding never trusts offsets or lengths; every
//! read is bounds-checked against the payload.

use crate::address::LedgerAddress;
use crate::crypto::keccak256;
use crate::{Error, Result};

/// Size of one ABI word
pub const WORD_SIZE: usize = 32;

/// Size of a function selector
pub const SELECTOR_SIZE: usize = 4;

/// Function selector: first four bytes of `keccak256(signature)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector of a call payload, if it is long enough to carry one
pub fn call_selector(data: &[u8]) -> Option<[u8; 4]> {
    data.get(..SELECTOR_SIZE)
        .and_then(|s| s.try_into().ok())
}

/// Right-aligned big-endian uint word
pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// ABI value to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `address`
    Address(LedgerAddress),
    /// `uint256` holding a value that fits in 128 bits
    Uint(u128),
    /// `bytes32`, or any other raw static word
    FixedBytes([u8; 32]),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `T[]`
    Array(Vec<Token>),
    /// `(T1, T2, ...)`
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_len(&self) -> usize {
        match self {
            Token::Tuple(items) if !self.is_dynamic() => items.iter().map(Token::head_len).sum(),
            _ => WORD_SIZE,
        }
    }
}

/// Encode a sequence of tokens (head/tail layout)
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_len).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }

    head.extend(tail);
    head
}

/// Encode a function call: selector followed by the encoded arguments
pub fn encode_call(selector: [u8; 4], tokens: &[Token]) -> Vec<u8> {
    let mut out = selector.to_vec();
    out.extend(encode(tokens));
    out
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(address) => address.to_word().to_vec(),
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::FixedBytes(word) => word.to_vec(),
        Token::Bytes(data) => {
            let padded = data.len().div_ceil(WORD_SIZE) * WORD_SIZE;
            let mut out = Vec::with_capacity(WORD_SIZE + padded);
            out.extend_from_slice(&uint_word(data.len() as u128));
            out.extend_from_slice(data);
            out.resize(WORD_SIZE + padded, 0);
            out
        }
        Token::Array(items) => {
            let mut out = uint_word(items.len() as u128).to_vec();
            out.extend(encode(items));
            out
        }
        Token::Tuple(items) => encode(items),
    }
}

/// Bounds-checked view over an encoded argument block.
///
/// `index` arguments count head words from the start of the view. Offsets
/// read from the head are relative to the start of the view, matching how
/// nested tuples and arrays are laid out.
#[derive(Debug, Clone, Copy)]
pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    /// View over raw argument bytes
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// View over the arguments of `data` if it starts with `selector`
    pub fn for_call(data: &'a [u8], selector: [u8; 4]) -> Result<Self> {
        match call_selector(data) {
            Some(found) if found == selector => Ok(Self::new(&data[SELECTOR_SIZE..])),
            Some(found) => Err(Error::AbiDecode(format!(
                "selector mismatch: expected 0x{}, got 0x{}",
                hex::encode(selector),
                hex::encode(found)
            ))),
            None => Err(Error::AbiDecode("payload shorter than a selector".to_string())),
        }
    }

    /// Length of the underlying block in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw head word
    pub fn word(&self, index: usize) -> Result<&'a [u8; 32]> {
        let start = index
            .checked_mul(WORD_SIZE)
            .ok_or_else(|| Error::AbiDecode("word index overflow".to_string()))?;
        self.data
            .get(start..start + WORD_SIZE)
            .and_then(|w| w.try_into().ok())
            .ok_or_else(|| {
                Error::AbiDecode(format!(
                    "word {} out of bounds ({} bytes)",
                    index,
                    self.data.len()
                ))
            })
    }

    /// `address` argument
    pub fn address(&self, index: usize) -> Result<LedgerAddress> {
        LedgerAddress::from_word(self.word(index)?)
            .map_err(|e| Error::AbiDecode(e.to_string()))
    }

    /// `uint256` argument that must fit in 128 bits
    pub fn uint(&self, index: usize) -> Result<u128> {
        let word = self.word(index)?;
        if word[..16].iter().any(|&b| b != 0) {
            return Err(Error::AbiDecode(format!("uint at word {} exceeds 128 bits", index)));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    /// `bytes32` argument
    pub fn fixed_bytes(&self, index: usize) -> Result<[u8; 32]> {
        Ok(*self.word(index)?)
    }

    fn usize_at(&self, index: usize) -> Result<usize> {
        usize::try_from(self.uint(index)?)
            .map_err(|_| Error::AbiDecode(format!("value at word {} too large", index)))
    }

    /// View at the offset stored in head word `index`
    pub fn tail(&self, index: usize) -> Result<AbiReader<'a>> {
        let offset = self.usize_at(index)?;
        let data = self
            .data
            .get(offset..)
            .ok_or_else(|| Error::AbiDecode(format!("offset {} out of bounds", offset)))?;
        Ok(AbiReader { data })
    }

    /// `bytes` argument
    pub fn bytes(&self, index: usize) -> Result<&'a [u8]> {
        let tail = self.tail(index)?;
        let len = tail.usize_at(0)?;
        let end = WORD_SIZE
            .checked_add(len)
            .ok_or_else(|| Error::AbiDecode("bytes length overflow".to_string()))?;
        tail.data
            .get(WORD_SIZE..end)
            .ok_or_else(|| Error::AbiDecode(format!("bytes of length {} truncated", len)))
    }

    /// Dynamic array argument: element count and a view over the elements
    pub fn array(&self, index: usize) -> Result<(usize, AbiReader<'a>)> {
        let tail = self.tail(index)?;
        let len = tail.usize_at(0)?;
        let items = AbiReader {
            data: &tail.data[WORD_SIZE..],
        };
        // Every element occupies at least one head word.
        if len > items.data.len() / WORD_SIZE {
            return Err(Error::AbiDecode(format!(
                "array of length {} exceeds payload",
                len
            )));
        }
        Ok((len, items))
    }
}

/// Cap on the bytes a decoder may copy out of one payload.
///
/// Offsets may point several head entries at the same tail, so a small
/// payload can name the same `bytes` value many times. A well-formed
/// encoding stores each value once, so its copies never add up to more
/// than the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct CopyBudget {
    remaining: usize,
}

impl CopyBudget {
    /// Budget of `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self { remaining: limit }
    }

    /// Budget sized to the payload being decoded
    pub fn for_payload(data: &[u8]) -> Self {
        Self::new(data.len())
    }

    /// Bytes left
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Owned copy of `bytes`, charged against the budget
    pub fn take(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.remaining = self
            .remaining
            .checked_sub(bytes.len())
            .ok_or_else(|| Error::AbiDecode("decoded data exceeds payload size".to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("execute(address,uint256,bytes)"), [0xb6, 0x1d, 0x27, 0xf6]);
    }

    #[test]
    fn test_encode_static_layout() {
        let address = LedgerAddress::new([0x11; 20]);
        let encoded = encode(&[Token::Address(address), Token::Uint(5)]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[12..32], &[0x11; 20]);
        assert_eq!(encoded[63], 5);
    }

    #[test]
    fn test_encode_bytes_layout() {
        // f(uint256, bytes) with 3 bytes of payload
        let encoded = encode(&[Token::Uint(1), Token::Bytes(vec![0xaa, 0xbb, 0xcc])]);
        assert_eq!(encoded.len(), 4 * WORD_SIZE);
        assert_eq!(encoded[63], 0x40); // offset of the bytes tail
        assert_eq!(encoded[95], 3); // length
        assert_eq!(&encoded[96..99], &[0xaa, 0xbb, 0xcc]);
        assert!(encoded[99..].iter().all(|&b| b == 0));

        let reader = AbiReader::new(&encoded);
        assert_eq!(reader.uint(0).unwrap(), 1);
        assert_eq!(reader.bytes(1).unwrap(), &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_nested_dynamic_tuple_array() {
        let calls = Token::Array(vec![
            Token::Tuple(vec![
                Token::Address(LedgerAddress::new([1; 20])),
                Token::Uint(7),
                Token::Bytes(vec![1, 2, 3]),
            ]),
            Token::Tuple(vec![
                Token::Address(LedgerAddress::new([2; 20])),
                Token::Uint(0),
                Token::Bytes(vec![0x42; 40]),
            ]),
        ]);
        let encoded = encode(&[calls]);

        let reader = AbiReader::new(&encoded);
        let (len, items) = reader.array(0).unwrap();
        assert_eq!(len, 2);

        let second = items.tail(1).unwrap();
        assert_eq!(second.address(0).unwrap(), LedgerAddress::new([2; 20]));
        assert_eq!(second.uint(1).unwrap(), 0);
        assert_eq!(second.bytes(2).unwrap(), &[0x42; 40][..]);
    }

    #[test]
    fn test_reader_rejects_out_of_bounds() {
        let reader = AbiReader::new(&[0u8; 31]);
        assert!(reader.word(0).is_err());

        let mut bogus_offset = uint_word(1_000).to_vec();
        bogus_offset.extend_from_slice(&[0u8; 32]);
        let reader = AbiReader::new(&bogus_offset);
        assert!(reader.bytes(0).is_err());

        // Claims a 1000-element array with no room for it.
        let mut huge = uint_word(32).to_vec();
        huge.extend_from_slice(&uint_word(1_000));
        assert!(AbiReader::new(&huge).array(0).is_err());
    }

    #[test]
    fn test_copy_budget() {
        let payload = [0u8; 10];
        let mut budget = CopyBudget::for_payload(&payload);
        assert_eq!(budget.take(&payload[..6]).unwrap(), vec![0u8; 6]);
        assert_eq!(budget.remaining(), 4);
        assert!(budget.take(&payload[..5]).is_err());
        assert_eq!(budget.remaining(), 4);
        assert!(budget.take(&payload[..4]).is_ok());
        assert!(budget.take(&[]).is_ok());
    }

    #[test]
    fn test_uint_overflow_rejected() {
        let word = [0xffu8; 32];
        assert!(AbiReader::new(&word).uint(0).is_err());
        assert_eq!(AbiReader::new(&word).fixed_bytes(0).unwrap(), word);
    }

    #[test]
    fn test_for_call_selector_check() {
        let data = encode_call([1, 2, 3, 4], &[Token::Uint(9)]);
        assert_eq!(AbiReader::for_call(&data, [1, 2, 3, 4]).unwrap().uint(0).unwrap(), 9);
        assert!(AbiReader::for_call(&data, [4, 3, 2, 1]).is_err());
        assert!(AbiReader::for_call(&[1, 2], [1, 2, 3, 4]).is_err());
    }
}
