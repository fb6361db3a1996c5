//! Property-based tests for shade-core
//!
//! Uses proptest to verify invariants across randomized inputs

use proptest::prelude::*;
use shade_core::abi::{encode, AbiReader, Token};
use shade_core::forwarding::{decode_execute_batch, encode_execute_batch, ForwardedCall};
use shade_core::keys::{derive_key_set, derive_sub_key, derive_unlock_key};
use shade_core::stealth::{self, check_with_spending_key};
use shade_core::{KdfConfig, LedgerAddress};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Passwords of printable characters (1-40 chars)
fn password_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9!@#$%^&*]{1,40}").unwrap()
}

/// 65-byte stand-in for an external signature
fn signature_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 65)
}

/// Salts at or above the minimum length
fn salt_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 16..64)
}

/// Random forwarded call
fn call_strategy() -> impl Strategy<Value = ForwardedCall> {
    (
        any::<[u8; 20]>(),
        any::<u128>(),
        prop::collection::vec(any::<u8>(), 0..200),
    )
        .prop_map(|(target, value, data)| ForwardedCall::new(LedgerAddress::new(target), value, data))
}

// ============================================================================
// Key Derivation Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: Same password + signature + salt = same key set
    #[test]
    fn prop_deterministic_key_set(
        password in password_strategy(),
        signature in signature_strategy(),
        salt in salt_strategy()
    ) {
        let a = derive_key_set(&password, &signature, &salt, &KdfConfig::INSECURE_FAST).unwrap();
        let b = derive_key_set(&password, &signature, &salt, &KdfConfig::INSECURE_FAST).unwrap();

        prop_assert_eq!(a.master_key(), b.master_key());
        prop_assert_eq!(a.public_keys(), b.public_keys());
    }

    /// Property: Changing the signature changes every sub-key
    #[test]
    fn prop_signature_is_second_factor(
        password in password_strategy(),
        sig1 in signature_strategy(),
        sig2 in signature_strategy(),
        salt in salt_strategy()
    ) {
        prop_assume!(sig1 != sig2);

        let a = derive_key_set(&password, &sig1, &salt, &KdfConfig::INSECURE_FAST).unwrap();
        let b = derive_key_set(&password, &sig2, &salt, &KdfConfig::INSECURE_FAST).unwrap();

        prop_assert_ne!(a.storage_key(), b.storage_key());
        prop_assert_ne!(a.viewing_private_key(), b.viewing_private_key());
        prop_assert_ne!(a.spending_private_key(), b.spending_private_key());
    }

    /// Property: Unlock key depends on the password only
    #[test]
    fn prop_unlock_key_password_bound(
        pass1 in password_strategy(),
        pass2 in password_strategy(),
        salt in salt_strategy()
    ) {
        prop_assume!(pass1 != pass2);

        let a = derive_unlock_key(&pass1, &salt, &KdfConfig::INSECURE_FAST).unwrap();
        let b = derive_unlock_key(&pass1, &salt, &KdfConfig::INSECURE_FAST).unwrap();
        let c = derive_unlock_key(&pass2, &salt, &KdfConfig::INSECURE_FAST).unwrap();

        prop_assert_eq!(*a, *b);
        prop_assert_ne!(*a, *c);
    }
}

proptest! {
    /// Property: Distinct purposes yield unrelated sub-keys
    #[test]
    fn prop_purposes_independent(
        master in any::<[u8; 32]>(),
        p1 in "[a-z-]{1,24}",
        p2 in "[a-z-]{1,24}"
    ) {
        prop_assume!(p1 != p2);

        let a = derive_sub_key(&master, &p1, 32).unwrap();
        let b = derive_sub_key(&master, &p2, 32).unwrap();
        prop_assert_ne!(&a[..], &b[..]);
    }

    /// Property: Shorter outputs are prefixes of longer ones (HKDF expand)
    #[test]
    fn prop_sub_key_length_prefix(
        master in any::<[u8; 32]>(),
        len in 1usize..=255
    ) {
        let full = derive_sub_key(&master, "storage-encryption", 255).unwrap();
        let short = derive_sub_key(&master, "storage-encryption", len).unwrap();
        prop_assert_eq!(&full[..len], &short[..]);
    }
}

// ============================================================================
// Stealth Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: Recipient always recognizes a generated address and the
    /// recovered key controls it
    #[test]
    fn prop_stealth_round_trip(
        viewing in any::<[u8; 32]>(),
        spending in any::<[u8; 32]>()
    ) {
        let viewing_key = secp256k1::SecretKey::from_slice(&viewing);
        let spending_key = secp256k1::SecretKey::from_slice(&spending);
        prop_assume!(viewing_key.is_ok() && spending_key.is_ok());

        let secp = secp256k1::Secp256k1::new();
        let viewing_pub = secp256k1::PublicKey::from_secret_key(&secp, &viewing_key.unwrap());
        let spending_pub = secp256k1::PublicKey::from_secret_key(&secp, &spending_key.unwrap());

        let generated = stealth::generate(&viewing_pub, &spending_pub).unwrap();
        let result = check_with_spending_key(
            &generated.ephemeral_bytes(),
            &viewing,
            &spending,
            &generated.stealth_address,
        )
        .unwrap();

        prop_assert!(result.is_for_me);
        let d = result.stealth_private_key.unwrap();
        prop_assert_eq!(
            stealth::stealth_key_address(&d).unwrap(),
            generated.stealth_address
        );
    }
}

// ============================================================================
// ABI Properties
// ============================================================================

proptest! {
    /// Property: Batched calls decode to what was encoded
    #[test]
    fn prop_execute_batch_decodes(calls in prop::collection::vec(call_strategy(), 0..6)) {
        let data = encode_execute_batch(&calls);
        prop_assert_eq!(decode_execute_batch(&data).unwrap(), calls);
    }

    /// Property: Truncated payloads never panic
    #[test]
    fn prop_truncated_payload_is_error_not_panic(
        payload in prop::collection::vec(any::<u8>(), 0..300),
        cut in 0usize..300
    ) {
        let data = encode(&[Token::Bytes(payload.clone()), Token::Uint(1)]);
        let cut = cut.min(data.len());
        let reader = AbiReader::new(&data[..cut]);
        let _ = reader.bytes(0);
        let _ = reader.array(0);
        let _ = reader.uint(1);
    }
}
