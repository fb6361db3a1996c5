//! Domain separation constants
//!
//! Every keyed-hash derivation in the wallet uses its own versioned salt and
//! info string. Changing any of these values changes every derived key, so a
//! new value always gets a new version suffix instead of an edit in place.

/// HKDF salt for the master key (password hash + external signature).
pub const MASTER_KEY_SALT: &[u8] = b"shade-master-salt-v1";

/// HKDF info for the master key.
pub const MASTER_KEY_INFO: &[u8] = b"shade-master-key-v1";

/// HKDF salt shared by every purpose-bound sub-key.
pub const SUBKEY_SALT: &[u8] = b"shade-subkey-salt-v1";

/// HKDF info prefix for sub-keys; the purpose label is appended.
pub const SUBKEY_INFO_PREFIX: &[u8] = b"shade-subkey-v1:";

/// HKDF salt for the password-only unlock key.
pub const UNLOCK_KEY_SALT: &[u8] = b"shade-unlock-salt-v1";

/// HKDF info for the password-only unlock key.
pub const UNLOCK_KEY_INFO: &[u8] = b"shade-unlock-key-v1";

/// Prefix for hashing the stealth shared secret to a scalar.
pub const STEALTH_HASH_TAG: &[u8] = b"shade-stealth-v1";

/// Sub-key purpose: encryption of wallet-local records.
pub const PURPOSE_STORAGE: &str = "storage-encryption";

/// Sub-key purpose: meta-viewing private key.
pub const PURPOSE_VIEWING: &str = "meta-viewing";

/// Sub-key purpose: meta-spending private key.
pub const PURPOSE_SPENDING: &str = "meta-spending";

/// Version of the message the external signer is asked to sign.
pub const SIGNING_MESSAGE_VERSION: u32 = 1;

/// Version byte of the encrypted key-set plaintext and vault record layout.
pub const VAULT_FORMAT_VERSION: u8 = 1;

/// Minimum salt length accepted by every password hash.
pub const MIN_SALT_LENGTH: usize = 16;

/// Default salt length produced for new vaults.
pub const DEFAULT_SALT_LENGTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_constants_distinct() {
        let all: [&[u8]; 7] = [
            MASTER_KEY_SALT,
            MASTER_KEY_INFO,
            SUBKEY_SALT,
            SUBKEY_INFO_PREFIX,
            UNLOCK_KEY_SALT,
            UNLOCK_KEY_INFO,
            STEALTH_HASH_TAG,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_salt_floor() {
        assert!(DEFAULT_SALT_LENGTH >= MIN_SALT_LENGTH);
    }
}
