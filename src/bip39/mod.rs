//! BIP39 Codec (C2): entropy ↔ mnemonic ↔ seed conversion against the fixed
//! 2048-word English list.
//!
//! The checksum/wordlist machinery is delegated to the `bip39` crate (see
//! the dependency note in `Cargo.toml`); this module owns the public
//! operation names and error mapping the core is specified against, and
//! the entropy-wiping discipline around them.

use bip39::{Language, Mnemonic};

use crate::common::error::{Result, SccError};
use crate::primitives::wipe::secure_wipe;

/// Strengths accepted by `generate_mnemonic`, in entropy bits.
pub const VALID_STRENGTHS: [u32; 5] = [128, 160, 192, 224, 256];

/// `generate_mnemonic(strength_bits)`: draw that many entropy bits, derive
/// the checksum, and return the word sequence. The entropy buffer is wiped
/// before return.
pub fn generate_mnemonic(strength_bits: u32) -> Result<Vec<String>> {
    if !VALID_STRENGTHS.contains(&strength_bits) {
        return Err(SccError::BadInput(format!(
            "invalid mnemonic strength: {strength_bits} bits"
        )));
    }

    let byte_len = (strength_bits / 8) as usize;
    let mut entropy = crate::primitives::rng::random_bytes(byte_len)?;

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| SccError::BadMnemonic(e.to_string()))?;

    secure_wipe(&mut entropy);

    Ok(mnemonic.words().map(str::to_string).collect())
}

/// `validate_mnemonic(words)`: each word must resolve to a unique index in
/// the wordlist, the bit length must be a multiple of 33, and the trailing
/// checksum bits must match. Returns the parsed `Mnemonic` on success.
pub fn validate_mnemonic(words: &[String]) -> Result<Mnemonic> {
    let phrase = words.join(" ");
    Mnemonic::parse_in_normalized(Language::English, &phrase)
        .map_err(|e| SccError::BadMnemonic(e.to_string()))
}

/// `mnemonic_to_seed(words, passphrase)`: `PBKDF2-HMAC-SHA512(password =
/// "mnemonic" ‖ passphrase, salt = NFKD(mnemonic words joined by spaces),
/// iter = 2048, dkLen = 64)`.
pub fn mnemonic_to_seed(words: &[String], passphrase: &str) -> Result<[u8; 64]> {
    let mnemonic = validate_mnemonic(words)?;
    let seed = mnemonic.to_seed_normalized(passphrase);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_validate_round_trips() {
        for strength in VALID_STRENGTHS {
            let words = generate_mnemonic(strength).unwrap();
            assert!(validate_mnemonic(&words).is_ok());
        }
    }

    #[test]
    fn test_generate_rejects_invalid_strength() {
        assert!(generate_mnemonic(100).is_err());
    }

    #[test]
    fn test_known_answer_seed_vector() {
        // spec.md §8 scenario 1.
        let words: Vec<String> = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"
            .split_whitespace()
            .map(String::from)
            .collect();
        let seed = mnemonic_to_seed(&words, "").unwrap();
        assert_eq!(
            hex::encode(seed),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_validate_rejects_unknown_word() {
        let words: Vec<String> = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zzzznotaword"
            .split_whitespace()
            .map(String::from)
            .collect();
        assert!(validate_mnemonic(&words).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_checksum() {
        let words: Vec<String> = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zoo"
            .split_whitespace()
            .map(String::from)
            .collect();
        assert!(validate_mnemonic(&words).is_err());
    }
}
