//! PBKDF2-HMAC-SHA512 key derivation.
//!
//! Used for three independent purposes, each with its own salt and
//! iteration count so none of the derivations can be used to recover
//! another: the BIP39 mnemonic-to-seed stretch (fixed at 2048 iterations by
//! BIP39 itself), the vault encryption key, and the password verifier.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

/// `PBKDF2-HMAC-SHA512(password, salt, iter, dkLen)`.
pub fn pbkdf2_hmac_sha512(password: &[u8], salt: &[u8], iter: u32, dk_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; dk_len];
    pbkdf2_hmac::<Sha512>(password, salt, iter, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_deterministic() {
        let a = pbkdf2_hmac_sha512(b"password", b"salt", 10, 32);
        let b = pbkdf2_hmac_sha512(b"password", b"salt", 10, 32);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_pbkdf2_salt_sensitivity() {
        let a = pbkdf2_hmac_sha512(b"password", b"salt1", 10, 32);
        let b = pbkdf2_hmac_sha512(b"password", b"salt2", 10, 32);
        assert_ne!(a, b);
    }
}
