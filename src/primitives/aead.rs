//! AES-256-GCM AEAD, grounded on the encrypted-key-share pattern used for
//! FROST key storage in this pack's sibling service: a password-derived key
//! wraps a secret blob with a random nonce and authenticated associated
//! data, and any verification failure collapses to one opaque error so a
//! caller can never learn whether the key or the ciphertext was wrong.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};

use crate::common::error::{Result, SccError};

/// Encrypt `plaintext` under `key32` with `nonce12`, authenticating `aad`.
/// Returns ciphertext with the 16-byte GCM tag appended.
pub fn aead_encrypt(key32: &[u8; 32], nonce12: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key32));
    let nonce = Nonce::from_slice(nonce12);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| SccError::AeadFailure)
}

/// Decrypt `ciphertext` (with trailing tag) under `key32`/`nonce12`,
/// verifying `aad`. Returns `AeadFailure` on any authentication failure —
/// deliberately no partial plaintext and no detail about which check
/// failed, so this can never be used to distinguish a wrong key from
/// corrupted ciphertext.
pub fn aead_decrypt(
    key32: &[u8; 32],
    nonce12: &[u8; 12],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key32));
    let nonce = Nonce::from_slice(nonce12);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SccError::AeadFailure)
}
