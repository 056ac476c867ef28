//! secp256k1 EC point operations and deterministic ECDSA.
//!
//! Built on the `secp256k1` crate (libsecp256k1 bindings) rather than
//! hand-rolled field/point arithmetic.
//! `sign_ecdsa_low_r`/RFC 6979 deterministic nonces are already the
//! library's default; this module still normalizes to low-S explicitly
//! rather than relying on that default, per §4.1.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::common::error::{Result, SccError};

/// `secp256k1_point_mul_generator(scalar) → compressed_pubkey`: derive the
/// compressed (33-byte) public key for a private scalar.
pub fn point_mul_generator(scalar: &[u8; 32]) -> Result<[u8; 33]> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(scalar)
        .map_err(|e| SccError::BadInput(format!("invalid private scalar: {e}")))?;
    let pk = PublicKey::from_secret_key(&secp, &sk);
    Ok(pk.serialize())
}

/// Uncompressed (65-byte, `0x04`-prefixed) public key, needed for Ethereum
/// address derivation which hashes the raw X/Y coordinates.
pub fn point_mul_generator_uncompressed(scalar: &[u8; 32]) -> Result<[u8; 65]> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(scalar)
        .map_err(|e| SccError::BadInput(format!("invalid private scalar: {e}")))?;
    let pk = PublicKey::from_secret_key(&secp, &sk);
    Ok(pk.serialize_uncompressed())
}

/// Result of a deterministic ECDSA signature: `r`, `s` (each 32 bytes, `s`
/// normalized to low-S), and the recovery id needed for Ethereum.
pub struct EcdsaSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl EcdsaSignature {
    /// 64-byte fixed `r‖s` encoding (Ethereum-style).
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    /// DER encoding (Bitcoin-style).
    pub fn to_der(&self) -> Vec<u8> {
        fn push_integer(out: &mut Vec<u8>, bytes: &[u8]) {
            let mut trimmed = bytes;
            while trimmed.len() > 1 && trimmed[0] == 0 && trimmed[1] < 0x80 {
                trimmed = &trimmed[1..];
            }
            out.push(0x02);
            if trimmed[0] & 0x80 != 0 {
                out.push((trimmed.len() + 1) as u8);
                out.push(0x00);
            } else {
                out.push(trimmed.len() as u8);
            }
            out.extend_from_slice(trimmed);
        }

        let mut body = Vec::with_capacity(72);
        push_integer(&mut body, &self.r);
        push_integer(&mut body, &self.s);

        let mut out = Vec::with_capacity(body.len() + 2);
        out.push(0x30);
        out.push(body.len() as u8);
        out.extend_from_slice(&body);
        out
    }
}

/// `ecdsa_sign_deterministic(priv, msg32) → (r, s)` via RFC 6979, with `s`
/// normalized to canonical low-S (`s ≤ n/2`) and the recovery id tracked
/// for Ethereum's `v`.
pub fn sign_deterministic(priv_key: &[u8; 32], msg32: &[u8; 32]) -> Result<EcdsaSignature> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(priv_key)
        .map_err(|e| SccError::BadInput(format!("invalid private scalar: {e}")))?;
    let msg = Message::from_digest(*msg32);

    let recoverable: RecoverableSignature = secp.sign_ecdsa_recoverable(&msg, &sk);
    let (recovery_id, mut sig) = recoverable.serialize_compact();

    let r: [u8; 32] = sig[..32].try_into().unwrap();
    let s_is_high = is_high_s(&sig[32..]);
    if s_is_high {
        negate_s(&mut sig[32..]);
    }
    let s: [u8; 32] = sig[32..].try_into().unwrap();

    let recovery_id = if s_is_high {
        flip_recovery_id(recovery_id)
    } else {
        recovery_id.to_i32() as u8
    };

    Ok(EcdsaSignature {
        r,
        s,
        recovery_id,
    })
}

// secp256k1 group order n, big-endian.
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

fn is_high_s(s: &[u8]) -> bool {
    // s > n/2  <=>  2*s > n, compared as big integers (33-byte doubled
    // value against the order zero-extended to 33 bytes).
    let mut doubled = [0u8; 33];
    let mut carry = 0u16;
    for i in (0..32).rev() {
        let v = (s[i] as u16) * 2 + carry;
        doubled[i + 1] = (v & 0xFF) as u8;
        carry = v >> 8;
    }
    doubled[0] = carry as u8;

    let mut order_ext = [0u8; 33];
    order_ext[1..].copy_from_slice(&SECP256K1_ORDER);

    doubled > order_ext
}

fn negate_s(s: &mut [u8]) {
    // s' = n - s
    let mut borrow = 0i32;
    for i in (0..32).rev() {
        let mut v = SECP256K1_ORDER[i] as i32 - s[i] as i32 - borrow;
        if v < 0 {
            v += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        s[i] = v as u8;
    }
}

fn flip_recovery_id(id: RecoveryId) -> u8 {
    (id.to_i32() ^ 1) as u8
}

/// Recover the signer's compressed public key from a 64-byte `r‖s`
/// signature, message digest, and recovery id — used to confirm `v` before
/// broadcasting an Ethereum transaction.
pub fn recover_pubkey(
    sig: &EcdsaSignature,
    msg32: &[u8; 32],
) -> Result<[u8; 33]> {
    let secp = Secp256k1::new();
    let recovery_id = RecoveryId::from_i32(sig.recovery_id as i32)
        .map_err(|e| SccError::BadInput(format!("invalid recovery id: {e}")))?;
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&sig.r);
    compact[32..].copy_from_slice(&sig.s);
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| SccError::BadInput(format!("invalid signature: {e}")))?;
    let msg = Message::from_digest(*msg32);
    let pk = secp
        .recover_ecdsa(&msg, &recoverable)
        .map_err(|e| SccError::BadInput(format!("recovery failed: {e}")))?;
    Ok(pk.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hash::sha256;

    #[test]
    fn test_sign_deterministic_reproducible() {
        let sk = [0x01u8; 32];
        let msg = sha256(b"hello world");
        let sig1 = sign_deterministic(&sk, &msg).unwrap();
        let sig2 = sign_deterministic(&sk, &msg).unwrap();
        assert_eq!(sig1.r, sig2.r);
        assert_eq!(sig1.s, sig2.s);
    }

    #[test]
    fn test_sign_low_s() {
        let sk = [0x02u8; 32];
        let msg = sha256(b"some transaction digest");
        let sig = sign_deterministic(&sk, &msg).unwrap();
        assert!(!is_high_s(&sig.s));
    }

    #[test]
    fn test_recover_pubkey_matches_signer() {
        let sk_bytes = [0x03u8; 32];
        let msg = sha256(b"recoverable message");
        let sig = sign_deterministic(&sk_bytes, &msg).unwrap();

        let expected_pubkey = point_mul_generator(&sk_bytes).unwrap();
        let recovered = recover_pubkey(&sig, &msg).unwrap();
        assert_eq!(recovered, expected_pubkey);
    }

    #[test]
    fn test_der_encoding_starts_with_sequence_tag() {
        let sk = [0x04u8; 32];
        let msg = sha256(b"der test");
        let sig = sign_deterministic(&sk, &msg).unwrap();
        let der = sig.to_der();
        assert_eq!(der[0], 0x30);
    }
}
