//! Primitives (C1): the lowest layer of the Secret Custody Core.
//!
//! Constant-time comparisons, secure RNG, hashing/MAC, PBKDF2, AEAD,
//! secp256k1 EC ops and ECDSA, base58check/bech32 encoding, and secure
//! wiping. Every routine here accepts buffers the caller owns, never
//! copies secret material to long-lived storage, and returns only
//! length-bounded outputs.

pub mod aead;
pub mod ecdsa;
pub mod encoding;
pub mod hash;
pub mod kdf;
pub mod rng;
pub mod wipe;

pub use aead::{aead_decrypt, aead_encrypt};
pub use ecdsa::{point_mul_generator, point_mul_generator_uncompressed, recover_pubkey, sign_deterministic, EcdsaSignature};
pub use encoding::{base58check_decode, base58check_encode, bech32_decode, bech32_encode, constant_time_equals};
pub use hash::{hash160, hmac_sha512, keccak256, ripemd160, sha256, sha512};
pub use kdf::pbkdf2_hmac_sha512;
pub use rng::{random_array, random_bytes};
pub use wipe::{secure_wipe, SecretBytes};
