//! HD Key Engine (C3): BIP32 master/child derivation and BIP44 account
//! paths, built on `bitcoin::bip32`.
//!
//! Re-implementing secp256k1 scalar/point arithmetic for child derivation
//! by hand would be a strictly worse, less-reviewed version of what
//! `bitcoin::bip32` already provides — the same reasoning the sibling
//! `alpenlabs-strata` key-derivation crate in this retrieval pack applies
//! (`Xpriv`/`Xpub`/`ChildNumber`/`DerivationPath` used directly rather than
//! hand-rolled point addition).

pub mod address;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::SECP256K1;
use bitcoin::NetworkKind;
use std::str::FromStr;

use crate::common::error::{Result, SccError};

/// A coin this engine knows BIP44 paths and address formats for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coin {
    Bitcoin,
    BitcoinTestnet,
    Ethereum,
}

impl Coin {
    /// BIP44 coin type.
    fn coin_type(&self) -> u32 {
        match self {
            Coin::Bitcoin => 0,
            Coin::BitcoinTestnet => 1,
            Coin::Ethereum => 60,
        }
    }
}

/// The SCC's own projection of an extended key's public fields, per §3's
/// `ExtendedKey` entity.
pub struct ExtendedKey {
    pub key_bytes: [u8; 32],
    pub chain_code: [u8; 32],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
    pub is_private: bool,
    xpriv: Option<Xpriv>,
    xpub: Xpub,
}

impl ExtendedKey {
    /// `master_from_seed(seed64)`: `I = HMAC-SHA512(key="Bitcoin seed",
    /// data=seed)`; left 32 bytes become the master private key, right 32
    /// the chain code. Depth/parentFingerprint/childNumber are all zero.
    pub fn master_from_seed(seed: &[u8; 64]) -> Result<Self> {
        let xpriv = Xpriv::new_master(NetworkKind::Main, seed)
            .map_err(|e| SccError::BadInput(format!("invalid seed for master key: {e}")))?;
        let xpub = Xpub::from_priv(SECP256K1, &xpriv);
        Ok(Self::from_xpriv(xpriv, xpub))
    }

    fn from_xpriv(xpriv: Xpriv, xpub: Xpub) -> Self {
        Self {
            key_bytes: xpriv.private_key.secret_bytes(),
            chain_code: *xpriv.chain_code.as_bytes(),
            depth: xpriv.depth,
            parent_fingerprint: xpriv.parent_fingerprint.to_bytes(),
            child_number: u32::from(xpriv.child_number),
            is_private: true,
            xpriv: Some(xpriv),
            xpub,
        }
    }

    /// `derive_child(parent, i)`: hardened if `i ≥ 2^31`, requiring the
    /// private parent; non-hardened derivation works from a public-only
    /// key too.
    pub fn derive_child(&self, i: u32) -> Result<Self> {
        let child_number = if i >= (1 << 31) {
            ChildNumber::from_hardened_idx(i - (1 << 31))
                .map_err(|e| SccError::BadInput(format!("invalid child index: {e}")))?
        } else {
            ChildNumber::from_normal_idx(i)
                .map_err(|e| SccError::BadInput(format!("invalid child index: {e}")))?
        };

        match &self.xpriv {
            Some(xpriv) => {
                let child_xpriv = xpriv
                    .derive_priv(SECP256K1, &[child_number])
                    .map_err(|e| SccError::BadInput(format!("child derivation failed: {e}")))?;
                let child_xpub = Xpub::from_priv(SECP256K1, &child_xpriv);
                Ok(Self::from_xpriv(child_xpriv, child_xpub))
            }
            None => {
                if child_number.is_hardened() {
                    return Err(SccError::BadInput(
                        "hardened derivation requires the private parent key".into(),
                    ));
                }
                let child_xpub = self
                    .xpub
                    .derive_pub(SECP256K1, &[child_number])
                    .map_err(|e| SccError::BadInput(format!("child derivation failed: {e}")))?;
                Ok(Self {
                    key_bytes: [0u8; 32],
                    chain_code: *child_xpub.chain_code.as_bytes(),
                    depth: child_xpub.depth,
                    parent_fingerprint: child_xpub.parent_fingerprint.to_bytes(),
                    child_number: u32::from(child_xpub.child_number),
                    is_private: false,
                    xpriv: None,
                    xpub: child_xpub,
                })
            }
        }
    }

    /// `derive_path(master, path)` for a BIP44 `(account, change, index)`
    /// tuple against the given coin — `m/44'/coin'/account'/change/index`.
    pub fn derive_bip44(
        &self,
        coin: Coin,
        account: u32,
        change: u32,
        index: u32,
    ) -> Result<Self> {
        let path_str = format!(
            "m/44'/{}'/{}'/{}/{}",
            coin.coin_type(),
            account,
            change,
            index
        );
        self.derive_path(&path_str)
    }

    /// Derive to the BIP44 account level only (`m/44'/coin'/account'`),
    /// stopping short of `change`/`index` so the result can be `neuter()`ed
    /// and cached for repeated public-only derivation.
    pub fn derive_account(&self, coin: Coin, account: u32) -> Result<Self> {
        let path = format!("m/44'/{}'/{}'", coin.coin_type(), account);
        self.derive_path(&path)
    }

    /// Derive along an arbitrary BIP32 path string, e.g. `m/44'/0'/0'/0/0`.
    pub fn derive_path(&self, path: &str) -> Result<Self> {
        let derivation_path = DerivationPath::from_str(path)
            .map_err(|e| SccError::BadInput(format!("invalid derivation path: {e}")))?;

        match &self.xpriv {
            Some(xpriv) => {
                let child_xpriv = xpriv
                    .derive_priv(SECP256K1, &derivation_path)
                    .map_err(|e| SccError::BadInput(format!("path derivation failed: {e}")))?;
                let child_xpub = Xpub::from_priv(SECP256K1, &child_xpriv);
                Ok(Self::from_xpriv(child_xpriv, child_xpub))
            }
            None => {
                let child_xpub = self
                    .xpub
                    .derive_pub(SECP256K1, &derivation_path)
                    .map_err(|e| SccError::BadInput(format!("path derivation failed: {e}")))?;
                Ok(Self {
                    key_bytes: [0u8; 32],
                    chain_code: *child_xpub.chain_code.as_bytes(),
                    depth: child_xpub.depth,
                    parent_fingerprint: child_xpub.parent_fingerprint.to_bytes(),
                    child_number: u32::from(child_xpub.child_number),
                    is_private: false,
                    xpriv: None,
                    xpub: child_xpub,
                })
            }
        }
    }

    /// Compressed (33-byte) public key.
    pub fn public_key_compressed(&self) -> [u8; 33] {
        self.xpub.public_key.serialize()
    }

    /// Uncompressed (65-byte) public key, needed for Ethereum addressing.
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        self.xpub.public_key.serialize_uncompressed()
    }

    /// Strip the private key, keeping only the public extended key. Used to
    /// cache an account-level key in memory for repeated non-hardened
    /// `derive_child`/`derive_path` calls (BIP44's `change`/`index` levels)
    /// without holding the seed or any private scalar beyond the single call
    /// that produced this key.
    pub fn neuter(&self) -> Self {
        Self {
            key_bytes: [0u8; 32],
            chain_code: self.chain_code,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            is_private: false,
            xpriv: None,
            xpub: self.xpub,
        }
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        crate::primitives::wipe::secure_wipe(&mut self.key_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_seed() -> [u8; 64] {
        let mut seed = [0u8; 64];
        for (i, b) in seed.iter_mut().enumerate() {
            *b = i as u8;
        }
        seed
    }

    #[test]
    fn test_master_from_seed_is_deterministic() {
        let seed = test_seed();
        let a = ExtendedKey::master_from_seed(&seed).unwrap();
        let b = ExtendedKey::master_from_seed(&seed).unwrap();
        assert_eq!(a.key_bytes, b.key_bytes);
        assert_eq!(a.chain_code, b.chain_code);
        assert_eq!(a.depth, 0);
        assert_eq!(a.child_number, 0);
    }

    #[test]
    fn test_derive_bip44_matches_explicit_path() {
        let seed = test_seed();
        let master = ExtendedKey::master_from_seed(&seed).unwrap();
        let via_bip44 = master.derive_bip44(Coin::Bitcoin, 0, 0, 0).unwrap();
        let via_path = master.derive_path("m/44'/0'/0'/0/0").unwrap();
        assert_eq!(via_bip44.key_bytes, via_path.key_bytes);
    }

    #[test]
    fn test_known_answer_master_to_p2pkh_address() {
        use crate::bip39;
        use crate::hdkey::address::bitcoin_p2pkh_address;

        let words: Vec<String> = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"
            .split_whitespace()
            .map(String::from)
            .collect();
        let seed = bip39::mnemonic_to_seed(&words, "").unwrap();
        let master = ExtendedKey::master_from_seed(&seed).unwrap();
        let account_key = master.derive_bip44(Coin::Bitcoin, 0, 0, 0).unwrap();

        let address = bitcoin_p2pkh_address(&account_key.public_key_compressed(), false);
        assert_eq!(address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
    }
}
