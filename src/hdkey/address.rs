//! Address encoding: Bitcoin P2PKH/bech32 P2WPKH, Ethereum EIP-55 hex.

use crate::primitives::encoding::{base58check_encode, bech32_encode};
use crate::primitives::hash::{hash160, keccak256};

/// `base58check(versionByte ‖ hash160(pubkey_compressed))`. `testnet`
/// selects version `0x6F` instead of mainnet's `0x00`.
pub fn bitcoin_p2pkh_address(pubkey_compressed: &[u8; 33], testnet: bool) -> String {
    let version = if testnet { 0x6Fu8 } else { 0x00u8 };
    let h160 = hash160(pubkey_compressed);

    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(&h160);

    base58check_encode(&payload)
}

/// `bech32_encode(hrp, 0x00, hash160(pubkey))`, hrp = `bc`/`tb`.
pub fn bitcoin_p2wpkh_address(pubkey_compressed: &[u8; 33], testnet: bool) -> crate::common::error::Result<String> {
    let hrp = if testnet { "tb" } else { "bc" };
    let h160 = hash160(pubkey_compressed);
    bech32_encode(hrp, 0, &h160)
}

/// `0x` ‖ EIP-55 checksummed hex of `keccak256(pubkey_uncompressed[1:])[12:32]`.
pub fn ethereum_address(pubkey_uncompressed: &[u8; 65]) -> String {
    let hash = keccak256(&pubkey_uncompressed[1..]);
    let raw_address = &hash[12..32];
    eip55_checksum(raw_address)
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address.
fn eip55_checksum(address: &[u8]) -> String {
    let hex_lower = hex::encode(address);
    let hash = keccak256(hex_lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");

    for (i, c) in hex_lower.chars().enumerate() {
        if c.is_ascii_digit() {
            out.push(c);
            continue;
        }
        // Nibble i of the keccak256 hash of the lowercase hex string
        // selects whether this letter is upper- or lower-cased.
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0F
        };
        if nibble >= 8 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eip55_checksum_known_vector() {
        // EIP-55 reference test vector.
        let address_bytes =
            hex::decode("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(
            eip55_checksum(&address_bytes),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_p2wpkh_address_has_expected_prefix() {
        let pubkey = [0x02u8; 33];
        let address = bitcoin_p2wpkh_address(&pubkey, false).unwrap();
        assert!(address.starts_with("bc1q"));
    }
}
