//! Base58Check, BIP173 bech32, and constant-time comparison.
//!
//! Base58Check defers to `bs58` (already part of the pack's dependency
//! stack in `iqlusioninc-crates/bip32`). Bech32 is hand-rolled: §4.1 lists
//! `bech32_encode`/`bech32_decode` as primitives the core itself owns, the
//! algorithm is small and fully pinned by BIP173, and the only bech32 crate
//! available in this retrieval pack is a major-version jump from the API
//! this code was grounded against, which is a correctness risk not worth
//! taking without a compiler to check it against.

use crate::common::error::{Result, SccError};
use subtle::ConstantTimeEq;

/// Base58Check-encode `payload` (version byte + data; the 4-byte checksum
/// is appended internally).
pub fn base58check_encode(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

/// Base58Check-decode `s`, verifying the checksum.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| SccError::BadInput(format!("invalid base58check: {e}")))
}

/// Compare two byte slices in constant time with respect to their content
/// (not their length). Returns `false` immediately if lengths differ, since
/// §8 property 7 only requires the running time to depend on `len(a)=len(b)`.
pub fn constant_time_equals(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn bech32_polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [
        0x3b6a_57b2,
        0x2650_8e6d,
        0x1ea1_19fa,
        0x3d42_33dd,
        0x2a14_62b3,
    ];
    let mut chk: u32 = 1;
    for &v in values {
        let b = chk >> 25;
        chk = (chk & 0x01ff_ffff) << 5 ^ (v as u32);
        for i in 0..5 {
            if (b >> i) & 1 == 1 {
                chk ^= GEN[i];
            }
        }
    }
    chk
}

fn bech32_hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    for c in hrp.bytes() {
        out.push(c >> 5);
    }
    out.push(0);
    for c in hrp.bytes() {
        out.push(c & 31);
    }
    out
}

fn bech32_create_checksum(hrp: &str, data: &[u8]) -> Vec<u8> {
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; 6]);
    let polymod = bech32_polymod(&values) ^ 1;
    (0..6)
        .map(|i| ((polymod >> (5 * (5 - i))) & 31) as u8)
        .collect()
}

fn bech32_verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(data);
    bech32_polymod(&values) == 1
}

/// Convert bits from an 8-bit group size to a 5-bit group size (or back),
/// as BIP173 §"Segwit address format" requires for packing the witness
/// program into 5-bit words.
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Result<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv: u32 = (1 << to_bits) - 1;
    for &value in data {
        let value = value as u32;
        if value >> from_bits != 0 {
            return Err(SccError::BadInput("invalid bech32 data value".into()));
        }
        acc = (acc << from_bits) | value;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return Err(SccError::BadInput("invalid bech32 padding".into()));
    }
    Ok(ret)
}

/// Encode a BIP173 segwit address: `hrp` (`bc`/`tb`), `witness_version`
/// (0 for P2WPKH), and the witness program bytes (the 20-byte hash160 for
/// P2WPKH).
pub fn bech32_encode(hrp: &str, witness_version: u8, witness_program: &[u8]) -> Result<String> {
    let mut data = vec![witness_version];
    data.extend(convert_bits(witness_program, 8, 5, true)?);

    let checksum = bech32_create_checksum(hrp, &data);
    let mut combined = data;
    combined.extend(checksum);

    let mut out = String::with_capacity(hrp.len() + 1 + combined.len());
    out.push_str(hrp);
    out.push('1');
    for v in combined {
        out.push(BECH32_CHARSET[v as usize] as char);
    }
    Ok(out)
}

/// Decode a BIP173 segwit address, returning `(hrp, witness_version,
/// witness_program)`.
pub fn bech32_decode(address: &str) -> Result<(String, u8, Vec<u8>)> {
    if address.len() < 8 || address.len() > 90 {
        return Err(SccError::BadInput("invalid bech32 length".into()));
    }
    let has_lower = address.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = address.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(SccError::BadInput("mixed-case bech32 string".into()));
    }
    let s = address.to_lowercase();

    let sep_pos = s
        .rfind('1')
        .ok_or_else(|| SccError::BadInput("missing bech32 separator".into()))?;
    if sep_pos == 0 || sep_pos + 7 > s.len() {
        return Err(SccError::BadInput("invalid bech32 separator position".into()));
    }

    let hrp = &s[..sep_pos];
    let data_part = &s[sep_pos + 1..];

    let mut data = Vec::with_capacity(data_part.len());
    for c in data_part.bytes() {
        let v = BECH32_CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| SccError::BadInput("invalid bech32 character".into()))?;
        data.push(v as u8);
    }

    if !bech32_verify_checksum(hrp, &data) {
        return Err(SccError::BadInput("invalid bech32 checksum".into()));
    }

    let payload = &data[..data.len() - 6];
    let witness_version = *payload
        .first()
        .ok_or_else(|| SccError::BadInput("empty bech32 payload".into()))?;
    let witness_program = convert_bits(&payload[1..], 5, 8, false)?;

    Ok((hrp.to_string(), witness_version, witness_program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_equals() {
        assert!(constant_time_equals(b"abc", b"abc"));
        assert!(!constant_time_equals(b"abc", b"abd"));
        assert!(!constant_time_equals(b"abc", b"ab"));
    }

    #[test]
    fn test_base58check_roundtrip() {
        let payload = [0x00u8, 0x01, 0x02, 0x03];
        let encoded = base58check_encode(&payload);
        let decoded = base58check_decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_bech32_roundtrip_p2wpkh() {
        let program = [0xAAu8; 20];
        let encoded = bech32_encode("bc", 0, &program).unwrap();
        let (hrp, version, decoded_program) = bech32_decode(&encoded).unwrap();
        assert_eq!(hrp, "bc");
        assert_eq!(version, 0);
        assert_eq!(decoded_program, program);
    }

    #[test]
    fn test_bech32_known_vector() {
        // BIP173 test vector: witness v0 program of 20 zero bytes, hrp "bc".
        let program = [0u8; 20];
        let encoded = bech32_encode("bc", 0, &program).unwrap();
        assert!(encoded.starts_with("bc1q"));
        let (_, version, decoded) = bech32_decode(&encoded).unwrap();
        assert_eq!(version, 0);
        assert_eq!(decoded, program);
    }

    #[test]
    fn test_bech32_rejects_corrupted_checksum() {
        let program = [0xAAu8; 20];
        let mut encoded = bech32_encode("bc", 0, &program).unwrap();
        let last = encoded.pop().unwrap();
        let replacement = if last == 'q' { 'p' } else { 'q' };
        encoded.push(replacement);
        assert!(bech32_decode(&encoded).is_err());
    }
}
