//! RFC 6238 TOTP enrolment/verification plus single-use backup codes.
//!
//! HOTP dynamic truncation follows RFC 4226 directly on top of
//! `hmac`+`sha1`, the same crates already pulled in for other primitives —
//! no extra TOTP crate is needed for an algorithm this small and this
//! tightly pinned by the RFC.

use base32::Alphabet;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::common::error::{Result, SccError};
use crate::identity::user::{make_password_verifier, verify_password};
use crate::primitives::random_bytes;

type HmacSha1 = Hmac<Sha1>;

const SECRET_BYTES: usize = 20;
const STEP_SECS: i64 = 30;
const CODE_DIGITS: u32 = 6;
const STEP_WINDOW: i64 = 1;
const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_CHARS: usize = 8;

/// A single-use backup code, stored only as its PBKDF2 verifier.
#[derive(Debug, Clone)]
pub struct BackupCode {
    pub verifier: String,
    pub used: bool,
}

/// Generate a fresh 160-bit TOTP secret and its base32 form.
pub fn generate_totp_secret() -> Result<(Vec<u8>, String)> {
    let secret = random_bytes(SECRET_BYTES)?;
    let encoded = base32::encode(Alphabet::RFC4648 { padding: false }, &secret);
    Ok((secret, encoded))
}

/// `otpauth://totp/<issuer>:<username>?secret=<base32>&issuer=<issuer>&...`
pub fn otpauth_uri(username: &str, issuer: &str, secret_base32: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{username}?secret={secret_base32}&issuer={issuer}&algorithm=SHA1&digits={CODE_DIGITS}&period={STEP_SECS}"
    )
}

fn hotp(secret: &[u8], counter: u64) -> Result<u32> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| SccError::internal(format!("invalid TOTP secret length: {e}")))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    Ok(truncated % 10u32.pow(CODE_DIGITS))
}

fn totp_at_step(secret: &[u8], step: i64) -> Result<u32> {
    hotp(secret, step.max(0) as u64)
}

/// `verify_totp(user, code)`: accepts the current step or ±1 step (±30s).
pub fn verify_totp_code(secret: &[u8], code: &str, unix_time: i64) -> Result<bool> {
    let Ok(candidate) = code.parse::<u32>() else {
        return Ok(false);
    };
    let current_step = unix_time / STEP_SECS;

    for delta in -STEP_WINDOW..=STEP_WINDOW {
        let step = current_step + delta;
        if step < 0 {
            continue;
        }
        if totp_at_step(secret, step)? == candidate {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Parse a user-entered base32 secret back to raw bytes.
pub fn decode_base32_secret(encoded: &str) -> Result<Vec<u8>> {
    base32::decode(Alphabet::RFC4648 { padding: false }, encoded)
        .ok_or_else(|| SccError::BadInput("invalid base32 TOTP secret".into()))
}

/// Generate `BACKUP_CODE_COUNT` fresh 8-character base32 backup codes and
/// their PBKDF2 verifiers. Returns `(plaintext_codes, stored_records)` — the
/// plaintext is shown to the user exactly once, the verifiers are what gets
/// persisted.
pub fn generate_backup_codes(iterations: u32) -> Result<(Vec<String>, Vec<BackupCode>)> {
    let mut plaintext = Vec::with_capacity(BACKUP_CODE_COUNT);
    let mut records = Vec::with_capacity(BACKUP_CODE_COUNT);

    for _ in 0..BACKUP_CODE_COUNT {
        let raw = random_bytes(BACKUP_CODE_CHARS)?;
        let code = base32::encode(Alphabet::RFC4648 { padding: false }, &raw)
            .chars()
            .take(BACKUP_CODE_CHARS)
            .collect::<String>();
        let verifier = make_password_verifier(&code, iterations)?;

        plaintext.push(code);
        records.push(BackupCode {
            verifier,
            used: false,
        });
    }

    Ok((plaintext, records))
}

/// Match `code` against any unused backup code in constant time with
/// respect to *which* index matched — every candidate is checked, and the
/// loop does not short-circuit on the first match.
pub fn match_backup_code(codes: &[BackupCode], code: &str) -> Option<usize> {
    let mut matched_index = None;
    for (i, entry) in codes.iter().enumerate() {
        let is_match = !entry.used && verify_password(code, &entry.verifier);
        if is_match && matched_index.is_none() {
            matched_index = Some(i);
        }
    }
    matched_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_confirm_verify_round_trip() {
        let (secret, _encoded) = generate_totp_secret().unwrap();
        let now = 1_700_000_000i64;
        let code = totp_at_step(&secret, now / STEP_SECS).unwrap();
        let code_str = format!("{code:06}");

        assert!(verify_totp_code(&secret, &code_str, now).unwrap());
        assert!(verify_totp_code(&secret, &code_str, now + STEP_SECS).unwrap());
        assert!(!verify_totp_code(&secret, &code_str, now - 120).unwrap());
    }

    #[test]
    fn test_verify_rejects_non_numeric_code() {
        let (secret, _) = generate_totp_secret().unwrap();
        assert!(!verify_totp_code(&secret, "not-a-code", 0).unwrap());
    }

    #[test]
    fn test_base32_secret_round_trips() {
        let (secret, encoded) = generate_totp_secret().unwrap();
        let decoded = decode_base32_secret(&encoded).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn test_backup_code_used_once() {
        let (plaintext, mut records) = generate_backup_codes(100).unwrap();
        let code = &plaintext[3];

        let index = match_backup_code(&records, code).unwrap();
        assert_eq!(index, 3);

        records[index].used = true;
        assert!(match_backup_code(&records, code).is_none());
    }

    #[test]
    fn test_otpauth_uri_contains_secret() {
        let uri = otpauth_uri("alice", "SCC", "ABCDEF123456");
        assert!(uri.contains("ABCDEF123456"));
        assert!(uri.starts_with("otpauth://totp/"));
    }
}
