//! `User` entity: username validation, password strength scoring, and the
//! PBKDF2 password verifier that stands in for the password at rest.
//!
//! The verifier is deliberately keyed by its own salt, independent of the
//! vault's `saltPBKDF2` — there is no path from one to the other.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::common::error::{Result, SccError};
use crate::primitives::{constant_time_equals, pbkdf2_hmac_sha512, random_bytes};

const VERIFIER_DK_LEN: usize = 64;
const VERIFIER_ALGO_TAG: &str = "pbkdf2-sha512";

/// A registered identity. `password_verifier` is the full self-describing
/// string `"pbkdf2-sha512$<iter>$<salt_b64_url>$<dk_b64_url>"` — it carries
/// its own salt, so no separate `authSalt` column is needed.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username_canonical: String,
    pub email: Option<String>,
    pub password_verifier: String,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub is_active: bool,
    pub backup_confirmed: bool,
}

/// Username must case-fold to a unique value, length 3..50, charset
/// `[A-Za-z0-9_-]`.
pub fn validate_username(username: &str) -> Result<String> {
    let canonical = username.to_lowercase();
    if canonical.len() < 3 || canonical.len() > 50 {
        return Err(SccError::InvalidUsername(
            "length must be between 3 and 50 characters".into(),
        ));
    }
    if !canonical
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SccError::InvalidUsername(
            "only letters, digits, '_' and '-' are allowed".into(),
        ));
    }
    Ok(canonical)
}

/// Length 12..128, at least one of each of {uppercase, lowercase, digit,
/// special}; each satisfied class contributes 20 to a strength score that
/// must reach 80.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < 12 || password.chars().count() > 128 {
        return Err(SccError::WeakPassword(
            "length must be between 12 and 128 characters".into(),
        ));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace());

    let score = [has_upper, has_lower, has_digit, has_special]
        .iter()
        .filter(|&&satisfied| satisfied)
        .count()
        * 20;

    if score < 80 {
        return Err(SccError::WeakPassword(
            "must contain uppercase, lowercase, a digit, and a special character".into(),
        ));
    }

    Ok(())
}

/// Derive a fresh self-describing password verifier string.
pub fn make_password_verifier(password: &str, iterations: u32) -> Result<String> {
    let salt = random_bytes(32)?;
    let dk = pbkdf2_hmac_sha512(password.as_bytes(), &salt, iterations, VERIFIER_DK_LEN);

    Ok(format!(
        "{VERIFIER_ALGO_TAG}${}${}${}",
        iterations,
        URL_SAFE_NO_PAD.encode(&salt),
        URL_SAFE_NO_PAD.encode(&dk),
    ))
}

/// Recompute the verifier from `password` against the parameters embedded
/// in `stored_verifier` and compare in constant time. Any parse failure is
/// treated the same as a mismatch — callers see only `false`.
pub fn verify_password(password: &str, stored_verifier: &str) -> bool {
    let Some((algo, iter_str, salt_b64, dk_b64)) = split_verifier(stored_verifier) else {
        return false;
    };
    if algo != VERIFIER_ALGO_TAG {
        return false;
    }
    let Ok(iterations) = iter_str.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = URL_SAFE_NO_PAD.decode(salt_b64) else {
        return false;
    };
    let Ok(expected_dk) = URL_SAFE_NO_PAD.decode(dk_b64) else {
        return false;
    };

    let candidate_dk = pbkdf2_hmac_sha512(password.as_bytes(), &salt, iterations, VERIFIER_DK_LEN);
    constant_time_equals(&candidate_dk, &expected_dk)
}

fn split_verifier(verifier: &str) -> Option<(&str, &str, &str, &str)> {
    let mut parts = verifier.split('$');
    let algo = parts.next()?;
    let iter_str = parts.next()?;
    let salt_b64 = parts.next()?;
    let dk_b64 = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((algo, iter_str, salt_b64, dk_b64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_canonicalizes_and_bounds_length() {
        assert_eq!(validate_username("Alice").unwrap(), "alice");
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username("bad name!").is_err());
    }

    #[test]
    fn test_password_strength_requires_all_classes() {
        assert!(validate_password_strength("Str0ng!Pass12").is_ok());
        assert!(validate_password_strength("alllowercase123").is_err());
        assert!(validate_password_strength("short1!A").is_err());
    }

    #[test]
    fn test_verifier_roundtrip() {
        let verifier = make_password_verifier("Str0ng!Pass12", 100).unwrap();
        assert!(verify_password("Str0ng!Pass12", &verifier));
        assert!(!verify_password("Str0ng!Pass13", &verifier));
    }

    #[test]
    fn test_verifier_survives_malformed_input() {
        assert!(!verify_password("anything", "not-a-verifier-string"));
        assert!(!verify_password("anything", "pbkdf2-sha512$abc$x$y"));
    }
}
