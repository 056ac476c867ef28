//! CSPRNG access.
//!
//! `getrandom` is used instead of `rand::thread_rng()` because it surfaces
//! a `Result` — an unavailable OS entropy source becomes `RngFailure`
//! instead of a panic, matching §7's error kind list.

use crate::common::error::{Result, SccError};

/// Draw `n` cryptographically secure random bytes from the OS entropy pool.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    getrandom::getrandom(&mut buf).map_err(|e| SccError::RngFailure(e.to_string()))?;
    Ok(buf)
}

/// Draw a fixed-size array of random bytes.
pub fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| SccError::RngFailure(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length_and_nonzero() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_array() {
        let a: [u8; 12] = random_array().unwrap();
        let b: [u8; 12] = random_array().unwrap();
        assert_ne!(a, b);
    }
}
