//! Secure memory wiping.
//!
//! Every buffer that ever holds a seed, a private scalar, a password, or a
//! derived key is wrapped so the wipe happens on every exit path, including
//! unwinding on error. `zeroize` is what the rest of this retrieval pack
//! reaches for (`iqlusioninc-crates`, `alpenlabs-strata`, `nconsigny-vanadium`
//! all carry it) — it guarantees the write isn't optimized away.

use zeroize::Zeroize;

/// Overwrite `buf` with zeros in a way the compiler will not elide.
pub fn secure_wipe(buf: &mut [u8]) {
    buf.zeroize();
}

/// A `Vec<u8>` that wipes its contents on drop, including on unwind.
///
/// Used for anything that holds a seed, a passphrase, or a raw private
/// scalar for longer than a single expression.
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.0.len())
            .finish()
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_wipe_zeros_buffer() {
        let mut buf = vec![0xABu8; 32];
        secure_wipe(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_secret_bytes_into_vec_roundtrip() {
        let secret = SecretBytes::new(vec![0x42u8; 16]);
        assert_eq!(secret.len(), 16);
        let raw = secret.into_vec();
        assert_eq!(raw, vec![0x42u8; 16]);
    }
}
