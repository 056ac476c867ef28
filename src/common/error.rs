//! Root Error Type for the Secret Custody Core
//!
//! Enumerates the stable error kinds from the core's error handling design:
//! deterministic validation errors, the single `InvalidCredentials` bucket
//! every authentication failure collapses into (so the core never leaks
//! which check failed), and the internal/retryable errors.

use thiserror::Error;

/// Root error type for the Secret Custody Core.
#[derive(Debug, Error)]
pub enum SccError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("user already exists")]
    UserExists,

    #[error("invalid mnemonic: {0}")]
    BadMnemonic(String),

    #[error("invalid input: {0}")]
    BadInput(String),

    /// Every authentication failure: wrong password, wrong TOTP, failed
    /// AEAD verification, or unknown username. Deliberately one variant so
    /// callers (and logs) cannot distinguish which check failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Lockout active. `retry_after_secs` is the wall-clock time remaining.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("session expired")]
    SessionExpired,

    #[error("session not found")]
    SessionUnknown,

    #[error("secure random source unavailable: {0}")]
    RngFailure(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("AEAD operation failed")]
    AeadFailure,

    #[error("configuration error: {0}")]
    Config(#[from] super::super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::super::logging::LoggingError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SccError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    /// Whether the retry policy (§4.5.6/§5) permits retrying this error
    /// inside the same call. Only `RngFailure` and storage-level transient
    /// errors qualify; every authentication failure is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SccError::RngFailure(_) | SccError::StorageFailure(_))
    }

    /// Stable string code for API/log consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            SccError::InvalidUsername(_) => "INVALID_USERNAME",
            SccError::WeakPassword(_) => "WEAK_PASSWORD",
            SccError::UserExists => "USER_EXISTS",
            SccError::BadMnemonic(_) => "BAD_MNEMONIC",
            SccError::BadInput(_) => "BAD_INPUT",
            SccError::InvalidCredentials => "INVALID_CREDENTIALS",
            SccError::RateLimited { .. } => "RATE_LIMITED",
            SccError::SessionExpired => "SESSION_EXPIRED",
            SccError::SessionUnknown => "SESSION_UNKNOWN",
            SccError::RngFailure(_) => "RNG_FAILURE",
            SccError::StorageFailure(_) => "STORAGE_FAILURE",
            SccError::AeadFailure => "AEAD_FAILURE",
            SccError::Config(_) => "CONFIG_ERROR",
            SccError::Logging(_) => "LOGGING_ERROR",
            SccError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias using `SccError`.
pub type Result<T> = std::result::Result<T, SccError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SccError::internal("pool exhausted");
        assert!(err.to_string().contains("pool exhausted"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SccError::RngFailure("no entropy".into()).is_retryable());
        assert!(SccError::StorageFailure("locked".into()).is_retryable());
        assert!(!SccError::InvalidCredentials.is_retryable());
        assert!(!SccError::WeakPassword("too short".into()).is_retryable());
    }

    #[test]
    fn test_credentials_error_has_no_detail() {
        // InvalidCredentials must carry no message payload: that is what
        // prevents user enumeration via error text.
        let err = SccError::InvalidCredentials;
        assert_eq!(err.to_string(), "invalid credentials");
    }
}
