//! Environment-based Configuration for the Secret Custody Core
//!
//! All spec-mandated constants (KDF iteration counts, session/lockout
//! durations) ship as defaults here so production call sites never need to
//! think about them, while tests can override the slow ones (PBKDF2
//! iterations) to keep the suite fast. Nothing here ever carries a secret
//! value — passwords and machine factors are supplied per call, not loaded
//! from configuration.
//!
//! # Recognised environment variables
//!
//! - `SCC_DB_PATH` - sqlite database path (default: `scc.sqlite3`)
//! - `SCC_VAULT_KDF_ITERATIONS` - PBKDF2 iterations for the vault key
//!   (default: 600_000)
//! - `SCC_VERIFIER_KDF_ITERATIONS` - PBKDF2 iterations for the password
//!   verifier (default: 600_000)
//! - `SCC_SESSION_TTL_SECS` - sliding session expiry (default: 900)
//! - `SCC_LOCKOUT_WINDOW_SECS` - rate-limit window (default: 900)
//! - `SCC_LOCKOUT_THRESHOLD` - failures before lockout (default: 5)
//! - `SCC_LOCKOUT_DURATION_SECS` - lockout duration (default: 900)
//! - `SCC_LOG_LEVEL` - logging level (debug, info, warn, error)
//! - `SCC_LOG_JSON` - "1" to force JSON log output

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Core configuration, loaded once at startup and passed by reference into
/// every SCC entry point alongside the storage handle (no ambient globals).
#[derive(Debug, Clone)]
pub struct SccConfig {
    /// Path to the sqlite database backing the storage layer.
    pub db_path: String,

    /// PBKDF2-HMAC-SHA512 iterations for the vault encryption key.
    pub vault_kdf_iterations: u32,

    /// PBKDF2-HMAC-SHA512 iterations for the password verifier.
    pub verifier_kdf_iterations: u32,

    /// Sliding session expiry, in seconds.
    pub session_ttl_secs: u64,

    /// Rate-limit window, in seconds.
    pub lockout_window_secs: u64,

    /// Consecutive login failures before lockout.
    pub lockout_threshold: u32,

    /// Lockout duration, in seconds.
    pub lockout_duration_secs: u64,

    /// Minimum log level.
    pub log_level: String,

    /// Whether to emit JSON-formatted logs.
    pub log_json: bool,
}

impl Default for SccConfig {
    fn default() -> Self {
        Self {
            db_path: "scc.sqlite3".to_string(),
            vault_kdf_iterations: 600_000,
            verifier_kdf_iterations: 600_000,
            session_ttl_secs: 15 * 60,
            lockout_window_secs: 15 * 60,
            lockout_threshold: 5,
            lockout_duration_secs: 15 * 60,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl SccConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset. Reads a `.env` file in the current
    /// directory first, if present, without overriding variables already set
    /// in the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        let defaults = Self::default();

        let db_path = env::var("SCC_DB_PATH").unwrap_or(defaults.db_path);

        let vault_kdf_iterations =
            parse_env_or("SCC_VAULT_KDF_ITERATIONS", defaults.vault_kdf_iterations)?;
        let verifier_kdf_iterations = parse_env_or(
            "SCC_VERIFIER_KDF_ITERATIONS",
            defaults.verifier_kdf_iterations,
        )?;
        let session_ttl_secs = parse_env_or("SCC_SESSION_TTL_SECS", defaults.session_ttl_secs)?;
        let lockout_window_secs =
            parse_env_or("SCC_LOCKOUT_WINDOW_SECS", defaults.lockout_window_secs)?;
        let lockout_threshold =
            parse_env_or("SCC_LOCKOUT_THRESHOLD", defaults.lockout_threshold)?;
        let lockout_duration_secs = parse_env_or(
            "SCC_LOCKOUT_DURATION_SECS",
            defaults.lockout_duration_secs,
        )?;

        let log_level = env::var("SCC_LOG_LEVEL").unwrap_or(defaults.log_level);
        let log_json = env::var("SCC_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            db_path,
            vault_kdf_iterations,
            verifier_kdf_iterations,
            session_ttl_secs,
            lockout_window_secs,
            lockout_threshold,
            lockout_duration_secs,
            log_level,
            log_json,
        })
    }

    /// A configuration tuned for tests: PBKDF2 iterations low enough that
    /// the whole suite stays fast, everything else unchanged.
    pub fn for_tests() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            vault_kdf_iterations: 100,
            verifier_kdf_iterations: 100,
            ..Self::default()
        }
    }
}

fn parse_env_or<T>(var_name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(var_name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), value)),
        Err(_) => Ok(default),
    }
}
