//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the Secret Custody Core.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type

pub mod error;

// Re-exports for convenience
pub use error::{Result, SccError};
pub use super::config::{ConfigError, SccConfig};
pub use super::logging::{
    generate_correlation_id, init_from_config, init_logging, log_security_event, ErrorDetails,
    EventCategory, LogEvent, LogLevel, LoggingError,
};
