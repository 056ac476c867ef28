//! Structured Logging for the Secret Custody Core
//!
//! JSON-capable structured logging built on `tracing`/`tracing-subscriber`,
//! with a `log_security_event` helper that every authentication outcome,
//! rate-limit trip, and vault failure goes through. The security event logs
//! the *fact* of failure (an error code) at info/warn level, never the
//! password, the seed, or any detail that would let a caller distinguish
//! *which* credential check failed — that distinction is already collapsed
//! by `SccError::InvalidCredentials` before it reaches here.

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Application log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Event categories for structured logging.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Authentication, session, and vault-access events.
    Security,
    /// Startup/shutdown and configuration events.
    System,
}

/// Structured log event.
#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details attached to a failed event.
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach an error code. Deliberately takes only a stable code, not a
    /// free-form message, so call sites cannot accidentally log a detail
    /// that would let a caller distinguish which credential check failed.
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: String::new(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

/// Log a security-related event: registration, login, TOTP verification,
/// rate-limit trips, reveal/restore, and vault operations all go through
/// this one helper so the logging discipline is uniform.
pub fn log_security_event(
    event_type: &str,
    success: bool,
    error_code: Option<&str>,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type)
        .with_data(serde_json::json!({ "success": success }));

    if let Some(code) = error_code {
        event = event.with_error_code(code);
    }
    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    if success {
        tracing::info!(target: "scc::security", "{}", event.to_json());
    } else {
        tracing::warn!(target: "scc::security", "{}", event.to_json());
    }
}

/// Initialize the logging system.
///
/// `json_format` selects JSON output (log aggregation / production) over
/// the pretty human-readable format (local development).
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("scc={}", format!("{:?}", level).to_lowercase()))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from an `SccConfig`.
pub fn init_from_config(config: &crate::config::SccConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    init_logging(level, config.log_json)
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for tracing a single request/operation
/// through the logs.
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Security, "login")
            .with_correlation_id("test-123")
            .with_data(serde_json::json!({"username": "alice"}));

        let json = event.to_json();
        assert!(json.contains("login"));
        assert!(json.contains("test-123"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_security_event_failure_carries_no_free_text() {
        // with_error_code accepts only a stable code, never a message, so a
        // failed login event can't leak which check failed.
        let event = LogEvent::new(LogLevel::Warn, EventCategory::Security, "login")
            .with_error_code("INVALID_CREDENTIALS");
        assert_eq!(event.error.as_ref().unwrap().message, "");
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();
        assert_ne!(id1, id2);
    }
}
