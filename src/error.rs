//! Error types for klaxon.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.
//! Note that most facade operations deliberately do not return errors:
//! removing an unknown alert is a benign race, not a failure.

use thiserror::Error;

/// Errors reported by an alert implementation from [`crate::Alert::check`].
///
/// A failed check is logged by the scheduler and never aborts the pass or
/// the worker; these exist so implementations can propagate their own
/// failures with `?` instead of swallowing them.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("I/O error during check: {0}")]
    Io(#[from] std::io::Error),

    #[error("check failed: {reason}")]
    Failed {
        reason: String,
    },
}

impl AlertError {
    /// Creates a check failure from any displayable reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors produced while constructing alerts from saved records.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown alert kind '{kind}'")]
    UnknownKind {
        kind: String,
    },

    #[error("invalid config for alert kind '{kind}': {reason}")]
    InvalidConfig {
        kind: String,
        reason: String,
    },
}

/// Top-level error type for klaxon.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("scheduler worker did not exit within {waited_ms}ms")]
    ShutdownTimeout {
        waited_ms: u64,
    },

    #[error("channel '{channel}' disconnected")]
    Disconnected {
        channel: String,
    },
}

impl EngineError {
    /// Returns true if this is an alert-execution error.
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::Alert(_))
    }

    /// Returns true if this is a registry error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }
}

/// Result type alias for klaxon operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_error_failed_message() {
        let err = AlertError::failed("connection refused");
        let msg = format!("{err}");
        assert!(msg.contains("check failed"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn alert_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err: AlertError = io.into();
        let msg = format!("{err}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn registry_error_unknown_kind() {
        let err = RegistryError::UnknownKind {
            kind: "chat".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("unknown alert kind"));
        assert!(msg.contains("chat"));
    }

    #[test]
    fn engine_error_from_alert() {
        let err: EngineError = AlertError::failed("boom").into();
        assert!(err.is_alert());
        assert!(!err.is_registry());
    }

    #[test]
    fn engine_error_from_registry() {
        let err: EngineError = RegistryError::UnknownKind {
            kind: "tts".to_string(),
        }
        .into();
        assert!(err.is_registry());
        assert!(!err.is_alert());
    }

    #[test]
    fn engine_error_shutdown_timeout_message() {
        let err = EngineError::ShutdownTimeout { waited_ms: 30_000 };
        let msg = format!("{err}");
        assert!(msg.contains("30000ms"));
    }
}
