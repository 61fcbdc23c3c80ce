//! Error types shared by the daemon crates.
//!
//! Two channels: `ValidationError` is fatal and surfaces at construction or
//! dispatch time. `ActionError` and `ProviderError` are the expected,
//! degraded-path failures the control loop absorbs and learns from.

use std::time::Duration;
use thiserror::Error;

/// Caller bugs and rejected input. Never swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid interface name length: {0:?}")]
    InterfaceLength(String),

    #[error("Invalid interface name (only alphanumeric, underscore, hyphen allowed): {0:?}")]
    InterfaceCharacters(String),

    #[error("Unknown recovery action: {0}")]
    UnknownAction(String),

    #[error("Unknown anomaly type: {0}")]
    UnknownAnomaly(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Failure of a single remediation step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{program} not available: {reason}")]
    ToolMissing { program: String, reason: String },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{command} exited with status {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("No anomalies to isolate node from")]
    NoIsolationTarget,
}

/// Failure of a monitoring collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("health check failed: {0}")]
    Health(String),

    #[error("metrics collection failed: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_messages() {
        let err = ActionError::NonZeroExit {
            command: "ip link set bat0 up".to_string(),
            code: Some(2),
            stderr: "RTNETLINK answers: Operation not permitted".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ip link set bat0 up"));
        assert!(msg.contains("Operation not permitted"));

        let err = ActionError::Timeout {
            program: "batctl".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "batctl timed out after 5s");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::UnknownAction("reboot_world".to_string());
        assert_eq!(err.to_string(), "Unknown recovery action: reboot_world");
    }
}
