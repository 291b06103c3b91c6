// src/utils/errors.rs
//! Kernel error types
//!
//! Everything here is a construction-time or observer-side failure. Errors
//! raised by agent code never surface as a `KernelError`; they are contained
//! by the lifecycle controller and recorded as outcomes instead.

use crate::agent::AgentId;
use thiserror::Error;

/// Result alias used across the kernel
pub type Result<T> = std::result::Result<T, KernelError>;

/// Kernel-level errors
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Agent identifier already in use: {0}")]
    DuplicateAgentId(AgentId),

    #[error("Invalid skill binding: {0}")]
    InvalidSkillBinding(String),

    #[error("Agent {agent_id} targets specification {requested}, kernel supports {supported}")]
    IncompatibleSpecVersion {
        agent_id: AgentId,
        requested: semver::Version,
        supported: semver::VersionReq,
    },

    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    #[error("Service registry is sealed, cannot register {0}")]
    RegistrySealed(String),

    #[error("Kernel is not running")]
    KernelNotRunning,

    #[error("Service {service} failed: {reason}")]
    ServiceFailed { service: String, reason: String },

    #[error("Timed out waiting for outcomes: expected {expected}, observed {observed}")]
    OutcomesIncomplete { expected: usize, observed: usize },

    #[error("Timed out waiting for {0} agent(s) to terminate")]
    ShutdownTimeout(usize),

    #[error("Export failed: {0}")]
    ExportFailed(String),
}

impl KernelError {
    /// Whether the error only signals that an observer gave up waiting
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            KernelError::OutcomesIncomplete { .. } | KernelError::ShutdownTimeout(_)
        )
    }
}

impl From<config::ConfigError> for KernelError {
    fn from(e: config::ConfigError) -> Self {
        KernelError::ConfigError(e.to_string())
    }
}

impl From<serde_yaml::Error> for KernelError {
    fn from(e: serde_yaml::Error) -> Self {
        KernelError::ConfigError(format!("YAML error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let incomplete = KernelError::OutcomesIncomplete {
            expected: 2,
            observed: 1,
        };
        assert!(incomplete.is_timeout());
        assert!(!KernelError::KernelNotRunning.is_timeout());
    }

    #[test]
    fn test_display() {
        let err = KernelError::OutcomesIncomplete {
            expected: 3,
            observed: 1,
        };
        assert_eq!(
            err.to_string(),
            "Timed out waiting for outcomes: expected 3, observed 1"
        );
    }
}
