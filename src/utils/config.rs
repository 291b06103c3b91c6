// src/utils/config.rs
//! Kernel configuration
//!
//! Loaded in layers through the `config` crate:
//!
//! 1. Built-in defaults
//! 2. `config/microkernel.{yaml,toml,json}` (optional)
//! 3. `MICROKERNEL__<SECTION>__<KEY>` environment variables

use crate::utils::errors::{KernelError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Specification version implemented by this kernel
pub const SPECIFICATION_VERSION: &str = "0.13.0";

/// What to do when a capability type is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Second registration fails with `ServiceAlreadyRegistered`
    Reject,

    /// Second registration is silently dropped, first instance stays
    Ignore,

    /// Last registration wins
    Overwrite,
}

/// How a `false` return from an agent's initialization is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclinedInitPolicy {
    /// Route through the FAILED path like a raised error
    Fail,

    /// Treat as a successful initialization
    Ignore,
}

/// Service registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Duplicate registration handling
    pub policy: RegistrationPolicy,

    /// Allow registrations after the kernel has started
    pub allow_late_registration: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            policy: RegistrationPolicy::Reject,
            allow_late_registration: false,
        }
    }
}

/// Lifecycle controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Maximum agents initializing or running at once
    pub max_concurrent_agents: usize,

    /// Handling of `Ok(false)` from `Agent::initialize`
    pub declined_init: DeclinedInitPolicy,

    /// Accepted agent specification versions (semver requirement)
    pub supported_spec_versions: String,

    /// Time allowed for live agents to finish during shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 1024,
            declined_init: DeclinedInitPolicy::Fail,
            supported_spec_versions: format!("^{}", SPECIFICATION_VERSION),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Parsed form of `supported_spec_versions`
    pub fn spec_requirement(&self) -> Result<semver::VersionReq> {
        semver::VersionReq::parse(&self.supported_spec_versions).map_err(|e| {
            KernelError::ConfigError(format!(
                "Invalid supported_spec_versions '{}': {}",
                self.supported_spec_versions, e
            ))
        })
    }
}

/// Outcome channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Default bound for observers waiting on outcomes
    pub default_await_timeout_ms: u64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            default_await_timeout_ms: 10_000,
        }
    }
}

impl OutcomeConfig {
    pub fn default_await_timeout(&self) -> Duration {
        Duration::from_millis(self.default_await_timeout_ms)
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,

    /// Record `metrics` counters
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

/// Complete kernel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub registry: RegistryConfig,
    pub lifecycle: LifecycleConfig,
    pub outcomes: OutcomeConfig,
    pub observability: ObservabilityConfig,
}

impl KernelConfig {
    /// Load from `config/microkernel.*` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config/microkernel")
    }

    /// Load from an explicit file stem (extension optional) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("MICROKERNEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: KernelConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: KernelConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the kernel cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.max_concurrent_agents == 0 {
            return Err(KernelError::ConfigError(
                "lifecycle.max_concurrent_agents cannot be 0".to_string(),
            ));
        }

        // Semaphore permits are capped by tokio
        if self.lifecycle.max_concurrent_agents > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(KernelError::ConfigError(format!(
                "lifecycle.max_concurrent_agents cannot exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }

        self.lifecycle.spec_requirement()?;

        if self.outcomes.default_await_timeout_ms == 0 {
            return Err(KernelError::ConfigError(
                "outcomes.default_await_timeout_ms cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
