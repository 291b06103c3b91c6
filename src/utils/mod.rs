// src/utils/mod.rs
//! Common utilities: configuration and error types

pub mod config;
pub mod errors;

pub use config::{
    DeclinedInitPolicy, KernelConfig, LifecycleConfig, ObservabilityConfig, OutcomeConfig,
    RegistrationPolicy, RegistryConfig, SPECIFICATION_VERSION,
};
pub use errors::{KernelError, Result};
