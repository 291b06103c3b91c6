// src/lib.rs
//! Agent Microkernel Library
//!
//! A small kernel hosting independently lifecycled agents. Agents reach
//! kernel services through a per-agent capability skill, and whatever
//! happens during an agent's initialization is contained and recorded as
//! that agent's outcome instead of propagating to the caller or to other
//! agents.
//!
//! # Architecture
//!
//! The kernel is structured into several key modules:
//!
//! - **kernel**: service registry, service lifecycle, the `Kernel` facade
//! - **agent**: agent trait, identifiers, capability skill
//! - **runtime**: lifecycle state machine and controller
//! - **outcome**: outcome log, filtered queries, exporters
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use agent_microkernel::{Agent, KernelBuilder, KernelConfig, MicroKernelSkill};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Agent for Greeter {
//!     async fn initialize(&self, _skill: &MicroKernelSkill) -> anyhow::Result<bool> {
//!         Ok(true)
//!     }
//! }
//!
//! # async fn demo() -> agent_microkernel::Result<()> {
//! let kernel = KernelBuilder::new(KernelConfig::default()).start().await?;
//! kernel.spawn(None, Greeter)?;
//!
//! let outcomes = kernel.outcomes().await_count(1, Duration::from_secs(5)).await?;
//! assert_eq!(outcomes.len(), 1);
//! kernel.shutdown(Duration::from_secs(5)).await
//! # }
//! ```

// Public module exports
pub mod agent;
pub mod kernel;
pub mod observability;
pub mod outcome;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use agent::{Agent, AgentId, AgentSpec, MicroKernelSkill};
pub use kernel::{
    Kernel, KernelBuilder, KernelService, KernelState, ServiceKey, ServiceProvider,
    ServiceProviderExt, ServiceRef,
};
pub use outcome::{AgentFailure, Outcome, OutcomeChannel, OutcomeFilter, OutcomeQuery, OutcomeStatus};
pub use runtime::AgentState;
pub use utils::config::KernelConfig;
pub use utils::errors::{KernelError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
