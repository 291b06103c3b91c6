// src/runtime/mod.rs
//! Agent lifecycle runtime
//!
//! This module drives agents from creation to termination:
//!
//! - **Lifecycle**: state machine and the table of agent states
//! - **Agent Runtime**: per-agent driver with the failure boundary
//! - **Controller**: spawning, concurrency bound, shutdown drain
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── LifecycleController ────────────────────────┐
//! │  AgentTable (CREATED … TERMINATED)      Semaphore (max concurrent)  │
//! │                                                                     │
//! │   task ─▶ AgentRuntime ─▶ initialize ─┬─ ok ──▶ run ─▶ completed    │
//! │                                       └─ err/panic ─▶ failed        │
//! │   task ─▶ AgentRuntime ─▶ …                                         │
//! └──────────────────────────────┬──────────────────────────────────────┘
//!                                ▼
//!                          OutcomeChannel
//! ```

pub mod agent_runtime;
pub mod controller;
pub mod lifecycle;

pub use agent_runtime::AgentRuntime;
pub use controller::LifecycleController;
pub use lifecycle::{AgentRecord, AgentState, AgentTable};
