// src/outcome/mod.rs
//! Agent outcomes and the channel observers read them from
//!
//! - **Outcome**: the terminal result recorded for one agent
//! - **Channel**: ordered, append-only outcome log with bounded waits
//! - **Exporter**: JSON, JSON Lines and JUnit renderings for tooling
//!
//! # Architecture
//!
//! ```text
//! Agent task ── contained failure / completion ──▶ OutcomeChannel::append
//!                                                      │
//!                                     watch(count) ────┤
//!                                                      ▼
//!                       Observer: query(filter) / await_count(n, timeout)
//! ```

pub mod channel;
pub mod exporter;

pub use channel::{OutcomeChannel, OutcomeFilter, OutcomeQuery, OutcomeStats};
pub use exporter::{ExportFormat, OutcomeExporter, OutcomeReport};

use crate::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Terminal status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Completed => f.write_str("completed"),
            OutcomeStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Lifecycle phase an agent failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Initialization,
    Run,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePhase::Initialization => f.write_str("initialization"),
            FailurePhase::Run => f.write_str("run"),
        }
    }
}

/// Failure captured at an agent's failure boundary
///
/// `Raised` keeps the agent's own error value as its source, so the whole
/// chain (context wrappers down to the root cause) is preserved as raised.
#[derive(Debug, Error)]
pub enum AgentFailure {
    #[error("agent {agent_id} raised an error during {phase}")]
    Raised {
        agent_id: AgentId,
        phase: FailurePhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("agent {agent_id} panicked during {phase}: {message}")]
    Panicked {
        agent_id: AgentId,
        phase: FailurePhase,
        message: String,
    },

    #[error("agent {agent_id} reported an unsuccessful initialization")]
    Declined { agent_id: AgentId },
}

impl AgentFailure {
    pub fn agent_id(&self) -> AgentId {
        match self {
            AgentFailure::Raised { agent_id, .. }
            | AgentFailure::Panicked { agent_id, .. }
            | AgentFailure::Declined { agent_id } => *agent_id,
        }
    }

    pub fn phase(&self) -> FailurePhase {
        match self {
            AgentFailure::Raised { phase, .. } | AgentFailure::Panicked { phase, .. } => *phase,
            AgentFailure::Declined { .. } => FailurePhase::Initialization,
        }
    }

    /// The agent's own error, when it raised one
    pub fn agent_error(&self) -> Option<&anyhow::Error> {
        match self {
            AgentFailure::Raised { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Terminal result recorded for one agent
#[derive(Debug)]
pub struct Outcome {
    /// Position in the channel, assigned on append
    pub sequence: u64,

    pub agent_id: AgentId,

    pub parent_id: Option<AgentId>,

    pub status: OutcomeStatus,

    /// Present exactly when `status` is `Failed`
    pub failure: Option<AgentFailure>,

    pub recorded_at: DateTime<Utc>,
}

impl Outcome {
    /// Outcome for an agent whose run concluded normally
    pub fn completed(agent_id: AgentId, parent_id: Option<AgentId>) -> Self {
        Self {
            sequence: 0,
            agent_id,
            parent_id,
            status: OutcomeStatus::Completed,
            failure: None,
            recorded_at: Utc::now(),
        }
    }

    /// Outcome for a contained failure
    pub fn failed(parent_id: Option<AgentId>, failure: AgentFailure) -> Self {
        Self {
            sequence: 0,
            agent_id: failure.agent_id(),
            parent_id,
            status: OutcomeStatus::Failed,
            failure: Some(failure),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Causal chain from the controller's wrapper down to the root cause
    pub fn cause_chain(&self) -> CauseChain<'_> {
        CauseChain {
            next: self
                .failure
                .as_ref()
                .map(|failure| failure as &(dyn StdError + 'static)),
        }
    }

    /// Innermost cause of a failure
    pub fn root_cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause_chain().last()
    }

    /// First error of type `E` anywhere in the causal chain
    pub fn find_cause<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause_chain().find_map(|cause| cause.downcast_ref::<E>())
    }

    /// Rendered messages of the causal chain, outermost first
    pub fn cause_messages(&self) -> Vec<String> {
        self.cause_chain().map(|cause| cause.to_string()).collect()
    }
}

/// Iterator over an outcome's causal chain
pub struct CauseChain<'a> {
    next: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> Iterator for CauseChain<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}
