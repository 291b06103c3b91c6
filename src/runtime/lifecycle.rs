// src/runtime/lifecycle.rs
//! Agent lifecycle state machine
//!
//! ```text
//! CREATED ─▶ INITIALIZING ─▶ RUNNING ─▶ STOPPING ─▶ TERMINATED
//!                  │             │                      ▲
//!                  └────────▶ FAILED ───────────────────┘
//! ```
//!
//! The table is owned by the lifecycle controller; agents only ever read
//! their state through the kernel.

use crate::agent::{AgentId, AgentSpec};
use crate::utils::errors::{KernelError, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Created,
    Initializing,
    Running,
    Stopping,
    Failed,
    Terminated,
}

impl AgentState {
    /// Whether the machine allows `self -> next`
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;

        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Terminated)
                | (Failed, Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == AgentState::Terminated
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Created => "CREATED",
            AgentState::Initializing => "INITIALIZING",
            AgentState::Running => "RUNNING",
            AgentState::Stopping => "STOPPING",
            AgentState::Failed => "FAILED",
            AgentState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Bookkeeping kept for every agent ever created
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub parent_id: Option<AgentId>,
    pub state: AgentState,
    pub created_at: DateTime<Utc>,
}

/// States of all agents created by one kernel
///
/// Records are never removed, which is what keeps identifiers unique for
/// the kernel's whole lifetime.
#[derive(Default)]
pub struct AgentTable {
    records: DashMap<AgentId, AgentRecord>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record for a new agent in state CREATED
    pub fn register(&self, spec: &AgentSpec) -> Result<()> {
        match self.records.entry(spec.id) {
            Entry::Occupied(_) => Err(KernelError::DuplicateAgentId(spec.id)),
            Entry::Vacant(vacant) => {
                vacant.insert(AgentRecord {
                    parent_id: spec.parent_id,
                    state: AgentState::Created,
                    created_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Move an agent to `next`; refused transitions leave the state untouched
    pub fn transition(&self, agent_id: AgentId, next: AgentState) -> bool {
        let Some(mut record) = self.records.get_mut(&agent_id) else {
            warn!(agent = %agent_id, "Transition requested for unknown agent");
            return false;
        };

        let current = record.state;
        if !current.can_transition_to(next) {
            warn!(
                agent = %agent_id,
                from = %current,
                to = %next,
                "Refused lifecycle transition"
            );
            return false;
        }

        record.state = next;
        debug!(agent = %agent_id, from = %current, to = %next, "Lifecycle transition");
        true
    }

    /// Mark an agent TERMINATED regardless of its current state
    pub fn force_terminate(&self, agent_id: AgentId) {
        if let Some(mut record) = self.records.get_mut(&agent_id) {
            if !record.state.is_terminal() {
                warn!(agent = %agent_id, from = %record.state, "Forcing agent to TERMINATED");
                record.state = AgentState::Terminated;
            }
        }
    }

    pub fn state(&self, agent_id: AgentId) -> Option<AgentState> {
        self.records.get(&agent_id).map(|record| record.state)
    }

    pub fn record(&self, agent_id: AgentId) -> Option<AgentRecord> {
        self.records.get(&agent_id).map(|record| record.clone())
    }

    /// Agents ever created
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
