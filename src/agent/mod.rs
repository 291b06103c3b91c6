// src/agent/mod.rs
//! Agents and their capability skill
//!
//! An agent is an independently lifecycled unit of execution. It never
//! touches its own lifecycle state: the [`LifecycleController`] drives it
//! through its hooks and owns the state machine.
//!
//! Agents reach kernel services exclusively through their
//! [`MicroKernelSkill`], which is handed to every hook.
//!
//! [`LifecycleController`]: crate::runtime::LifecycleController

pub mod skill;

pub use skill::MicroKernelSkill;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Stable agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Ulid);

impl AgentId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// The all-zero identifier, never valid as an agent owner
    pub const fn nil() -> Self {
        Self(Ulid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for AgentId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl FromStr for AgentId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construction parameters for an agent
///
/// The specification version replaces class-level version metadata: it is
/// checked against `lifecycle.supported_spec_versions` when the agent is
/// spawned, and an incompatible version is rejected before the agent exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    /// Identifier of the agent
    pub id: AgentId,

    /// Identifier of the agent that spawned it, if any
    pub parent_id: Option<AgentId>,

    /// Specification version the agent was written against
    pub spec_version: Option<semver::Version>,
}

impl AgentSpec {
    pub fn new(parent_id: Option<AgentId>, id: AgentId) -> Self {
        Self {
            id,
            parent_id,
            spec_version: None,
        }
    }

    /// Spec with a freshly generated identifier
    pub fn child_of(parent_id: Option<AgentId>) -> Self {
        Self::new(parent_id, AgentId::new())
    }

    pub fn with_spec_version(mut self, version: semver::Version) -> Self {
        self.spec_version = Some(version);
        self
    }
}

/// Behavior hosted by the kernel
///
/// `initialize` is the single extension point every agent must provide. It
/// returns whether initialization succeeded; errors and panics raised from
/// any hook are contained by the controller and recorded as the agent's
/// outcome.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Initialization routine
    async fn initialize(&self, skill: &MicroKernelSkill) -> anyhow::Result<bool>;

    /// Main body, invoked once initialization succeeded
    async fn run(&self, _skill: &MicroKernelSkill) -> anyhow::Result<()> {
        Ok(())
    }

    /// Teardown hook, invoked on every path to TERMINATED
    async fn on_destroy(&self, _skill: &MicroKernelSkill) -> anyhow::Result<()> {
        Ok(())
    }
}
