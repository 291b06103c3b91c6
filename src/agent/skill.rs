// src/agent/skill.rs
//! Capability skill giving an agent access to kernel services
//!
//! A skill is bound to exactly one agent and one kernel when it is built and
//! never rebound. Lookups go straight to the kernel and never fail: a missing
//! capability is `None`, not an error.

use crate::agent::AgentId;
use crate::kernel::registry::{ServiceKey, ServiceProvider, ServiceRef};
use crate::utils::errors::{KernelError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Per-agent proxy to the kernel's services
#[derive(Clone)]
pub struct MicroKernelSkill {
    owner: AgentId,
    kernel: Arc<dyn ServiceProvider>,
}

impl MicroKernelSkill {
    /// Bind a skill to `owner` and `kernel`
    pub fn new(owner: AgentId, kernel: Arc<dyn ServiceProvider>) -> Result<Self> {
        if owner.is_nil() {
            return Err(KernelError::InvalidSkillBinding(
                "skill owner cannot be the nil agent id".to_string(),
            ));
        }

        Ok(Self { owner, kernel })
    }

    /// Look up a service by capability descriptor
    pub fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        let service = self.kernel.get_service(key);
        trace!(
            agent = %self.owner,
            key = ?key,
            found = service.is_some(),
            "Service lookup"
        );
        service
    }

    /// Look up and downcast the service registered for `T`
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_service(Some(&ServiceKey::of::<T>()))
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Agent this skill belongs to
    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// Kernel this skill is bound to
    pub fn kernel(&self) -> &Arc<dyn ServiceProvider> {
        &self.kernel
    }
}

impl fmt::Debug for MicroKernelSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroKernelSkill")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
