// src/runtime/controller.rs
//! Lifecycle controller spawning agents as independent tasks
//!
//! Spawning is synchronous and never blocks: construction-time checks
//! (kernel accepting, spec version, skill binding, identifier uniqueness)
//! fail immediately to the caller, then the agent runs on its own task.
//! A semaphore bounds how many agents initialize or run at once; waiting
//! for a permit happens inside the agent's task.
//!
//! # Architecture
//!
//! ```text
//! spawn(spec, agent) ──checks──▶ AgentTable (CREATED)
//!        │
//!        └──▶ task: permit ─▶ AgentRuntime::drive ─▶ OutcomeChannel
//!                                  (failure boundary)
//! ```

use crate::agent::{Agent, AgentId, AgentSpec, MicroKernelSkill};
use crate::kernel::registry::ServiceProvider;
use crate::outcome::OutcomeChannel;
use crate::runtime::agent_runtime::AgentRuntime;
use crate::runtime::lifecycle::{AgentRecord, AgentState, AgentTable};
use crate::utils::config::LifecycleConfig;
use crate::utils::errors::{KernelError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Drives agents through their lifecycle
pub struct LifecycleController {
    /// Configuration
    config: LifecycleConfig,

    /// Accepted agent specification versions
    spec_requirement: semver::VersionReq,

    /// States of every agent ever created
    table: Arc<AgentTable>,

    /// Outcome log shared with observers
    outcomes: Arc<OutcomeChannel>,

    /// Bounds concurrently live agents
    permits: Arc<Semaphore>,

    /// Agent tasks
    tracker: TaskTracker,

    /// Abort handles of tasks still running
    live: Arc<DashMap<AgentId, AbortHandle>>,

    /// Cleared once shutdown begins
    accepting: AtomicBool,
}

impl LifecycleController {
    pub fn new(config: LifecycleConfig, outcomes: Arc<OutcomeChannel>) -> Result<Self> {
        let spec_requirement = config.spec_requirement()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_agents));

        debug!(
            "Lifecycle controller initialized with {} agent permits",
            config.max_concurrent_agents
        );

        Ok(Self {
            config,
            spec_requirement,
            table: Arc::new(AgentTable::new()),
            outcomes,
            permits,
            tracker: TaskTracker::new(),
            live: Arc::new(DashMap::new()),
            accepting: AtomicBool::new(true),
        })
    }

    /// Create an agent and start driving it on its own task
    ///
    /// `kernel` is what the agent's skill is bound to.
    pub fn spawn(
        &self,
        spec: AgentSpec,
        agent: Arc<dyn Agent>,
        kernel: Arc<dyn ServiceProvider>,
    ) -> Result<AgentId> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(KernelError::KernelNotRunning);
        }

        self.check_spec_version(&spec)?;
        let skill = MicroKernelSkill::new(spec.id, kernel)?;
        self.table.register(&spec)?;

        let agent_id = spec.id;
        let parent_id = spec.parent_id;
        let runtime = AgentRuntime::new(
            spec,
            agent,
            skill,
            Arc::clone(&self.table),
            Arc::clone(&self.outcomes),
            self.config.declined_init,
        );

        let permits = Arc::clone(&self.permits);
        let live = Arc::clone(&self.live);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let handle = self.tracker.spawn(async move {
            // Wait until the abort handle is registered so removal below
            // always happens after insertion
            let _ = registered_rx.await;

            // The semaphore is never closed
            let permit = permits.acquire_owned().await.ok();
            let outcome = runtime.drive().await;
            drop(permit);

            live.remove(&agent_id);
            outcome
        });

        self.live.insert(agent_id, handle.abort_handle());
        let _ = registered_tx.send(());

        metrics::counter!("microkernel_agents_spawned_total").increment(1);
        info!(agent = %agent_id, parent = ?parent_id, "Agent spawned");

        Ok(agent_id)
    }

    fn check_spec_version(&self, spec: &AgentSpec) -> Result<()> {
        match &spec.spec_version {
            Some(version) if !self.spec_requirement.matches(version) => {
                Err(KernelError::IncompatibleSpecVersion {
                    agent_id: spec.id,
                    requested: version.clone(),
                    supported: self.spec_requirement.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Refuse further spawns
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
        self.tracker.close();
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Wait for live agents to terminate, aborting stragglers after `timeout`
    pub async fn drain(&self, timeout: Duration) -> Result<()> {
        self.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            debug!("All agent tasks finished");
            return Ok(());
        }

        let stragglers: Vec<AgentId> = self.live.iter().map(|entry| *entry.key()).collect();
        for agent_id in &stragglers {
            if let Some((_, handle)) = self.live.remove(agent_id) {
                handle.abort();
            }
            self.table.force_terminate(*agent_id);
        }

        // Aborted tasks release their permits and gauges once dropped
        let _ = tokio::time::timeout(timeout, self.tracker.wait()).await;

        warn!(
            "Aborted {} agent(s) still live after {:?}",
            stragglers.len(),
            timeout
        );
        Err(KernelError::ShutdownTimeout(stragglers.len()))
    }

    pub fn state(&self, agent_id: AgentId) -> Option<AgentState> {
        self.table.state(agent_id)
    }

    pub fn record(&self, agent_id: AgentId) -> Option<AgentRecord> {
        self.table.record(agent_id)
    }

    /// Agents ever created
    pub fn agent_count(&self) -> usize {
        self.table.len()
    }

    /// Agents spawned and neither finished nor aborted
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn outcomes(&self) -> &Arc<OutcomeChannel> {
        &self.outcomes
    }
}
