// src/runtime/agent_runtime.rs
//! Per-agent runtime driving one agent through its lifecycle
//!
//! Every hook call runs inside a failure boundary scoped to this agent:
//! returned errors and panics are both captured, turned into an
//! [`AgentFailure`], and recorded as the agent's single outcome. Nothing
//! escapes to the controller or to sibling agents.

use crate::agent::{Agent, AgentSpec, MicroKernelSkill};
use crate::outcome::{AgentFailure, FailurePhase, Outcome, OutcomeChannel};
use crate::runtime::lifecycle::{AgentState, AgentTable};
use crate::utils::config::DeclinedInitPolicy;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one hook call: the hook's own result, or the panic message
type Guarded<T> = std::result::Result<anyhow::Result<T>, String>;

/// Run a hook, converting a panic into its message
async fn guard<T, F>(hook: F) -> Guarded<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    AssertUnwindSafe(hook)
        .catch_unwind()
        .await
        .map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Holds one unit of `microkernel_agents_active` until dropped, so an
/// aborted agent task gives its unit back too
struct ActiveGauge;

impl ActiveGauge {
    fn enter() -> Self {
        metrics::gauge!("microkernel_agents_active").increment(1.0);
        Self
    }
}

impl Drop for ActiveGauge {
    fn drop(&mut self) {
        metrics::gauge!("microkernel_agents_active").decrement(1.0);
    }
}

/// Runtime for a single agent
pub struct AgentRuntime {
    /// Construction parameters
    spec: AgentSpec,

    /// The hosted behavior
    agent: Arc<dyn Agent>,

    /// Capability skill bound to this agent
    skill: MicroKernelSkill,

    /// Lifecycle states (owned by the controller)
    table: Arc<AgentTable>,

    /// Where the outcome is recorded
    outcomes: Arc<OutcomeChannel>,

    /// Handling of `Ok(false)` from `initialize`
    declined_init: DeclinedInitPolicy,
}

impl AgentRuntime {
    pub fn new(
        spec: AgentSpec,
        agent: Arc<dyn Agent>,
        skill: MicroKernelSkill,
        table: Arc<AgentTable>,
        outcomes: Arc<OutcomeChannel>,
        declined_init: DeclinedInitPolicy,
    ) -> Self {
        Self {
            spec,
            agent,
            skill,
            table,
            outcomes,
            declined_init,
        }
    }

    /// Drive the agent to TERMINATED and record its outcome
    pub async fn drive(self) -> Arc<Outcome> {
        let agent_id = self.spec.id;
        let started = Instant::now();

        let active = ActiveGauge::enter();
        self.table.transition(agent_id, AgentState::Initializing);
        debug!(agent = %agent_id, "Initializing agent");

        let init = guard(self.agent.initialize(&self.skill)).await;
        let init_failure = match init {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => match self.declined_init {
                DeclinedInitPolicy::Fail => Some(AgentFailure::Declined { agent_id }),
                DeclinedInitPolicy::Ignore => {
                    debug!(agent = %agent_id, "Initialization declined, treated as success");
                    None
                }
            },
            Ok(Err(source)) => Some(AgentFailure::Raised {
                agent_id,
                phase: FailurePhase::Initialization,
                source,
            }),
            Err(message) => Some(AgentFailure::Panicked {
                agent_id,
                phase: FailurePhase::Initialization,
                message,
            }),
        };

        let outcome = match init_failure {
            Some(failure) => self.fail(failure).await,
            None => self.run().await,
        };

        drop(active);
        debug!(
            agent = %agent_id,
            status = %outcome.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent terminated"
        );

        outcome
    }

    /// RUNNING phase, entered after a successful initialization
    async fn run(&self) -> Arc<Outcome> {
        let agent_id = self.spec.id;
        self.table.transition(agent_id, AgentState::Running);
        info!(agent = %agent_id, "Agent running");

        let failure = match guard(self.agent.run(&self.skill)).await {
            Ok(Ok(())) => None,
            Ok(Err(source)) => Some(AgentFailure::Raised {
                agent_id,
                phase: FailurePhase::Run,
                source,
            }),
            Err(message) => Some(AgentFailure::Panicked {
                agent_id,
                phase: FailurePhase::Run,
                message,
            }),
        };

        if let Some(failure) = failure {
            return self.fail(failure).await;
        }

        self.table.transition(agent_id, AgentState::Stopping);
        self.destroy().await;
        self.table.transition(agent_id, AgentState::Terminated);

        self.outcomes
            .append(Outcome::completed(agent_id, self.spec.parent_id))
    }

    /// FAILED path: tear down and record the failure
    async fn fail(&self, failure: AgentFailure) -> Arc<Outcome> {
        let agent_id = self.spec.id;

        warn!(
            agent = %agent_id,
            phase = %failure.phase(),
            error = %failure,
            "Agent failure contained"
        );
        metrics::counter!("microkernel_agent_failures_total", "phase" => failure.phase().to_string())
            .increment(1);

        self.table.transition(agent_id, AgentState::Failed);
        self.destroy().await;
        self.table.transition(agent_id, AgentState::Terminated);

        self.outcomes
            .append(Outcome::failed(self.spec.parent_id, failure))
    }

    /// Teardown hook; its own failures are logged and otherwise ignored
    async fn destroy(&self) {
        let agent_id = self.spec.id;

        match guard(self.agent.on_destroy(&self.skill)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(agent = %agent_id, "Destroy hook failed: {:#}", e),
            Err(message) => warn!(agent = %agent_id, "Destroy hook panicked: {}", message),
        }
    }
}
