// src/kernel/mod.rs
//! Microkernel facade
//!
//! The kernel owns the service registry, the lifecycle controller and the
//! outcome channel. It is built once with [`KernelBuilder`], which starts
//! every registered service before the first agent can be spawned.
//!
//! ```text
//! KernelBuilder ──service()──▶ ServiceRegistry
//!       │ start()
//!       ▼
//!    Kernel ──spawn()──▶ LifecycleController ──▶ OutcomeChannel
//!       ▲                       │
//!       └──── get_service ◀── MicroKernelSkill (one per agent)
//! ```

pub mod registry;
pub mod service;

pub use registry::{
    Registration, ServiceKey, ServiceProvider, ServiceProviderExt, ServiceRef, ServiceRegistry,
};
pub use service::KernelService;

use crate::agent::{Agent, AgentId, AgentSpec};
use crate::outcome::OutcomeChannel;
use crate::runtime::{AgentState, LifecycleController};
use crate::utils::config::KernelConfig;
use crate::utils::errors::{KernelError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Kernel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Collects services before the kernel boots
pub struct KernelBuilder {
    config: KernelConfig,
    registry: ServiceRegistry,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        let registry = ServiceRegistry::new(config.registry.clone());
        Self { config, registry }
    }

    /// Register `instance` as the service for its type
    pub fn service<T: KernelService>(self, instance: Arc<T>) -> Result<Self> {
        self.registry.register(instance)?;
        Ok(self)
    }

    /// Start services in registration order and return the running kernel
    ///
    /// If a service fails to start, the ones already started are stopped
    /// again in reverse order.
    pub async fn start(self) -> Result<Kernel> {
        self.config.validate()?;

        let mut started: Vec<Arc<dyn KernelService>> = Vec::new();
        for (key, service) in self.registry.lifecycles() {
            if let Err(e) = service.start().await {
                error!("Service {} failed to start: {:#}", key, e);
                stop_services(started.iter().rev()).await;

                return Err(KernelError::ServiceFailed {
                    service: service.name().to_string(),
                    reason: format!("{:#}", e),
                });
            }
            started.push(service);
        }

        self.registry.seal();

        let outcomes = Arc::new(OutcomeChannel::new(
            self.config.outcomes.default_await_timeout(),
        ));
        let controller = LifecycleController::new(self.config.lifecycle.clone(), outcomes)?;

        info!(
            "Kernel started with {} service(s), max {} concurrent agents",
            started.len(),
            self.config.lifecycle.max_concurrent_agents
        );

        Ok(Kernel {
            inner: Arc::new(KernelInner {
                config: self.config,
                registry: self.registry,
                controller,
                state: Mutex::new(KernelState::Running),
            }),
        })
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

async fn stop_services<'a>(services: impl Iterator<Item = &'a Arc<dyn KernelService>>) {
    for service in services {
        stop_service(service.as_ref()).await;
    }
}

async fn stop_service(service: &dyn KernelService) {
    if let Err(e) = service.stop().await {
        warn!("Service {} failed to stop: {:#}", service.name(), e);
    }
}

struct KernelInner {
    config: KernelConfig,
    registry: ServiceRegistry,
    controller: LifecycleController,
    state: Mutex<KernelState>,
}

impl ServiceProvider for KernelInner {
    fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        self.registry.lookup(key)
    }
}

/// Handle to a running kernel; cheap to clone
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// Spawn an agent under a freshly generated identifier
    pub fn spawn<A: Agent>(&self, parent_id: Option<AgentId>, agent: A) -> Result<AgentId> {
        self.spawn_with(AgentSpec::child_of(parent_id), agent)
    }

    /// Spawn an agent from an explicit construction spec
    pub fn spawn_with<A: Agent>(&self, spec: AgentSpec, agent: A) -> Result<AgentId> {
        self.spawn_shared(spec, Arc::new(agent))
    }

    /// Spawn an agent the caller keeps a handle to
    pub fn spawn_shared(&self, spec: AgentSpec, agent: Arc<dyn Agent>) -> Result<AgentId> {
        if self.state() != KernelState::Running {
            return Err(KernelError::KernelNotRunning);
        }

        let provider: Arc<dyn ServiceProvider> = self.inner.clone();
        self.inner.controller.spawn(spec, agent, provider)
    }

    /// Look up a service; `None` for unknown or missing keys
    pub fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        self.inner.registry.lookup(key)
    }

    /// Look up and downcast the service registered for `T`
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.registry.service::<T>()
    }

    /// Register and start a service after boot
    ///
    /// Only allowed when `registry.allow_late_registration` is set. The
    /// registration policy is applied before the service is started; under
    /// `Overwrite` the displaced service is stopped once the new one is in.
    pub async fn register_service<T: KernelService>(&self, instance: Arc<T>) -> Result<bool> {
        if self.state() != KernelState::Running {
            return Err(KernelError::KernelNotRunning);
        }
        if !self.inner.config.registry.allow_late_registration {
            return Err(KernelError::RegistrySealed(ServiceKey::of::<T>().to_string()));
        }
        if !self.inner.registry.check_available(&ServiceKey::of::<T>())? {
            debug!("Ignoring late registration of {}", instance.name());
            return Ok(false);
        }

        instance
            .start()
            .await
            .map_err(|e| KernelError::ServiceFailed {
                service: instance.name().to_string(),
                reason: format!("{:#}", e),
            })?;

        // A concurrent registration may still win the slot
        match self.inner.registry.register(Arc::clone(&instance)) {
            Ok(Registration::Inserted) => Ok(true),
            Ok(Registration::Replaced(displaced)) => {
                stop_service(displaced.as_ref()).await;
                Ok(true)
            }
            Ok(Registration::Ignored) => {
                stop_service(instance.as_ref()).await;
                Ok(false)
            }
            Err(e) => {
                stop_service(instance.as_ref()).await;
                Err(e)
            }
        }
    }

    /// The outcome log shared with observers
    pub fn outcomes(&self) -> &Arc<OutcomeChannel> {
        self.inner.controller.outcomes()
    }

    pub fn agent_state(&self, agent_id: AgentId) -> Option<AgentState> {
        self.inner.controller.state(agent_id)
    }

    /// Agents ever spawned
    pub fn agent_count(&self) -> usize {
        self.inner.controller.agent_count()
    }

    /// Agents neither finished nor aborted at shutdown
    pub fn live_agents(&self) -> usize {
        self.inner.controller.live_count()
    }

    pub fn service_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn state(&self) -> KernelState {
        *self.inner.state.lock()
    }

    /// Stop accepting agents, drain live ones, then stop services
    ///
    /// Agents still live after `timeout` are aborted and reported through
    /// `ShutdownTimeout`; services are stopped either way. Calling this
    /// again after shutdown began is a no-op.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != KernelState::Running {
                return Ok(());
            }
            *state = KernelState::ShuttingDown;
        }

        info!("Kernel shutting down");
        let drained = self.inner.controller.drain(timeout).await;

        let services: Vec<_> = self
            .inner
            .registry
            .lifecycles()
            .into_iter()
            .map(|(_, service)| service)
            .collect();
        stop_services(services.iter().rev()).await;

        *self.inner.state.lock() = KernelState::Stopped;
        info!("Kernel stopped");

        drained
    }

    /// `shutdown` bounded by `lifecycle.shutdown_timeout_ms`
    pub async fn stop(&self) -> Result<()> {
        self.shutdown(self.inner.config.lifecycle.shutdown_timeout())
            .await
    }
}

impl ServiceProvider for Kernel {
    fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        self.inner.get_service(key)
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state())
            .field("services", &self.service_count())
            .field("agents", &self.agent_count())
            .finish()
    }
}
