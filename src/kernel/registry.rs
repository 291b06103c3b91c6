// src/kernel/registry.rs
//! Service registry mapping capability types to kernel services
//!
//! Registrations happen while the kernel boots; afterwards the registry is
//! sealed and serves lookups only (unless late registration is enabled).
//! Entries are fully built before insertion, so a concurrent lookup sees
//! either nothing or a complete entry.
//!
//! A lookup never fails: unknown keys and the `None` key both yield `None`.

use crate::kernel::service::KernelService;
use crate::utils::config::{RegistrationPolicy, RegistryConfig};
use crate::utils::errors::{KernelError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Type-erased handle to a registered service instance
pub type ServiceRef = Arc<dyn Any + Send + Sync>;

/// Comparable descriptor of a capability type
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Descriptor for the service type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.type_name).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Source of kernel services
///
/// Implemented by the kernel itself and by the registry; skills only ever
/// see this trait, so any implementation can stand in for the kernel.
pub trait ServiceProvider: Send + Sync {
    /// Look up the service registered under `key`
    fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef>;
}

/// Typed lookup on top of [`ServiceProvider`]
pub trait ServiceProviderExt: ServiceProvider {
    /// Look up and downcast the service registered for `T`
    fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_service(Some(&ServiceKey::of::<T>()))
            .and_then(|service| service.downcast::<T>().ok())
    }
}

impl<P: ServiceProvider + ?Sized> ServiceProviderExt for P {}

/// What a registration did
pub enum Registration {
    /// First service for its type
    Inserted,

    /// Dropped by the `Ignore` policy; the existing service stays
    Ignored,

    /// Took the slot of an earlier service under the `Overwrite` policy
    Replaced(Arc<dyn KernelService>),
}

impl Registration {
    /// Whether the new instance is now the registered one
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Registration::Ignored)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Inserted => f.write_str("Inserted"),
            Registration::Ignored => f.write_str("Ignored"),
            Registration::Replaced(service) => {
                f.debug_tuple("Replaced").field(&service.name()).finish()
            }
        }
    }
}

/// A registered service
#[derive(Clone)]
struct ServiceEntry {
    instance: ServiceRef,
    lifecycle: Arc<dyn KernelService>,
}

/// Registry of kernel services
pub struct ServiceRegistry {
    /// Configuration
    config: RegistryConfig,

    /// Capability type to service mapping
    services: DashMap<ServiceKey, ServiceEntry>,

    /// Lifecycle handles in registration order
    order: Mutex<Vec<(ServiceKey, Arc<dyn KernelService>)>>,

    /// Set once the kernel has booted
    sealed: AtomicBool,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            services: DashMap::new(),
            order: Mutex::new(Vec::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register `instance` as the service for type `T`
    pub fn register<T: KernelService>(&self, instance: Arc<T>) -> Result<Registration> {
        let key = ServiceKey::of::<T>();

        if self.is_sealed() && !self.config.allow_late_registration {
            return Err(KernelError::RegistrySealed(key.to_string()));
        }

        let entry = ServiceEntry {
            instance: instance.clone() as ServiceRef,
            lifecycle: instance as Arc<dyn KernelService>,
        };

        // Hold the order lock across the map update so both views agree
        let mut order = self.order.lock();

        match self.services.entry(key) {
            Entry::Vacant(vacant) => {
                order.push((key, Arc::clone(&entry.lifecycle)));
                vacant.insert(entry);
                info!("Registered service {}", key);
                Ok(Registration::Inserted)
            }
            Entry::Occupied(mut occupied) => match self.config.policy {
                RegistrationPolicy::Reject => {
                    Err(KernelError::ServiceAlreadyRegistered(key.to_string()))
                }
                RegistrationPolicy::Ignore => {
                    debug!("Ignoring duplicate registration of {}", key);
                    Ok(Registration::Ignored)
                }
                RegistrationPolicy::Overwrite => {
                    warn!("Overwriting service {}", key);
                    if let Some(slot) = order.iter_mut().find(|(k, _)| *k == key) {
                        slot.1 = Arc::clone(&entry.lifecycle);
                    }
                    let displaced = occupied.insert(entry);
                    Ok(Registration::Replaced(displaced.lifecycle))
                }
            },
        }
    }

    /// Whether registering `key` now would be refused or dropped by policy
    pub fn check_available(&self, key: &ServiceKey) -> Result<bool> {
        if self.is_sealed() && !self.config.allow_late_registration {
            return Err(KernelError::RegistrySealed(key.to_string()));
        }
        if !self.contains(key) {
            return Ok(true);
        }

        match self.config.policy {
            RegistrationPolicy::Reject => {
                Err(KernelError::ServiceAlreadyRegistered(key.to_string()))
            }
            RegistrationPolicy::Ignore => Ok(false),
            RegistrationPolicy::Overwrite => Ok(true),
        }
    }

    /// Look up a service; `None` for unknown or missing keys
    pub fn lookup(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        let key = key?;
        self.services
            .get(key)
            .map(|entry| Arc::clone(&entry.instance))
    }

    /// Whether a service is registered for `key`
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.services.contains_key(key)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Stop accepting registrations (unless late registration is allowed)
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Lifecycle handles in registration order
    pub(crate) fn lifecycles(&self) -> Vec<(ServiceKey, Arc<dyn KernelService>)> {
        self.order.lock().clone()
    }
}

impl ServiceProvider for ServiceRegistry {
    fn get_service(&self, key: Option<&ServiceKey>) -> Option<ServiceRef> {
        self.lookup(key)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
