// src/kernel/service.rs
//! Kernel service lifecycle
//!
//! Every registered service is started when the kernel boots (registration
//! order) and stopped when it shuts down (reverse order).

use async_trait::async_trait;

/// A service the kernel hosts and exposes to agents through their skill
#[async_trait]
pub trait KernelService: Send + Sync + 'static {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once while the kernel boots
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once while the kernel shuts down
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
