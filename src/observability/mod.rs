// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Both initializers are idempotent: the first call installs the global
//! subscriber or recorder and later calls are no-ops.

use crate::utils::config::ObservabilityConfig;
use crate::utils::errors::{KernelError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING: OnceCell<()> = OnceCell::new();
static METRICS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize logging, and metrics when enabled
pub fn init(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    init_tracing(config)?;

    if config.metrics_enabled {
        init_metrics().map(Some)
    } else {
        Ok(None)
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    TRACING
        .get_or_try_init(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .map_err(|e| KernelError::ConfigError(format!("invalid log filter: {}", e)))?;

            let (json, plain) = if config.json_logs {
                (Some(tracing_subscriber::fmt::layer().json()), None)
            } else {
                (None, Some(tracing_subscriber::fmt::layer()))
            };

            // Another subscriber may already be installed (tests, host apps)
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json)
                .with(plain)
                .try_init();

            Ok(())
        })
        .map(|_| ())
}

/// Install the Prometheus recorder and return its render handle
pub fn init_metrics() -> Result<PrometheusHandle> {
    METRICS
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| KernelError::ConfigError(format!("metrics recorder: {}", e)))?;

            describe_metrics();
            Ok(handle)
        })
        .cloned()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "microkernel_agents_spawned_total",
        "Agents accepted by spawn"
    );
    metrics::describe_counter!(
        "microkernel_agent_failures_total",
        "Contained agent failures, by lifecycle phase"
    );
    metrics::describe_counter!(
        "microkernel_outcomes_total",
        "Outcomes appended, by status"
    );
    metrics::describe_gauge!(
        "microkernel_agents_active",
        "Agents currently initializing or running"
    );
}
