use std::time::Duration;

use cnvrg_core::{Ownership, DEFAULT_CONFLICT_RETRIES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Attempts for status, registry and finalizer read-modify-write loops
    pub conflict_retries: usize,
    /// Requeue delay after a failed registry update
    pub registry_retry: Duration,
    /// Requeue delay after a failed pass
    pub error_requeue: Duration,
    pub ownership: Ownership,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            registry_retry: Duration::from_secs(30),
            error_requeue: Duration::from_secs(15),
            ownership: Ownership::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|s| matches!(s.trim(), "1" | "true" | "yes" | "on"))
}

impl ReconcileConfig {
    /// Defaults overridden by `CNVRG_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            conflict_retries: env_parse("CNVRG_CONFLICT_RETRIES").unwrap_or(d.conflict_retries),
            registry_retry: env_parse("CNVRG_REGISTRY_RETRY_SECS").map(Duration::from_secs).unwrap_or(d.registry_retry),
            error_requeue: env_parse("CNVRG_ERROR_REQUEUE_SECS").map(Duration::from_secs).unwrap_or(d.error_requeue),
            ownership: Ownership {
                istio: env_flag("CNVRG_OWN_ISTIO_RESOURCES").unwrap_or(d.ownership.istio),
                openshift: env_flag("CNVRG_OWN_OPENSHIFT_RESOURCES").unwrap_or(d.ownership.openshift),
                prometheus: env_flag("CNVRG_OWN_PROMETHEUS_RESOURCES").unwrap_or(d.ownership.prometheus),
            },
        }
    }
}
