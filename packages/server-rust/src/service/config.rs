use serde::{Deserialize, Serialize};
use servhost_core::Lifecycle;

/// Host-level configuration for discovery, registration and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Name reported in logs for this service host.
    pub host_name: String,
    /// Lifecycle used when `init` and `register_service` bind handler types.
    pub default_lifecycle: Lifecycle,
    /// Build the invoker for every registered message type during `init`
    /// instead of on first request.
    pub eager_invokers: bool,
    /// Timeout applied by the dispatch pipeline, in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Maximum number of concurrent dispatches before load shedding.
    pub max_concurrent_operations: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_name: "servhost".to_string(),
            default_lifecycle: Lifecycle::PerCall,
            eager_invokers: false,
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_per_call_lifecycle() {
        let config = HostConfig::default();
        assert_eq!(config.default_lifecycle, Lifecycle::PerCall);
        assert!(!config.eager_invokers);
        assert_eq!(config.default_operation_timeout_ms, 30_000);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: HostConfig =
            serde_json::from_str(r#"{"defaultLifecycle":"shared","eagerInvokers":true}"#).unwrap();
        assert_eq!(config.default_lifecycle, Lifecycle::Shared);
        assert!(config.eager_invokers);
        assert_eq!(config.max_concurrent_operations, 1000);
        assert_eq!(config.host_name, "servhost");
    }
}
