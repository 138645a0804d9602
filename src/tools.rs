//! Capability runtime.
//!
//! Capabilities are named, side-effecting actions the model may invoke
//! mid-response. The registry owns the handlers, filters the advertised
//! set per session, and bounds every invocation with a timeout so a stuck
//! capability degrades to a tool-level error instead of stalling the
//! exchange.

mod builtin;
mod outcome;

pub use outcome::{
    DatabaseReport, SearchHit, SearchResults, ToolCall, ToolOutcome, ToolResult, WeatherReport,
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// JSON-schema description of a capability, as advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Seam between the inference engine and capability execution
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Definitions for the capabilities in `enabled` that this runtime can
    /// actually serve.
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition>;

    /// Invoke a capability. Never fails the exchange; problems come back
    /// as an error-marked result.
    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult;
}

/// One registered capability handler
#[async_trait]
pub trait Capability: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Produce the raw result payload. The registry types it afterwards.
    async fn run(&self, arguments: Value) -> Result<Value, String>;
}

/// Settings for the built-in capability set
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// SearxNG-compatible endpoint for `web_search`
    pub search_endpoint: Option<String>,
    /// Location of the scratch database backing `query_database`
    pub database_path: Option<PathBuf>,
    /// Per-invocation budget
    pub invoke_timeout: Duration,
}

impl ToolConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        Self {
            search_endpoint: std::env::var("SEARCH_API_URL").ok(),
            database_path: std::env::var("COLLOQUY_DB_PATH").ok().map(PathBuf::from),
            invoke_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            database_path: None,
            invoke_timeout: Duration::from_secs(10),
        }
    }
}

/// Production capability registry
pub struct ToolRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    invoke_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(invoke_timeout: Duration) -> Self {
        Self {
            capabilities: HashMap::new(),
            invoke_timeout,
        }
    }

    /// Registry with the built-in capability set. Capabilities whose
    /// prerequisites are missing are skipped with a warning rather than
    /// failing startup.
    pub fn with_builtins(config: &ToolConfig) -> Self {
        let mut registry = Self::new(config.invoke_timeout);

        let http = reqwest::Client::builder()
            .timeout(config.invoke_timeout)
            .build()
            .expect("failed to build HTTP client");

        registry.register(Arc::new(builtin::WeatherTool::new(http.clone())));
        registry.register(Arc::new(builtin::SearchTool::new(
            http,
            config.search_endpoint.clone(),
        )));

        match builtin::DatabaseTool::open(config.database_path.as_deref()) {
            Ok(db) => registry.register(Arc::new(db)),
            Err(e) => {
                tracing::warn!(error = %e, "scratch database unavailable, query_database disabled");
            }
        }

        registry
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities
            .insert(capability.definition().name, capability);
    }
}

#[async_trait]
impl ToolRuntime for ToolRegistry {
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition> {
        enabled
            .iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| c.definition())
            .collect()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(capability) = self.capabilities.get(name) else {
            return ToolResult::error(format!("unknown capability: {name}"));
        };

        match tokio::time::timeout(self.invoke_timeout, capability.run(arguments)).await {
            Ok(Ok(value)) => ToolResult::Success(ToolOutcome::from_name_and_value(name, value)),
            Ok(Err(message)) => ToolResult::error(message),
            Err(_) => ToolResult::error(format!(
                "capability timed out after {}s",
                self.invoke_timeout.as_secs()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SlowCapability;

    #[async_trait]
    impl Capability for SlowCapability {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow".to_string(),
                description: "Never finishes in time.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn run(&self, _arguments: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Returns its arguments.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn run(&self, arguments: Value) -> Result<Value, String> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn unknown_capability_is_an_error_result() {
        let registry = ToolRegistry::new(Duration::from_secs(1));
        let result = registry.invoke("nope", json!({})).await;
        assert!(result.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_capability_times_out() {
        let mut registry = ToolRegistry::new(Duration::from_millis(50));
        registry.register(Arc::new(SlowCapability));

        let result = registry.invoke("slow", json!({})).await;
        match result {
            ToolResult::Error { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_invocation_is_typed_by_name() {
        let mut registry = ToolRegistry::new(Duration::from_secs(1));
        registry.register(Arc::new(EchoCapability));

        let result = registry.invoke("echo", json!({"a": 1})).await;
        match result {
            ToolResult::Success(ToolOutcome::Generic { data }) => {
                assert_eq!(data, json!({"a": 1}));
            }
            other => panic!("expected generic outcome, got {other:?}"),
        }
    }

    #[test]
    fn definitions_follow_the_enabled_set() {
        let mut registry = ToolRegistry::new(Duration::from_secs(1));
        registry.register(Arc::new(EchoCapability));
        registry.register(Arc::new(SlowCapability));

        let defs = registry.definitions(&["echo".to_string(), "missing".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }
}
