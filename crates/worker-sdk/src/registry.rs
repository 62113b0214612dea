//! Tool registry — maps tool names to handlers and collects their schemas
//! for the `register` handshake frame.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::tool::ToolDefinition;

use crate::types::ToolResult;

/// Implement this trait to handle tool calls dispatched by the hub.
///
/// # Example
///
/// ```rust,no_run
/// use sa_worker_sdk::{ToolResult, WorkerTool};
///
/// struct PingTool;
///
/// #[async_trait::async_trait]
/// impl WorkerTool for PingTool {
///     async fn call(&self, _args: serde_json::Value) -> ToolResult {
///         Ok(serde_json::json!({ "pong": true }))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait WorkerTool: Send + Sync + 'static {
    /// Execute the tool against the JSON arguments the LLM supplied.
    async fn call(&self, args: serde_json::Value) -> ToolResult;
}

/// Registry of tool handlers, keyed by the name advertised to the hub.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn WorkerTool>>,
    schemas: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool's schema and handler together. The schema's `name`
    /// is the key used to dispatch incoming `tool_call` frames.
    pub fn register(&mut self, schema: ToolDefinition, handler: impl WorkerTool) {
        self.tools.insert(schema.name.clone(), Arc::new(handler));
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// All registered schemas, in the shape sent in the `register` frame.
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.schemas.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Look up a handler by exact tool name.
    pub(crate) fn get(&self, tool_name: &str) -> Option<Arc<dyn WorkerTool>> {
        self.tools.get(tool_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolError;

    struct Echo;
    #[async_trait::async_trait]
    impl WorkerTool for Echo {
        async fn call(&self, args: serde_json::Value) -> ToolResult {
            Ok(args)
        }
    }

    struct Fail;
    #[async_trait::async_trait]
    impl WorkerTool for Fail {
        async fn call(&self, _args: serde_json::Value) -> ToolResult {
            Err(ToolError::Failed("intentional".into()))
        }
    }

    fn schema(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test tool".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(schema("echo"), Echo);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn schemas_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(schema("z_tool"), Echo);
        reg.register(schema("a_tool"), Echo);
        let names: Vec<_> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a_tool", "z_tool"]);
    }

    #[tokio::test]
    async fn echo_tool_returns_args() {
        let mut reg = ToolRegistry::new();
        reg.register(schema("echo"), Echo);
        let handler = reg.get("echo").unwrap();
        let result = handler.call(serde_json::json!({"x": 1})).await;
        assert_eq!(result.unwrap(), serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn fail_tool_returns_error() {
        let mut reg = ToolRegistry::new();
        reg.register(schema("fail"), Fail);
        let handler = reg.get("fail").unwrap();
        let result = handler.call(serde_json::json!({})).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("intentional"));
    }
}
