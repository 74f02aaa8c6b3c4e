//! Tool registry and host-provided tool handlers
//!
//! Tools are host functions the workflow can invoke, either from a dedicated
//! `tool` node or from inside an agent's tool-calling loop. The engine owns
//! neither the tool implementations nor their transport; it receives a
//! [`ToolRegistry`] at run start and calls handlers with the JSON arguments
//! the model (or the upstream node) produced.
//!
//! A handler returns the stringified result that is appended to the
//! conversation as a `tool` message. Handler errors are surfaced as error
//! text to the model rather than failing the run - the model gets a chance
//! to recover, the same way a human operator would read a failed command's
//! output.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declaration of a callable tool, advertised to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name, unique within a registry
    pub name: String,

    /// What the tool does, shown to the model
    pub description: String,

    /// JSON Schema of the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a definition with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the argument schema.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Host-provided tool implementation.
///
/// Receives the parsed JSON arguments and resolves to the stringified result
/// or an error message.
pub type ToolHandler = Arc<
    dyn Fn(serde_json::Value) -> BoxFuture<'static, std::result::Result<String, String>>
        + Send
        + Sync,
>;

/// A tool definition paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Declaration advertised to the provider
    pub definition: ToolDefinition,

    /// Implementation invoked with parsed arguments
    pub handler: ToolHandler,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Fallback handler consulted when an agent's tool call names a tool that is
/// not in the registry. Receives the tool name and the raw arguments.
pub type FallbackToolHandler = Arc<
    dyn Fn(String, serde_json::Value) -> BoxFuture<'static, std::result::Result<String, String>>
        + Send
        + Sync,
>;

/// Registry of tools available to a run, keyed by tool id.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name.
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        let id = definition.name.clone();
        self.tools.insert(id, RegisteredTool { definition, handler });
    }

    /// Register a tool under an explicit id (builder style).
    pub fn with_tool(
        mut self,
        id: impl Into<String>,
        definition: ToolDefinition,
        handler: ToolHandler,
    ) -> Self {
        self.tools.insert(id.into(), RegisteredTool { definition, handler });
        self
    }

    /// Look up a tool by id.
    pub fn get(&self, id: &str) -> Option<&RegisteredTool> {
        self.tools.get(id)
    }

    /// Whether a tool is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Definitions for a set of tool ids, skipping unknown ids.
    pub fn definitions_for(&self, ids: &[String]) -> Vec<ToolDefinition> {
        ids.iter()
            .filter_map(|id| self.tools.get(id).map(|t| t.definition.clone()))
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Wrap an async closure as a [`ToolHandler`].
///
/// ```rust
/// use agentflow_core::tools::{tool_handler, ToolDefinition, ToolRegistry};
///
/// let mut registry = ToolRegistry::new();
/// registry.register(
///     ToolDefinition::new("echo", "Echo the input back"),
///     tool_handler(|args| async move { Ok(args.to_string()) }),
/// );
/// assert!(registry.contains("echo"));
/// ```
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<String, String>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new("upper", "Uppercase a string")
                .with_parameters(json!({"type": "object", "properties": {"text": {"type": "string"}}})),
            tool_handler(|args| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
            }),
        );

        let tool = registry.get("upper").unwrap();
        let out = (tool.handler)(json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, "HI");
    }

    #[test]
    fn test_definitions_for_skips_unknown() {
        let registry = ToolRegistry::new().with_tool(
            "a",
            ToolDefinition::new("a", "tool a"),
            tool_handler(|_| async move { Ok(String::new()) }),
        );

        let defs = registry.definitions_for(&["a".to_string(), "missing".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "a");
    }

    #[tokio::test]
    async fn test_handler_error_is_value() {
        let registry = ToolRegistry::new().with_tool(
            "fail",
            ToolDefinition::new("fail", "always fails"),
            tool_handler(|_| async move { Err("boom".to_string()) }),
        );

        let tool = registry.get("fail").unwrap();
        let err = (tool.handler)(json!({})).await.unwrap_err();
        assert_eq!(err, "boom");
    }
}
