//! Tool node - invoke a host-provided tool with the current input

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::retry::ErrorHandling;
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Data bag of a `tool` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNodeData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Registry id of the tool to invoke
    pub tool_id: String,

    /// Error-handling policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
}

/// Executor for `tool` nodes.
///
/// Looks the tool up in the run's registry and invokes its handler with the
/// current input as a JSON string argument. A missing tool is
/// `MISSING_REQUIRED_PORT`; a handler error is classified from its message
/// like any other runtime failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolExecutor;

impl ToolExecutor {
    fn data(node: &Node) -> Result<ToolNodeData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid tool node data: {e}"),
            )
        })
    }
}

#[async_trait]
impl NodeExecutor for ToolExecutor {
    fn kind(&self) -> &'static str {
        kinds::TOOL
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Tool", "toolId": ""})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        match Self::data(node) {
            Ok(data) if data.tool_id.is_empty() => vec![ValidationIssue::error(
                ErrorCode::MissingRequiredPort,
                format!("tool node '{}' has no toolId", node.id),
            )
            .for_node(&node.id)],
            Ok(_) => Vec::new(),
            Err(e) => vec![
                ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
            ],
        }
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;

        let Some(tool) = env.ctx.tools.get(&data.tool_id).cloned() else {
            return Err(EngineError::new(
                ErrorCode::MissingRequiredPort,
                format!("tool '{}' is not registered", data.tool_id),
            ));
        };

        let args = serde_json::Value::String(env.ctx.input.text.clone());
        match (tool.handler)(args).await {
            Ok(result) => Ok(NodeOutcome::output(result)),
            Err(message) => Err(EngineError::classified(format!(
                "tool '{}' failed: {message}",
                data.tool_id
            ))),
        }
    }
}
