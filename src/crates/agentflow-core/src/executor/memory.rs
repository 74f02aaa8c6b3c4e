//! Memory node - query or store through the run's memory adapter

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::validate::ValidationIssue;
use agentflow_memory::{MemoryEntry, MemoryQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Memory node operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryOperation {
    /// Retrieve entries matching the current input
    Query,
    /// Persist the current input
    Store,
}

/// Data bag of a `memory` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNodeData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Operation performed by the node
    pub operation: MemoryOperation,

    /// Result limit for queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Backend-specific filter for queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
}

/// Executor for `memory` nodes.
///
/// `query` returns the concatenated contents of matching entries; `store`
/// writes the current input with session/node metadata and passes the input
/// through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryExecutor;

impl MemoryExecutor {
    fn data(node: &Node) -> Result<MemoryNodeData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid memory node data: {e}"),
            )
        })
    }
}

#[async_trait]
impl NodeExecutor for MemoryExecutor {
    fn kind(&self) -> &'static str {
        kinds::MEMORY
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Memory", "operation": "query"})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        match Self::data(node) {
            Ok(_) => Vec::new(),
            Err(e) => vec![
                ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
            ],
        }
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;

        let Some(adapter) = env.run.options.memory.as_ref() else {
            return Err(EngineError::new(
                ErrorCode::Validation,
                "no memory adapter configured for this run",
            ));
        };

        let input = env.ctx.input.text.clone();
        match data.operation {
            MemoryOperation::Query => {
                let mut query = MemoryQuery::new(input).with_session(&env.ctx.session.id);
                if let Some(limit) = data.limit {
                    query = query.with_limit(limit);
                }
                if let Some(filter) = data.filter.clone() {
                    query = query.with_filter(filter);
                }
                let entries = adapter
                    .query(query)
                    .await
                    .map_err(|e| EngineError::classified(format!("memory query failed: {e}")))?;
                let joined = entries
                    .iter()
                    .map(|e| e.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(NodeOutcome::output(joined))
            }
            MemoryOperation::Store => {
                let entry = MemoryEntry::new(input.clone())
                    .with_session(&env.ctx.session.id)
                    .with_node(&node.id);
                adapter
                    .store(entry)
                    .await
                    .map_err(|e| EngineError::classified(format!("memory store failed: {e}")))?;
                Ok(NodeOutcome::output(input))
            }
        }
    }
}
