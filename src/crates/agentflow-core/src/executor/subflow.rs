//! Subflow node - invoke a registered workflow as a nested run

use crate::context::ExecutionInput;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Data bag of a `subflow` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubflowData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Registry id of the workflow to invoke
    pub subflow_id: String,

    /// Child input construction: each value is a literal, `{{output}}`
    /// (the current input), or `{{outputs.<nodeId>}}` (a recorded output).
    /// Ordered map so child input composition is deterministic.
    pub input_mappings: BTreeMap<String, String>,

    /// Share this run's session (id and messages) with the child
    #[serde(default)]
    pub share_session: bool,
}

/// Executor for `subflow` nodes.
///
/// Resolves the child workflow from the run's subflow registry, evaluates
/// the input mappings into a fresh [`ExecutionInput`], and recurses into the
/// engine. The child's final output becomes this node's output; a child
/// failure surfaces as this node's error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubflowExecutor;

impl SubflowExecutor {
    fn data(node: &Node) -> Result<SubflowData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid subflow node data: {e}"),
            )
        })
    }

    fn evaluate_mapping(
        value: &str,
        current_input: &str,
        outputs: &std::collections::HashMap<String, String>,
    ) -> String {
        if value == "{{output}}" {
            return current_input.to_string();
        }
        if let Some(node_id) = value
            .strip_prefix("{{outputs.")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            return outputs.get(node_id.trim()).cloned().unwrap_or_default();
        }
        value.to_string()
    }

    /// Compose the child's input text from the evaluated mappings.
    ///
    /// A mapping keyed `input` becomes the text verbatim; otherwise the
    /// evaluated pairs are joined as `key: value` lines.
    fn compose_input(evaluated: &BTreeMap<String, String>) -> String {
        if let Some(direct) = evaluated.get("input") {
            return direct.clone();
        }
        evaluated
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl NodeExecutor for SubflowExecutor {
    fn kind(&self) -> &'static str {
        kinds::SUBFLOW
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Subflow", "subflowId": "", "inputMappings": {}})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        let data = match Self::data(node) {
            Ok(data) => data,
            Err(e) => {
                return vec![
                    ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
                ]
            }
        };

        let mut issues = Vec::new();
        if data.subflow_id.is_empty() {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::MissingSubflowId,
                    format!("subflow node '{}' has no subflowId", node.id),
                )
                .for_node(&node.id),
            );
        }
        if data.input_mappings.is_empty() {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::MissingInputMapping,
                    format!("subflow node '{}' has no input mappings", node.id),
                )
                .for_node(&node.id),
            );
        }
        issues
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;

        if data.subflow_id.is_empty() {
            return Err(EngineError::new(
                ErrorCode::MissingSubflowId,
                format!("subflow node '{}' has no subflowId", node.id),
            ));
        }

        let Some(child) = env.run.options.subflows.get(&data.subflow_id).cloned() else {
            return Err(EngineError::new(
                ErrorCode::SubflowNotFound,
                format!("subflow '{}' is not registered", data.subflow_id),
            ));
        };

        let evaluated: BTreeMap<String, String> = data
            .input_mappings
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Self::evaluate_mapping(v, &env.ctx.input.text, &env.ctx.outputs),
                )
            })
            .collect();
        let child_text = Self::compose_input(&evaluated);

        debug!(
            subflow = %data.subflow_id,
            share_session = data.share_session,
            "entering subflow"
        );

        let session = data.share_session.then(|| env.ctx.session.clone());
        let (result, child_session) = env
            .run
            .engine
            .execute_nested(
                child,
                ExecutionInput::text(child_text),
                env.run.callbacks.clone(),
                session,
                env.ctx.cancel.clone(),
            )
            .await;

        if data.share_session {
            env.ctx.session = child_session;
        }

        if result.success {
            Ok(NodeOutcome::output(result.output.unwrap_or_default()))
        } else {
            let err = result.error.unwrap_or_else(|| {
                EngineError::new(ErrorCode::Unknown, "subflow failed without an error")
            });
            Err(EngineError::new(
                err.code,
                format!("subflow '{}' failed: {}", data.subflow_id, err.message),
            ))
        }
    }
}
