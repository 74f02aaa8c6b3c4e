//! Parallel node - concurrent branch fan-out with optional merge

use crate::callbacks::ExecutionCallbacks;
use crate::context::CancelToken;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::streaming::{stream_chat, TokenSink};
use crate::executor::{ExecEnv, HandleSpec, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::messages::Message;
use crate::provider::{ChatProvider, ChatRequest};
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sentinel output of a branch that exceeded its timeout.
pub const BRANCH_TIMEOUT_MARKER: &str = "[branch timed out]";

/// One branch of a parallel node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSpec {
    /// Branch id, also usable as a source handle
    pub id: String,

    /// Display label
    pub label: String,

    /// Branch model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Branch prompt override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Data bag of a `parallel` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Branches, spawned in declaration order
    pub branches: Vec<BranchSpec>,

    /// Default model for branches and the merge call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Default prompt for branches and the merge call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Per-branch timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_timeout: Option<u64>,

    /// Merge branch outputs with one more reasoning call
    #[serde(default = "default_merge_enabled")]
    pub merge_enabled: bool,
}

fn default_merge_enabled() -> bool {
    true
}

const MERGE_PROMPT: &str = "You are given the outputs of several parallel branches. \
Merge them into a single coherent answer.";

/// Executor for `parallel` nodes.
///
/// Spawns one task per branch; branches share nothing but the cancellation
/// token and the callback sink, and each receives an independent snapshot of
/// the conversation history. A branch that times out contributes
/// [`BRANCH_TIMEOUT_MARKER`] and does not cancel its siblings; a branch
/// failure is captured as text. When merging is enabled a final reasoning
/// call combines the branch outputs, streaming against the parallel node's
/// own id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor;

impl ParallelExecutor {
    fn data(node: &Node) -> Result<ParallelData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid parallel node data: {e}"),
            )
        })
    }
}

struct BranchTask {
    branch: BranchSpec,
    model: Option<String>,
    prompt: Option<String>,
    input: String,
    history: Vec<Message>,
    node_id: String,
    provider: Arc<dyn ChatProvider>,
    callbacks: Arc<dyn ExecutionCallbacks>,
    cancel: CancelToken,
    timeout: Option<Duration>,
}

impl BranchTask {
    /// Run one branch to completion, always emitting start and complete.
    async fn run(self) -> (String, String) {
        self.callbacks
            .on_branch_start(&self.node_id, &self.branch.id, &self.branch.label)
            .await;

        let output = match self.call().await {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(
                    node = %self.node_id,
                    branch = %self.branch.id,
                    "branch timed out"
                );
                BRANCH_TIMEOUT_MARKER.to_string()
            }
            Err(err) => format!("[branch error: {}]", err.message),
        };

        self.callbacks
            .on_branch_complete(&self.node_id, &self.branch.id, &self.branch.label, &output)
            .await;
        (self.branch.id.clone(), output)
    }

    /// `Ok(None)` is a timeout.
    async fn call(&self) -> Result<Option<String>> {
        let model = self.model.clone().ok_or_else(|| {
            EngineError::new(
                ErrorCode::MissingModel,
                format!("branch '{}' has no model", self.branch.id),
            )
        })?;

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = &self.prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(&self.input));

        let request = ChatRequest::new(model, messages);
        let call = stream_chat(
            self.provider.as_ref(),
            request,
            &self.cancel,
            TokenSink::Branch {
                callbacks: self.callbacks.as_ref(),
                node_id: &self.node_id,
                branch_id: &self.branch.id,
            },
        );

        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result.map(|o| Some(o.content)),
                Err(_) => Ok(None),
            },
            None => call.await.map(|o| Some(o.content)),
        }
    }
}

#[async_trait]
impl NodeExecutor for ParallelExecutor {
    fn kind(&self) -> &'static str {
        kinds::PARALLEL
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Parallel", "branches": []})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        match Self::data(node) {
            Ok(data) if data.branches.is_empty() => vec![ValidationIssue::error(
                ErrorCode::MissingRequiredPort,
                format!("parallel node '{}' declares no branches", node.id),
            )
            .for_node(&node.id)],
            Ok(_) => Vec::new(),
            Err(e) => vec![
                ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
            ],
        }
    }

    fn dynamic_handles(&self, node: &Node) -> Vec<HandleSpec> {
        Self::data(node)
            .map(|data| {
                data.branches
                    .into_iter()
                    .map(|b| HandleSpec {
                        id: b.id,
                        label: b.label,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;
        if data.branches.is_empty() {
            return Err(EngineError::new(
                ErrorCode::MissingRequiredPort,
                format!("parallel node '{}' declares no branches", node.id),
            ));
        }

        let input = env.ctx.input.text.clone();
        let history = env.ctx.history.clone();
        let timeout = data.branch_timeout.map(Duration::from_millis);

        debug!(
            node = %node.id,
            branches = data.branches.len(),
            timeout_ms = data.branch_timeout,
            "fanning out branches"
        );

        let handles: Vec<_> = data
            .branches
            .iter()
            .map(|branch| {
                let task = BranchTask {
                    model: branch
                        .model
                        .clone()
                        .or_else(|| data.model.clone())
                        .or_else(|| env.run.options.default_model.clone()),
                    prompt: branch.prompt.clone().or_else(|| data.prompt.clone()),
                    branch: branch.clone(),
                    input: input.clone(),
                    history: history.clone(),
                    node_id: node.id.clone(),
                    provider: env.run.provider.clone(),
                    callbacks: env.run.callbacks.clone(),
                    cancel: env.ctx.cancel.clone(),
                    timeout,
                };
                tokio::spawn(task.run())
            })
            .collect();

        let mut branch_outputs: HashMap<String, String> = HashMap::new();
        let mut ordered: Vec<(String, String, String)> = Vec::with_capacity(data.branches.len());
        for (handle, branch) in handles.into_iter().zip(&data.branches) {
            let (branch_id, output) = handle
                .await
                .map_err(|e| EngineError::classified(format!("branch task failed: {e}")))?;
            branch_outputs.insert(branch_id.clone(), output.clone());
            ordered.push((branch_id, branch.label.clone(), output));
        }

        if env.ctx.cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }

        let output = if data.merge_enabled {
            let model = data
                .model
                .clone()
                .or_else(|| env.run.options.default_model.clone())
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorCode::MissingModel,
                        format!("parallel node '{}' has no merge model", node.id),
                    )
                })?;

            let sections = ordered
                .iter()
                .map(|(_, label, output)| format!("[{label}]: {output}"))
                .collect::<Vec<_>>()
                .join("\n\n");
            let merge_system = data.prompt.clone().unwrap_or_else(|| MERGE_PROMPT.to_string());
            let request = ChatRequest::new(
                model,
                vec![
                    Message::system(merge_system),
                    Message::user(format!("Input: {input}\n\nBranch results:\n{sections}")),
                ],
            );

            stream_chat(
                env.run.provider.as_ref(),
                request,
                &env.ctx.cancel,
                TokenSink::Node {
                    callbacks: env.run.callbacks.as_ref(),
                    node_id: &node.id,
                },
            )
            .await?
            .content
        } else {
            ordered
                .iter()
                .map(|(_, label, output)| format!("[{label}]: {output}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(NodeOutcome::output(output).with_branch_outputs(branch_outputs))
    }
}
