//! Agent node - streaming reasoning with a bounded tool-calling loop

use crate::callbacks::{HitlMode, HitlRequest, HitlResponse};
use crate::compaction::compact_history;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::streaming::{stream_chat, TokenSink};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::messages::{Message, ToolCall};
use crate::provider::ChatRequest;
use crate::retry::ErrorHandling;
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Policy when the tool loop hits its iteration cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxToolIterationsPolicy {
    /// Return the last content prefixed with a warning line
    #[default]
    Warning,
    /// Fail with `TOOL_ITERATION_EXCEEDED`
    Error,
    /// Ask the human; approval grants one more provider call
    Hitl,
}

/// Data bag of an `agent` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Model identifier; falls back to the run's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// System prompt
    #[serde(default)]
    pub prompt: String,

    /// Registry ids of tools exposed to the model
    #[serde(default)]
    pub tools: Vec<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Generation token limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool-loop cap; falls back to the run option, then 10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<u32>,

    /// What to do at the cap
    #[serde(default)]
    pub on_max_tool_iterations: MaxToolIterationsPolicy,

    /// Require human approval before each tool execution round
    #[serde(default)]
    pub hitl: bool,

    /// Error-handling policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,
}

/// Executor for `agent` nodes.
///
/// Composes `[system] ++ compacted(history) ++ [user: input]`, streams the
/// provider call, and loops while the model requests tools: each requested
/// call is parsed, dispatched to the registry (or the run's fallback
/// handler), and its result appended as a `tool` message before the next
/// provider call. The loop is bounded by `maxToolIterations`, counted in
/// provider calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentExecutor;

impl AgentExecutor {
    fn data(node: &Node) -> Result<AgentData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid agent node data: {e}"),
            )
        })
    }

    /// Execute one round of requested tool calls, returning the result
    /// messages to append.
    async fn run_tool_calls(env: &ExecEnv<'_>, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let args = match call.parsed_arguments() {
                Ok(args) => args,
                Err(e) => {
                    results.push(Message::tool(
                        format!("Error: invalid tool arguments: {e}"),
                        &call.id,
                        &call.name,
                    ));
                    continue;
                }
            };

            let content = if let Some(tool) = env.ctx.tools.get(&call.name) {
                match (tool.handler)(args).await {
                    Ok(result) => result,
                    Err(message) => format!("Error: {message}"),
                }
            } else if let Some(fallback) = &env.run.options.on_tool_call {
                match fallback(call.name.clone(), args).await {
                    Ok(result) => result,
                    Err(message) => format!("Error: {message}"),
                }
            } else {
                format!("Error: tool '{}' not found", call.name)
            };

            debug!(tool = %call.name, "tool call completed");
            results.push(Message::tool(content, &call.id, &call.name));
        }
        results
    }

    /// Ask the human gate; `None` means no handler is installed.
    async fn request_approval(
        env: &ExecEnv<'_>,
        node: &Node,
        message: String,
    ) -> Option<HitlResponse> {
        let request = HitlRequest {
            node_id: node.id.clone(),
            mode: HitlMode::Approval,
            message,
        };
        env.run.callbacks.on_hitl_request(&request).await
    }
}

#[async_trait]
impl NodeExecutor for AgentExecutor {
    fn kind(&self) -> &'static str {
        kinds::AGENT
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Agent", "model": "", "prompt": ""})
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
        if data.model.as_deref().unwrap_or("").is_empty() {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::MissingModel,
                    format!("agent '{}' has no model", node.id),
                )
                .for_node(&node.id),
            );
        }
        if data.prompt.trim().is_empty() {
            issues.push(
                ValidationIssue::warning(
                    ErrorCode::EmptyPrompt,
                    format!("agent '{}' has an empty prompt", node.id),
                )
                .for_node(&node.id),
            );
        }
        issues
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;

        let model = data
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| env.run.options.default_model.clone())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::MissingModel,
                    format!("agent '{}' has no model and no default is set", node.id),
                )
            })?;

        let compacted = compact_history(
            &env.ctx.history,
            &model,
            &env.run.options.compaction,
            env.run.provider.as_ref(),
            &env.ctx.cancel,
        )
        .await?;
        env.ctx.history = compacted.clone();

        let user_input = env.ctx.input.text.clone();
        let mut messages = Vec::with_capacity(compacted.len() + 2);
        messages.push(Message::system(&data.prompt));
        messages.extend(compacted);
        messages.push(Message::user(&user_input));
        env.ctx.session.messages.push(Message::user(&user_input));

        let tool_definitions = env.ctx.tools.definitions_for(&data.tools);
        let max_iterations = data
            .max_tool_iterations
            .unwrap_or(env.run.options.max_tool_iterations)
            .max(1);

        let mut provider_calls: u32 = 0;
        let mut granted_extra: u32 = 0;
        let final_content = loop {
            let mut request = ChatRequest::new(&model, messages.clone())
                .with_tools(tool_definitions.clone());
            if let Some(temperature) = data.temperature {
                request = request.with_temperature(temperature);
            }
            if let Some(max_tokens) = data.max_tokens {
                request = request.with_max_tokens(max_tokens);
            }

            let outcome = stream_chat(
                env.run.provider.as_ref(),
                request,
                &env.ctx.cancel,
                TokenSink::Node {
                    callbacks: env.run.callbacks.as_ref(),
                    node_id: &node.id,
                },
            )
            .await?;
            provider_calls += 1;

            if outcome.tool_calls.is_empty() {
                break outcome.content;
            }

            if provider_calls >= max_iterations + granted_extra {
                match data.on_max_tool_iterations {
                    MaxToolIterationsPolicy::Error => {
                        return Err(EngineError::new(
                            ErrorCode::ToolIterationExceeded,
                            format!("tool loop exceeded {max_iterations} iterations"),
                        ));
                    }
                    MaxToolIterationsPolicy::Hitl => {
                        let answer = Self::request_approval(
                            env,
                            node,
                            format!(
                                "Agent '{}' reached {max_iterations} tool iterations. Continue?",
                                node.label()
                            ),
                        )
                        .await;
                        match answer {
                            Some(HitlResponse::Approve) | Some(HitlResponse::Submit(_)) => {
                                granted_extra += 1;
                            }
                            Some(_) => {
                                break format!(
                                    "Tool iteration stopped by user\n{}",
                                    outcome.content
                                );
                            }
                            None => {
                                warn!(node = %node.id, "tool iteration cap reached, no HITL handler");
                                break format!(
                                    "Warning: Maximum tool iterations ({max_iterations}) reached\n{}",
                                    outcome.content
                                );
                            }
                        }
                    }
                    MaxToolIterationsPolicy::Warning => {
                        warn!(node = %node.id, cap = max_iterations, "tool iteration cap reached");
                        break format!(
                            "Warning: Maximum tool iterations ({max_iterations}) reached\n{}",
                            outcome.content
                        );
                    }
                }
            }

            if data.hitl {
                let tools = outcome
                    .tool_calls
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                match Self::request_approval(
                    env,
                    node,
                    format!("Agent '{}' wants to run tools: {tools}", node.label()),
                )
                .await
                {
                    Some(HitlResponse::Reject) | Some(HitlResponse::Skip) => {
                        break if outcome.content.is_empty() {
                            "Tool execution rejected by user".to_string()
                        } else {
                            outcome.content
                        };
                    }
                    _ => {}
                }
            }

            messages.push(Message::assistant_tool_calls(
                outcome.content.clone(),
                outcome.tool_calls.clone(),
            ));
            let results = Self::run_tool_calls(env, &outcome.tool_calls).await;
            messages.extend(results);
        };

        env.ctx
            .session
            .messages
            .push(Message::assistant(&final_content));

        Ok(NodeOutcome::output(final_content))
    }
}
