//! While-loop node - bounded iteration over a body subgraph

use crate::context::ExecutionContext;
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::streaming::{stream_chat, TokenSink};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{handles, kinds, Node, Workflow};
use crate::messages::Message;
use crate::provider::ChatRequest;
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Loop progress handed to custom evaluators.
#[derive(Debug, Clone, Copy)]
pub struct LoopState {
    /// Completed body iterations
    pub iteration: u32,
}

/// Host-injected condition evaluator: truthy means run another iteration.
///
/// Evaluators observe the context as it was at iteration entry; the engine
/// evaluates the condition before driving the body, so state written by the
/// current iteration's body is never visible to the decision that started it.
pub type LoopEvaluator = Arc<dyn Fn(&ExecutionContext, &LoopState) -> bool + Send + Sync>;

/// Policy when the loop reaches `maxIterations`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxIterationsPolicy {
    /// Exit through `done` with a warning log
    #[default]
    Warning,
    /// Exit through `done` silently
    Continue,
    /// Fail the node
    Error,
}

/// Data bag of a `whileLoop` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhileLoopData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Prompt for the provider-evaluated continue/done decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_prompt: Option<String>,

    /// Iteration cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Behavior at the cap
    #[serde(default)]
    pub on_max_iterations: MaxIterationsPolicy,

    /// Model for the condition call; falls back to the run default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_model: Option<String>,

    /// Name of a host-injected evaluator, replacing the provider call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_evaluator: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

/// Executor for `whileLoop` nodes.
///
/// Each iteration evaluates the condition against the input as it stood at
/// iteration entry, then drives the subgraph behind the `body` handle as a
/// nested bounded traversal. The body's terminal output becomes the next
/// iteration's input. Exit goes through the `done` handle carrying the
/// current input; the loop runs at least once when the initial condition
/// holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhileLoopExecutor;

fn done_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bdone\b").expect("valid regex"))
}

impl WhileLoopExecutor {
    fn data(node: &Node) -> Result<WhileLoopData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid whileLoop node data: {e}"),
            )
        })
    }

    /// Decide whether to run another iteration.
    async fn should_continue(
        env: &ExecEnv<'_>,
        node: &Node,
        data: &WhileLoopData,
        input: &str,
        iteration: u32,
    ) -> Result<bool> {
        if let Some(name) = &data.custom_evaluator {
            let Some(evaluator) = env.run.options.custom_evaluators.get(name) else {
                return Err(EngineError::new(
                    ErrorCode::MissingConditionPrompt,
                    format!("custom evaluator '{name}' is not registered"),
                ));
            };
            return Ok(evaluator(&*env.ctx, &LoopState { iteration }));
        }

        let Some(prompt) = &data.condition_prompt else {
            return Err(EngineError::new(
                ErrorCode::MissingConditionPrompt,
                format!("whileLoop '{}' has neither a condition prompt nor an evaluator", node.id),
            ));
        };

        let model = data
            .condition_model
            .clone()
            .or_else(|| env.run.options.default_model.clone())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::MissingModel,
                    format!("whileLoop '{}' has no condition model", node.id),
                )
            })?;

        let request = ChatRequest::new(
            model,
            vec![
                Message::system(prompt),
                Message::user(format!(
                    "Input: {input}\nIteration: {iteration}\n\nReply with \"done\" to exit \
                     the loop, or \"continue\" to run another iteration."
                )),
            ],
        );

        let reply = stream_chat(
            env.run.provider.as_ref(),
            request,
            &env.ctx.cancel,
            TokenSink::Silent,
        )
        .await?
        .content;

        Ok(!done_word_re().is_match(&reply))
    }
}

#[async_trait]
impl NodeExecutor for WhileLoopExecutor {
    fn kind(&self) -> &'static str {
        kinds::WHILE_LOOP
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({
            "label": "While",
            "conditionPrompt": "",
            "maxIterations": 10,
            "onMaxIterations": "warning",
        })
    }

    fn validate(&self, node: &Node, workflow: &Workflow) -> Vec<ValidationIssue> {
        let data = match Self::data(node) {
            Ok(data) => data,
            Err(e) => {
                return vec![
                    ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
                ]
            }
        };

        let mut issues = Vec::new();
        let no_prompt = data
            .condition_prompt
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty();
        if no_prompt && data.custom_evaluator.is_none() {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::MissingConditionPrompt,
                    format!("whileLoop '{}' has no condition", node.id),
                )
                .for_node(&node.id),
            );
        }
        if data.max_iterations == 0 {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::InvalidMaxIterations,
                    format!("whileLoop '{}' has maxIterations = 0", node.id),
                )
                .for_node(&node.id),
            );
        }
        let has_body = workflow
            .edges
            .iter()
            .any(|e| e.source == node.id && e.source_handle.as_deref() == Some(handles::BODY));
        if !has_body {
            issues.push(
                ValidationIssue::error(
                    ErrorCode::MissingRequiredPort,
                    format!("whileLoop '{}' has no body edge", node.id),
                )
                .for_node(&node.id),
            );
        }
        issues
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;
        let mut input = env.ctx.input.text.clone();
        let mut iteration: u32 = 0;

        loop {
            if env.ctx.cancel.is_cancelled() {
                return Err(EngineError::cancelled());
            }

            // The condition sees the input as it was at iteration entry
            if !Self::should_continue(env, node, &data, &input, iteration).await? {
                debug!(node = %node.id, iteration, "loop condition signalled done");
                break;
            }

            if iteration >= data.max_iterations {
                match data.on_max_iterations {
                    MaxIterationsPolicy::Error => {
                        return Err(EngineError::new(
                            ErrorCode::NodeCapExceeded,
                            format!(
                                "whileLoop '{}' exceeded {} iterations",
                                node.id, data.max_iterations
                            ),
                        ));
                    }
                    MaxIterationsPolicy::Warning => {
                        warn!(
                            node = %node.id,
                            cap = data.max_iterations,
                            "loop iteration cap reached, exiting through done"
                        );
                        break;
                    }
                    MaxIterationsPolicy::Continue => break,
                }
            }

            let run = env.run;
            input = run
                .engine
                .run_subgraph(run, &mut *env.ctx, &node.id, input)
                .await?;
            iteration += 1;
        }

        Ok(NodeOutcome::output(input).with_route_hint(handles::DONE))
    }
}
