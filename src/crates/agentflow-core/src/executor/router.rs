//! Router node - single-call classification onto one outgoing handle

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::streaming::{stream_chat, TokenSink};
use crate::executor::{ExecEnv, HandleSpec, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::messages::Message;
use crate::provider::ChatRequest;
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// One selectable route of a router node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Handle id edges attach to
    pub id: String,

    /// Label shown to the classifier
    pub label: String,
}

/// What to do when the classifier reply maps to no route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterFallback {
    /// Pick the first route
    #[default]
    First,
    /// Fail with `ROUTER_INVALID_ROUTE`
    Error,
}

/// Data bag of a `router` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Selectable routes, in presentation order
    pub routes: Vec<RouteSpec>,

    /// Extra instructions prepended to the classification prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Classifier model; falls back to the run's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Behavior when the reply maps to no route
    #[serde(default)]
    pub fallback_behavior: RouterFallback,
}

/// Executor for `router` nodes.
///
/// Makes one provider call asking for a route number, parses the first
/// integer out of the reply, and falls back to a case-insensitive label
/// substring match, then to `fallbackBehavior`. The selected handle travels
/// to the driver as the outcome's route hint; the upstream input passes
/// through to the selected branch unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterExecutor;

fn first_integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

impl RouterExecutor {
    fn data(node: &Node) -> Result<RouterData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid router node data: {e}"),
            )
        })
    }

    fn classification_prompt(data: &RouterData, input: &str) -> String {
        let options = data
            .routes
            .iter()
            .enumerate()
            .map(|(i, route)| format!("{}) {}", i + 1, route.label))
            .collect::<Vec<_>>()
            .join("  ");

        let mut prompt = String::new();
        if let Some(extra) = &data.prompt {
            prompt.push_str(extra);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "Given the input and these options: {options} reply with a single number.\n\nInput: {input}"
        ));
        prompt
    }

    /// Map a classifier reply to a route index, if possible.
    fn select_route(data: &RouterData, reply: &str) -> Option<usize> {
        if let Some(m) = first_integer_re().find(reply) {
            if let Ok(number) = m.as_str().parse::<usize>() {
                if (1..=data.routes.len()).contains(&number) {
                    return Some(number - 1);
                }
            }
        }

        // Substring fallback against the route labels
        let lower = reply.to_lowercase();
        data.routes
            .iter()
            .position(|route| lower.contains(&route.label.to_lowercase()))
    }
}

#[async_trait]
impl NodeExecutor for RouterExecutor {
    fn kind(&self) -> &'static str {
        kinds::ROUTER
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Router", "routes": []})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        match Self::data(node) {
            Ok(data) if data.routes.is_empty() => vec![ValidationIssue::error(
                ErrorCode::MissingRequiredPort,
                format!("router '{}' declares no routes", node.id),
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
                data.routes
                    .into_iter()
                    .map(|r| HandleSpec {
                        id: r.id,
                        label: r.label,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;
        if data.routes.is_empty() {
            return Err(EngineError::new(
                ErrorCode::MissingRequiredPort,
                format!("router '{}' declares no routes", node.id),
            ));
        }

        let model = data
            .model
            .clone()
            .or_else(|| env.run.options.default_model.clone())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::MissingModel,
                    format!("router '{}' has no model and no default is set", node.id),
                )
            })?;

        let input = env.ctx.input.text.clone();
        let request = ChatRequest::new(
            model,
            vec![Message::system(Self::classification_prompt(&data, &input))],
        );

        let reply = stream_chat(
            env.run.provider.as_ref(),
            request,
            &env.ctx.cancel,
            TokenSink::Node {
                callbacks: env.run.callbacks.as_ref(),
                node_id: &node.id,
            },
        )
        .await?
        .content;

        let (selected, fallback) = match Self::select_route(&data, &reply) {
            Some(index) => (index, false),
            None => match data.fallback_behavior {
                RouterFallback::First => {
                    warn!(
                        node = %node.id,
                        reply = %reply,
                        "classifier reply matched no route, falling back to first"
                    );
                    (0, true)
                }
                RouterFallback::Error => {
                    return Err(EngineError::new(
                        ErrorCode::RouterInvalidRoute,
                        format!("reply '{reply}' matched none of the declared routes"),
                    ));
                }
            },
        };

        let handle = data.routes[selected].id.clone();
        debug!(node = %node.id, handle = %handle, fallback, "route selected");
        env.run
            .callbacks
            .on_route_selected(&node.id, &handle, fallback)
            .await;

        Ok(NodeOutcome::output(reply)
            .with_route_hint(handle)
            .with_next_input(input))
    }
}
