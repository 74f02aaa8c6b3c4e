//! Typed event sink for execution progress
//!
//! Subscribers observe a run through the [`ExecutionCallbacks`] trait: node
//! lifecycle, streamed tokens and reasoning deltas, router decisions,
//! parallel-branch progress, and human-in-the-loop requests. Every method
//! has a no-op default so implementations override only what they render.
//!
//! # Ordering contract
//!
//! - For a given node, `on_token` / `on_reasoning` arrive in provider-stream
//!   order, strictly between that node's `on_node_start` and
//!   `on_node_finish` / `on_node_error`.
//! - For a given `(parallel node, branch)` pair, `on_branch_start` precedes
//!   all `on_branch_token` which precede `on_branch_complete`. No ordering
//!   is guaranteed *across* branches.
//! - A single invocation is never interleaved with itself: parallel branches
//!   call the sink from concurrent tasks, but each call is one atomic
//!   dispatch. Implementations shared across branches must be `Send + Sync`.
//!
//! # Label resolution
//!
//! Executors emit raw node ids on hot paths (tokens, branches). Consumers
//! that want display labels wrap their sink with [`NodeResolver`] built from
//! the workflow, which maps an id to `(id, label, type)` - unknown nodes
//! resolve to `(id, id, "unknown")` and non-string labels fall back to the
//! node id.

use crate::error::EngineError;
use crate::graph::Workflow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity of a node as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node id
    pub id: String,

    /// Display label (defaults to the id)
    pub label: String,

    /// Node kind string
    pub kind: String,
}

impl NodeInfo {
    /// Info for a node the workflow does not contain.
    pub fn unknown(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            kind: "unknown".to_string(),
            id,
        }
    }
}

/// What a human-in-the-loop gate is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitlMode {
    /// Approve or reject continuing
    Approval,
    /// Provide free-form input
    Input,
    /// Review and optionally modify a value
    Review,
}

/// A pause point handed to the host.
#[derive(Debug, Clone)]
pub struct HitlRequest {
    /// Node requesting the pause
    pub node_id: String,

    /// What kind of answer is expected
    pub mode: HitlMode,

    /// Message shown to the human
    pub message: String,
}

/// The host's answer to a [`HitlRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitlResponse {
    /// Continue
    Approve,
    /// Stop the gated activity
    Reject,
    /// Continue with the provided input
    Submit(String),
    /// Continue with a modified value
    Modify(String),
    /// Skip the gated activity entirely
    Skip,
}

/// Subscriber interface for execution events.
///
/// All methods default to no-ops. `on_hitl_request` returning `None` means
/// no human is attached; callers fall back to their non-interactive policy.
#[async_trait]
pub trait ExecutionCallbacks: Send + Sync {
    /// A node is about to execute.
    async fn on_node_start(&self, node: &NodeInfo) {
        let _ = node;
    }

    /// A node finished successfully with the given output.
    async fn on_node_finish(&self, node: &NodeInfo, output: &str) {
        let _ = (node, output);
    }

    /// A node failed (after retries were exhausted).
    async fn on_node_error(&self, node: &NodeInfo, error: &EngineError) {
        let _ = (node, error);
    }

    /// A content token was streamed for a node.
    async fn on_token(&self, node_id: &str, token: &str) {
        let _ = (node_id, token);
    }

    /// A reasoning token was streamed for a node.
    async fn on_reasoning(&self, node_id: &str, token: &str) {
        let _ = (node_id, token);
    }

    /// A router selected an outgoing handle.
    async fn on_route_selected(&self, node_id: &str, handle: &str, fallback: bool) {
        let _ = (node_id, handle, fallback);
    }

    /// A parallel branch started.
    async fn on_branch_start(&self, node_id: &str, branch_id: &str, label: &str) {
        let _ = (node_id, branch_id, label);
    }

    /// A parallel branch streamed a token.
    async fn on_branch_token(&self, node_id: &str, branch_id: &str, token: &str) {
        let _ = (node_id, branch_id, token);
    }

    /// A parallel branch completed (successfully, with an error string, or
    /// with the timeout sentinel).
    async fn on_branch_complete(&self, node_id: &str, branch_id: &str, label: &str, output: &str) {
        let _ = (node_id, branch_id, label, output);
    }

    /// A human-in-the-loop gate was reached. `None` means unhandled.
    async fn on_hitl_request(&self, request: &HitlRequest) -> Option<HitlResponse> {
        let _ = request;
        None
    }
}

/// A sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCallbacks;

#[async_trait]
impl ExecutionCallbacks for NullCallbacks {}

/// Multiplexer delivering every event to several sinks in registration
/// order. The first sink to answer a HITL request wins.
#[derive(Default)]
pub struct CallbackFanout {
    sinks: Vec<Arc<dyn ExecutionCallbacks>>,
}

impl CallbackFanout {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style).
    pub fn with_sink(mut self, sink: Arc<dyn ExecutionCallbacks>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl ExecutionCallbacks for CallbackFanout {
    async fn on_node_start(&self, node: &NodeInfo) {
        for sink in &self.sinks {
            sink.on_node_start(node).await;
        }
    }

    async fn on_node_finish(&self, node: &NodeInfo, output: &str) {
        for sink in &self.sinks {
            sink.on_node_finish(node, output).await;
        }
    }

    async fn on_node_error(&self, node: &NodeInfo, error: &EngineError) {
        for sink in &self.sinks {
            sink.on_node_error(node, error).await;
        }
    }

    async fn on_token(&self, node_id: &str, token: &str) {
        for sink in &self.sinks {
            sink.on_token(node_id, token).await;
        }
    }

    async fn on_reasoning(&self, node_id: &str, token: &str) {
        for sink in &self.sinks {
            sink.on_reasoning(node_id, token).await;
        }
    }

    async fn on_route_selected(&self, node_id: &str, handle: &str, fallback: bool) {
        for sink in &self.sinks {
            sink.on_route_selected(node_id, handle, fallback).await;
        }
    }

    async fn on_branch_start(&self, node_id: &str, branch_id: &str, label: &str) {
        for sink in &self.sinks {
            sink.on_branch_start(node_id, branch_id, label).await;
        }
    }

    async fn on_branch_token(&self, node_id: &str, branch_id: &str, token: &str) {
        for sink in &self.sinks {
            sink.on_branch_token(node_id, branch_id, token).await;
        }
    }

    async fn on_branch_complete(&self, node_id: &str, branch_id: &str, label: &str, output: &str) {
        for sink in &self.sinks {
            sink.on_branch_complete(node_id, branch_id, label, output)
                .await;
        }
    }

    async fn on_hitl_request(&self, request: &HitlRequest) -> Option<HitlResponse> {
        for sink in &self.sinks {
            if let Some(response) = sink.on_hitl_request(request).await {
                return Some(response);
            }
        }
        None
    }
}

/// Resolves node ids to [`NodeInfo`] from a workflow snapshot.
///
/// Built once per run; pure and side-effect-free. Used by the driver to
/// enrich lifecycle events and available to subscribers that need labels
/// for token-level events.
#[derive(Debug, Clone, Default)]
pub struct NodeResolver {
    nodes: HashMap<String, (String, String)>,
}

impl NodeResolver {
    /// Build a resolver from a workflow's node list.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut nodes = HashMap::with_capacity(workflow.nodes.len());
        for node in &workflow.nodes {
            // Node::label already falls back to the id for non-string labels
            nodes.insert(
                node.id.clone(),
                (node.label().to_string(), node.kind.clone()),
            );
        }
        Self { nodes }
    }

    /// Resolve an id, yielding `(id, id, "unknown")` for nodes the workflow
    /// does not contain.
    pub fn resolve(&self, node_id: &str) -> NodeInfo {
        match self.nodes.get(node_id) {
            Some((label, kind)) => NodeInfo {
                id: node_id.to_string(),
                label: label.clone(),
                kind: kind.clone(),
            },
            None => NodeInfo::unknown(node_id),
        }
    }
}
