//! # agentflow-core - Agentic Workflow Execution Engine
//!
//! **Execute user-authored workflow graphs whose nodes are language-model
//! calls, routing decisions, parallel fan-outs, loops, tool invocations,
//! memory operations, sub-workflow invocations, and terminal outputs.**
//!
//! Given a [`Workflow`](graph::Workflow) and an input, the
//! [`Engine`](engine::Engine) traverses the graph, invokes an external
//! chat-completion provider for reasoning nodes, streams produced tokens to
//! subscribers, and returns a final aggregated output.
//!
//! ## Overview
//!
//! - **Deterministic traversal** - a single-threaded driver visits nodes in
//!   declared edge order; given a deterministic provider, two runs of the
//!   same graph produce identical outputs and node chains.
//! - **Streaming-first** - every provider call streams; token and reasoning
//!   deltas reach subscribers in provider order through a typed callback
//!   sink.
//! - **Bounded cycles** - router back-edges and while-loops are legal; a
//!   per-node dispatch cap and a global step cap are the only enforcement
//!   mechanism.
//! - **Confined concurrency** - parallelism lives inside the parallel
//!   executor's fan-out; the driver itself never interleaves two nodes.
//! - **Cooperative cancellation** - one latch, observed at every suspension
//!   point: provider chunks, tool calls, retry backoff, branch barriers.
//! - **Provider-agnostic** - the engine consumes a
//!   [`ChatProvider`](provider::ChatProvider) trait and stays out of wire
//!   formats; memory backends hide behind `agentflow-memory`'s
//!   `MemoryAdapter`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow_core::{Engine, ExecutionInput, NullCallbacks, Workflow};
//! use agentflow_core::graph::{Edge, Node};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let workflow = Workflow::new("greeter")
//!         .with_node(Node::new("start-1", "start", json!({"label": "Start"})))
//!         .with_node(Node::new("agent-1", "agent", json!({
//!             "label": "Greeter",
//!             "model": "gpt-4o-mini",
//!             "prompt": "You are helpful.",
//!         })))
//!         .with_edge(Edge::new("e1", "start-1", "agent-1"));
//!
//!     let engine = Engine::new(Arc::new(MyProvider::new()));
//!     let result = engine
//!         .execute(&workflow, ExecutionInput::text("Hello!"), Arc::new(NullCallbacks))
//!         .await;
//!
//!     println!("{}", result.output.unwrap_or_default());
//! }
//! ```
//!
//! ## Module Organization
//!
//! ### Core APIs (Start Here)
//! - [`engine`] - [`Engine`](engine::Engine), options, results, the
//!   traversal driver
//! - [`graph`] - workflow, node, and edge types
//! - [`loader`] - JSON loading with schema-version upgrade
//! - [`callbacks`] - the event sink and HITL vocabulary
//!
//! ### Execution
//! - [`executor`] - one executor per node kind, plus the registry
//! - [`retry`] - per-node retry policy and the error-handling wrapper
//! - [`context`] - per-run mutable state and cancellation
//! - [`compaction`] - conversation-window management
//!
//! ### Integration Seams
//! - [`provider`] - the chat-completion trait and stream chunk types
//! - [`tools`] - tool registry and host handlers
//! - [`messages`] - chat message types
//! - [`models`] - model context-window catalog
//!
//! ### Validation
//! - [`validate`] - preflight structural checks
//! - [`index`] - O(1) graph lookups
//! - [`error`] - the error taxonomy

pub mod callbacks;
pub mod compaction;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod index;
pub mod loader;
pub mod messages;
pub mod models;
pub mod provider;
pub mod retry;
pub mod tools;
pub mod validate;

// Re-export main types
pub use callbacks::{
    CallbackFanout, ExecutionCallbacks, HitlMode, HitlRequest, HitlResponse, NodeInfo,
    NodeResolver, NullCallbacks,
};
pub use compaction::{CompactionConfig, CompactionStrategy};
pub use context::{Attachment, CancelToken, ExecutionContext, ExecutionInput, SessionState};
pub use engine::{Engine, ExecutionOptions, ExecutionResult};
pub use error::{EngineError, ErrorCode, Result, RetryAttempt, RetryReport};
pub use executor::{
    ExecutorRegistry, HandleSpec, LoopEvaluator, LoopState, NodeExecutor, NodeOutcome,
};
pub use graph::{Edge, Node, Workflow, WorkflowMeta};
pub use index::GraphIndex;
pub use messages::{Message, MessageRole, ToolCall};
pub use provider::{ChatOptions, ChatProvider, ChatRequest, ChunkStream, StreamChunk};
pub use retry::{ErrorHandling, ErrorMode, RetryConfig};
pub use tools::{tool_handler, FallbackToolHandler, ToolDefinition, ToolHandler, ToolRegistry};
pub use validate::{validate_workflow, Severity, ValidationIssue, ValidationReport};
