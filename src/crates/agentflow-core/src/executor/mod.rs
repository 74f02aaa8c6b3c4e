//! Node executors - one per node kind
//!
//! The traversal driver dispatches every node to a [`NodeExecutor`] looked
//! up by the node's `type` string. Executors own their node kind end to end:
//! the schema of the `data` bag, preflight validation of a node instance,
//! the set of dynamic output handles (router routes, parallel branches), and
//! the execution itself.
//!
//! Executors receive an [`ExecEnv`]: a mutable borrow of the run's
//! [`ExecutionContext`] plus shared run services (workflow, graph index,
//! provider, callbacks, options, and the engine for nested traversals).
//! They return a [`NodeOutcome`] - the recorded output, an optional routing
//! hint consumed by the driver, an optional replacement for the downstream
//! input, and per-branch outputs for fan-out nodes.
//!
//! Unknown node types resolve to [`NoopExecutor`], which passes input
//! through at runtime and reports a validation error at preflight - an
//! unregistered extension must never crash the engine.

mod agent;
mod memory;
mod output;
mod parallel;
mod router;
mod start;
mod streaming;
mod subflow;
mod tool;
mod while_loop;

pub use agent::{AgentData, AgentExecutor, MaxToolIterationsPolicy};
pub use memory::{MemoryExecutor, MemoryNodeData, MemoryOperation};
pub use output::{OutputExecutor, OutputFormat, OutputNodeData};
pub use parallel::{BranchSpec, ParallelData, ParallelExecutor, BRANCH_TIMEOUT_MARKER};
pub use router::{RouteSpec, RouterData, RouterExecutor, RouterFallback};
pub use start::StartExecutor;
pub use subflow::{SubflowData, SubflowExecutor};
pub use tool::{ToolExecutor, ToolNodeData};
pub use while_loop::{
    LoopEvaluator, LoopState, MaxIterationsPolicy, WhileLoopData, WhileLoopExecutor,
};

use crate::callbacks::{ExecutionCallbacks, NodeResolver};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::graph::{Node, Workflow};
use crate::index::GraphIndex;
use crate::provider::ChatProvider;
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A dynamic output handle of a node (router route, parallel branch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSpec {
    /// Handle id as referenced by edges' `sourceHandle`
    pub id: String,

    /// Display label
    pub label: String,
}

/// Shared, immutable services of one run.
pub struct RunEnv<'a> {
    /// The workflow being executed
    pub workflow: &'a Workflow,

    /// Graph index over the workflow
    pub index: &'a GraphIndex<'a>,

    /// The engine, for nested traversals (loop bodies, subflows)
    pub engine: &'a crate::engine::Engine,

    /// Chat provider shared across the run
    pub provider: Arc<dyn ChatProvider>,

    /// Event sink shared across the run
    pub callbacks: Arc<dyn ExecutionCallbacks>,

    /// Node id -> (label, kind) resolution for event enrichment
    pub resolver: NodeResolver,

    /// Run options
    pub options: &'a crate::engine::ExecutionOptions,
}

/// Execution environment handed to a node executor.
pub struct ExecEnv<'a> {
    /// Mutable per-run state
    pub ctx: &'a mut ExecutionContext,

    /// Shared run services
    pub run: &'a RunEnv<'a>,
}

/// Successful result of a node execution.
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
    /// Output recorded under the node's id
    pub output: String,

    /// Outgoing handle selected by the executor (routers, loops)
    pub route_hint: Option<String>,

    /// Input for downstream nodes when it differs from `output`
    /// (routers pass the upstream input through)
    pub next_input: Option<String>,

    /// Per-branch outputs of a fan-out node
    pub branch_outputs: Option<HashMap<String, String>>,
}

impl NodeOutcome {
    /// An outcome carrying just an output.
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: text.into(),
            ..Default::default()
        }
    }

    /// Select an outgoing handle.
    pub fn with_route_hint(mut self, handle: impl Into<String>) -> Self {
        self.route_hint = Some(handle.into());
        self
    }

    /// Pass a different input downstream than the recorded output.
    pub fn with_next_input(mut self, input: impl Into<String>) -> Self {
        self.next_input = Some(input.into());
        self
    }

    /// Attach per-branch outputs.
    pub fn with_branch_outputs(mut self, outputs: HashMap<String, String>) -> Self {
        self.branch_outputs = Some(outputs);
        self
    }

    /// The text downstream nodes receive as input.
    pub fn downstream_input(&self) -> &str {
        self.next_input.as_deref().unwrap_or(&self.output)
    }
}

/// Executor for one node kind.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The node `type` string this executor handles.
    fn kind(&self) -> &'static str;

    /// Seed data for newly authored nodes of this kind. Unused by the
    /// engine at runtime; asserted for consistency in tests.
    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Preflight validation of a node instance.
    fn validate(&self, node: &Node, workflow: &Workflow) -> Vec<ValidationIssue> {
        let _ = (node, workflow);
        Vec::new()
    }

    /// Data-driven output handles (router routes, parallel branches).
    fn dynamic_handles(&self, node: &Node) -> Vec<HandleSpec> {
        let _ = node;
        Vec::new()
    }

    /// Execute the node.
    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome>;
}

/// Pass-through executor for unregistered node types.
///
/// Fails validation (the preflight reports the unknown type) but executes
/// as identity so a run with `preflight: false` degrades gracefully.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

#[async_trait]
impl NodeExecutor for NoopExecutor {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        vec![ValidationIssue::error(
            crate::error::ErrorCode::Validation,
            format!("unknown node type '{}'", node.kind),
        )
        .for_node(&node.id)]
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, _node: &Node) -> Result<NodeOutcome> {
        Ok(NodeOutcome::output(env.ctx.input.text.clone()))
    }
}

/// Registry mapping node `type` strings to executors.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
    noop: Arc<dyn NodeExecutor>,
}

impl ExecutorRegistry {
    /// An empty registry (extension kinds only).
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
            noop: Arc::new(NoopExecutor),
        }
    }

    /// Registry with every built-in executor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(StartExecutor));
        registry.register(Arc::new(AgentExecutor));
        registry.register(Arc::new(RouterExecutor));
        registry.register(Arc::new(ParallelExecutor));
        registry.register(Arc::new(WhileLoopExecutor));
        registry.register(Arc::new(ToolExecutor));
        registry.register(Arc::new(MemoryExecutor));
        registry.register(Arc::new(SubflowExecutor));
        registry.register(Arc::new(OutputExecutor));
        registry
    }

    /// Register an executor under its kind.
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.executors
            .insert(executor.kind().to_string(), executor);
    }

    /// Look up an executor, if registered.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(kind)
    }

    /// Look up an executor, falling back to the no-op pass-through.
    pub fn resolve(&self, kind: &str) -> &Arc<dyn NodeExecutor> {
        self.executors.get(kind).unwrap_or(&self.noop)
    }

    /// Registered kinds, for diagnostics.
    pub fn kinds(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
