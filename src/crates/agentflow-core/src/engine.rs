//! Traversal driver - the engine entry point
//!
//! [`Engine::execute`] runs a workflow against an input: preflight
//! validation, graph indexing, then a single-threaded traversal loop that
//! pops one node at a time from a LIFO frontier, dispatches it through the
//! retry wrapper, and enqueues its successors in declared edge order. The
//! driver never interleaves two node executions; all concurrency lives
//! inside executors (the parallel node's fan-out) and in the cooperative
//! suspension of provider streaming.
//!
//! Two caps bound every run: a per-node dispatch cap (`NODE_CAP_EXCEEDED`)
//! and a global step cap (`GLOBAL_CAP_EXCEEDED`). Cyclic graphs - router
//! back-edges and while-loops - are legal precisely because these caps are
//! the enforcement mechanism; the driver performs no cycle detection.
//!
//! `execute` never returns `Err`: failures are folded into the returned
//! [`ExecutionResult`] with a classified error, and events already emitted
//! are not retracted.

use crate::callbacks::{ExecutionCallbacks, NodeResolver};
use crate::compaction::CompactionConfig;
use crate::context::{CancelToken, ExecutionContext, ExecutionInput, SessionState};
use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::{ExecEnv, ExecutorRegistry, LoopEvaluator, NodeOutcome, RunEnv};
use crate::graph::{handles, kinds, Node, Workflow};
use crate::index::GraphIndex;
use crate::provider::ChatProvider;
use crate::retry::{execute_with_retry, ErrorHandling, ErrorMode};
use crate::tools::{FallbackToolHandler, ToolRegistry};
use crate::validate::{validate_workflow, ValidationReport};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine-level options for a run.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Global step cap (default 1000)
    pub max_iterations: u64,

    /// Per-node dispatch cap (default 100)
    pub max_node_executions: u32,

    /// Default tool-loop cap for agent nodes (default 10)
    pub max_tool_iterations: u32,

    /// Model used when a node declares none
    pub default_model: Option<String>,

    /// Run preflight validation before dispatch (default true)
    pub preflight: bool,

    /// Memory adapter for `memory` nodes
    pub memory: Option<Arc<dyn agentflow_memory::MemoryAdapter>>,

    /// Tools available to the run
    pub tools: ToolRegistry,

    /// Fallback handler for agent tool calls naming unregistered tools
    pub on_tool_call: Option<FallbackToolHandler>,

    /// Host-injected while-loop evaluators by name
    pub custom_evaluators: HashMap<String, LoopEvaluator>,

    /// History compaction configuration
    pub compaction: CompactionConfig,

    /// Workflows invocable from `subflow` nodes
    pub subflows: HashMap<String, Arc<Workflow>>,

    /// Cancellation latch observed by every suspension point
    pub cancel: CancelToken,
}

impl ExecutionOptions {
    /// Options with the documented defaults.
    pub fn new() -> Self {
        Self {
            max_iterations: 1_000,
            max_node_executions: 100,
            max_tool_iterations: 10,
            default_model: None,
            preflight: true,
            memory: None,
            tools: ToolRegistry::new(),
            on_tool_call: None,
            custom_evaluators: HashMap::new(),
            compaction: CompactionConfig::default(),
            subflows: HashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Set the global step cap.
    pub fn with_max_iterations(mut self, cap: u64) -> Self {
        self.max_iterations = cap;
        self
    }

    /// Set the per-node dispatch cap.
    pub fn with_max_node_executions(mut self, cap: u32) -> Self {
        self.max_node_executions = cap;
        self
    }

    /// Set the default agent tool-loop cap.
    pub fn with_max_tool_iterations(mut self, cap: u32) -> Self {
        self.max_tool_iterations = cap;
        self
    }

    /// Set the fallback model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Enable or disable preflight validation.
    pub fn with_preflight(mut self, preflight: bool) -> Self {
        self.preflight = preflight;
        self
    }

    /// Attach a memory adapter.
    pub fn with_memory(mut self, memory: Arc<dyn agentflow_memory::MemoryAdapter>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach a tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Attach the fallback tool handler.
    pub fn with_on_tool_call(mut self, handler: FallbackToolHandler) -> Self {
        self.on_tool_call = Some(handler);
        self
    }

    /// Register a named while-loop evaluator.
    pub fn with_evaluator(mut self, name: impl Into<String>, evaluator: LoopEvaluator) -> Self {
        self.custom_evaluators.insert(name.into(), evaluator);
        self
    }

    /// Set the compaction configuration.
    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }

    /// Register a workflow invocable from `subflow` nodes.
    pub fn with_subflow(mut self, id: impl Into<String>, workflow: Arc<Workflow>) -> Self {
        self.subflows.insert(id.into(), workflow);
        self
    }

    /// Use an externally held cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a run. `execute` resolves with this; it never throws.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the run completed
    pub success: bool,

    /// Final output (the last terminal node's output)
    pub output: Option<String>,

    /// Failure details when `success` is false
    pub error: Option<EngineError>,

    /// Latest output per node id
    pub outputs: HashMap<String, String>,

    /// Node ids in visit order
    pub node_chain: Vec<String>,
}

impl ExecutionResult {
    fn completed(output: String, ctx: ExecutionContext) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            outputs: ctx.outputs,
            node_chain: ctx.node_chain,
        }
    }

    fn failed(error: EngineError, ctx: ExecutionContext) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            outputs: ctx.outputs,
            node_chain: ctx.node_chain,
        }
    }

    fn rejected(error: EngineError) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            outputs: HashMap::new(),
            node_chain: Vec::new(),
        }
    }
}

/// The workflow execution engine.
///
/// Holds the provider, the executor registry, and the run options. One
/// engine can execute any number of workflows; per-run state lives in the
/// [`ExecutionContext`] created inside `execute`.
pub struct Engine {
    provider: Arc<dyn ChatProvider>,
    registry: Arc<ExecutorRegistry>,
    options: ExecutionOptions,
}

impl Engine {
    /// Create an engine with default options and the built-in executors.
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            registry: Arc::new(ExecutorRegistry::with_defaults()),
            options: ExecutionOptions::new(),
        }
    }

    /// Replace the executor registry (extension node kinds).
    pub fn with_registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the run options.
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// The engine's cancellation token; cancel it to stop in-flight runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.options.cancel.clone()
    }

    /// Run preflight validation without executing.
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        validate_workflow(workflow, &self.registry)
    }

    /// Execute a workflow.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        input: ExecutionInput,
        callbacks: Arc<dyn ExecutionCallbacks>,
    ) -> ExecutionResult {
        let (result, _session) = self
            .run_workflow(workflow, input, callbacks, None, self.options.cancel.clone())
            .await;
        result
    }

    /// Execute a registered child workflow (subflow recursion).
    pub(crate) async fn execute_nested(
        &self,
        workflow: Arc<Workflow>,
        input: ExecutionInput,
        callbacks: Arc<dyn ExecutionCallbacks>,
        session: Option<SessionState>,
        cancel: CancelToken,
    ) -> (ExecutionResult, SessionState) {
        self.run_workflow(&workflow, input, callbacks, session, cancel)
            .await
    }

    async fn run_workflow(
        &self,
        workflow: &Workflow,
        input: ExecutionInput,
        callbacks: Arc<dyn ExecutionCallbacks>,
        session: Option<SessionState>,
        cancel: CancelToken,
    ) -> (ExecutionResult, SessionState) {
        if self.options.preflight {
            let report = self.validate(workflow);
            for warning in report.warnings() {
                warn!(code = %warning.code, "{}", warning.message);
            }
            if !report.is_valid() {
                let first = report.errors().next().expect("invalid report has an error");
                let mut error = EngineError::new(first.code, first.message.clone());
                if let Some(node_id) = &first.node_id {
                    error = error.with_node(node_id);
                }
                return (ExecutionResult::rejected(error), SessionState::new());
            }
        }

        let Some(start) = workflow.start_nodes().first().map(|n| n.id.clone()) else {
            return (
                ExecutionResult::rejected(EngineError::new(
                    ErrorCode::NoStartNode,
                    "workflow has no start node",
                )),
                SessionState::new(),
            );
        };

        let mut ctx = ExecutionContext::new(
            input,
            Arc::new(self.options.tools.clone()),
            cancel,
        );
        if let Some(session) = session {
            ctx.session = session;
        }

        info!(
            workflow = %workflow.meta.name,
            session = %ctx.session.id,
            "run started"
        );

        let index = GraphIndex::build(workflow);
        let run = RunEnv {
            workflow,
            index: &index,
            engine: self,
            provider: self.provider.clone(),
            callbacks,
            resolver: NodeResolver::from_workflow(workflow),
            options: &self.options,
        };

        let seed_input = ctx.input.text.clone();
        let outcome = self
            .traverse(&run, &mut ctx, vec![(start, seed_input)], None)
            .await;

        let session = ctx.session.clone();
        let result = match outcome {
            Ok(terminal) => {
                let output = terminal.unwrap_or_default();
                info!(session = %session.id, "run completed");
                ExecutionResult::completed(output, ctx)
            }
            Err(error) => {
                warn!(session = %session.id, code = %error.code, "run failed");
                ExecutionResult::failed(error, ctx)
            }
        };
        (result, session)
    }

    /// Drive the traversal loop over a seeded frontier.
    ///
    /// The frontier is LIFO and successors are pushed in reverse declared
    /// order, which yields depth-first visits in declared edge order. Each
    /// frontier entry carries the input snapshot assigned when it was
    /// enqueued, so siblings of a fan-out all see their common predecessor's
    /// output. `skip_target` marks a loop node whose back-edge must not be
    /// re-entered (nested body traversals).
    ///
    /// Returns the output of the last terminal node visited.
    async fn traverse(
        &self,
        run: &RunEnv<'_>,
        ctx: &mut ExecutionContext,
        seed: Vec<(String, String)>,
        skip_target: Option<&str>,
    ) -> Result<Option<String>> {
        let mut frontier: Vec<(String, String)> = seed.into_iter().rev().collect();
        let mut terminal_output: Option<String> = None;

        while let Some((node_id, node_input)) = frontier.pop() {
            if ctx.cancel.is_cancelled() {
                return Err(EngineError::cancelled());
            }

            let Some(node) = run.index.node(&node_id) else {
                // Preflight rejects dangling edges; without preflight a
                // missing target just ends this path.
                continue;
            };

            let count = ctx.exec_count.entry(node_id.clone()).or_insert(0);
            *count += 1;
            if *count > self.options.max_node_executions {
                return Err(EngineError::new(
                    ErrorCode::NodeCapExceeded,
                    format!(
                        "node '{node_id}' dispatched more than {} times",
                        self.options.max_node_executions
                    ),
                )
                .with_node(&node_id));
            }

            ctx.steps += 1;
            if ctx.steps > self.options.max_iterations {
                return Err(EngineError::new(
                    ErrorCode::GlobalCapExceeded,
                    format!("run exceeded {} steps", self.options.max_iterations),
                ));
            }

            ctx.node_chain.push(node_id.clone());
            ctx.input.text = node_input;

            let info = run.resolver.resolve(&node_id);
            debug!(node = %node_id, kind = %node.kind, step = ctx.steps, "dispatching");
            run.callbacks.on_node_start(&info).await;

            let executor = self.registry.resolve(&node.kind);
            let cancel = ctx.cancel.clone();
            let mut env = ExecEnv {
                ctx: &mut *ctx,
                run,
            };
            let result = execute_with_retry(executor.as_ref(), &mut env, node, &cancel).await;
            drop(env);

            match result {
                Ok(outcome) => {
                    ctx.record_output(&node_id, &node.kind, &outcome.output);
                    run.callbacks.on_node_finish(&info, &outcome.output).await;

                    let pushed = self.push_successors(
                        run,
                        &mut frontier,
                        node,
                        &outcome,
                        skip_target,
                    );
                    if pushed == 0 {
                        terminal_output = Some(outcome.output);
                    }
                }
                Err(error) => {
                    if error.code == ErrorCode::Cancelled {
                        return Err(error);
                    }
                    run.callbacks.on_node_error(&info, &error).await;

                    match ErrorHandling::from_node(node).mode {
                        ErrorMode::Stop => return Err(error),
                        ErrorMode::Continue => {
                            warn!(node = %node_id, code = %error.code, "continuing past error");
                            ctx.record_output(&node_id, &node.kind, "");
                            let outcome = NodeOutcome::output("");
                            let pushed = self.push_successors(
                                run,
                                &mut frontier,
                                node,
                                &outcome,
                                skip_target,
                            );
                            if pushed == 0 {
                                terminal_output = Some(String::new());
                            }
                        }
                        ErrorMode::Branch => {
                            let error_edges = run
                                .index
                                .outgoing_on_handle(&node_id, Some(handles::ERROR));
                            if error_edges.is_empty() {
                                return Err(error);
                            }
                            warn!(node = %node_id, code = %error.code, "routing to error handle");
                            for edge in error_edges.iter().rev() {
                                if skip_target != Some(edge.target.as_str()) {
                                    frontier
                                        .push((edge.target.clone(), error.message.clone()));
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(terminal_output)
    }

    /// Push a node's successors, returning how many were enqueued.
    fn push_successors(
        &self,
        run: &RunEnv<'_>,
        frontier: &mut Vec<(String, String)>,
        node: &Node,
        outcome: &NodeOutcome,
        skip_target: Option<&str>,
    ) -> usize {
        let edges = match outcome.route_hint.as_deref() {
            Some(handle) => run.index.outgoing_on_handle(&node.id, Some(handle)),
            None if node.kind == kinds::PARALLEL => run.index.outgoing(&node.id).to_vec(),
            None => run.index.outgoing_on_handle(&node.id, None),
        };

        let next_input = outcome.downstream_input();
        let mut pushed = 0;
        for edge in edges.iter().rev() {
            if skip_target == Some(edge.target.as_str()) {
                continue; // the loop's natural back-edge
            }
            frontier.push((edge.target.clone(), next_input.to_string()));
            pushed += 1;
        }
        pushed
    }

    /// Drive the body subgraph of a while-loop for one iteration.
    ///
    /// Seeds the traversal with the loop node's `body` successors and
    /// refuses to re-enter the loop node itself; the body's terminal output
    /// becomes the next iteration's input (or the input passes through when
    /// the body produces no terminal).
    pub(crate) async fn run_subgraph(
        &self,
        run: &RunEnv<'_>,
        ctx: &mut ExecutionContext,
        loop_node_id: &str,
        input: String,
    ) -> Result<String> {
        let seed: Vec<(String, String)> = run
            .index
            .outgoing_on_handle(loop_node_id, Some(handles::BODY))
            .iter()
            .map(|edge| (edge.target.clone(), input.clone()))
            .collect();

        if seed.is_empty() {
            return Err(EngineError::new(
                ErrorCode::MissingRequiredPort,
                format!("whileLoop '{loop_node_id}' has no body edge"),
            )
            .with_node(loop_node_id));
        }

        let terminal = self
            .traverse(run, ctx, seed, Some(loop_node_id))
            .await?;
        Ok(terminal.unwrap_or(input))
    }
}
