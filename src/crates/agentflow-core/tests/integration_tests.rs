//! Integration tests for complete workflow runs
//!
//! These drive the engine end to end against a scripted provider and verify
//! outputs, callback sequences, and failure behavior in realistic graphs.

mod common;

use agentflow_core::graph::{Edge, Node, Workflow};
use agentflow_core::tools::{tool_handler, ToolDefinition, ToolRegistry};
use agentflow_core::{
    Engine, ErrorCode, ExecutionInput, ExecutionOptions, ExecutionResult, NullCallbacks,
};
use common::{Recorder, Script, ScriptedProvider};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn start_node(id: &str) -> Node {
    Node::new(id, "start", json!({"label": "Start"}))
}

fn agent_node(id: &str, prompt: &str) -> Node {
    Node::new(id, "agent", json!({"label": id, "model": "m", "prompt": prompt}))
}

async fn run(
    workflow: &Workflow,
    provider: ScriptedProvider,
    options: ExecutionOptions,
    callbacks: Arc<Recorder>,
    input: &str,
) -> ExecutionResult {
    Engine::new(Arc::new(provider))
        .with_options(options)
        .execute(workflow, ExecutionInput::text(input), callbacks)
        .await
}

// --- Scenario: start -> agent happy path ---------------------------------

#[tokio::test]
async fn test_start_agent_happy_path() {
    let workflow = Workflow::new("happy")
        .with_node(start_node("start-1"))
        .with_node(agent_node("agent-1", "You are helpful."))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new().push(Script::content(&["Hello", " back!"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "Hello, world!",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("Hello back!"));
    assert_eq!(result.node_chain, vec!["start-1", "agent-1"]);

    let events = recorder.filtered(&["start:", "finish:", "token:"]);
    assert_eq!(
        events,
        vec![
            "start:start-1",
            "finish:start-1:Hello, world!",
            "start:agent-1",
            "token:agent-1:Hello",
            "token:agent-1: back!",
            "finish:agent-1:Hello back!",
        ]
    );
}

#[tokio::test]
async fn test_token_concatenation_matches_recorded_output() {
    let workflow = Workflow::new("tokens")
        .with_node(start_node("start-1"))
        .with_node(agent_node("agent-1", "p"))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new().push(Script::content(&["a", "b", "c", "d"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "x",
    )
    .await;

    assert!(result.success);
    assert_eq!(recorder.tokens_for("agent-1"), result.outputs["agent-1"]);
}

// --- Scenario: router classification -------------------------------------

fn router_workflow() -> Workflow {
    Workflow::new("routed")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "router-1",
            "router",
            json!({
                "label": "Router",
                "model": "m",
                "routes": [
                    {"id": "route-a", "label": "Technical"},
                    {"id": "route-b", "label": "General"},
                ],
            }),
        ))
        .with_node(agent_node("agent-tech", "tech"))
        .with_node(agent_node("agent-general", "general"))
        .with_edge(Edge::new("e1", "start-1", "router-1"))
        .with_edge(Edge::new("e2", "router-1", "agent-tech").on_handle("route-a"))
        .with_edge(Edge::new("e3", "router-1", "agent-general").on_handle("route-b"))
}

#[tokio::test]
async fn test_router_selects_route() {
    let provider = ScriptedProvider::new()
        .push(Script::content(&["1"]))
        .push(Script::content(&["Technical response"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &router_workflow(),
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "my program crashes",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("Technical response"));

    let events = recorder.events();
    assert!(events.contains(&"start:agent-tech".to_string()));
    assert!(!events.contains(&"start:agent-general".to_string()));
    assert!(events.contains(&"route:router-1:route-a:false".to_string()));
}

#[tokio::test]
async fn test_router_invalid_reply_falls_back_to_first() {
    let provider = ScriptedProvider::new()
        .push(Script::content(&["invalid"]))
        .push(Script::content(&["Technical response"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &router_workflow(),
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "anything",
    )
    .await;

    assert!(result.success);
    assert_eq!(result.output.as_deref(), Some("Technical response"));
    assert!(recorder
        .events()
        .contains(&"route:router-1:route-a:true".to_string()));
}

#[tokio::test]
async fn test_router_label_substring_fallback() {
    let provider = ScriptedProvider::new()
        .push(Script::content(&["definitely a General question"]))
        .push(Script::content(&["General response"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &router_workflow(),
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "anything",
    )
    .await;

    assert!(result.success);
    assert!(recorder
        .events()
        .contains(&"route:router-1:route-b:false".to_string()));
    assert_eq!(result.output.as_deref(), Some("General response"));
}

// --- Scenario: bounded tool loop ------------------------------------------

#[tokio::test]
async fn test_tool_loop_bounded_with_warning() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("lookup", "Look something up"),
        tool_handler(|_args| async move { Ok("data".to_string()) }),
    );

    let workflow = Workflow::new("loopy")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "agent-1",
            "agent",
            json!({
                "label": "Agent",
                "model": "m",
                "prompt": "p",
                "tools": ["lookup"],
                "maxToolIterations": 2,
                "onMaxToolIterations": "warning",
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    // The model asks for a tool on every call; the loop must stop at two
    // provider calls.
    let provider = Arc::new(
        ScriptedProvider::new()
            .push(Script::tool_call("lookup", r#"{"q": 1}"#))
            .push(Script::tool_call("lookup", r#"{"q": 2}"#))
            .push(Script::tool_call("lookup", r#"{"q": 3}"#)),
    );

    let engine = Engine::new(provider.clone())
        .with_options(ExecutionOptions::new().with_tools(tools));
    let result = engine
        .execute(
            &workflow,
            ExecutionInput::text("go"),
            Arc::new(NullCallbacks),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(provider.call_count(), 2);
    let output = result.output.unwrap();
    assert!(
        output.starts_with("Warning: Maximum tool iterations (2) reached"),
        "output: {output}"
    );
}

#[tokio::test]
async fn test_tool_loop_error_policy() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("lookup", "Look something up"),
        tool_handler(|_args| async move { Ok("data".to_string()) }),
    );

    let workflow = Workflow::new("loopy")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "agent-1",
            "agent",
            json!({
                "label": "Agent",
                "model": "m",
                "prompt": "p",
                "tools": ["lookup"],
                "maxToolIterations": 1,
                "onMaxToolIterations": "error",
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new()
        .push(Script::tool_call("lookup", "{}"))
        .push(Script::tool_call("lookup", "{}"));

    let engine = Engine::new(Arc::new(provider))
        .with_options(ExecutionOptions::new().with_tools(tools));
    let result = engine
        .execute(
            &workflow,
            ExecutionInput::text("go"),
            Arc::new(NullCallbacks),
        )
        .await;

    assert!(!result.success);
    assert_eq!(
        result.error.unwrap().code,
        ErrorCode::ToolIterationExceeded
    );
}

#[tokio::test]
async fn test_tool_loop_hitl_rejection_stops_loop() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("lookup", "Look something up"),
        tool_handler(|_args| async move { Ok("data".to_string()) }),
    );

    let workflow = Workflow::new("gated")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "agent-1",
            "agent",
            json!({
                "label": "Agent",
                "model": "m",
                "prompt": "p",
                "tools": ["lookup"],
                "maxToolIterations": 1,
                "onMaxToolIterations": "hitl",
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new()
        .push(Script::tool_call("lookup", "{}"))
        .push(Script::tool_call("lookup", "{}"));
    let recorder = Arc::new(Recorder::with_hitl_answer(
        agentflow_core::HitlResponse::Reject,
    ));

    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new().with_tools(tools),
        recorder.clone(),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert!(result
        .output
        .unwrap()
        .starts_with("Tool iteration stopped by user"));
    assert!(recorder.events().contains(&"hitl:agent-1".to_string()));
}

// --- Scenario: parallel with timeout --------------------------------------

#[tokio::test]
async fn test_parallel_branch_timeout() {
    let workflow = Workflow::new("fanout")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "parallel-1",
            "parallel",
            json!({
                "label": "Fan",
                "branches": [
                    {"id": "fast", "label": "Fast", "model": "fast-m"},
                    {"id": "slow", "label": "Slow", "model": "slow-m"},
                ],
                "branchTimeout": 300,
                "mergeEnabled": false,
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "parallel-1"));

    let provider = ScriptedProvider::new()
        .push_for("fast-m", Script::content(&["Fast response"]))
        .push_for(
            "slow-m",
            Script::content(&["Slow response"]).after(Duration::from_secs(5)),
        );
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    let output = result.output.unwrap();
    assert!(output.contains("Fast response"), "output: {output}");
    assert!(output.contains("[branch timed out]"), "output: {output}");

    let starts = recorder.filtered(&["branch_start:"]);
    let completes = recorder.filtered(&["branch_complete:"]);
    assert_eq!(starts.len(), 2);
    assert_eq!(completes.len(), 2);
    assert!(completes
        .iter()
        .any(|e| e == "branch_complete:parallel-1:fast:Fast response"));
    assert!(completes
        .iter()
        .any(|e| e == "branch_complete:parallel-1:slow:[branch timed out]"));
}

#[tokio::test]
async fn test_parallel_merge_call() {
    let workflow = Workflow::new("fanout")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "parallel-1",
            "parallel",
            json!({
                "label": "Fan",
                "model": "merge-m",
                "branches": [
                    {"id": "a", "label": "A", "model": "a-m"},
                    {"id": "b", "label": "B", "model": "b-m"},
                ],
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "parallel-1"));

    let provider = ScriptedProvider::new()
        .push_for("a-m", Script::content(&["alpha"]))
        .push_for("b-m", Script::content(&["beta"]))
        .push_for("merge-m", Script::content(&["alpha and beta, combined"]));
    let recorder = Arc::new(Recorder::new());

    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new(),
        recorder.clone(),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("alpha and beta, combined"));
    // Merge tokens stream against the parallel node's own id
    assert_eq!(recorder.tokens_for("parallel-1"), "alpha and beta, combined");
}

// --- Scenario: while-loop with custom evaluator ----------------------------

#[tokio::test]
async fn test_while_loop_custom_evaluator() {
    let body_runs = Arc::new(AtomicUsize::new(0));
    let body_counter = body_runs.clone();

    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("bodyTool", "loop body"),
        tool_handler(move |_args| {
            let n = body_counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(format!("body-{n}")) }
        }),
    );
    tools.register(
        ToolDefinition::new("echoDone", "echo after the loop"),
        tool_handler(|args| async move {
            Ok(format!("done:{}", args.as_str().unwrap_or_default()))
        }),
    );

    let workflow = Workflow::new("looped")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "loop-1",
            "whileLoop",
            json!({
                "label": "Loop",
                "customEvaluator": "loopEval",
                "maxIterations": 10,
            }),
        ))
        .with_node(Node::new("tool-body", "tool", json!({"label": "Body", "toolId": "bodyTool"})))
        .with_node(Node::new("tool-done", "tool", json!({"label": "Done", "toolId": "echoDone"})))
        .with_edge(Edge::new("e1", "start-1", "loop-1"))
        .with_edge(Edge::new("e2", "loop-1", "tool-body").on_handle("body"))
        .with_edge(Edge::new("e3", "tool-body", "loop-1"))
        .with_edge(Edge::new("e4", "loop-1", "tool-done").on_handle("done"));

    let options = ExecutionOptions::new()
        .with_tools(tools)
        .with_evaluator("loopEval", Arc::new(|_ctx, state| state.iteration < 2));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        options,
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(body_runs.load(Ordering::SeqCst), 2);
    assert_eq!(result.output.as_deref(), Some("done:body-2"));
}

#[tokio::test]
async fn test_while_loop_iteration_cap_exits_through_done() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("noop", "no-op body"),
        tool_handler(|args| async move {
            Ok(args.as_str().unwrap_or_default().to_string())
        }),
    );

    let workflow = Workflow::new("capped")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "loop-1",
            "whileLoop",
            json!({
                "label": "Loop",
                "customEvaluator": "always",
                "maxIterations": 3,
                "onMaxIterations": "warning",
            }),
        ))
        .with_node(Node::new("tool-body", "tool", json!({"label": "B", "toolId": "noop"})))
        .with_edge(Edge::new("e1", "start-1", "loop-1"))
        .with_edge(Edge::new("e2", "loop-1", "tool-body").on_handle("body"))
        .with_edge(Edge::new("e3", "tool-body", "loop-1"));

    let options = ExecutionOptions::new()
        .with_tools(tools)
        .with_evaluator("always", Arc::new(|_ctx, _state| true));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        options,
        Arc::new(Recorder::new()),
        "seed",
    )
    .await;

    // Cap reached: exits through done (no done edge here, so the loop node
    // is terminal) with the current input.
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("seed"));
    assert_eq!(result.outputs["tool-body"], "seed");
}

// --- Caps ------------------------------------------------------------------

#[tokio::test]
async fn test_node_cap_exceeded_on_cycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("spin", "self-looping tool"),
        tool_handler(move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok("again".to_string()) }
        }),
    );

    let workflow = Workflow::new("cycle")
        .with_node(start_node("start-1"))
        .with_node(Node::new("tool-1", "tool", json!({"label": "Spin", "toolId": "spin"})))
        .with_edge(Edge::new("e1", "start-1", "tool-1"))
        .with_edge(Edge::new("e2", "tool-1", "tool-1"));

    let options = ExecutionOptions::new()
        .with_tools(tools)
        .with_max_node_executions(3);

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        options,
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, ErrorCode::NodeCapExceeded);
    assert_eq!(error.node_id.as_deref(), Some("tool-1"));
    // The node ran its full budget before the cap tripped on dispatch k+1
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_global_cap_exceeded() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("spin", "self-looping tool"),
        tool_handler(|_args| async move { Ok("again".to_string()) }),
    );

    let workflow = Workflow::new("cycle")
        .with_node(start_node("start-1"))
        .with_node(Node::new("tool-1", "tool", json!({"label": "Spin", "toolId": "spin"})))
        .with_edge(Edge::new("e1", "start-1", "tool-1"))
        .with_edge(Edge::new("e2", "tool-1", "tool-1"));

    let options = ExecutionOptions::new()
        .with_tools(tools)
        .with_max_iterations(5);

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        options,
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::GlobalCapExceeded);
}

// --- Cancellation ----------------------------------------------------------

#[tokio::test]
async fn test_cancellation_interrupts_run() {
    let workflow = Workflow::new("slow")
        .with_node(start_node("start-1"))
        .with_node(agent_node("agent-1", "p"))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new()
        .push(Script::content(&["never seen"]).after(Duration::from_secs(5)));

    let engine = Engine::new(Arc::new(provider));
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = engine
        .execute(
            &workflow,
            ExecutionInput::text("go"),
            Arc::new(NullCallbacks),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::Cancelled);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let workflow = Workflow::new("w")
        .with_node(start_node("start-1"))
        .with_node(agent_node("agent-1", "p"))
        .with_edge(Edge::new("e1", "start-1", "agent-1"));

    let provider = ScriptedProvider::new().push(Script::content(&["ok"]));
    let engine = Engine::new(Arc::new(provider));
    let result = engine
        .execute(
            &workflow,
            ExecutionInput::text("go"),
            Arc::new(NullCallbacks),
        )
        .await;
    assert!(result.success);

    // Stopping after the run completed changes nothing and is idempotent
    let cancel = engine.cancel_token();
    cancel.cancel();
    cancel.cancel();
    assert!(cancel.is_cancelled());
    assert_eq!(result.output.as_deref(), Some("ok"));
}

// --- Error handling --------------------------------------------------------

#[tokio::test]
async fn test_retry_recovers_transient_failure() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("flaky", "fails twice then succeeds"),
        tool_handler(move |_args| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("rate limit exceeded".to_string())
                } else {
                    Ok("recovered".to_string())
                }
            }
        }),
    );

    let workflow = Workflow::new("flaky")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "tool-1",
            "tool",
            json!({
                "label": "Flaky",
                "toolId": "flaky",
                "errorHandling": {"mode": "stop", "retry": {"maxRetries": 3, "baseDelay": 1}},
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "tool-1"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new().with_tools(tools),
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("recovered"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_reports_history() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("dead", "always rate limited"),
        tool_handler(|_args| async move { Err("rate limit exceeded".to_string()) }),
    );

    let workflow = Workflow::new("dead")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "tool-1",
            "tool",
            json!({
                "label": "Dead",
                "toolId": "dead",
                "errorHandling": {"mode": "stop", "retry": {"maxRetries": 2, "baseDelay": 1}},
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "tool-1"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new().with_tools(tools),
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, ErrorCode::RateLimit);
    assert_eq!(error.node_id.as_deref(), Some("tool-1"));
    let retry = error.retry.unwrap();
    assert_eq!(retry.attempts, 3);
    assert_eq!(retry.history.len(), 3);
}

#[tokio::test]
async fn test_error_mode_branch_routes_to_error_handle() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("boom", "always fails"),
        tool_handler(|_args| async move { Err("something odd happened".to_string()) }),
    );
    tools.register(
        ToolDefinition::new("rescue", "formats the failure"),
        tool_handler(|args| async move {
            Ok(format!("handled: {}", args.as_str().unwrap_or_default()))
        }),
    );

    let workflow = Workflow::new("branchy")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "tool-1",
            "tool",
            json!({
                "label": "Boom",
                "toolId": "boom",
                "errorHandling": {"mode": "branch"},
            }),
        ))
        .with_node(Node::new("tool-2", "tool", json!({"label": "Rescue", "toolId": "rescue"})))
        .with_edge(Edge::new("e1", "start-1", "tool-1"))
        .with_edge(Edge::new("e2", "tool-1", "tool-2").on_handle("error"));

    let recorder = Arc::new(Recorder::new());
    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new().with_tools(tools),
        recorder.clone(),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    let output = result.output.unwrap();
    assert!(output.starts_with("handled: "), "output: {output}");
    assert!(output.contains("something odd happened"));
    assert!(recorder
        .events()
        .iter()
        .any(|e| e.starts_with("error:tool-1:")));
}

#[tokio::test]
async fn test_error_mode_continue_records_empty_output() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("boom", "always fails"),
        tool_handler(|_args| async move { Err("something odd happened".to_string()) }),
    );
    tools.register(
        ToolDefinition::new("echo", "echoes its input"),
        tool_handler(|args| async move {
            Ok(format!("<{}>", args.as_str().unwrap_or_default()))
        }),
    );

    let workflow = Workflow::new("continuing")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "tool-1",
            "tool",
            json!({
                "label": "Boom",
                "toolId": "boom",
                "errorHandling": {"mode": "continue"},
            }),
        ))
        .with_node(Node::new("tool-2", "tool", json!({"label": "Echo", "toolId": "echo"})))
        .with_edge(Edge::new("e1", "start-1", "tool-1"))
        .with_edge(Edge::new("e2", "tool-1", "tool-2"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new().with_tools(tools),
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.outputs["tool-1"], "");
    assert_eq!(result.output.as_deref(), Some("<>"));
}

// --- Memory / subflow / output --------------------------------------------

#[tokio::test]
async fn test_memory_store_then_query() {
    let memory = Arc::new(agentflow_memory::InMemoryMemoryAdapter::new());

    let workflow = Workflow::new("remembering")
        .with_node(start_node("start-1"))
        .with_node(Node::new("mem-store", "memory", json!({"label": "S", "operation": "store"})))
        .with_node(Node::new("mem-query", "memory", json!({"label": "Q", "operation": "query"})))
        .with_edge(Edge::new("e1", "start-1", "mem-store"))
        .with_edge(Edge::new("e2", "mem-store", "mem-query"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new().with_memory(memory.clone()),
        Arc::new(Recorder::new()),
        "favorite color is blue",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("favorite color is blue"));
    assert_eq!(memory.len().await, 1);
}

#[tokio::test]
async fn test_subflow_invocation() {
    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition::new("upper", "uppercases input"),
        tool_handler(|args| async move {
            Ok(args.as_str().unwrap_or_default().to_uppercase())
        }),
    );

    let child = Arc::new(
        Workflow::new("child")
            .with_node(start_node("start-c"))
            .with_node(Node::new("tool-c", "tool", json!({"label": "Upper", "toolId": "upper"})))
            .with_edge(Edge::new("ec1", "start-c", "tool-c")),
    );

    let workflow = Workflow::new("parent")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "sub-1",
            "subflow",
            json!({
                "label": "Child",
                "subflowId": "child-1",
                "inputMappings": {"input": "{{output}}"},
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "sub-1"));

    let options = ExecutionOptions::new()
        .with_tools(tools)
        .with_subflow("child-1", child);

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        options,
        Arc::new(Recorder::new()),
        "quiet words",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("QUIET WORDS"));
}

#[tokio::test]
async fn test_subflow_not_found() {
    let workflow = Workflow::new("parent")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "sub-1",
            "subflow",
            json!({
                "label": "Child",
                "subflowId": "ghost",
                "inputMappings": {"input": "{{output}}"},
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "sub-1"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new(),
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::SubflowNotFound);
}

#[tokio::test]
async fn test_output_node_template() {
    let workflow = Workflow::new("templated")
        .with_node(start_node("start-1"))
        .with_node(agent_node("agent-1", "p"))
        .with_node(Node::new(
            "out-1",
            "output",
            json!({
                "label": "Out",
                "format": "text",
                "template": "Result: {{agent-1}} (missing: {{ghost}})",
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "agent-1"))
        .with_edge(Edge::new("e2", "agent-1", "out-1"));

    let provider = ScriptedProvider::new().push(Script::content(&["four"]));
    let result = run(
        &workflow,
        provider,
        ExecutionOptions::new(),
        Arc::new(Recorder::new()),
        "2+2?",
    )
    .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(
        result.output.as_deref(),
        Some("Result: four (missing: {{ghost}})")
    );
}

#[tokio::test]
async fn test_output_node_json_schema_violation() {
    let workflow = Workflow::new("schemad")
        .with_node(start_node("start-1"))
        .with_node(Node::new(
            "out-1",
            "output",
            json!({
                "label": "Out",
                "format": "json",
                "template": "{{output}}",
                "schema": {"type": "object", "required": ["answer"]},
            }),
        ))
        .with_edge(Edge::new("e1", "start-1", "out-1"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new(),
        Arc::new(Recorder::new()),
        r#"{"question": "unanswered"}"#,
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::OutputSchemaInvalid);
}

// --- Preflight and determinism ---------------------------------------------

#[tokio::test]
async fn test_preflight_rejects_invalid_graph() {
    let workflow = Workflow::new("no-start").with_node(agent_node("agent-1", "p"));

    let result = run(
        &workflow,
        ScriptedProvider::new(),
        ExecutionOptions::new(),
        Arc::new(Recorder::new()),
        "go",
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::NoStartNode);
    assert!(result.node_chain.is_empty());
}

#[tokio::test]
async fn test_deterministic_replay() {
    async fn one_run() -> ExecutionResult {
        let provider = ScriptedProvider::new()
            .push(Script::content(&["2"]))
            .push(Script::content(&["General response"]));
        run(
            &router_workflow(),
            provider,
            ExecutionOptions::new(),
            Arc::new(Recorder::new()),
            "same input",
        )
        .await
    }

    let first = one_run().await;
    let second = one_run().await;

    assert!(first.success && second.success);
    assert_eq!(first.outputs, second.outputs);
    assert_eq!(first.node_chain, second.node_chain);
    assert_eq!(first.output, second.output);
}
