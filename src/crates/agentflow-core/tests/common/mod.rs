//! Shared test fixtures: a scripted replay provider and an event recorder.

use agentflow_core::callbacks::{ExecutionCallbacks, HitlRequest, HitlResponse, NodeInfo};
use agentflow_core::error::{EngineError, ErrorCode, Result};
use agentflow_core::provider::{ChatProvider, ChatRequest, ChunkStream, StreamChunk};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted provider response: optional latency, then chunks in order.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub delay: Option<Duration>,
    pub chunks: Vec<StreamChunk>,
}

impl Script {
    /// A script streaming the given content tokens.
    pub fn content(tokens: &[&str]) -> Self {
        Self {
            delay: None,
            chunks: tokens.iter().map(|t| StreamChunk::content(*t)).collect(),
        }
    }

    /// A script answering with a single complete tool call.
    pub fn tool_call(name: &str, arguments: &str) -> Self {
        Self {
            delay: None,
            chunks: vec![StreamChunk::tool_call(0, format!("call-{name}"), name, arguments)],
        }
    }

    /// Delay the response.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Deterministic provider replaying scripts.
///
/// Scripts can be keyed by model (for concurrent branch calls, where call
/// order is not deterministic) or queued globally in call order.
#[derive(Default)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Script>>,
    by_model: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a script answered in global call order.
    pub fn push(self, script: Script) -> Self {
        self.queue.lock().unwrap().push_back(script);
        self
    }

    /// Enqueue a script answered to calls for a specific model.
    pub fn push_for(self, model: &str, script: Script) -> Self {
        self.by_model
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(script);
        self
    }

    /// Total provider calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let script = {
            let mut by_model = self.by_model.lock().unwrap();
            match by_model.get_mut(&request.model).and_then(VecDeque::pop_front) {
                Some(script) => Some(script),
                None => self.queue.lock().unwrap().pop_front(),
            }
        };

        let Some(script) = script else {
            return Err(EngineError::new(
                ErrorCode::LlmError,
                format!("no scripted response for model '{}'", request.model),
            ));
        };

        let stream = async_stream::stream! {
            if let Some(delay) = script.delay {
                tokio::time::sleep(delay).await;
            }
            for chunk in script.chunks {
                yield Ok(chunk);
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Callback sink recording every event as a flat string.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    pub hitl_answer: Option<HitlResponse>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that answers HITL requests with a fixed response.
    pub fn with_hitl_answer(answer: HitlResponse) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            hitl_answer: Some(answer),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Events starting with any of the given prefixes, in emission order.
    pub fn filtered(&self, prefixes: &[&str]) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| prefixes.iter().any(|p| e.starts_with(p)))
            .collect()
    }

    /// Concatenation of all tokens emitted for a node.
    pub fn tokens_for(&self, node_id: &str) -> String {
        let prefix = format!("token:{node_id}:");
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ExecutionCallbacks for Recorder {
    async fn on_node_start(&self, node: &NodeInfo) {
        self.record(format!("start:{}", node.id));
    }

    async fn on_node_finish(&self, node: &NodeInfo, output: &str) {
        self.record(format!("finish:{}:{output}", node.id));
    }

    async fn on_node_error(&self, node: &NodeInfo, error: &EngineError) {
        self.record(format!("error:{}:{}", node.id, error.code));
    }

    async fn on_token(&self, node_id: &str, token: &str) {
        self.record(format!("token:{node_id}:{token}"));
    }

    async fn on_reasoning(&self, node_id: &str, token: &str) {
        self.record(format!("reasoning:{node_id}:{token}"));
    }

    async fn on_route_selected(&self, node_id: &str, handle: &str, fallback: bool) {
        self.record(format!("route:{node_id}:{handle}:{fallback}"));
    }

    async fn on_branch_start(&self, node_id: &str, branch_id: &str, _label: &str) {
        self.record(format!("branch_start:{node_id}:{branch_id}"));
    }

    async fn on_branch_token(&self, node_id: &str, branch_id: &str, token: &str) {
        self.record(format!("branch_token:{node_id}:{branch_id}:{token}"));
    }

    async fn on_branch_complete(&self, node_id: &str, branch_id: &str, _label: &str, output: &str) {
        self.record(format!("branch_complete:{node_id}:{branch_id}:{output}"));
    }

    async fn on_hitl_request(&self, request: &HitlRequest) -> Option<HitlResponse> {
        self.record(format!("hitl:{}", request.node_id));
        self.hitl_answer.clone()
    }
}
