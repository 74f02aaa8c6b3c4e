//! Per-run mutable execution state
//!
//! An [`ExecutionContext`] is created when `execute()` is entered and
//! dropped when it returns. The traversal driver exclusively owns it;
//! executors receive a mutable borrow and may touch only their designated
//! parts: their own `outputs` entry, the conversation history (append-only
//! outside compaction), and the diagnostic node chain. Execution counters
//! are maintained by the driver alone.
//!
//! Cancellation is a one-way latch shared across every task a run spawns.
//! [`CancelToken::cancel`] is idempotent; every suspension point in the
//! engine observes the token and surfaces `CANCELLED` once it is set.

use crate::graph::kinds;
use crate::messages::Message;
use crate::tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Binary attachment carried alongside the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// MIME type of the payload
    pub mime_type: String,

    /// Raw bytes
    pub bytes: Vec<u8>,
}

/// Raw user input to a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionInput {
    /// Input text; rewritten along the traversal as node outputs flow
    /// downstream
    pub text: String,

    /// Optional binary attachments, immutable for the run
    pub attachments: Vec<Attachment>,
}

impl ExecutionInput {
    /// Create a text-only input.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach a binary payload.
    pub fn with_attachment(mut self, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            mime_type: mime_type.into(),
            bytes,
        });
        self
    }
}

/// One-way cancellation latch.
///
/// Cloning shares the latch. Once set it stays set; waiting tasks are woken
/// through the embedded [`Notify`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token. Idempotent; wakes all waiters.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the token is set.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve when the token is set. Returns immediately if already set.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            // Re-check after arming the waiter so a cancel between the load
            // and the await is not lost.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Messages scoped to one run, optionally shared into subflow runs.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session id, generated at run start
    pub id: String,

    /// Ordered session messages
    pub messages: Vec<Message>,
}

impl SessionState {
    /// Create a fresh session with a generated id.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state of a single run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Current input; the traversal rewrites `text` as outputs flow
    pub input: ExecutionInput,

    /// Latest output per node id; loop re-executions overwrite
    pub outputs: HashMap<String, String>,

    /// Run-long conversation history, subject to compaction
    pub history: Vec<Message>,

    /// Dispatch count per node id, maintained by the driver
    pub exec_count: HashMap<String, u32>,

    /// Global step counter, maintained by the driver
    pub steps: u64,

    /// Node ids in visit order, for diagnostics
    pub node_chain: Vec<String>,

    /// Cancellation latch shared with spawned tasks
    pub cancel: CancelToken,

    /// Run-scoped session messages
    pub session: SessionState,

    /// Tools available to this run
    pub tools: Arc<ToolRegistry>,
}

impl ExecutionContext {
    /// Create a context for a fresh run.
    pub fn new(input: ExecutionInput, tools: Arc<ToolRegistry>, cancel: CancelToken) -> Self {
        Self {
            input,
            outputs: HashMap::new(),
            history: Vec::new(),
            exec_count: HashMap::new(),
            steps: 0,
            node_chain: Vec::new(),
            cancel,
            session: SessionState::new(),
            tools,
        }
    }

    /// Record a node's output.
    ///
    /// Writes the `outputs` entry and, when the node kind is a reasoning
    /// kind (`agent`, `router`, `parallel`, `whileLoop`), appends the text
    /// to the conversation history as an assistant message. Non-reasoning
    /// executors never touch history.
    pub fn record_output(&mut self, node_id: &str, kind: &str, text: &str) {
        self.outputs.insert(node_id.to_string(), text.to_string());
        if is_reasoning_kind(kind) && !text.is_empty() {
            self.history.push(Message::assistant(text));
        }
    }

    /// Dispatch count for a node.
    pub fn executions_of(&self, node_id: &str) -> u32 {
        self.exec_count.get(node_id).copied().unwrap_or(0)
    }
}

/// Whether outputs of this node kind are part of the conversation.
pub fn is_reasoning_kind(kind: &str) -> bool {
    matches!(
        kind,
        kinds::AGENT | kinds::ROUTER | kinds::PARALLEL | kinds::WHILE_LOOP
    )
}
