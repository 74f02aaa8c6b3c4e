//! Shared streaming plumbing for reasoning executors
//!
//! Every provider call in the engine goes through [`stream_chat`]: it drives
//! the chunk stream to completion, fans tokens out to the right callback
//! channel, accumulates content/reasoning/tool-call fragments, and observes
//! cancellation at every chunk boundary. Keeping this in one place is what
//! makes the token-ordering guarantee hold - deltas are forwarded in the
//! order the provider yields them, one at a time, before the next chunk is
//! polled.

use crate::callbacks::ExecutionCallbacks;
use crate::context::CancelToken;
use crate::error::{EngineError, Result};
use crate::messages::ToolCall;
use crate::provider::{assemble_tool_calls, ChatProvider, ChatRequest, ToolCallFragment};
use futures::StreamExt;

/// Where streamed tokens are delivered.
pub(crate) enum TokenSink<'a> {
    /// Top-level node: `on_token` / `on_reasoning`
    Node {
        callbacks: &'a dyn ExecutionCallbacks,
        node_id: &'a str,
    },
    /// Parallel branch: `on_branch_token` (content only)
    Branch {
        callbacks: &'a dyn ExecutionCallbacks,
        node_id: &'a str,
        branch_id: &'a str,
    },
    /// No emission (condition probes, summarization)
    Silent,
}

/// Accumulated result of one streaming call.
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamOutcome {
    /// Concatenated content deltas
    pub content: String,

    /// Concatenated reasoning deltas
    pub reasoning: String,

    /// Assembled tool calls, provider order
    pub tool_calls: Vec<ToolCall>,
}

/// Drive one provider call to completion.
pub(crate) async fn stream_chat(
    provider: &dyn ChatProvider,
    request: ChatRequest,
    cancel: &CancelToken,
    sink: TokenSink<'_>,
) -> Result<StreamOutcome> {
    if cancel.is_cancelled() {
        return Err(EngineError::cancelled());
    }

    let mut stream = provider.chat_stream(request).await?;
    let mut outcome = StreamOutcome::default();
    let mut fragments: Vec<ToolCallFragment> = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::cancelled()),
            next = stream.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(err),
            None => break,
        };

        if let Some(content) = &chunk.content {
            outcome.content.push_str(content);
            match &sink {
                TokenSink::Node { callbacks, node_id } => {
                    callbacks.on_token(node_id, content).await;
                }
                TokenSink::Branch {
                    callbacks,
                    node_id,
                    branch_id,
                } => {
                    callbacks.on_branch_token(node_id, branch_id, content).await;
                }
                TokenSink::Silent => {}
            }
        }

        if let Some(reasoning) = &chunk.reasoning {
            outcome.reasoning.push_str(reasoning);
            if let TokenSink::Node { callbacks, node_id } = &sink {
                callbacks.on_reasoning(node_id, reasoning).await;
            }
        }

        fragments.extend(chunk.tool_calls);
    }

    outcome.tool_calls = assemble_tool_calls(&fragments);
    Ok(outcome)
}
