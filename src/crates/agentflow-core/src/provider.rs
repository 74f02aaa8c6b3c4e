//! Provider trait for streaming chat completion
//!
//! The engine is an orchestration layer, not an LLM client: it consumes a
//! chat-completion backend through the [`ChatProvider`] trait and stays
//! agnostic of wire formats. Implementations convert [`ChatRequest`] into
//! their provider's API call and yield [`StreamChunk`] values as deltas
//! arrive.
//!
//! Every chunk may carry a content delta, a reasoning delta (for thinking
//! models that expose their reasoning stream separately), and tool-call
//! fragments. Fragments are partial: providers typically stream a call's
//! name first and its JSON arguments over several chunks, indexed by call
//! position. [`assemble_tool_calls`] folds an ordered fragment sequence back
//! into complete [`ToolCall`]s once the stream ends.
//!
//! # Implementing a provider
//!
//! ```rust,ignore
//! use agentflow_core::provider::{ChatProvider, ChatRequest, ChunkStream};
//! use async_trait::async_trait;
//!
//! struct MyClient { api_key: String }
//!
//! #[async_trait]
//! impl ChatProvider for MyClient {
//!     async fn chat_stream(&self, request: ChatRequest) -> agentflow_core::Result<ChunkStream> {
//!         // 1. Convert request.messages to the provider's format
//!         // 2. Open the streaming API call
//!         // 3. Map each wire event to a StreamChunk
//!         todo!()
//!     }
//! }
//! ```

use crate::error::Result;
use crate::messages::{Message, ToolCall};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Stream of chunks produced by a provider call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Generation parameters for a chat call.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
}

/// A request to a chat provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier, provider-interpreted
    pub model: String,

    /// Conversation messages, oldest first
    pub messages: Vec<Message>,

    /// Generation parameters
    pub options: ChatOptions,
}

impl ChatRequest {
    /// Create a request with default options.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: ChatOptions::default(),
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Set the generation token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Bind tools the model may call.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.options.tools = tools;
        self
    }
}

/// A partial tool call carried by a stream chunk.
///
/// `index` identifies the call position within the response; `id` and `name`
/// arrive on the first fragment of a call, `arguments_delta` accumulates
/// across fragments.
#[derive(Debug, Clone, Default)]
pub struct ToolCallFragment {
    /// Call position within the response
    pub index: usize,

    /// Provider-assigned call id (first fragment only)
    pub id: Option<String>,

    /// Tool name (first fragment only)
    pub name: Option<String>,

    /// Partial JSON arguments text
    pub arguments_delta: String,
}

/// One delta from a streaming provider call.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Content text delta
    pub content: Option<String>,

    /// Reasoning text delta (thinking models)
    pub reasoning: Option<String>,

    /// Tool-call fragments
    pub tool_calls: Vec<ToolCallFragment>,
}

impl StreamChunk {
    /// A chunk carrying only content text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A chunk carrying only reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Default::default()
        }
    }

    /// A chunk carrying a single complete tool call.
    pub fn tool_call(
        index: usize,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCallFragment {
                index,
                id: Some(id.into()),
                name: Some(name.into()),
                arguments_delta: arguments.into(),
            }],
            ..Default::default()
        }
    }
}

/// Chat-completion backend consumed by the engine.
///
/// Implementations must be `Send + Sync`; the engine shares one provider
/// across the whole run (including concurrently running parallel branches)
/// behind an `Arc`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a streaming chat call.
    ///
    /// The returned stream yields deltas in provider order. Errors may
    /// surface either from this method (connection setup) or as `Err` items
    /// mid-stream; both are classified by the retry wrapper.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}

/// Fold an ordered fragment sequence into complete tool calls.
///
/// Fragments with the same `index` belong to one call; their argument deltas
/// concatenate in arrival order. Calls missing a name are dropped (a
/// provider glitch the engine cannot act on).
pub fn assemble_tool_calls(fragments: &[ToolCallFragment]) -> Vec<ToolCall> {
    let mut by_index: Vec<(usize, ToolCall)> = Vec::new();

    for fragment in fragments {
        match by_index.iter_mut().find(|(i, _)| *i == fragment.index) {
            Some((_, call)) => {
                if call.id.is_empty() {
                    if let Some(id) = &fragment.id {
                        call.id = id.clone();
                    }
                }
                if call.name.is_empty() {
                    if let Some(name) = &fragment.name {
                        call.name = name.clone();
                    }
                }
                call.arguments.push_str(&fragment.arguments_delta);
            }
            None => {
                by_index.push((
                    fragment.index,
                    ToolCall {
                        id: fragment.id.clone().unwrap_or_default(),
                        name: fragment.name.clone().unwrap_or_default(),
                        arguments: fragment.arguments_delta.clone(),
                    },
                ));
            }
        }
    }

    by_index.sort_by_key(|(i, _)| *i);
    by_index
        .into_iter()
        .map(|(_, call)| call)
        .filter(|call| !call.name.is_empty())
        .collect()
}
