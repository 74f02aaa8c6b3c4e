//! Conversation history compaction
//!
//! Long runs accumulate history faster than models can read it. Before every
//! reasoning call the agent executor estimates the conversation's token
//! count and, when it exceeds `context_window(model) - margin`, rewrites the
//! older part of the history while preserving the most recent messages
//! verbatim.
//!
//! Token counting is deliberately approximate - `ceil(len / 4)` per message
//! - because the engine only needs a fit/doesn't-fit signal, not billing
//! accuracy. Compacting an already-compacted history is a no-op: the
//! estimate falls below the threshold and the messages pass through
//! untouched.
//!
//! Three strategies are available:
//!
//! - [`CompactionStrategy::Truncate`] - drop the older half of the
//!   compactable range. Free, lossy.
//! - [`CompactionStrategy::Summarize`] - ask the provider to summarize the
//!   compactable range into a single system message prefixed with
//!   `"[Previous conversation summary]: "`.
//! - [`CompactionStrategy::Custom`] - caller-provided compactor.

use crate::context::CancelToken;
use crate::error::{EngineError, Result};
use crate::messages::{Message, MessageRole};
use crate::models;
use crate::provider::{ChatProvider, ChatRequest};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;

/// Prefix of the system message a summarization pass produces.
pub const SUMMARY_PREFIX: &str = "[Previous conversation summary]: ";

const SUMMARIZE_PROMPT: &str = "Summarize the following conversation concisely, \
preserving facts, decisions, and open questions. Reply with the summary only.";

/// Caller-provided compactor: receives the compactable messages, returns the
/// replacement text (wrapped into a single system message by the engine).
pub type CustomCompactor = Arc<dyn Fn(&[Message]) -> String + Send + Sync>;

/// How the older part of the history is rewritten.
#[derive(Clone, Default)]
pub enum CompactionStrategy {
    /// Drop the older half of the compactable range
    #[default]
    Truncate,
    /// Replace the compactable range with a provider-written summary
    Summarize,
    /// Replace the compactable range using a caller-provided function
    Custom(CustomCompactor),
}

impl fmt::Debug for CompactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionStrategy::Truncate => f.write_str("Truncate"),
            CompactionStrategy::Summarize => f.write_str("Summarize"),
            CompactionStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Compaction configuration.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Tokens held back from the model limit before compaction triggers
    pub margin: usize,

    /// Lower bound on the trigger threshold, for small-context models
    pub min_threshold: usize,

    /// Most recent messages preserved verbatim
    pub preserve_recent: usize,

    /// Rewrite strategy for the older range
    pub strategy: CompactionStrategy,

    /// Model used for `Summarize` calls; falls back to the reasoning model
    pub summary_model: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            margin: 10_000,
            min_threshold: 1_000,
            preserve_recent: 5,
            strategy: CompactionStrategy::Truncate,
            summary_model: None,
        }
    }
}

impl CompactionConfig {
    /// Trigger threshold for a model.
    pub fn threshold_for(&self, model: &str) -> usize {
        models::context_window(model)
            .saturating_sub(self.margin)
            .max(self.min_threshold)
    }
}

/// Approximate token count of one message.
pub fn estimate_message_tokens(message: &Message) -> usize {
    message.content.len().div_ceil(4)
}

/// Approximate token count of a message sequence.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Compact a history to fit the model's window.
///
/// Returns the input unchanged when it already fits. The provider is only
/// consulted for the `Summarize` strategy.
pub async fn compact_history(
    history: &[Message],
    model: &str,
    config: &CompactionConfig,
    provider: &dyn ChatProvider,
    cancel: &CancelToken,
) -> Result<Vec<Message>> {
    let threshold = config.threshold_for(model);
    if estimate_tokens(history) <= threshold {
        return Ok(history.to_vec());
    }

    let preserved_from = history.len().saturating_sub(config.preserve_recent);
    let (to_compact, recent) = history.split_at(preserved_from);
    if to_compact.is_empty() {
        return Ok(history.to_vec());
    }

    tracing::warn!(
        model,
        estimated = estimate_tokens(history),
        threshold,
        compacting = to_compact.len(),
        "history exceeds context window, compacting"
    );

    let mut compacted: Vec<Message> = match &config.strategy {
        CompactionStrategy::Truncate => {
            let keep_from = to_compact.len() / 2;
            to_compact[keep_from..].to_vec()
        }
        CompactionStrategy::Summarize => {
            let summary_model = config.summary_model.as_deref().unwrap_or(model);
            let summary = summarize(to_compact, summary_model, provider, cancel).await?;
            vec![Message::system(format!("{SUMMARY_PREFIX}{summary}"))]
        }
        CompactionStrategy::Custom(compactor) => {
            vec![Message::system(compactor(to_compact))]
        }
    };

    compacted.extend_from_slice(recent);
    Ok(compacted)
}

async fn summarize(
    messages: &[Message],
    model: &str,
    provider: &dyn ChatProvider,
    cancel: &CancelToken,
) -> Result<String> {
    let transcript = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let request = ChatRequest::new(
        model,
        vec![
            Message::system(SUMMARIZE_PROMPT),
            Message::user(transcript),
        ],
    );

    let mut stream = provider.chat_stream(request).await?;
    let mut summary = String::new();
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }
        match stream.next().await {
            Some(Ok(chunk)) => {
                if let Some(content) = chunk.content {
                    summary.push_str(&content);
                }
            }
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }
    Ok(summary)
}
