//! Message types for conversation history and provider calls
//!
//! The engine keeps one run-scoped conversation history of [`Message`]
//! values: reasoning nodes append their outputs, the agent executor's tool
//! loop appends assistant tool-call messages and tool results, and
//! compaction rewrites the older part of the sequence when it outgrows the
//! model's context window.
//!
//! # Core Types
//!
//! - [`Message`] - a single chat message with role, content, and optional
//!   tool-call payload
//! - [`MessageRole`] - `system` / `user` / `assistant` / `tool`
//! - [`ToolCall`] - a provider-requested tool invocation with JSON arguments
//!
//! ```rust
//! use agentflow_core::messages::Message;
//!
//! let system = Message::system("You are a helpful assistant.");
//! let user = Message::user("What is 2 + 2?");
//! let reply = Message::assistant("4");
//! assert_eq!(reply.content, "4");
//! ```

use serde::{Deserialize, Serialize};

/// The speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions or context for the model
    System,
    /// Messages from the user (or the upstream node's output)
    User,
    /// Responses from the model
    Assistant,
    /// Results from tool executions
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result message
    pub id: String,

    /// Tool name
    pub name: String,

    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments as JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who produced the message
    pub role: MessageRole,

    /// Text content
    pub content: String,

    /// For `tool` messages: the call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For `tool` messages: the tool's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// For `assistant` messages: tool invocations requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        msg.tool_calls = Some(calls);
        msg
    }

    /// Create a tool result message.
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// Whether this assistant message requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}
