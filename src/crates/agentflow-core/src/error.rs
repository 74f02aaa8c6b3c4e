//! Error types and error classification for workflow execution
//!
//! This module defines the engine's error taxonomy. Every failure that can
//! surface from a run carries a stable [`ErrorCode`], a human-readable
//! message, the node it originated from when known, and - for errors that
//! went through the retry wrapper - a [`RetryReport`] with the attempt
//! history.
//!
//! Two classes of codes exist:
//!
//! - **Structural codes** produced by preflight validation
//!   (`NO_START_NODE`, `DANGLING_EDGE`, ...). These are returned before any
//!   node is dispatched.
//! - **Runtime codes** produced during execution (`RATE_LIMIT`, `TIMEOUT`,
//!   `NODE_CAP_EXCEEDED`, `CANCELLED`, ...). Provider and tool failures are
//!   classified from their message text, case-insensitively, the same way
//!   the retry wrapper decides whether an error is transient.
//!
//! `execute()` itself never returns `Err`; failures are folded into the
//! `ExecutionResult` the caller receives. The `Result` alias in this module
//! is for internal plumbing between the driver, the retry wrapper, and the
//! executors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;

/// Stable error codes for every failure the engine can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural (preflight)
    NoStartNode,
    MultipleStartNodes,
    DisconnectedNode,
    DanglingEdge,
    UnknownHandle,
    MissingModel,
    EmptyPrompt,
    DuplicateSourceHandle,
    MissingRequiredPort,
    MissingSubflowId,
    SubflowNotFound,
    MissingInputMapping,
    MissingConditionPrompt,
    InvalidMaxIterations,

    // Runtime caps and routing
    NodeCapExceeded,
    GlobalCapExceeded,
    ToolIterationExceeded,
    RouterInvalidRoute,
    BranchTimeout,
    OutputSchemaInvalid,

    // Classified provider/tool failures
    RateLimit,
    Timeout,
    Network,
    LlmError,
    Validation,
    Cancelled,
    Unknown,
}

impl ErrorCode {
    /// Whether an error with this code is worth retrying by default.
    ///
    /// Matches the default `retryOn` set of the retry wrapper: transient
    /// provider failures plus anything unclassifiable. Structural errors,
    /// caps, and cancellation are never retried.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimit
                | ErrorCode::Timeout
                | ErrorCode::Network
                | ErrorCode::LlmError
                | ErrorCode::Unknown
        )
    }

    /// Classify an error message into a runtime code.
    ///
    /// Pattern-matched on the lowered message text. The order matters:
    /// cancellation and rate limits are checked before the broader
    /// network/LLM buckets so a message like "rate limited by upstream LLM"
    /// classifies as `RateLimit`.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("cancel") {
            return ErrorCode::Cancelled;
        }
        if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            return ErrorCode::RateLimit;
        }
        if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline") {
            return ErrorCode::Timeout;
        }
        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
        {
            return ErrorCode::Network;
        }
        if lower.contains("llm")
            || lower.contains("model")
            || lower.contains("provider")
            || lower.contains("completion")
        {
            return ErrorCode::LlmError;
        }
        if lower.contains("invalid")
            || lower.contains("validation")
            || lower.contains("schema")
            || lower.contains("malformed")
        {
            return ErrorCode::Validation;
        }
        ErrorCode::Unknown
    }

    /// Canonical wire name (`SCREAMING_SNAKE_CASE`).
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoStartNode => "NO_START_NODE",
            ErrorCode::MultipleStartNodes => "MULTIPLE_START_NODES",
            ErrorCode::DisconnectedNode => "DISCONNECTED_NODE",
            ErrorCode::DanglingEdge => "DANGLING_EDGE",
            ErrorCode::UnknownHandle => "UNKNOWN_HANDLE",
            ErrorCode::MissingModel => "MISSING_MODEL",
            ErrorCode::EmptyPrompt => "EMPTY_PROMPT",
            ErrorCode::DuplicateSourceHandle => "DUPLICATE_SOURCE_HANDLE",
            ErrorCode::MissingRequiredPort => "MISSING_REQUIRED_PORT",
            ErrorCode::MissingSubflowId => "MISSING_SUBFLOW_ID",
            ErrorCode::SubflowNotFound => "SUBFLOW_NOT_FOUND",
            ErrorCode::MissingInputMapping => "MISSING_INPUT_MAPPING",
            ErrorCode::MissingConditionPrompt => "MISSING_CONDITION_PROMPT",
            ErrorCode::InvalidMaxIterations => "INVALID_MAX_ITERATIONS",
            ErrorCode::NodeCapExceeded => "NODE_CAP_EXCEEDED",
            ErrorCode::GlobalCapExceeded => "GLOBAL_CAP_EXCEEDED",
            ErrorCode::ToolIterationExceeded => "TOOL_ITERATION_EXCEEDED",
            ErrorCode::RouterInvalidRoute => "ROUTER_INVALID_ROUTE",
            ErrorCode::BranchTimeout => "BRANCH_TIMEOUT",
            ErrorCode::OutputSchemaInvalid => "OUTPUT_SCHEMA_INVALID",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Network => "NETWORK",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded retry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt: u32,

    /// Error message observed on this attempt
    pub error: String,

    /// When the attempt failed
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Retry history attached to an error that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    /// Attempts actually made
    pub attempts: u32,

    /// Configured attempt budget
    pub max_attempts: u32,

    /// Per-attempt failure records, oldest first
    pub history: Vec<RetryAttempt>,
}

/// The engine's error type.
///
/// Carries the classification code, a message, the originating node when
/// known, and the retry history when the retry wrapper was involved.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct EngineError {
    /// Stable error code
    pub code: ErrorCode,

    /// Human-readable description
    pub message: String,

    /// Node the error originated from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// Retry history, present when the retry wrapper exhausted its budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryReport>,
}

impl EngineError {
    /// Create an error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: None,
            retry: None,
        }
    }

    /// Create an error classified from its message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::classify(&message),
            message,
            node_id: None,
            retry: None,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "execution cancelled")
    }

    /// Attach the originating node.
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Attach a retry report.
    pub fn with_retry(mut self, retry: RetryReport) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Whether the retry wrapper may retry this error by default.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
