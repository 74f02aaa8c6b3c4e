//! Retry wrapper and per-node error-handling policy
//!
//! Every executor call goes through [`execute_with_retry`]. The wrapper
//! reads the node's optional `errorHandling` bag, classifies failures by
//! their [`ErrorCode`], and retries transient ones with exponential backoff
//! and jitter. When the budget is exhausted the final error is surfaced to
//! the traversal driver carrying the full attempt history; the driver then
//! consults the node's [`ErrorMode`] to decide between aborting, continuing
//! with an empty output, or routing to the `error` handle.
//!
//! Backoff for attempt `n` (0-based) is
//! `min(base_delay * 2^n + jitter, max_delay)` with jitter drawn uniformly
//! from `0..base_delay / 2`. Cancellation is observed while sleeping -
//! a pending backoff aborts immediately when the run is cancelled.

use crate::context::CancelToken;
use crate::error::{EngineError, ErrorCode, Result, RetryAttempt, RetryReport};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::Node;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// What the driver does with a node's final (post-retry) error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Abort the run with the error
    #[default]
    Stop,
    /// Record an empty output and continue on the default handle
    Continue,
    /// Route to the node's `error` handle when present, else stop quietly
    Branch,
}

/// Per-node retry policy, deserialized from the node's `errorHandling.retry`
/// bag (camelCase keys match the graph JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub base_delay: u64,

    /// Backoff ceiling in milliseconds; unbounded when absent
    pub max_delay: Option<u64>,

    /// Codes to retry; empty means the default transient set
    pub retry_on: Vec<ErrorCode>,

    /// Codes never retried, re-raised unchanged
    pub skip_on: Vec<ErrorCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: 1_000,
            max_delay: None,
            retry_on: Vec::new(),
            skip_on: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Whether an error with this code should be retried under this policy.
    pub fn should_retry(&self, code: ErrorCode) -> bool {
        if code == ErrorCode::Cancelled || self.skip_on.contains(&code) {
            return false;
        }
        if self.retry_on.is_empty() {
            code.is_retryable()
        } else {
            self.retry_on.contains(&code)
        }
    }

    /// Backoff before retry `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(1u64 << attempt.min(20));
        let jitter = if self.base_delay >= 2 {
            rand::thread_rng().gen_range(0..self.base_delay / 2)
        } else {
            0
        };
        let delay = base.saturating_add(jitter);
        Duration::from_millis(match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        })
    }
}

/// Per-node error-handling policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorHandling {
    /// Driver behavior after retries are exhausted
    pub mode: ErrorMode,

    /// Optional retry policy
    pub retry: Option<RetryConfig>,
}

impl ErrorHandling {
    /// Read the policy from a node's data bag. Absent or malformed bags
    /// yield the default (`stop`, no retries).
    pub fn from_node(node: &Node) -> Self {
        node.data
            .get("errorHandling")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Run one node through its executor, applying the node's retry policy.
///
/// Errors carry the originating node id and, when retries happened, a
/// [`RetryReport`] with one entry per failed attempt.
pub async fn execute_with_retry(
    executor: &dyn NodeExecutor,
    env: &mut ExecEnv<'_>,
    node: &Node,
    cancel: &CancelToken,
) -> Result<NodeOutcome> {
    let policy = ErrorHandling::from_node(node);
    let retry = policy.retry.unwrap_or_default();
    let max_attempts = retry.max_retries + 1;

    let mut history: Vec<RetryAttempt> = Vec::new();

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled().with_node(&node.id));
        }

        match executor.execute(env, node).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                history.push(RetryAttempt {
                    attempt: attempt + 1,
                    error: err.message.clone(),
                    timestamp: chrono::Utc::now(),
                });

                let last = attempt + 1 == max_attempts;
                if last || !retry.should_retry(err.code) {
                    if history.len() > 1 {
                        warn!(
                            node = %node.id,
                            code = %err.code,
                            attempts = history.len(),
                            "node failed after retries"
                        );
                        return Err(err.with_node(&node.id).with_retry(RetryReport {
                            attempts: history.len() as u32,
                            max_attempts,
                            history,
                        }));
                    }
                    return Err(err.with_node(&node.id));
                }

                let delay = retry.backoff_delay(attempt);
                debug!(
                    node = %node.id,
                    code = %err.code,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(EngineError::cancelled().with_node(&node.id));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // max_attempts >= 1, so the loop always returns
    unreachable!("retry loop exited without a result")
}
