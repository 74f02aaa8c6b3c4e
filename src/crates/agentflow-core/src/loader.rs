//! Workflow JSON loader
//!
//! Deserializes the UTF-8 JSON serialization of a workflow - top-level
//! `{meta, nodes, edges}` - and normalizes its schema version. Version
//! `1.x` documents are accepted and upgraded in place to the current
//! `2.0.0`; the engine itself only ever sees the current shape.

use crate::error::{EngineError, ErrorCode, Result};
use crate::graph::Workflow;

/// Schema version the loader normalizes to.
pub const CURRENT_VERSION: &str = "2.0.0";

/// Load a workflow from a JSON string.
pub fn from_json(json: &str) -> Result<Workflow> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        EngineError::new(ErrorCode::Validation, format!("workflow is not valid JSON: {e}"))
    })?;
    from_value(value)
}

/// Load a workflow from a parsed JSON value.
pub fn from_value(value: serde_json::Value) -> Result<Workflow> {
    let mut workflow: Workflow = serde_json::from_value(value).map_err(|e| {
        EngineError::new(
            ErrorCode::Validation,
            format!("workflow does not match the expected shape: {e}"),
        )
    })?;

    let version = workflow.meta.version.clone();
    if version.starts_with("1.") {
        tracing::debug!(from = %version, to = CURRENT_VERSION, "upgrading workflow version");
        workflow.meta.version = CURRENT_VERSION.to_string();
    } else if !version.starts_with("2.") {
        return Err(EngineError::new(
            ErrorCode::Validation,
            format!("unsupported workflow version '{version}'"),
        ));
    }

    Ok(workflow)
}
