//! Output node - terminal template rendering

use crate::error::{EngineError, ErrorCode, Result};
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::{kinds, Node, Workflow};
use crate::validate::ValidationIssue;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Post-processing applied to the rendered template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Rendered text as-is
    Text,
    /// Parsed as JSON, optionally validated against a schema
    Json,
    /// Rendered text, markdown by convention
    Markdown,
}

/// Data bag of an `output` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputNodeData {
    /// Display label
    #[serde(default)]
    pub label: String,

    /// Output format
    pub format: OutputFormat,

    /// Template with `{{nodeId}}` placeholders; defaults to `{{output}}`
    /// (the current input)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Append run metadata (session id, node chain)
    #[serde(default)]
    pub include_metadata: bool,

    /// JSON Schema the parsed `json` output must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Executor for terminal `output` nodes.
///
/// Substitutes `{{<nodeId>}}` placeholders with recorded outputs, leaving
/// unresolved placeholders literal, then applies the format. The `json`
/// format parses the rendered string and, when a non-empty schema is
/// attached, validates the parsed value against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputExecutor;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.:-]+)\s*\}\}").expect("valid regex"))
}

/// Render a template against recorded outputs.
///
/// `{{output}}` resolves to the current input; `{{<nodeId>}}` resolves to
/// that node's recorded output; anything else stays literal.
pub(crate) fn render_template(
    template: &str,
    current_input: &str,
    outputs: &HashMap<String, String>,
) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            if key == "output" {
                current_input.to_string()
            } else if let Some(value) = outputs.get(key) {
                value.clone()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

impl OutputExecutor {
    fn data(node: &Node) -> Result<OutputNodeData> {
        serde_json::from_value(node.data.clone()).map_err(|e| {
            EngineError::new(
                ErrorCode::Validation,
                format!("invalid output node data: {e}"),
            )
        })
    }

    fn schema_of(data: &OutputNodeData) -> Option<&serde_json::Value> {
        data.schema.as_ref().filter(|s| {
            !s.is_null() && s.as_object().map(|o| !o.is_empty()).unwrap_or(true)
        })
    }
}

#[async_trait]
impl NodeExecutor for OutputExecutor {
    fn kind(&self) -> &'static str {
        kinds::OUTPUT
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Output", "format": "text"})
    }

    fn validate(&self, node: &Node, _workflow: &Workflow) -> Vec<ValidationIssue> {
        let data = match Self::data(node) {
            Ok(data) => data,
            Err(e) => {
                return vec![
                    ValidationIssue::error(ErrorCode::Validation, e.message).for_node(&node.id)
                ]
            }
        };

        let mut issues = Vec::new();
        if let Some(schema) = Self::schema_of(&data) {
            if jsonschema::JSONSchema::compile(schema).is_err() {
                issues.push(
                    ValidationIssue::error(
                        ErrorCode::Validation,
                        format!("output node '{}' has an invalid JSON schema", node.id),
                    )
                    .for_node(&node.id),
                );
            }
        }
        issues
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, node: &Node) -> Result<NodeOutcome> {
        let data = Self::data(node)?;

        let template = data.template.as_deref().unwrap_or("{{output}}");
        let mut rendered = render_template(template, &env.ctx.input.text, &env.ctx.outputs);

        if data.format == OutputFormat::Json {
            let parsed: std::result::Result<serde_json::Value, _> =
                serde_json::from_str(&rendered);
            match (parsed, Self::schema_of(&data)) {
                (Ok(value), Some(schema)) => {
                    let compiled = jsonschema::JSONSchema::compile(schema).map_err(|e| {
                        EngineError::new(
                            ErrorCode::OutputSchemaInvalid,
                            format!("output schema does not compile: {e}"),
                        )
                    })?;
                    if !compiled.is_valid(&value) {
                        return Err(EngineError::new(
                            ErrorCode::OutputSchemaInvalid,
                            "rendered output does not satisfy the attached schema",
                        ));
                    }
                }
                (Err(e), Some(_)) => {
                    return Err(EngineError::new(
                        ErrorCode::OutputSchemaInvalid,
                        format!("rendered output is not valid JSON: {e}"),
                    ));
                }
                _ => {}
            }
        }

        if data.include_metadata {
            rendered.push_str(&format!(
                "\n\n---\nsession: {}\nnodes: {}",
                env.ctx.session.id,
                env.ctx.node_chain.join(" -> ")
            ));
        }

        Ok(NodeOutcome::output(rendered))
    }
}
