//! Preflight graph validation
//!
//! Runs before any node is dispatched. Structural checks (start-node rules,
//! dangling edges, reachability, handle resolution) live here; node-level
//! checks are delegated to each executor's `validate`, so the schema of a
//! node's data bag stays owned by its executor.
//!
//! Errors abort the run before the first dispatch; warnings are surfaced to
//! the caller and otherwise ignored.

use crate::error::ErrorCode;
use crate::executor::ExecutorRegistry;
use crate::graph::{handles, kinds, Workflow};
use crate::index::GraphIndex;
use std::collections::{HashSet, VecDeque};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the run at preflight
    Error,
    /// Surfaced but ignored
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Stable issue code
    pub code: ErrorCode,

    /// Severity
    pub severity: Severity,

    /// Offending node, when applicable
    pub node_id: Option<String>,

    /// Offending edge, when applicable
    pub edge_id: Option<String>,

    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    /// Create an error-severity issue.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            node_id: None,
            edge_id: None,
            message: message.into(),
        }
    }

    /// Create a warning-severity issue.
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            node_id: None,
            edge_id: None,
            message: message.into(),
        }
    }

    /// Attach the offending node.
    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Attach the offending edge.
    pub fn for_edge(mut self, edge_id: impl Into<String>) -> Self {
        self.edge_id = Some(edge_id.into());
        self
    }
}

/// Outcome of a preflight pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// All findings, errors and warnings
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether no error-severity issues were found.
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == Severity::Error)
    }

    /// Error-severity findings.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-severity findings.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }
}

/// Validate a workflow against the structural rules and every node's
/// executor.
pub fn validate_workflow(workflow: &Workflow, registry: &ExecutorRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();
    let index = GraphIndex::build(workflow);

    // Start-node rules
    let starts = workflow.start_nodes();
    match starts.len() {
        0 => report.issues.push(ValidationIssue::error(
            ErrorCode::NoStartNode,
            "workflow has no start node",
        )),
        1 => {}
        n => report.issues.push(ValidationIssue::error(
            ErrorCode::MultipleStartNodes,
            format!("workflow has {n} start nodes"),
        )),
    }

    // Edge endpoints
    for edge in &workflow.edges {
        for endpoint in [&edge.source, &edge.target] {
            if index.node(endpoint).is_none() {
                report.issues.push(
                    ValidationIssue::error(
                        ErrorCode::DanglingEdge,
                        format!("edge '{}' references missing node '{endpoint}'", edge.id),
                    )
                    .for_edge(&edge.id),
                );
            }
        }
    }

    // Reachability from the unique start node
    if let [start] = starts.as_slice() {
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        reachable.insert(start.id.as_str());
        queue.push_back(start.id.as_str());
        while let Some(current) = queue.pop_front() {
            for edge in index.outgoing(current) {
                if reachable.insert(edge.target.as_str()) {
                    queue.push_back(edge.target.as_str());
                }
            }
        }
        for node in &workflow.nodes {
            if !reachable.contains(node.id.as_str()) {
                report.issues.push(
                    ValidationIssue::error(
                        ErrorCode::DisconnectedNode,
                        format!("node '{}' is not reachable from start", node.id),
                    )
                    .for_node(&node.id),
                );
            }
        }
    }

    // Handle resolution
    for edge in &workflow.edges {
        let Some(handle) = edge.source_handle.as_deref() else {
            continue;
        };
        let Some(source) = index.node(&edge.source) else {
            continue; // already reported as dangling
        };
        if handle == handles::ERROR {
            continue;
        }
        let static_ok = source.kind == kinds::WHILE_LOOP
            && (handle == handles::BODY || handle == handles::DONE);
        let dynamic_ok = registry
            .resolve(&source.kind)
            .dynamic_handles(source)
            .iter()
            .any(|h| h.id == handle);
        if !static_ok && !dynamic_ok {
            report.issues.push(
                ValidationIssue::error(
                    ErrorCode::UnknownHandle,
                    format!(
                        "edge '{}' uses handle '{handle}' not exposed by node '{}'",
                        edge.id, source.id
                    ),
                )
                .for_edge(&edge.id),
            );
        }
    }

    // Duplicate (source, sourceHandle) pairs on routers
    let mut seen: HashSet<(&str, Option<&str>)> = HashSet::new();
    for edge in &workflow.edges {
        let is_router = index
            .node(&edge.source)
            .map(|n| n.kind == kinds::ROUTER)
            .unwrap_or(false);
        if !is_router {
            continue;
        }
        let key = (edge.source.as_str(), edge.source_handle.as_deref());
        if !seen.insert(key) {
            report.issues.push(
                ValidationIssue::warning(
                    ErrorCode::DuplicateSourceHandle,
                    format!(
                        "router '{}' has multiple edges on handle '{}'",
                        edge.source,
                        edge.source_handle.as_deref().unwrap_or("(default)")
                    ),
                )
                .for_edge(&edge.id),
            );
        }
    }

    // Per-executor node validation
    for node in &workflow.nodes {
        report
            .issues
            .extend(registry.resolve(&node.kind).validate(node, workflow));
    }

    report
}
