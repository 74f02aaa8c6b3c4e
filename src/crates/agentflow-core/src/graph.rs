//! Workflow graph representation
//!
//! A [`Workflow`] is the immutable input to a run: a set of typed nodes and
//! an ordered list of edges connecting named output ports (handles). The
//! engine never mutates the graph; layout hints (`position`) are carried but
//! ignored.
//!
//! Node `data` is kept as raw JSON here. Each executor owns the schema of
//! its own node kind and deserializes the bag into its typed form at
//! validation/execution time, so unknown node types can be represented
//! without crashing the engine - they simply fail preflight validation.
//!
//! # Example
//!
//! ```rust
//! use agentflow_core::graph::{Edge, Node, Workflow};
//! use serde_json::json;
//!
//! let workflow = Workflow::new("greeter")
//!     .with_node(Node::new("start-1", "start", json!({"label": "Start"})))
//!     .with_node(Node::new("agent-1", "agent", json!({
//!         "label": "Greeter",
//!         "model": "gpt-4o-mini",
//!         "prompt": "You are helpful.",
//!     })))
//!     .with_edge(Edge::new("e1", "start-1", "agent-1"));
//!
//! assert_eq!(workflow.nodes.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

/// Node kind names built into the engine.
pub mod kinds {
    /// Entry node, exactly one per workflow
    pub const START: &str = "start";
    /// Reasoning node with streaming and tool loop
    pub const AGENT: &str = "agent";
    /// Classification node selecting one outgoing handle
    pub const ROUTER: &str = "router";
    /// Concurrent fan-out node with optional merge
    pub const PARALLEL: &str = "parallel";
    /// Bounded loop over a body subgraph
    pub const WHILE_LOOP: &str = "whileLoop";
    /// Host-provided tool invocation
    pub const TOOL: &str = "tool";
    /// Memory adapter query/store
    pub const MEMORY: &str = "memory";
    /// Nested workflow invocation
    pub const SUBFLOW: &str = "subflow";
    /// Terminal output node with template
    pub const OUTPUT: &str = "output";
}

/// Well-known handle names.
pub mod handles {
    /// Error-routing handle consulted when a node fails with mode `branch`
    pub const ERROR: &str = "error";
    /// Loop body handle of a `whileLoop` node
    pub const BODY: &str = "body";
    /// Loop exit handle of a `whileLoop` node
    pub const DONE: &str = "done";
}

/// Workflow metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMeta {
    /// Schema version of the serialized form
    pub version: String,

    /// Workflow name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for WorkflowMeta {
    fn default() -> Self {
        Self {
            version: crate::loader::CURRENT_VERSION.to_string(),
            name: String::new(),
            description: None,
        }
    }
}

/// Opaque editor layout hint. Unused by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single node of the authored graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique non-empty id
    pub id: String,

    /// Node kind; one of [`kinds`] or a registered extension name
    #[serde(rename = "type")]
    pub kind: String,

    /// Layout hint, ignored at runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Kind-specific attribute bag; schema owned by the node's executor
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Node {
    /// Create a node.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: None,
            data,
        }
    }

    /// The node's display label, falling back to its id.
    ///
    /// Non-string `label` values are treated as absent.
    pub fn label(&self) -> &str {
        self.data
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.id)
    }
}

/// A directed edge between two node ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique edge id
    pub id: String,

    /// Source node id
    pub source: String,

    /// Target node id
    pub target: String,

    /// Logical outgoing port; `None` means the single default port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    /// Logical incoming port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,

    /// Optional display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Create an edge on the default handle.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: None,
        }
    }

    /// Set the source handle.
    pub fn on_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// An immutable workflow graph: metadata, nodes, and ordered edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow metadata
    #[serde(default)]
    pub meta: WorkflowMeta,

    /// Graph nodes, keyed by unique id
    pub nodes: Vec<Node>,

    /// Ordered edges; declaration order is the traversal tie-break
    pub edges: Vec<Edge>,
}

impl Workflow {
    /// Create an empty workflow with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: WorkflowMeta {
                name: name.into(),
                ..Default::default()
            },
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node (builder style).
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge (builder style).
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes of kind `start`, in declaration order.
    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.kind == kinds::START).collect()
    }
}
