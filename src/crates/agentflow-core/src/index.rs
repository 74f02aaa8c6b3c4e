//! Graph index - O(1) node and edge lookups
//!
//! Built once per run from the immutable [`Workflow`]. The index classifies
//! edges by `(source, sourceHandle)` and preserves declaration order inside
//! each bucket, which is the tie-break the traversal driver relies on. When
//! several edges share the same source handle all of them are honored; this
//! is how parallel nodes and fan-out routers express multiple successors.
//!
//! Construction is O(V + E); every lookup afterwards is O(1) in the number
//! of nodes (handle buckets are small vectors).

use crate::graph::{Edge, Node, Workflow};
use std::collections::HashMap;

/// Per-run lookup structure over a workflow graph.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    nodes: HashMap<&'a str, &'a Node>,
    /// Outgoing edges per source, in declaration order
    outgoing: HashMap<&'a str, Vec<&'a Edge>>,
    /// Incoming edges per target, in declaration order
    incoming: HashMap<&'a str, Vec<&'a Edge>>,
}

impl<'a> GraphIndex<'a> {
    /// Build the index from a workflow.
    pub fn build(workflow: &'a Workflow) -> Self {
        let mut nodes = HashMap::with_capacity(workflow.nodes.len());
        for node in &workflow.nodes {
            nodes.insert(node.id.as_str(), node);
        }

        let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut incoming: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &workflow.edges {
            outgoing.entry(edge.source.as_str()).or_default().push(edge);
            incoming.entry(edge.target.as_str()).or_default().push(edge);
        }

        Self {
            nodes,
            outgoing,
            incoming,
        }
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.nodes.get(id).copied()
    }

    /// All outgoing edges of a node, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> &[&'a Edge] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outgoing edges on a specific handle, in declaration order.
    ///
    /// `None` selects the default port (edges without a `sourceHandle`).
    pub fn outgoing_on_handle(&self, node_id: &str, handle: Option<&str>) -> Vec<&'a Edge> {
        self.outgoing(node_id)
            .iter()
            .filter(|e| e.source_handle.as_deref() == handle)
            .copied()
            .collect()
    }

    /// Whether the node has at least one edge on the given handle.
    pub fn has_outgoing(&self, node_id: &str, handle: Option<&str>) -> bool {
        self.outgoing(node_id)
            .iter()
            .any(|e| e.source_handle.as_deref() == handle)
    }

    /// All incoming edges of a node, in declaration order.
    pub fn incoming(&self, node_id: &str) -> &[&'a Edge] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }
}
