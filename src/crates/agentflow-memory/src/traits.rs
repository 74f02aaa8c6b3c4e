//! Extensible memory storage trait for custom backend implementations
//!
//! This module defines the **[`MemoryAdapter`]** trait - the abstraction the
//! execution engine uses for long-lived memory. Memory nodes in a workflow
//! query and store entries through this trait; the engine itself never
//! assumes a particular backend. Downstream projects can implement the trait
//! for any storage system (a vector database, SQLite, Redis, a plain file)
//! while keeping workflows portable.
//!
//! # Core Types
//!
//! - [`MemoryAdapter`] - Main trait for storage backend implementation
//! - [`MemoryEntry`] - A single stored item with content and metadata
//! - [`MemoryQuery`] - Query parameters (text, session scope, limit, filter)
//! - [`MemoryMetadata`] - Timestamp, session id, and originating node id
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agentflow_memory::{InMemoryMemoryAdapter, MemoryAdapter, MemoryEntry, MemoryQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let memory = InMemoryMemoryAdapter::new();
//!
//!     memory.store(MemoryEntry::new("User prefers metric units")).await?;
//!
//!     let hits = memory.query(MemoryQuery::new("units").with_limit(5)).await?;
//!     for entry in hits {
//!         println!("{}", entry.content);
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to every stored memory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    /// When the entry was stored
    pub timestamp: Option<DateTime<Utc>>,

    /// Session the entry was stored from
    pub session_id: Option<String>,

    /// Workflow node that produced the entry
    pub node_id: Option<String>,
}

/// A single memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Unique entry id
    pub id: String,

    /// The stored content
    pub content: String,

    /// Entry metadata
    #[serde(default)]
    pub metadata: MemoryMetadata,
}

impl MemoryEntry {
    /// Create a new entry with a generated id and the current timestamp.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: MemoryMetadata {
                timestamp: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Scope the entry to a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.metadata.session_id = Some(session_id.into());
        self
    }

    /// Record the node that produced the entry.
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.metadata.node_id = Some(node_id.into());
        self
    }
}

/// Query parameters for memory retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    /// Free-text query
    pub text: String,

    /// Restrict results to a session
    pub session_id: Option<String>,

    /// Maximum number of entries to return
    pub limit: Option<usize>,

    /// Backend-specific filter expression
    pub filter: Option<serde_json::Value>,
}

impl MemoryQuery {
    /// Create a query for the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Restrict results to a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Limit the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attach a backend-specific filter.
    pub fn with_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Storage backend for workflow memory.
///
/// Implementations must be `Send + Sync`; the engine shares a single adapter
/// across a run behind an `Arc`. Both methods are suspension points - an
/// implementation may perform network or disk I/O.
#[async_trait]
pub trait MemoryAdapter: Send + Sync {
    /// Retrieve entries relevant to the query, most relevant first.
    ///
    /// Relevance is backend-defined; the in-memory implementation performs
    /// case-insensitive substring matching. An empty result is not an error.
    async fn query(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>>;

    /// Persist an entry.
    async fn store(&self, entry: MemoryEntry) -> Result<()>;
}
