//! # agentflow-memory - Memory Abstractions for Workflow Execution
//!
//! **Trait-based memory abstractions and an in-memory implementation** for
//! agentflow workflows. Memory nodes in a workflow graph read and write
//! long-lived context through the [`MemoryAdapter`] trait; this crate defines
//! that trait together with the entry/query types and ships
//! [`InMemoryMemoryAdapter`] as a reference backend.
//!
//! ## Overview
//!
//! - [`MemoryAdapter`] - storage backend trait (`query` / `store`)
//! - [`MemoryEntry`] / [`MemoryQuery`] / [`MemoryMetadata`] - data types
//! - [`InMemoryMemoryAdapter`] - thread-safe in-process backend
//! - [`MemoryError`] - error type for memory operations
//!
//! Production deployments implement [`MemoryAdapter`] over their preferred
//! store (vector database, SQL, key-value); the engine only depends on the
//! trait.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{MemoryError, Result};
pub use memory::InMemoryMemoryAdapter;
pub use traits::{MemoryAdapter, MemoryEntry, MemoryMetadata, MemoryQuery};
