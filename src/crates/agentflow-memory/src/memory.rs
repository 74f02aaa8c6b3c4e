//! In-memory memory adapter for development and testing
//!
//! This module provides **[`InMemoryMemoryAdapter`]** - a reference
//! implementation of the [`MemoryAdapter`] trait backed by a thread-safe
//! `Vec`. Entries live for the lifetime of the process; matching is a
//! case-insensitive substring scan. Use it for development, tests, and
//! short-lived workflows; production deployments should implement
//! [`MemoryAdapter`] over a real store.

use crate::error::Result;
use crate::traits::{MemoryAdapter, MemoryEntry, MemoryQuery};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory implementation of [`MemoryAdapter`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryMemoryAdapter {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryMemoryAdapter {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all entries. Intended for test isolation.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl MemoryAdapter for InMemoryMemoryAdapter {
    async fn query(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        let needle = query.text.to_lowercase();

        let mut hits: Vec<MemoryEntry> = entries
            .iter()
            .filter(|e| {
                if let Some(session) = &query.session_id {
                    if e.metadata.session_id.as_deref() != Some(session.as_str()) {
                        return false;
                    }
                }
                needle.is_empty() || e.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        // Most recent entries first
        hits.reverse();

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn store(&self, entry: MemoryEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_query() {
        let memory = InMemoryMemoryAdapter::new();

        memory
            .store(MemoryEntry::new("the sky is blue"))
            .await
            .unwrap();
        memory
            .store(MemoryEntry::new("grass is green"))
            .await
            .unwrap();

        let hits = memory.query(MemoryQuery::new("sky")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "the sky is blue");
    }

    #[tokio::test]
    async fn test_query_empty_text_returns_all() {
        let memory = InMemoryMemoryAdapter::new();
        memory.store(MemoryEntry::new("a")).await.unwrap();
        memory.store(MemoryEntry::new("b")).await.unwrap();

        let hits = memory.query(MemoryQuery::new("")).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_query_most_recent_first() {
        let memory = InMemoryMemoryAdapter::new();
        memory.store(MemoryEntry::new("note one")).await.unwrap();
        memory.store(MemoryEntry::new("note two")).await.unwrap();

        let hits = memory.query(MemoryQuery::new("note")).await.unwrap();
        assert_eq!(hits[0].content, "note two");
        assert_eq!(hits[1].content, "note one");
    }

    #[tokio::test]
    async fn test_session_scoping() {
        let memory = InMemoryMemoryAdapter::new();
        memory
            .store(MemoryEntry::new("shared fact").with_session("s1"))
            .await
            .unwrap();
        memory
            .store(MemoryEntry::new("shared fact").with_session("s2"))
            .await
            .unwrap();

        let hits = memory
            .query(MemoryQuery::new("fact").with_session("s1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_limit() {
        let memory = InMemoryMemoryAdapter::new();
        for i in 0..10 {
            memory
                .store(MemoryEntry::new(format!("entry {i}")))
                .await
                .unwrap();
        }

        let hits = memory
            .query(MemoryQuery::new("entry").with_limit(3))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_clear() {
        let memory = InMemoryMemoryAdapter::new();
        memory.store(MemoryEntry::new("x")).await.unwrap();
        memory.clear().await;
        assert!(memory.is_empty().await);
    }
}
