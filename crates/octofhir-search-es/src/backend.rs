//! Seam to the external search index.
//!
//! The core never talks to a search engine itself. Callers driving chain
//! resolution, inclusion resolution or a full type search provide an
//! implementation of [`SearchBackend`] that executes the Elasticsearch
//! style request bodies produced by the builder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One request against the index of a single resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendQuery {
    pub resource_type: String,
    pub from: usize,
    pub size: usize,
    /// Count every match instead of stopping at the default threshold
    #[serde(default)]
    pub track_total_hits: bool,
    /// Request body: `query`, `sort`, `fields`, `_source`
    pub body: Value,
}

impl BackendQuery {
    pub fn new(resource_type: impl Into<String>, size: usize, body: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            from: 0,
            size,
            track_total_hits: false,
            body,
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    #[must_use]
    pub fn with_total_hits(mut self) -> Self {
        self.track_total_hits = true;
        self
    }
}

/// Result of a [`BackendQuery`].
///
/// Each hit is the stored resource document. When the request disables
/// `_source`, hits must still carry the projected `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<Value>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn execute(&self, query: BackendQuery) -> Result<SearchHits>;
}
