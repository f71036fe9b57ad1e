//! Vector index abstraction
//!
//! This module provides:
//! - The [`VectorIndex`] trait used by the reconciler and retrieval engine
//! - A Qdrant-backed index for production use
//! - An in-process index for tests and dry runs
//!
//! Metadata values are scalars only (see [`crate::metadata`]).

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::chunk::Chunk;
use crate::embed::{embed_query, Embedder};
use crate::error::Result;
use crate::metadata::{Metadata, ScalarValue};
use async_trait::async_trait;
use uuid::Uuid;

/// A chunk ready to be written to the index
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl IndexRecord {
    pub fn new(
        content_id: &str,
        chunk_index: usize,
        vector: Vec<f32>,
        text: String,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: point_id(content_id, chunk_index),
            vector,
            text,
            metadata,
        }
    }

    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self::new(
            &chunk.content_id,
            chunk.chunk_index,
            vector,
            chunk.text,
            chunk.metadata,
        )
    }
}

/// Deterministic point id for a chunk
pub fn point_id(content_id: &str, chunk_index: usize) -> Uuid {
    let name = format!("{}:{}", content_id, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// A record as read back from the index
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Similarity score (vector queries only)
    pub score: Option<f32>,
}

impl StoredChunk {
    pub fn title(&self) -> Option<&str> {
        self.metadata.title()
    }
}

/// Conjunction of `field == value` conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    conditions: Vec<(String, ScalarValue)>,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, ScalarValue)] {
        &self.conditions
    }

    /// Whether `metadata` satisfies every condition
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

/// Collection statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection: String,
    pub points_count: u64,
    pub status: String,
}

/// Trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()>;

    /// Delete every record matching `filter`, returning how many were removed
    async fn delete_where(&self, filter: &FieldFilter) -> Result<usize>;

    /// Nearest neighbours of `vector`, best first
    async fn query_by_vector(&self, vector: Vec<f32>, k: usize) -> Result<Vec<StoredChunk>>;

    /// Records matching `filter`, up to `limit` if given
    async fn get_where(&self, filter: &FieldFilter, limit: Option<usize>) -> Result<Vec<StoredChunk>>;

    /// Embedder used for text queries
    fn embedder(&self) -> &dyn Embedder;

    /// Collection statistics, `None` if the collection does not exist yet
    async fn stats(&self) -> Result<Option<CollectionStats>>;

    /// Nearest neighbours of `text`, best first
    async fn query_by_text(&self, text: &str, k: usize) -> Result<Vec<StoredChunk>> {
        let vector = embed_query(self.embedder(), text).await?;
        self.query_by_vector(vector, k).await
    }
}
