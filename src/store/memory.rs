//! In-process vector index

use super::{CollectionStats, FieldFilter, IndexRecord, StoredChunk, VectorIndex};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// [`VectorIndex`] kept in memory, with exact cosine search
pub struct MemoryIndex {
    name: String,
    records: RwLock<BTreeMap<Uuid, IndexRecord>>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryIndex {
    pub fn new(name: &str, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.to_string(),
            records: RwLock::new(BTreeMap::new()),
            embedder,
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every stored record, ordered by id
    pub async fn snapshot(&self) -> Vec<StoredChunk> {
        self.records.read().await.values().map(to_stored).collect()
    }
}

fn to_stored(record: &IndexRecord) -> StoredChunk {
    StoredChunk {
        id: record.id.to_string(),
        text: record.text.clone(),
        metadata: record.metadata.clone(),
        score: None,
    }
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()> {
        let dimension = self.embedder.dimension();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(Error::Index(format!(
                "Vector dimension mismatch for '{}': expected {}, got {}",
                self.name,
                dimension,
                bad.vector.len()
            )));
        }

        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.id, record);
        }
        Ok(())
    }

    async fn delete_where(&self, filter: &FieldFilter) -> Result<usize> {
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|_, r| !filter.matches(&r.metadata));
        Ok(before - store.len())
    }

    async fn query_by_vector(&self, vector: Vec<f32>, k: usize) -> Result<Vec<StoredChunk>> {
        let store = self.records.read().await;
        let mut scored: Vec<(f32, &IndexRecord)> = store
            .values()
            .map(|r| (cosine_similarity(&vector, &r.vector), r))
            .collect();
        // Stable sort keeps id order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, r)| StoredChunk {
                score: Some(score),
                ..to_stored(r)
            })
            .collect())
    }

    async fn get_where(&self, filter: &FieldFilter, limit: Option<usize>) -> Result<Vec<StoredChunk>> {
        let store = self.records.read().await;
        Ok(store
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .take(limit.unwrap_or(usize::MAX))
            .map(to_stored)
            .collect())
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn stats(&self) -> Result<Option<CollectionStats>> {
        Ok(Some(CollectionStats {
            collection: self.name.clone(),
            points_count: self.len().await as u64,
            status: "InMemory".to_string(),
        }))
    }
}
