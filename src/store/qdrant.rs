//! Qdrant vector database integration

use super::{
    stored_chunk_from_payload, to_qdrant_filter, CollectionStats, FieldFilter, IndexRecord,
    StoredChunk, VectorIndex,
};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::metadata;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, GetCollectionInfoResponse, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::sync::Arc;
use tracing::{debug, info};

/// Payload fields the reconciler filters on
const KEYWORD_FIELDS: [&str; 4] = [
    metadata::CONTENT_ID,
    metadata::PARENT_ID,
    metadata::SPACE,
    metadata::KIND,
];

/// Scroll page size
const SCROLL_BATCH: u32 = 256;

/// Qdrant-backed [`VectorIndex`]
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    /// Create a new index handle; no network traffic happens here
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Expected vector dimension for this collection
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Ensure the collection exists with the right vector size and payload indexes
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            let info = self.client.collection_info(&self.collection).await?;
            if let Some(size) = vector_size(&info) {
                if size as usize != self.dimension() {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but model '{}' produces {}. Use a new collection name or re-sync with the matching model.",
                        self.collection,
                        size,
                        self.embedder.model_name(),
                        self.dimension()
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection,
            self.dimension()
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension() as u64, Distance::Cosine),
                ),
            )
            .await?;

        for field in KEYWORD_FIELDS {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(&self.collection, field, FieldType::Keyword)
                        .wait(true),
                )
                .await?;
        }

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn count_where(&self, filter: &FieldFilter) -> Result<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(to_qdrant_filter(filter)?)
                    .exact(true),
            )
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

fn vector_size(info: &GetCollectionInfoResponse) -> Option<u64> {
    use qdrant_client::qdrant::vectors_config::Config;

    let params = info.result.as_ref()?.config.as_ref()?.params.as_ref()?;
    match params.vectors_config.as_ref()?.config.as_ref()? {
        Config::Params(p) => Some(p.size),
        Config::ParamsMap(_) => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let dimension = self.dimension();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                dimension,
                bad.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            records.len(),
            self.collection
        );

        let points: Vec<PointStruct> = records.into_iter().map(|r| r.to_point_struct()).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn delete_where(&self, filter: &FieldFilter) -> Result<usize> {
        let count = self.count_where(filter).await?;
        if count == 0 {
            return Ok(0);
        }

        debug!("Deleting {} points matching {:?}", count, filter);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(to_qdrant_filter(filter)?)
                    .wait(true),
            )
            .await?;
        Ok(count as usize)
    }

    async fn query_by_vector(&self, vector: Vec<f32>, k: usize) -> Result<Vec<StoredChunk>> {
        debug!("Searching collection {} with limit {}", self.collection, k);

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, k as u64).with_payload(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| stored_chunk_from_payload(p.id, p.payload, Some(p.score)))
            .collect())
    }

    async fn get_where(&self, filter: &FieldFilter, limit: Option<usize>) -> Result<Vec<StoredChunk>> {
        let qdrant_filter = to_qdrant_filter(filter)?;
        let mut chunks = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let batch = match limit {
                Some(l) => l.saturating_sub(chunks.len()).min(SCROLL_BATCH as usize) as u32,
                None => SCROLL_BATCH,
            };
            if batch == 0 {
                break;
            }

            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .filter(qdrant_filter.clone())
                .limit(batch)
                .with_payload(true)
                .with_vectors(false);
            if let Some(o) = offset.take() {
                builder = builder.offset(o);
            }

            let response = self.client.scroll(builder).await?;
            chunks.extend(
                response
                    .result
                    .into_iter()
                    .map(|p| stored_chunk_from_payload(p.id, p.payload, None)),
            );

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(chunks)
    }

    fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    async fn stats(&self) -> Result<Option<CollectionStats>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|r| CollectionStats {
            collection: self.collection.clone(),
            points_count: r.points_count.unwrap_or(0),
            status: format!("{:?}", r.status()),
        }))
    }
}
