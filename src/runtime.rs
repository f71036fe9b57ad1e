//! Wiring of one configured profile into concrete components

use crate::answer::AnswerEngine;
use crate::chunk::Chunker;
use crate::config::{Config, ProfileConfig};
use crate::embed::create_embedder;
use crate::error::Result;
use crate::extract::{DocumentExtractor, TextExtractor};
use crate::generate::{Generator, HttpGenerator};
use crate::retrieval::RetrievalEngine;
use crate::retry::RetryPolicy;
use crate::source::{ConfluenceSource, ContentSource};
use crate::store::QdrantIndex;
use crate::sync::{IdLocks, SyncReconciler};
use std::sync::Arc;
use tracing::debug;

/// Components for one profile.
///
/// Reconcilers built from the same runtime share one [`IdLocks`] table.
pub struct Runtime {
    config: Config,
    profile_name: String,
    profile: ProfileConfig,
    source: Arc<dyn ContentSource>,
    index: Arc<QdrantIndex>,
    extractor: Arc<dyn TextExtractor>,
    locks: IdLocks,
}

impl Runtime {
    /// Build the components; no network traffic happens here
    pub fn new(config: &Config, profile: Option<&str>) -> Result<Self> {
        let (profile_name, profile) = config.profile(profile)?;
        debug!(
            "Using profile {} (collection {})",
            profile_name, profile.collection_name
        );

        let embedder = create_embedder(&config.embedding)?;
        let index = QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            &profile.collection_name,
            embedder,
        )?;
        let source = ConfluenceSource::new(&profile.source)?;

        Ok(Self {
            config: config.clone(),
            profile_name: profile_name.to_string(),
            profile: profile.clone(),
            source: Arc::new(source),
            index: Arc::new(index),
            extractor: Arc::new(DocumentExtractor),
            locks: IdLocks::new(),
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn profile(&self) -> &ProfileConfig {
        &self.profile
    }

    pub fn index(&self) -> &Arc<QdrantIndex> {
        &self.index
    }

    /// Create the collection if needed and check its vector size
    pub async fn prepare_index(&self) -> Result<()> {
        self.index.ensure_collection().await
    }

    pub fn reconciler(&self) -> SyncReconciler {
        SyncReconciler::new(
            self.source.clone(),
            self.index.clone(),
            self.extractor.clone(),
            self.profile.source.spaces.clone(),
        )
        .with_chunker(Chunker::from_config(&self.config.chunk))
        .with_retry(RetryPolicy::from_config(&self.config.sync))
        .with_locks(self.locks.clone())
        .with_window_days(self.config.sync.incremental_window_days)
        .with_batch_size(self.config.embedding.batch_size)
    }

    pub fn retrieval(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.index.clone(), self.source.clone())
            .with_expansion_k(self.config.query.expansion_k)
    }

    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        Ok(Arc::new(HttpGenerator::new(&self.config.generation)?))
    }

    /// Answer engine with `k` first-pass chunks (configured default if `None`)
    pub fn answer_engine(&self, k: Option<usize>) -> Result<AnswerEngine> {
        Ok(AnswerEngine::new(self.retrieval(), self.generator()?)
            .with_k(k.unwrap_or(self.config.query.k)))
    }
}
