//! Similarity retrieval with structural context expansion

use crate::error::Result;
use crate::metadata;
use crate::source::ContentSource;
use crate::store::{FieldFilter, StoredChunk, VectorIndex};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default similarity hits per ancestor title
pub const DEFAULT_EXPANSION_K: usize = 2;

/// Finds context chunks for a question
pub struct RetrievalEngine {
    index: Arc<dyn VectorIndex>,
    source: Arc<dyn ContentSource>,
    expansion_k: usize,
}

impl RetrievalEngine {
    pub fn new(index: Arc<dyn VectorIndex>, source: Arc<dyn ContentSource>) -> Self {
        Self {
            index,
            source,
            expansion_k: DEFAULT_EXPANSION_K,
        }
    }

    pub fn with_expansion_k(mut self, expansion_k: usize) -> Self {
        self.expansion_k = expansion_k.max(1);
        self
    }

    /// Top `k` chunks for `query`, best first.
    ///
    /// Index failures are logged and yield no context.
    pub async fn retrieve_context(&self, query: &str, k: usize) -> Vec<StoredChunk> {
        match self.index.query_by_text(query, k).await {
            Ok(chunks) => {
                debug!("Retrieved {} chunk(s)", chunks.len());
                chunks
            }
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Extra chunks from the ancestors and direct children of the pages
    /// behind `chunks`.
    ///
    /// Ancestors are matched by exact title among similarity hits for that
    /// title; titles are not unique, so this can pick up a namesake page.
    /// Returned chunks never repeat a record already in `chunks`.
    pub async fn expand_context(&self, chunks: &[StoredChunk]) -> Result<Vec<StoredChunk>> {
        let mut seen: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let mut processed: HashSet<String> = HashSet::new();
        let mut expanded = Vec::new();

        for chunk in chunks {
            let Some(page_id) = chunk.metadata.effective_id() else {
                continue;
            };
            if !processed.insert(page_id.to_string()) {
                continue;
            }

            for ancestor in chunk.metadata.hierarchy() {
                let hits = self.index.query_by_text(&ancestor, self.expansion_k).await?;
                for hit in hits {
                    if hit.title() == Some(ancestor.as_str()) && seen.insert(hit.id.clone()) {
                        expanded.push(hit);
                    }
                }
            }

            let children = match self.source.fetch_children(page_id).await {
                Ok(children) => children,
                Err(e) => {
                    warn!("Skipping children of page {}: {}", page_id, e);
                    continue;
                }
            };
            for child in children {
                if processed.contains(&child.id) {
                    continue;
                }
                let representative = self
                    .index
                    .get_where(&FieldFilter::eq(metadata::CONTENT_ID, child.id.as_str()), Some(1))
                    .await?;
                if let Some(hit) = representative.into_iter().next() {
                    processed.insert(child.id);
                    if seen.insert(hit.id.clone()) {
                        expanded.push(hit);
                    }
                }
            }
        }

        debug!("Expansion added {} chunk(s)", expanded.len());
        Ok(expanded)
    }
}
