//! Per-page ingestion: prepare the full chunk set, then swap it in

use super::{SyncReconciler, SyncStats};
use crate::embed::embed_in_batches;
use crate::error::{Error, Result};
use crate::metadata;
use crate::source::{AttachmentDescriptor, ContentItem, PageContent};
use crate::store::{FieldFilter, IndexRecord};
use tracing::{debug, warn};

/// Everything that replaces one page in the index
pub(crate) struct PreparedPage {
    pub id: String,
    pub records: Vec<IndexRecord>,
    pub attachments_indexed: usize,
    pub attachments_skipped: usize,
}

impl SyncReconciler {
    /// Build and embed the page plus its supported attachments.
    ///
    /// Nothing touches the index here, so a failure leaves the stored
    /// generation as it was.
    pub(crate) async fn prepare_page(&self, content: PageContent) -> Result<PreparedPage> {
        let id = content.id.clone();
        let hierarchy = self
            .retry
            .run("fetch hierarchy", || self.source.fetch_hierarchy(&id))
            .await?;
        let page = ContentItem::page(content, hierarchy);

        let descriptors = self
            .retry
            .run("list attachments", || self.source.fetch_attachments(&id))
            .await?;

        let mut items = Vec::with_capacity(descriptors.len() + 1);
        let mut attachments_indexed = 0;
        let mut attachments_skipped = 0;
        for descriptor in &descriptors {
            match self.attachment_item(descriptor, &page).await {
                Some(item) => {
                    attachments_indexed += 1;
                    items.push(item);
                }
                None => attachments_skipped += 1,
            }
        }
        items.insert(0, page);

        let chunks = self.chunker.process(&items);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(self.index.embedder(), texts, self.batch_size).await?;
        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector))
            .collect();

        Ok(PreparedPage {
            id,
            records,
            attachments_indexed,
            attachments_skipped,
        })
    }

    /// Fetch and extract one attachment; `None` means skipped
    async fn attachment_item(
        &self,
        descriptor: &AttachmentDescriptor,
        page: &ContentItem,
    ) -> Option<ContentItem> {
        let Some(format) = descriptor.format() else {
            debug!(
                "Skipping attachment '{}' on page {}: unsupported type",
                descriptor.title, page.id
            );
            return None;
        };

        let bytes = match self
            .retry
            .run("download attachment", || {
                self.source.fetch_attachment_bytes(descriptor)
            })
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping attachment '{}': {}", descriptor.title, e);
                return None;
            }
        };

        let extractor = self.extractor.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes, format))
            .await
            .map_err(|e| Error::Extraction(format!("Extraction task failed: {}", e)))
            .and_then(|r| r);

        match extracted {
            Ok(text) if text.trim().is_empty() => {
                debug!("Skipping attachment '{}': no text", descriptor.title);
                None
            }
            Ok(text) => Some(ContentItem::attachment(
                descriptor,
                page,
                self.source.attachment_link(descriptor),
                text,
            )),
            Err(e) => {
                warn!("Skipping attachment '{}': {}", descriptor.title, e);
                None
            }
        }
    }

    /// Replace whatever is stored for the page with the prepared set
    pub(crate) async fn apply_page(&self, prepared: PreparedPage, stats: &mut SyncStats) -> Result<()> {
        let _guard = self.locks.acquire(&prepared.id).await;

        self.delete_unlocked(&prepared.id).await?;

        let written = prepared.records.len();
        if written > 0 {
            self.index.upsert(prepared.records).await?;
        }

        stats.chunks_written += written;
        stats.attachments_indexed += prepared.attachments_indexed;
        stats.attachments_skipped += prepared.attachments_skipped;
        debug!("Wrote {} chunks for page {}", written, prepared.id);
        Ok(())
    }

    /// Remove a page and everything hanging off it
    pub(crate) async fn delete_item(&self, id: &str) -> Result<usize> {
        let _guard = self.locks.acquire(id).await;
        self.delete_unlocked(id).await
    }

    async fn delete_unlocked(&self, id: &str) -> Result<usize> {
        let own = self
            .index
            .delete_where(&FieldFilter::eq(metadata::CONTENT_ID, id))
            .await?;
        let children = self
            .index
            .delete_where(&FieldFilter::eq(metadata::PARENT_ID, id))
            .await?;
        Ok(own + children)
    }
}
