//! Source-to-index reconciliation
//!
//! The index is the only state: the stored generation of each page is read
//! back from chunk metadata, diffed against the source, and pages are then
//! deleted, added or replaced. Replacements prepare and embed the complete
//! new chunk set before anything stored is removed.

mod ingest;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::error::Result;
use crate::extract::TextExtractor;
use crate::metadata;
use crate::progress::ItemProgress;
use crate::retry::RetryPolicy;
use crate::source::{ContentSource, PageContent};
use crate::store::{FieldFilter, VectorIndex};
use chrono::{Duration as ChronoDuration, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Reconciliation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Diff every page id in every space
    Full,
    /// Per-space deletions plus pages modified inside the trailing window
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Counters for one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub spaces: usize,
    pub pages_seen: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub attachments_indexed: usize,
    pub attachments_skipped: usize,
    pub chunks_written: usize,
    /// One message per skipped unit
    pub errors: Vec<String>,
}

impl SyncStats {
    fn record_error(&mut self, message: String) {
        warn!("{}", message);
        self.errors.push(message);
    }
}

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per content id async locks
///
/// Clones share the same table, so reconcilers built from one runtime never
/// interleave writes for the same id. Entries live only while someone holds
/// or waits for them.
#[derive(Debug, Clone, Default)]
pub struct IdLocks {
    table: LockTable,
}

/// Exclusive write access to one content id
pub struct IdGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    table: LockTable,
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table's own handle left: nobody holds or waits for it
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive write access to `id`
    pub async fn acquire(&self, id: &str) -> IdGuard {
        let guard = self.lock_for(id).lock_owned().await;
        IdGuard {
            guard: Some(guard),
            id: id.to_string(),
            table: self.table.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Page id to stored `last_modified`
type Snapshot = BTreeMap<String, String>;

/// Keeps one index collection consistent with a set of wiki spaces
pub struct SyncReconciler {
    source: Arc<dyn ContentSource>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn TextExtractor>,
    chunker: Chunker,
    retry: RetryPolicy,
    locks: IdLocks,
    spaces: Vec<String>,
    window_days: i64,
    batch_size: usize,
    show_progress: bool,
}

impl SyncReconciler {
    pub fn new(
        source: Arc<dyn ContentSource>,
        index: Arc<dyn VectorIndex>,
        extractor: Arc<dyn TextExtractor>,
        spaces: Vec<String>,
    ) -> Self {
        let config = Config::default();
        Self {
            source,
            index,
            extractor,
            chunker: Chunker::from_config(&config.chunk),
            retry: RetryPolicy::from_config(&config.sync),
            locks: IdLocks::new(),
            spaces,
            window_days: config.sync.incremental_window_days,
            batch_size: config.embedding.batch_size,
            show_progress: false,
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_locks(mut self, locks: IdLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Trailing window for incremental runs; callers validate `days >= 1`
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Per-item and per-space failures are collected in
    /// [`SyncStats::errors`]; only an unreadable index fails the run.
    pub async fn reconcile(&self, mode: SyncMode) -> Result<SyncStats> {
        info!(
            "Starting {} sync of {} space(s): {}",
            mode,
            self.spaces.len(),
            self.spaces.join(", ")
        );
        let mut stats = SyncStats {
            spaces: self.spaces.len(),
            ..SyncStats::default()
        };

        match mode {
            SyncMode::Full => self.reconcile_full(&mut stats).await?,
            SyncMode::Incremental => self.reconcile_incremental(&mut stats).await?,
        }

        info!(
            "Sync complete: {} added, {} updated, {} unchanged, {} deleted, {} chunks written, {} error(s)",
            stats.added,
            stats.updated,
            stats.unchanged,
            stats.deleted,
            stats.chunks_written,
            stats.errors.len()
        );
        Ok(stats)
    }

    async fn reconcile_full(&self, stats: &mut SyncStats) -> Result<()> {
        let mut current = BTreeSet::new();
        let mut listing_failed = false;
        for space in &self.spaces {
            match self
                .retry
                .run("list pages", || self.source.list_ids(space))
                .await
            {
                Ok(ids) => {
                    debug!("Space {} lists {} page(s)", space, ids.len());
                    current.extend(ids);
                }
                Err(e) => {
                    listing_failed = true;
                    stats.record_error(format!("Listing space {} failed: {}", space, e));
                }
            }
        }
        stats.pages_seen = current.len();

        let stored = self.snapshot(None).await?;

        if listing_failed {
            warn!("Skipping deletions: at least one space could not be listed");
        } else {
            let removed: Vec<&String> = stored.keys().filter(|id| !current.contains(*id)).collect();
            self.delete_pages(removed, stats).await;
        }

        let progress = ItemProgress::start(current.len(), "Syncing pages", self.show_progress);
        for id in &current {
            self.sync_page(id, None, stored.get(id).map(String::as_str), stats)
                .await;
            progress.advance();
        }
        progress.finish("Pages synced");
        Ok(())
    }

    async fn reconcile_incremental(&self, stats: &mut SyncStats) -> Result<()> {
        let since = Utc::now() - ChronoDuration::days(self.window_days);
        info!("Looking for pages modified since {}", since.to_rfc3339());

        for space in &self.spaces {
            let stored = self.snapshot(Some(space)).await?;

            match self
                .retry
                .run("list pages", || self.source.list_ids(space))
                .await
            {
                Ok(current) => {
                    let removed: Vec<&String> =
                        stored.keys().filter(|id| !current.contains(*id)).collect();
                    self.delete_pages(removed, stats).await;
                }
                Err(e) => stats.record_error(format!(
                    "Listing space {} failed, deletions skipped: {}",
                    space, e
                )),
            }

            let modified = match self
                .retry
                .run("search modified pages", || {
                    self.source.list_modified_since(space, since)
                })
                .await
            {
                Ok(pages) => pages,
                Err(e) => {
                    stats.record_error(format!(
                        "Searching modified pages in {} failed: {}",
                        space, e
                    ));
                    continue;
                }
            };
            stats.pages_seen += modified.len();

            let progress = ItemProgress::start(
                modified.len(),
                &format!("Syncing {}", space),
                self.show_progress,
            );
            for summary in &modified {
                self.sync_page(
                    &summary.id,
                    Some(&summary.last_modified),
                    stored.get(&summary.id).map(String::as_str),
                    stats,
                )
                .await;
                progress.advance();
            }
            progress.finish(&format!("{} synced", space));
        }
        Ok(())
    }

    /// Stored generation per page, optionally limited to one space
    async fn snapshot(&self, space: Option<&str>) -> Result<Snapshot> {
        let filter = match space {
            Some(space) => FieldFilter::eq(metadata::SPACE, space),
            None => FieldFilter::default(),
        };

        let mut snapshot = Snapshot::new();
        for chunk in self.index.get_where(&filter, None).await? {
            let Some(id) = chunk.metadata.effective_id() else {
                continue;
            };
            let last_modified = chunk.metadata.effective_last_modified().unwrap_or_default();
            // Page chunks are authoritative over attachment copies
            if !chunk.metadata.is_attachment() || !snapshot.contains_key(id) {
                snapshot.insert(id.to_string(), last_modified.to_string());
            }
        }
        debug!("Snapshot holds {} page(s)", snapshot.len());
        Ok(snapshot)
    }

    async fn delete_pages(&self, ids: Vec<&String>, stats: &mut SyncStats) {
        for id in ids {
            match self.delete_item(id).await {
                Ok(removed) => {
                    debug!("Deleted page {} ({} records)", id, removed);
                    stats.deleted += 1;
                }
                Err(e) => stats.record_error(format!("Deleting page {} failed: {}", id, e)),
            }
        }
    }

    /// Add, replace or skip one page.
    ///
    /// `listed` is the modification stamp from a listing, when one is known,
    /// and lets unchanged pages skip the content fetch.
    async fn sync_page(
        &self,
        id: &str,
        listed: Option<&str>,
        stored: Option<&str>,
        stats: &mut SyncStats,
    ) {
        if let (Some(listed), Some(stored)) = (listed, stored) {
            if listed == stored {
                debug!("Page {} unchanged", id);
                stats.unchanged += 1;
                return;
            }
        }

        let content: PageContent = match self
            .retry
            .run("fetch page", || self.source.fetch_content(id))
            .await
        {
            Ok(content) => content,
            Err(e) => {
                stats.record_error(format!("Fetching page {} failed: {}", id, e));
                return;
            }
        };

        if stored == Some(content.last_modified.as_str()) {
            debug!("Page {} unchanged", id);
            stats.unchanged += 1;
            return;
        }

        let prepared = match self.prepare_page(content).await {
            Ok(prepared) => prepared,
            Err(e) => {
                stats.record_error(format!("Preparing page {} failed: {}", id, e));
                return;
            }
        };

        if prepared.records.is_empty() && stored.is_none() {
            debug!("Page {} has nothing to index", id);
            stats.unchanged += 1;
            stats.attachments_skipped += prepared.attachments_skipped;
            return;
        }

        match self.apply_page(prepared, stats).await {
            Ok(()) if stored.is_some() => {
                debug!("Page {} replaced", id);
                stats.updated += 1;
            }
            Ok(()) => {
                debug!("Page {} added", id);
                stats.added += 1;
            }
            Err(e) => stats.record_error(format!("Writing page {} failed: {}", id, e)),
        }
    }
}
