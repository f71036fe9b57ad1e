//! Sync command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sync::{SyncMode, SyncStats};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub profile: Option<String>,
    pub mode: SyncMode,
    /// Overrides `sync.incremental_window_days`
    pub since_days: Option<i64>,
    pub show_progress: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            profile: None,
            mode: SyncMode::Full,
            since_days: None,
            show_progress: true,
        }
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub profile: String,
    pub collection: String,
    pub mode: SyncMode,
    pub stats: SyncStats,
}

/// Reconcile the profile's spaces into its collection
pub async fn cmd_sync(config: &Config, options: SyncOptions) -> Result<SyncReport> {
    if let Some(days) = options.since_days {
        if days < 1 {
            return Err(Error::Config(format!(
                "--since-days must be at least 1, got {}",
                days
            )));
        }
    }

    let runtime = Runtime::new(config, options.profile.as_deref())?;
    info!(
        "Syncing profile {} into {}",
        runtime.profile_name(),
        runtime.profile().collection_name
    );
    runtime.prepare_index().await?;

    let mut reconciler = runtime.reconciler().with_progress(options.show_progress);
    if let Some(days) = options.since_days {
        reconciler = reconciler.with_window_days(days);
    }
    let stats = reconciler.reconcile(options.mode).await?;

    Ok(SyncReport {
        profile: runtime.profile_name().to_string(),
        collection: runtime.profile().collection_name.clone(),
        mode: options.mode,
        stats,
    })
}

/// Print a sync report to console
pub fn print_sync_report(report: &SyncReport) {
    let stats = &report.stats;
    println!(
        "\n🔄 {} sync of '{}' → {}\n",
        report.mode, report.profile, report.collection
    );
    println!("  Spaces:      {}", stats.spaces);
    println!("  Pages seen:  {}", stats.pages_seen);
    println!("  Added:       {}", stats.added);
    println!("  Updated:     {}", stats.updated);
    println!("  Unchanged:   {}", stats.unchanged);
    println!("  Deleted:     {}", stats.deleted);
    println!(
        "  Attachments: {} indexed, {} skipped",
        stats.attachments_indexed, stats.attachments_skipped
    );
    println!("  Chunks:      {}", stats.chunks_written);

    if stats.errors.is_empty() {
        println!("\n✓ Completed without errors");
    } else {
        println!("\n⚠ {} unit(s) skipped:", stats.errors.len());
        for error in &stats.errors {
            println!("  • {}", error);
        }
    }
}
