//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::store::VectorIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub profile: String,
    pub wiki_url: String,
    pub spaces: Vec<String>,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: u64,
}

/// Get system status for a profile
pub async fn cmd_status(config: &Config, profile: Option<&str>) -> Result<StatusInfo> {
    info!("Getting status");

    let runtime = Runtime::new(config, profile)?;
    let (qdrant_connected, collection_exists, qdrant_points) = match runtime.index().stats().await
    {
        Ok(Some(stats)) => (true, true, stats.points_count),
        Ok(None) => (true, false, 0),
        Err(e) => {
            debug!("Qdrant connection error: {:?}", e);
            (false, false, 0)
        }
    };

    let profile = runtime.profile();
    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        profile: runtime.profile_name().to_string(),
        wiki_url: profile.source.base_url.clone(),
        spaces: profile.source.spaces.clone(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: profile.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        generation_model: config.generation.model.clone(),
        qdrant_connected,
        collection_exists,
        qdrant_points,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 wikirag Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Profile: {}", status.profile);
    println!("\nWiki:");
    println!("  URL: {}", status.wiki_url);
    println!("  Spaces: {}", status.spaces.join(", "));
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.collection_name);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created - run 'wikirag sync' to create)"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);
    println!("\nEmbedding Model: {}", status.embedding_model);
    println!("Generation Model: {}", status.generation_model);
}
