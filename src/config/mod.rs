//! Configuration management for wikirag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Profile used when none is given on the command line
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    /// Named wiki profiles
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, ProfileConfig>,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Answer generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Reconciliation configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// One wiki plus the collection its pages are indexed into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Wiki connection settings
    #[serde(default)]
    pub source: SourceConfig,
}

/// Wiki (Confluence) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the wiki, without the `/wiki` suffix
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    /// Account used for basic auth
    #[serde(default)]
    pub username: String,

    /// Environment variable holding the API token
    #[serde(default = "default_source_api_token_env")]
    pub api_token_env: String,

    /// Space keys to index
    #[serde(default)]
    pub spaces: Vec<String>,

    /// Requests per second against the wiki
    #[serde(default = "default_source_requests_per_second")]
    pub requests_per_second: u32,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// Page size for content listings
    #[serde(default = "default_source_page_limit")]
    pub page_limit: usize,

    /// Page size for CQL searches
    #[serde(default = "default_source_search_limit")]
    pub search_limit: usize,
}

/// Which embedding implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Http,
    /// In-process fastembed model (`local-embed` feature)
    Local,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Backend base URL (http backend only)
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Environment variable holding the API key
    #[serde(default = "default_model_api_key_env")]
    pub api_key_env: String,
}

/// Generation (chat completion) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Backend base URL
    #[serde(default = "default_generation_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_model_api_key_env")]
    pub api_key_env: String,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Attempts per source call, first try included
    #[serde(default = "default_sync_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    #[serde(default = "default_sync_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single retry delay
    #[serde(default = "default_sync_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Trailing window scanned by incremental runs
    #[serde(default = "default_sync_incremental_window_days")]
    pub incremental_window_days: i64,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Chunks retrieved for the first pass
    #[serde(default = "default_query_k")]
    pub k: usize,

    /// Results fetched per ancestor title during expansion
    #[serde(default = "default_query_expansion_k")]
    pub expansion_k: usize,

    /// Confidence (0-100) at which the first answer is accepted
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for wikirag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Http
}

fn default_profiles() -> BTreeMap<String, ProfileConfig> {
    let mut profiles = BTreeMap::new();
    profiles.insert(default_profile_name(), ProfileConfig::default());
    profiles
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            default_profile: default_profile_name(),
            profiles: default_profiles(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunk: ChunkConfig::default(),
            sync: SyncConfig::default(),
            query: QueryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            username: String::new(),
            api_token_env: default_source_api_token_env(),
            spaces: vec!["DOCS".to_string()],
            requests_per_second: default_source_requests_per_second(),
            timeout_secs: default_source_timeout(),
            page_limit: default_source_page_limit(),
            search_limit: default_source_search_limit(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            api_key_env: default_model_api_key_env(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            temperature: default_generation_temperature(),
            timeout_secs: default_generation_timeout(),
            api_key_env: default_model_api_key_env(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_sync_max_attempts(),
            initial_backoff_ms: default_sync_initial_backoff_ms(),
            max_backoff_ms: default_sync_max_backoff_ms(),
            incremental_window_days: default_sync_incremental_window_days(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k: default_query_k(),
            expansion_k: default_query_expansion_k(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl SourceConfig {
    /// Get the wiki API token from environment
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api_token_env).ok()
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

impl GenerationConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

impl SyncConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Config {
    /// Get the default base directory for wikirag (~/.wikirag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wikirag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Point the config at a file location
    pub fn set_config_path(&mut self, config_path: &Path) {
        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        self.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.set_config_path(config_path);

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Resolve a profile by name, falling back to `default_profile`
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &ProfileConfig)> {
        let name = name.unwrap_or(&self.default_profile);
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size == 0 {
            return Err(Error::Config("chunk.chunk_size must be positive".to_string()));
        }

        if self.chunk.chunk_overlap >= self.chunk.chunk_size {
            return Err(Error::Config(
                "chunk.chunk_overlap must be < chunk.chunk_size".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.query.confidence_threshold) {
            return Err(Error::Config(
                "query.confidence_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.query.k == 0 {
            return Err(Error::Config("query.k must be positive".to_string()));
        }

        if self.sync.max_attempts == 0 {
            return Err(Error::Config(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.sync.incremental_window_days <= 0 {
            return Err(Error::Config(
                "sync.incremental_window_days must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if !self.profiles.contains_key(&self.default_profile) {
            return Err(Error::Config(format!(
                "default_profile '{}' is not defined under [profiles]",
                self.default_profile
            )));
        }

        for (name, profile) in &self.profiles {
            if profile.source.spaces.iter().all(|s| s.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "profiles.{}.source.spaces must list at least one space",
                    name
                )));
            }
            if profile.source.requests_per_second == 0 {
                return Err(Error::Config(format!(
                    "profiles.{}.source.requests_per_second must be positive",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_profile, "default");
        assert_eq!(config.chunk.chunk_size, 1000);
        assert_eq!(config.chunk.chunk_overlap, 200);
        assert_eq!(config.query.k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = Config::default();
        config.set_config_path(&path);
        config
            .profiles
            .get_mut("default")
            .unwrap()
            .collection_name = "test_collection".to_string();

        config.save().unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        let (name, profile) = loaded.profile(None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(profile.collection_name, "test_collection");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "help"

[profiles.help]
collection_name = "online_help"

[profiles.help.source]
base_url = "https://help.example.com"
username = "bot@example.com"
spaces = ["HELP", "FAQ"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let (_, profile) = config.profile(Some("help")).unwrap();
        assert_eq!(profile.source.spaces, vec!["HELP", "FAQ"]);
        assert_eq!(profile.source.search_limit, 50);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Http);
        assert!(matches!(
            config.profile(Some("missing")),
            Err(Error::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid: overlap >= size
        config.chunk.chunk_overlap = config.chunk.chunk_size;
        assert!(config.validate().is_err());

        // Fix it
        config.chunk.chunk_overlap = 100;
        assert!(config.validate().is_ok());

        config.query.confidence_threshold = 120.0;
        assert!(config.validate().is_err());
        config.query.confidence_threshold = 89.0;

        config.sync.incremental_window_days = 0;
        assert!(config.validate().is_err());
        config.sync.incremental_window_days = 14;
        assert!(config.validate().is_ok());

        config.profiles.get_mut("default").unwrap().source.spaces.clear();
        assert!(config.validate().is_err());
    }
}
