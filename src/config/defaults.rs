//! Default values for configuration

/// Default Qdrant URL for local development
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Name of the profile used when none is given
pub fn default_profile_name() -> String {
    "default".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "wikirag_pages".to_string()
}

/// Placeholder wiki URL written by `config init`
pub fn default_source_base_url() -> String {
    "https://example.atlassian.net".to_string()
}

/// Default environment variable holding the wiki API token
pub fn default_source_api_token_env() -> String {
    "CONFLUENCE_API_TOKEN".to_string()
}

/// Default requests per second against the wiki
pub fn default_source_requests_per_second() -> u32 {
    5
}

/// Default request timeout in seconds
pub fn default_source_timeout() -> u64 {
    30
}

/// Page size for content listings
pub fn default_source_page_limit() -> usize {
    100
}

/// Page size for CQL searches (kept low to avoid server timeouts)
pub fn default_source_search_limit() -> usize {
    50
}

/// Default embedding backend URL (OpenAI-compatible)
pub fn default_embedding_url() -> String {
    "https://api.openai.com".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default embedding dimension for text-embedding-3-small
pub fn default_embedding_dimension() -> usize {
    1536
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default environment variable holding the model API key
pub fn default_model_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default generation backend URL (OpenAI-compatible)
pub fn default_generation_url() -> String {
    "https://api.openai.com".to_string()
}

/// Default generation model
pub fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default sampling temperature
pub fn default_generation_temperature() -> f32 {
    0.0
}

/// Default generation timeout in seconds
pub fn default_generation_timeout() -> u64 {
    120
}

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    1000
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default attempts per source call (first try included)
pub fn default_sync_max_attempts() -> u32 {
    3
}

/// Default delay before the first retry
pub fn default_sync_initial_backoff_ms() -> u64 {
    1000
}

/// Default cap on a single retry delay
pub fn default_sync_max_backoff_ms() -> u64 {
    30_000
}

/// Default trailing window for incremental sync
pub fn default_sync_incremental_window_days() -> i64 {
    14
}

/// Default number of chunks retrieved for the first pass
pub fn default_query_k() -> usize {
    4
}

/// Default number of results per ancestor lookup
pub fn default_query_expansion_k() -> usize {
    2
}

/// Default confidence needed to skip context expansion
pub fn default_confidence_threshold() -> f64 {
    89.0
}
