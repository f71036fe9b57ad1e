//! Answer generation
//!
//! A generator turns a system instruction plus a user prompt into text.

mod http_backend;

pub use http_backend::*;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for chat-style generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a completion for one system/user exchange
    async fn generate(&self, system: &str, user: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}
