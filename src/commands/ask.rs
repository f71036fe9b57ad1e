//! Ask command implementation

use crate::answer::{format_answer, AnswerResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub profile: Option<String>,
    /// Overrides `query.confidence_threshold`
    pub threshold: Option<f64>,
    /// Overrides `query.k`
    pub k: Option<usize>,
}

/// Answer a question against a profile's collection.
///
/// Only setup problems (unknown profile, bad threshold, unusable backend
/// configuration) are errors; retrieval and generation failures degrade to
/// the fallback answer.
pub async fn cmd_ask(config: &Config, question: &str, options: AskOptions) -> Result<AnswerResult> {
    let threshold = options
        .threshold
        .unwrap_or(config.query.confidence_threshold);
    if !(0.0..=100.0).contains(&threshold) {
        return Err(Error::Config(format!(
            "Confidence threshold must be between 0 and 100, got {}",
            threshold
        )));
    }

    let runtime = Runtime::new(config, options.profile.as_deref())?;
    info!("Asking profile {}", runtime.profile_name());
    let engine = runtime.answer_engine(options.k)?;

    Ok(engine.answer_query(question, threshold).await)
}

/// Library entry point: answer `query` with the given profile and threshold
pub async fn answer_query(
    config: &Config,
    profile: Option<&str>,
    query: &str,
    threshold: f64,
) -> Result<AnswerResult> {
    let options = AskOptions {
        profile: profile.map(str::to_string),
        threshold: Some(threshold),
        k: None,
    };
    cmd_ask(config, query, options).await
}

/// Print an answer with its sources to console
pub fn print_answer(result: &AnswerResult) {
    println!("{}", format_answer(result));
}
