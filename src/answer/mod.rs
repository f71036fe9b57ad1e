//! Confidence-gated question answering
//!
//! A first answer is generated from the top retrieved chunks. When its
//! self-reported confidence falls below the threshold, the context is
//! widened with structurally related chunks and a second answer is
//! generated; it replaces the first only if it is strictly more confident.

pub mod confidence;
pub mod prompt;

pub use confidence::{parse, ParsedAnswer};

use crate::generate::Generator;
use crate::metadata;
use crate::retrieval::RetrievalEngine;
use crate::store::StoredChunk;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const FALLBACK_ANSWER: &str =
    "I'm sorry, but I couldn't find any relevant information to answer your question.";

/// Default number of chunks for the first pass
pub const DEFAULT_K: usize = 4;

/// A cited source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub link: String,
    pub space: String,
    pub is_attachment: bool,
}

impl SourceRef {
    pub fn from_chunk(chunk: &StoredChunk) -> Self {
        let meta = &chunk.metadata;
        Self {
            title: meta.title().unwrap_or(prompt::UNKNOWN_TITLE).to_string(),
            link: meta.get_str(metadata::LINK).unwrap_or_default().to_string(),
            space: meta.get_str(metadata::SPACE).unwrap_or_default().to_string(),
            is_attachment: meta.is_attachment(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<SourceRef>,
}

impl AnswerResult {
    pub fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    fn from_pass(parsed: ParsedAnswer, context: &[StoredChunk]) -> Self {
        Self {
            answer: parsed.text,
            confidence: parsed.confidence,
            sources: collect_sources(context),
        }
    }
}

/// Sources of `chunks`, deduplicated in first-seen order
pub fn collect_sources(chunks: &[StoredChunk]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .map(SourceRef::from_chunk)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Plain-text rendering: answer, numbered sources, confidence
pub fn format_answer(result: &AnswerResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.answer);
    let _ = writeln!(out, "\nSOURCES:");
    let _ = writeln!(out, "{}", "-".repeat(80));
    for (i, source) in result.sources.iter().enumerate() {
        let kind = if source.is_attachment {
            "Attachment"
        } else {
            "Page"
        };
        let _ = writeln!(out, "{}. {} ({}):\n{}", i + 1, source.title, kind, source.link);
    }
    let _ = write!(out, "\nConfidence: {}%", result.confidence);
    out
}

/// Two-pass answer engine
pub struct AnswerEngine {
    retrieval: RetrievalEngine,
    generator: Arc<dyn Generator>,
    k: usize,
}

impl AnswerEngine {
    pub fn new(retrieval: RetrievalEngine, generator: Arc<dyn Generator>) -> Self {
        Self {
            retrieval,
            generator,
            k: DEFAULT_K,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Answer `query`; never fails, degrading to the fallback answer.
    pub async fn answer_query(&self, query: &str, threshold: f64) -> AnswerResult {
        info!("Answering query: {}", query);

        let initial = self.retrieval.retrieve_context(query, self.k).await;
        if initial.is_empty() {
            info!("No context found");
            return AnswerResult::fallback();
        }

        let Some(first) = self.generate(query, &initial).await else {
            return AnswerResult::fallback();
        };
        if first.confidence >= threshold {
            debug!("First pass accepted at {}", first.confidence);
            return AnswerResult::from_pass(first, &initial);
        }

        info!(
            "Confidence {} below threshold {}, expanding context",
            first.confidence, threshold
        );
        let additional = match self.retrieval.expand_context(&initial).await {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => {
                debug!("Expansion found nothing new");
                return AnswerResult::from_pass(first, &initial);
            }
            Err(e) => {
                warn!("Context expansion failed: {}", e);
                return AnswerResult::from_pass(first, &initial);
            }
        };

        let mut widened = initial.clone();
        let mut ids: HashSet<String> = initial.iter().map(|c| c.id.clone()).collect();
        widened.extend(additional.into_iter().filter(|c| ids.insert(c.id.clone())));

        match self.generate(query, &widened).await {
            Some(second) if second.confidence > first.confidence => {
                info!("Expanded answer adopted at {}", second.confidence);
                AnswerResult::from_pass(second, &widened)
            }
            Some(second) => {
                debug!(
                    "Expanded answer not better ({} <= {})",
                    second.confidence, first.confidence
                );
                AnswerResult::from_pass(first, &initial)
            }
            None => AnswerResult::from_pass(first, &initial),
        }
    }

    /// One generation call over `context`; `None` on backend failure
    async fn generate(&self, query: &str, context: &[StoredChunk]) -> Option<ParsedAnswer> {
        let user = prompt::build_user_prompt(&prompt::build_context(context), query);
        match self.generator.generate(prompt::SYSTEM_PROMPT, &user).await {
            Ok(text) => {
                let parsed = parse(&text);
                if !parsed.matched {
                    debug!("Generation carried no confidence score");
                }
                Some(parsed)
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                None
            }
        }
    }
}
