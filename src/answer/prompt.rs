//! Prompt construction

use crate::store::StoredChunk;

/// Title used when a chunk carries none
pub const UNKNOWN_TITLE: &str = "Unknown";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using the provided context. \
Generate your final response after adjusting it to increase accuracy and relevance. \
Do not provide any explanations about your process. \
Please do not make up any information - stay strict on the context. \
DO NOT include any statement about confidence or usefulness in your answer. \
After you've completed your answer, on a new line that will not be shown to the user, \
provide your confidence score in exactly this format: CONFIDENCE_SCORE: X";

/// `Source: <title>` blocks separated by blank lines
pub fn build_context(chunks: &[StoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("Source: {}\n{}", c.title().unwrap_or(UNKNOWN_TITLE), c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{self, Metadata};

    fn chunk(title: Option<&str>, text: &str) -> StoredChunk {
        let mut meta = Metadata::new();
        if let Some(title) = title {
            meta.insert(metadata::TITLE, title);
        }
        StoredChunk {
            id: text.to_string(),
            text: text.to_string(),
            metadata: meta,
            score: None,
        }
    }

    #[test]
    fn test_context_layout() {
        let context = build_context(&[chunk(Some("Setup"), "Install it."), chunk(None, "Orphan.")]);
        assert_eq!(context, "Source: Setup\nInstall it.\n\nSource: Unknown\nOrphan.");

        let prompt = build_user_prompt(&context, "How?");
        assert!(prompt.starts_with("Context:\nSource: Setup"));
        assert!(prompt.ends_with("\n\nQuestion: How?"));
    }

    #[test]
    fn test_system_prompt_requests_trailer() {
        assert!(SYSTEM_PROMPT.ends_with("CONFIDENCE_SCORE: X"));
        assert!(!SYSTEM_PROMPT.contains("  "));
    }
}
