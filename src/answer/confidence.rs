//! Confidence trailer parsing

use regex::Regex;
use std::sync::LazyLock;

/// `CONFIDENCE_SCORE: 87` as the final line, the trailer the system prompt asks for
static TAGGED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*CONFIDENCE_SCORE:\s*(\d+(?:\.\d+)?)\s*\z").expect("valid confidence pattern")
});

/// Older free-form statement: `Confidence in the usefulness of this answer: 80%`
static LEGACY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*Confidence(?:\s+in\s+the\s+usefulness\s+of\s+this\s+answer)?:\s*(\d+(?:\.\d+)?)%\s*\z")
        .expect("valid legacy confidence pattern")
});

/// Generated text split into the visible answer and its confidence
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub text: String,
    /// 0..=100
    pub confidence: f64,
    /// Whether a confidence trailer was found
    pub matched: bool,
}

/// Split a confidence trailer off the end of generated text.
///
/// Only a trailer at the very end counts, so a mention earlier in the body
/// is left alone. The tagged form wins over the legacy form. Without a
/// trailer the text is returned as is with confidence 0.
pub fn parse(text: &str) -> ParsedAnswer {
    for pattern in [&*TAGGED_RE, &*LEGACY_RE] {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(confidence) = value.as_str().parse::<f64>() else {
            continue;
        };

        return ParsedAnswer {
            text: text[..whole.start()].trim().to_string(),
            confidence: confidence.clamp(0.0, 100.0),
            matched: true,
        };
    }

    ParsedAnswer {
        text: text.to_string(),
        confidence: 0.0,
        matched: false,
    }
}
