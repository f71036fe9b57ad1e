//! Text chunking for indexing
//!
//! This module splits item text into overlapping windows:
//! - Lengths and offsets are counted in characters, never bytes
//! - Every window is an exact substring, so the windows rebuild the text
//! - Window ends prefer paragraph, line, sentence and then word boundaries
//! - Each chunk carries index-safe metadata plus a content hash

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::metadata::{self, Metadata};
use crate::source::ContentItem;
use blake3::Hasher;

/// A slice of one item's text, ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Id of the item the chunk was cut from
    pub content_id: String,

    /// Chunk index (0-based)
    pub chunk_index: usize,

    /// Total chunks produced for the item
    pub chunk_count: usize,

    /// The window text
    pub text: String,

    /// Sanitized metadata, scalars only
    pub metadata: Metadata,
}

/// Splits items into chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker; `chunk_overlap` must be below `chunk_size`
    /// (enforced by `Config::validate`).
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Chunk every item, preserving item order
    pub fn process(&self, items: &[ContentItem]) -> Vec<Chunk> {
        items.iter().flat_map(|item| self.chunk_item(item)).collect()
    }

    /// Chunk one item. Empty text yields no chunks.
    pub fn chunk_item(&self, item: &ContentItem) -> Vec<Chunk> {
        let windows = self.split(&item.raw_text);
        if windows.is_empty() {
            return Vec::new();
        }

        let base = item.base_metadata();
        let chunk_count = windows.len();

        windows
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| {
                let mut meta = base.clone();
                meta.insert(metadata::CHUNK_INDEX, chunk_index);
                meta.insert(metadata::CHUNK_COUNT, chunk_count);
                meta.insert(metadata::CHUNK_HASH, compute_text_hash(&text));

                Chunk {
                    content_id: item.id.clone(),
                    chunk_index,
                    chunk_count,
                    text,
                    metadata: meta,
                }
            })
            .collect()
    }

    /// Split text into overlapping windows
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        // Byte offset of every char position, plus the end of the text
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();

        self.window_bounds(&chars)
            .into_iter()
            .map(|(start, end)| text[offsets[start]..offsets[end]].to_string())
            .collect()
    }

    /// Window bounds in character positions
    fn window_bounds(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let total = chars.len();
        let mut bounds = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= self.chunk_size {
                bounds.push((start, total));
                break;
            }

            let end = self.find_end(chars, start);
            bounds.push((start, end));
            start = end - self.chunk_overlap;
        }

        bounds
    }

    fn find_end(&self, chars: &[char], start: usize) -> usize {
        let hard = start + self.chunk_size;
        // Stay in the last half of the window and past the overlap so the
        // next window always advances
        let lo = (start + self.chunk_size / 2).max(start + self.chunk_overlap + 1);

        let points = find_break_points(chars, lo, hard);
        best_break(&points).map_or(hard, |p| p.position)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkConfig::default())
    }
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ContentKind;

    fn item(id: &str, text: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            kind: ContentKind::Page,
            title: "Install Guide".to_string(),
            space: "DOCS".to_string(),
            parent_id: None,
            last_modified: "2024-05-01T10:00:00.000Z".to_string(),
            hierarchy_path: vec!["Home".to_string(), "Guides".to_string()],
            raw_text: text.to_string(),
            link: "https://wiki.example.com/pages/1".to_string(),
            source_url: "https://wiki.example.com/rest/api/content/1".to_string(),
            file_type: None,
            extra: serde_json::Map::new(),
        }
    }

    fn rebuild(windows: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, w) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(w);
            } else {
                out.extend(w.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_windows_reconstruct_text() {
        // 2400 chars with no natural boundaries
        let text: String = "abcdefghij".repeat(240);
        let chunker = Chunker::new(1000, 200);

        let windows = chunker.split(&text);

        assert_eq!(windows.len(), 3);
        assert!(windows.iter().all(|w| w.chars().count() <= 1000));
        assert_eq!(&windows[0][800..], &windows[1][..200]);
        assert_eq!(&windows[1][800..], &windows[2][..200]);
        assert_eq!(rebuild(&windows, 200), text);

        let chunks = chunker.chunk_item(&item("1", &text));
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.chunk_count, 3);
            assert_eq!(chunk.metadata.get_i64(metadata::CHUNK_COUNT), Some(3));
        }
    }

    #[test]
    fn test_prefers_natural_boundaries() {
        let paragraph = format!("{}.\n\n", "word ".repeat(150).trim_end());
        let text = paragraph.repeat(4);
        let chunker = Chunker::new(1000, 200);

        let windows = chunker.split(&text);

        assert!(windows.len() > 1);
        assert!(windows[0].ends_with("\n\n"));
        assert_eq!(rebuild(&windows, 200), text);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "héllo wörld ünïcode ".repeat(100);
        let chunker = Chunker::new(300, 50);

        let windows = chunker.split(&text);

        assert!(windows.iter().all(|w| w.chars().count() <= 300));
        assert_eq!(rebuild(&windows, 50), text);
    }

    #[test]
    fn test_short_and_empty_text() {
        let chunker = Chunker::default();

        assert!(chunker.chunk_item(&item("1", "")).is_empty());

        let chunks = chunker.chunk_item(&item("1", "A short page."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short page.");
    }

    #[test]
    fn test_chunk_metadata() {
        let chunks = Chunker::default().chunk_item(&item("42", "Body text."));
        let meta = &chunks[0].metadata;

        assert_eq!(meta.content_id(), Some("42"));
        assert_eq!(meta.get_str(metadata::KIND), Some("page"));
        assert_eq!(meta.get_str(metadata::HIERARCHY_TEXT), Some("Home > Guides"));
        assert_eq!(meta.hierarchy(), vec!["Home", "Guides"]);
        assert_eq!(meta.get_bool(metadata::IS_ATTACHMENT), Some(false));
        assert_eq!(
            meta.get_str(metadata::CHUNK_HASH),
            Some(compute_text_hash("Body text.").as_str())
        );
        assert!(meta.get(metadata::PARENT_ID).is_none());
    }

    #[test]
    fn test_deterministic() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(100);
        let chunker = Chunker::new(500, 50);

        assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}
