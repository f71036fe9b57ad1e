//! Break point detection for chunking
//!
//! Positions are character offsets. A break point at `p` means a window may
//! end just before character `p`, keeping the delimiter in the earlier chunk.

/// Priority levels for break points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    /// Word boundary (lowest)
    Word = 1,
    /// Sentence boundary
    Sentence = 2,
    /// Line break
    Line = 3,
    /// Paragraph boundary (highest)
    Paragraph = 4,
}

/// A potential break point in text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    /// Character position
    pub position: usize,
    /// Priority of this break point
    pub priority: BreakPriority,
}

impl BreakPoint {
    pub fn new(position: usize, priority: BreakPriority) -> Self {
        Self { position, priority }
    }
}

/// Classify the boundary that ends right before `position`, if any
pub fn classify(chars: &[char], position: usize) -> Option<BreakPriority> {
    if position == 0 || position > chars.len() {
        return None;
    }

    let last = chars[position - 1];
    let before = position.checked_sub(2).map(|i| chars[i]);

    if last == '\n' {
        return if before == Some('\n') {
            Some(BreakPriority::Paragraph)
        } else {
            Some(BreakPriority::Line)
        };
    }

    if last.is_whitespace() {
        return match before {
            Some('.' | '?' | '!') => Some(BreakPriority::Sentence),
            _ => Some(BreakPriority::Word),
        };
    }

    None
}

/// Collect break points with positions in `lo..=hi`
pub fn find_break_points(chars: &[char], lo: usize, hi: usize) -> Vec<BreakPoint> {
    let hi = hi.min(chars.len());
    if lo > hi {
        return Vec::new();
    }

    (lo..=hi)
        .filter_map(|p| classify(chars, p).map(|priority| BreakPoint::new(p, priority)))
        .collect()
}

/// Pick the highest-priority break point, latest position on ties
pub fn best_break(points: &[BreakPoint]) -> Option<BreakPoint> {
    points
        .iter()
        .copied()
        .max_by_key(|p| (p.priority, p.position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_break_priority_ordering() {
        assert!(BreakPriority::Paragraph > BreakPriority::Line);
        assert!(BreakPriority::Line > BreakPriority::Sentence);
        assert!(BreakPriority::Sentence > BreakPriority::Word);
    }

    #[test]
    fn test_classify() {
        let text = chars("One. Two\nThree\n\nFour five");

        assert_eq!(classify(&text, 5), Some(BreakPriority::Sentence));
        assert_eq!(classify(&text, 9), Some(BreakPriority::Line));
        assert_eq!(classify(&text, 16), Some(BreakPriority::Paragraph));
        assert_eq!(classify(&text, 21), Some(BreakPriority::Word));
        assert_eq!(classify(&text, 2), None);
        assert_eq!(classify(&text, 0), None);
    }

    #[test]
    fn test_best_break_prefers_priority_then_position() {
        let points = vec![
            BreakPoint::new(10, BreakPriority::Word),
            BreakPoint::new(4, BreakPriority::Sentence),
            BreakPoint::new(8, BreakPriority::Sentence),
        ];

        assert_eq!(
            best_break(&points),
            Some(BreakPoint::new(8, BreakPriority::Sentence))
        );
        assert_eq!(best_break(&[]), None);
    }
}
