//! Splits arbitrarily long text into segments within the provider's ceiling.
//!
//! Cuts prefer, in order: the last sentence-ending period in the back half of
//! the window, any other clause punctuation in the back half, the last space,
//! and finally a hard cut at the ceiling. Lengths are counted in characters,
//! not bytes, so multi-byte text is never split inside a code point.

use crate::defaults;

/// Punctuation accepted as a secondary cut point.
const CLAUSE_PUNCTUATION: &[char] = &['.', '!', '?', ';', ':', ','];

/// One speakable piece of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position in the sequence.
    pub index: usize,
    /// Number of segments produced from the same text.
    pub total: usize,
    /// Trimmed, non-empty text of this segment.
    pub text: String,
}

impl Segment {
    /// Whether this is the final segment of its sequence.
    pub fn is_last(&self) -> bool {
        self.index == self.total
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Segment `text` using the provider ceiling.
pub fn segment(text: &str) -> Vec<Segment> {
    segment_with_limit(text, defaults::MAX_SEGMENT_CHARS)
}

/// Segment `text` so that no segment exceeds `max_len` characters.
///
/// Whitespace-only input yields no segments. Input within the limit yields a
/// single segment equal to the trimmed input.
pub fn segment_with_limit(text: &str, max_len: usize) -> Vec<Segment> {
    let max_len = max_len.max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let cut = match remaining.char_indices().nth(max_len) {
            // Fewer than max_len + 1 chars left: take everything.
            None => remaining.len(),
            Some((window_end, _)) => find_cut(&remaining[..window_end], max_len),
        };

        let (piece, rest) = remaining.split_at(cut);
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
        remaining = rest.trim_start();
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Segment {
            index: i + 1,
            total,
            text,
        })
        .collect()
}

/// Byte offset at which to cut a window of exactly `max_len` characters.
fn find_cut(window: &str, max_len: usize) -> usize {
    let chars: Vec<(usize, char)> = window.char_indices().collect();
    let half = max_len / 2;

    // Sentence end: a period followed by a space or by the end of the window.
    let sentence_end = (0..chars.len()).rev().find(|&i| {
        chars[i].1 == '.' && chars.get(i + 1).is_none_or(|&(_, next)| next == ' ')
    });
    if let Some(i) = sentence_end
        && i > half
    {
        return byte_after(&chars, i, window.len());
    }

    // Any clause punctuation, still only in the back half.
    if let Some(i) = (half + 1..chars.len())
        .rev()
        .find(|&i| CLAUSE_PUNCTUATION.contains(&chars[i].1))
    {
        return byte_after(&chars, i, window.len());
    }

    // Last space anywhere in the window; the space itself is trimmed away.
    if let Some(&(offset, _)) = chars.iter().rev().find(|&&(_, c)| c == ' ')
        && offset > 0
    {
        return offset;
    }

    // No usable boundary: hard cut at the ceiling.
    window.len()
}

/// Byte offset just past the char at position `i`.
fn byte_after(chars: &[(usize, char)], i: usize, window_len: usize) -> usize {
    chars.get(i + 1).map(|&(offset, _)| offset).unwrap_or(window_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn short_text_is_one_trimmed_segment() {
        let segments = segment("  Hello world.  ");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello world.");
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[0].total, 1);
        assert!(segments[0].is_last());
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(segment("   \n\t ").is_empty());
        assert!(segment("").is_empty());
    }

    #[test]
    fn cuts_after_sentence_period_in_back_half() {
        // Window of 20 chars: "aaaaaaaaaaaa. bbbbbb" -> period at index 12 > 10
        let text = "aaaaaaaaaaaa. bbbbbbbbbbbbbbbbbbbb";
        let segments = segment_with_limit(text, 20);
        assert_eq!(segments[0].text, "aaaaaaaaaaaa.");
        assert!(segments[1].text.starts_with("bbbb"));
    }

    #[test]
    fn early_period_falls_through_to_clause_punctuation() {
        // Period at index 2 is in the front half; comma at index 14 is in the back half.
        let text = "ab. cdefghijkl, mnopqrstuvwxyz and more";
        let segments = segment_with_limit(text, 20);
        assert_eq!(segments[0].text, "ab. cdefghijkl,");
    }

    #[test]
    fn no_punctuation_cuts_at_last_space() {
        let text = "alpha beta gamma delta epsilon zeta";
        let segments = segment_with_limit(text, 20);
        assert_eq!(texts(&segments)[0], "alpha beta gamma");
        for s in &segments {
            assert!(s.char_len() <= 20);
        }
    }

    #[test]
    fn unbroken_word_is_hard_cut_at_limit() {
        let text = "x".repeat(45);
        let segments = segment_with_limit(&text, 20);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].char_len(), 20);
        assert_eq!(segments[1].char_len(), 20);
        assert_eq!(segments[2].char_len(), 5);
    }

    #[test]
    fn indices_are_one_based_and_share_total() {
        let text = "One sentence here. Another sentence there. And a third one follows.";
        let segments = segment_with_limit(text, 25);
        let total = segments.len();
        assert!(total > 1);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i + 1);
            assert_eq!(s.total, total);
        }
        assert!(segments.last().is_some_and(Segment::is_last));
    }

    #[test]
    fn multibyte_text_counts_characters() {
        // 30 two-byte characters, no spaces: must cut on char boundaries.
        let text = "é".repeat(30);
        let segments = segment_with_limit(&text, 20);
        assert_eq!(segments[0].char_len(), 20);
        assert_eq!(segments[1].char_len(), 10);
    }

    #[test]
    fn period_at_end_of_window_counts_as_sentence_end() {
        // Window is exactly "aaaaaaaaaaaaaaaaaaa." (20 chars) followed by more text.
        let text = format!("{}.{}", "a".repeat(19), "b".repeat(10));
        let segments = segment_with_limit(&text, 20);
        assert_eq!(segments[0].text, format!("{}.", "a".repeat(19)));
        assert_eq!(segments[1].text, "b".repeat(10));
    }
}
