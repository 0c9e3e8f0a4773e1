use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use whisper_tts::defaults::MAX_SEGMENT_CHARS;
use whisper_tts::text::{segment, segment_with_limit};

const WORD_CHARS: &[char] = &['a', 'e', 'k', 'z', 'é', 'ß', '日', '本', 'ж', '🙂'];
const SEPARATORS: &[&str] = &[" ", " ", " ", ". ", ", ", "! ", "; ", "\n", "  ", "\t"];

fn random_text(rng: &mut StdRng, words: usize) -> String {
    let mut text = String::new();
    for _ in 0..words {
        let len = rng.gen_range(1..30);
        for _ in 0..len {
            text.push(WORD_CHARS[rng.gen_range(0..WORD_CHARS.len())]);
        }
        text.push_str(SEPARATORS[rng.gen_range(0..SEPARATORS.len())]);
    }
    text
}

fn without_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[test]
fn segments_never_exceed_the_limit() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let limit = rng.gen_range(8..120);
        let words = rng.gen_range(0..60);
        let text = random_text(&mut rng, words);
        for s in segment_with_limit(&text, limit) {
            assert!(
                s.char_len() <= limit,
                "segment of {} chars over limit {}: {:?}",
                s.char_len(),
                limit,
                s.text
            );
            assert!(!s.text.is_empty());
            assert_eq!(s.text, s.text.trim());
        }
    }
}

#[test]
fn segmentation_drops_only_whitespace() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let limit = rng.gen_range(5..80);
        let words = rng.gen_range(0..80);
        let text = random_text(&mut rng, words);
        let joined: String = segment_with_limit(&text, limit)
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(without_whitespace(&joined), without_whitespace(&text));
    }
}

#[test]
fn indices_are_contiguous() {
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..100 {
        let text = random_text(&mut rng, 40);
        let segments = segment_with_limit(&text, 50);
        let total = segments.len();
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i + 1);
            assert_eq!(s.total, total);
        }
    }
}

#[test]
fn text_within_ceiling_is_a_single_trimmed_segment() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..50 {
        let words = rng.gen_range(1..100);
        let text = format!("\n  {}  ", random_text(&mut rng, words));
        if text.chars().count() > MAX_SEGMENT_CHARS || text.trim().is_empty() {
            continue;
        }
        let segments = segment(&text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, text.trim());
    }
}

#[test]
fn text_of_exactly_the_ceiling_is_not_split() {
    let text = "w".repeat(MAX_SEGMENT_CHARS);
    let segments = segment(&text);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].char_len(), MAX_SEGMENT_CHARS);
}

#[test]
fn five_thousand_chars_of_prose_split_in_two_at_a_sentence() {
    let sentence = "The quick brown fox jumps over the lazy dog. ";
    let text: String = sentence.repeat(120).chars().take(5000).collect();
    assert_eq!(text.chars().count(), 5000);

    let segments = segment(&text);
    assert_eq!(segments.len(), 2);
    for s in &segments {
        assert!(s.char_len() <= MAX_SEGMENT_CHARS);
    }

    let first = &segments[0].text;
    assert!(first.ends_with('.'), "first segment should end a sentence");
    assert!(first.chars().count() > MAX_SEGMENT_CHARS / 2);

    let rest = &text[first.len()..];
    let leading = rest.chars().take_while(|c| c.is_whitespace()).count();
    assert!(leading <= 1);
    assert_eq!(rest.trim(), segments[1].text);
}
