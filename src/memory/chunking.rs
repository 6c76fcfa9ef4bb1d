//! Splits long text into overlapping, token-bounded chunks and mean-pools
//! chunk vectors back into one vector per sector.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{HsgError, Result};

pub const DEFAULT_TARGET_TOKENS: usize = 768;
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.1;
/// Rough characters-per-token used for every estimate.
const CHARS_PER_TOKEN: usize = 4;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is a valid regex"));

/// A bounded sub-span of the source text. Offsets are in characters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub tokens: usize,
}

/// `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Sentence spans (char offsets) inside one paragraph. A sentence ends after
/// `.`, `!` or `?` followed by whitespace.
fn sentences(paragraph: &str, base: usize) -> Vec<(String, usize)> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < chars.len() {
        let is_end = matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).is_some_and(|c| c.is_whitespace());
        if is_end {
            push_sentence(&chars[start..=i], base + start, &mut out);
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    if start < chars.len() {
        push_sentence(&chars[start..], base + start, &mut out);
    }
    out
}

fn push_sentence(chars: &[char], offset: usize, out: &mut Vec<(String, usize)>) {
    let text: String = chars.iter().collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        let lead = text.chars().take_while(|c| c.is_whitespace()).count();
        out.push((trimmed.to_string(), offset + lead));
    }
}

/// Cut a sentence longer than `max_chars` into pieces on char boundaries.
fn split_long(sentence: String, offset: usize, max_chars: usize) -> Vec<(String, usize)> {
    if sentence.chars().count() <= max_chars {
        return vec![(sentence, offset)];
    }
    let chars: Vec<char> = sentence.chars().collect();
    let mut out = Vec::new();
    for (i, piece) in chars.chunks(max_chars).enumerate() {
        push_sentence(piece, offset + i * max_chars, &mut out);
    }
    out
}

/// Split `text` into chunks of at most roughly `target_tokens` tokens.
///
/// When a chunk is emitted the next one is seeded with the trailing
/// `overlap_ratio` share of the target size, so adjacent chunks share text.
pub fn chunk_text(text: &str, target_tokens: usize, overlap_ratio: f64) -> Vec<Chunk> {
    let total_tokens = estimate_tokens(text);
    if total_tokens <= target_tokens {
        return vec![Chunk {
            text: text.to_string(),
            start: 0,
            end: text.chars().count(),
            tokens: total_tokens,
        }];
    }

    let target_chars = target_tokens * CHARS_PER_TOKEN;
    let overlap_chars = (target_chars as f64 * overlap_ratio.clamp(0.0, 1.0)).floor() as usize;

    let mut all_sentences = Vec::new();
    let mut cursor = 0usize;
    for m in PARAGRAPH_BREAK.find_iter(text) {
        let para = &text[cursor..m.start()];
        all_sentences.extend(sentences(para, text[..cursor].chars().count()));
        cursor = m.end();
    }
    all_sentences.extend(sentences(&text[cursor..], text[..cursor].chars().count()));

    // an overlap seed plus one piece must still fit in a chunk
    let piece_chars = target_chars.saturating_sub(overlap_chars + 1).max(1);
    let all_sentences: Vec<(String, usize)> = all_sentences
        .into_iter()
        .flat_map(|(sentence, offset)| split_long(sentence, offset, piece_chars))
        .collect();

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_start = 0usize;

    for (sentence, offset) in all_sentences {
        let candidate_len = buf.chars().count() + 1 + sentence.chars().count();
        if candidate_len > target_chars && !buf.is_empty() {
            let buf_len = buf.chars().count();
            let end = buf_start + buf_len;
            chunks.push(Chunk {
                tokens: estimate_tokens(&buf),
                start: buf_start,
                end,
                text: std::mem::take(&mut buf),
            });
            let prev = &chunks[chunks.len() - 1].text;
            let keep = overlap_chars.min(buf_len);
            let overlap: String = prev.chars().skip(buf_len - keep).collect();
            if overlap.is_empty() {
                buf_start = offset;
                buf = sentence;
            } else {
                buf_start = end - keep;
                buf = format!("{overlap} {sentence}");
            }
        } else if buf.is_empty() {
            buf_start = offset;
            buf = sentence;
        } else {
            buf.push(' ');
            buf.push_str(&sentence);
        }
    }

    if !buf.is_empty() {
        let len = buf.chars().count();
        chunks.push(Chunk {
            tokens: estimate_tokens(&buf),
            start: buf_start,
            end: buf_start + len,
            text: buf,
        });
    }

    chunks
}

/// Element-wise mean of equal-dimension vectors.
pub fn aggregate_vectors(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| HsgError::InvalidInput("no vectors to aggregate".into()))?;
    if vectors.len() == 1 {
        return Ok(first.clone());
    }
    let dim = first.len();
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        if v.len() != dim {
            return Err(HsgError::InvalidInput(format!(
                "cannot aggregate vectors of dimension {} and {dim}",
                v.len()
            )));
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += *x as f64;
        }
    }
    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|x| (x / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(chars: usize) -> String {
        let sentence = "The quick brown fox jumps over the lazy dog near the river bank. ";
        let mut out = String::new();
        let mut n = 0;
        while out.len() < chars {
            out.push_str(sentence);
            n += 1;
            if n % 8 == 0 {
                out.push_str("\n\n");
            }
        }
        out.truncate(chars);
        out
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk_text("Hello world.", DEFAULT_TARGET_TOKENS, DEFAULT_OVERLAP_RATIO);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.");
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 12);
        assert_eq!(chunks[0].tokens, 3);
    }

    #[test]
    fn ten_thousand_chars_split_with_overlap() {
        let text = long_text(10_000);
        let chunks = chunk_text(&text, 768, 0.1);
        assert!(chunks.len() > 1, "expected several chunks, got {}", chunks.len());

        let overlap_chars = (768.0 * 4.0 * 0.1f64).floor() as usize;
        for c in &chunks {
            // target plus one trailing sentence of slack
            assert!(c.tokens <= 768 + 20, "chunk too large: {} tokens", c.tokens);
        }
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].text.chars().count() - overlap_chars)
                .collect();
            assert!(!tail.is_empty());
            assert!(
                pair[1].text.starts_with(&tail),
                "next chunk should open with the previous chunk's tail"
            );
            assert!(pair[1].start < pair[0].end);
        }
    }

    #[test]
    fn unpunctuated_text_is_cut_to_target() {
        let text = "x".repeat(10_000);
        let chunks = chunk_text(&text, 768, 0.1);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.tokens <= 768), "{:?}", chunks.iter().map(|c| c.tokens).collect::<Vec<_>>());
        assert_eq!(chunks[0].start, 0);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end);
        }
    }

    #[test]
    fn long_sentence_pieces_keep_offsets() {
        let pieces = split_long("abcdefg".into(), 10, 3);
        assert_eq!(
            pieces,
            vec![("abc".to_string(), 10), ("def".to_string(), 13), ("g".to_string(), 16)]
        );
        assert_eq!(split_long("ab".into(), 4, 3), vec![("ab".to_string(), 4)]);
    }

    #[test]
    fn zero_overlap_has_no_shared_prefix() {
        let text = long_text(5_000);
        let chunks = chunk_text(&text, 200, 0.0);
        assert!(chunks.len() > 1);
        assert!(chunks[1].start >= chunks[0].end);
    }

    #[test]
    fn sentence_split_keeps_terminators() {
        let s = sentences("One. Two! Three? Four", 0);
        let texts: Vec<&str> = s.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["One.", "Two!", "Three?", "Four"]);
        assert_eq!(s[1].1, 5);
    }

    #[test]
    fn aggregate_single_is_passthrough() {
        let v = vec![vec![0.25, -1.0, 3.0]];
        assert_eq!(aggregate_vectors(&v).unwrap(), v[0]);
    }

    #[test]
    fn aggregate_is_elementwise_mean() {
        let v = vec![vec![1.0, 2.0], vec![3.0, 6.0]];
        assert_eq!(aggregate_vectors(&v).unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn aggregate_rejects_empty_and_ragged() {
        assert!(aggregate_vectors(&[]).is_err());
        assert!(aggregate_vectors(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
