//! Deterministic text chunking with configurable overlap.
//!
//! Windows are measured in characters and prefer to end on natural
//! boundaries (paragraph break, then sentence end, then word break) before
//! falling back to a hard cut. The strict guarantees are simpler than the
//! heuristic: no chunk exceeds `chunk_size`, and concatenating the chunks
//! with each one's `overlap_with_previous` prefix dropped reproduces the
//! input exactly.

use serde::{Deserialize, Serialize};

use crate::extract::ExtractedPage;
use crate::types::IngestError;

/// A bounded slice of one page's text, tagged with its origin.
///
/// Chunks never span two pages, and `sequence_index` follows original-text
/// order within the page. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub overlap_with_previous: usize,
    pub source_url: String,
    pub title: String,
    pub sequence_index: usize,
}

/// Splits `text` into consecutive windows of at most `chunk_size` characters,
/// each window after the first sharing its leading `chunk_overlap` characters
/// with the previous window's tail.
///
/// Empty input yields an empty sequence. `chunk_overlap >= chunk_size` (or a
/// zero `chunk_size`) is a configuration error and fails fast instead of
/// looping.
pub fn split(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, IngestError> {
    if chunk_size == 0 {
        return Err(IngestError::Config("chunk_size must be positive".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(IngestError::Config(format!(
            "chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            // The window must extend past the overlap region or the next
            // start would not advance.
            find_break(&chars, start + chunk_overlap + 1, hard_end)
        };
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - chunk_overlap;
    }

    Ok(chunks)
}

/// Picks the best cut position in `min_end..=hard_end`, preferring paragraph
/// breaks, then sentence ends, then word breaks, then the hard cut.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    for end in (min_end..=hard_end).rev() {
        if end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n' {
            return end;
        }
    }
    for end in (min_end..=hard_end).rev() {
        if end >= 2
            && chars[end - 1].is_whitespace()
            && matches!(chars[end - 2], '.' | '!' | '?')
        {
            return end;
        }
    }
    for end in (min_end..=hard_end).rev() {
        if chars[end - 1].is_whitespace() {
            return end;
        }
    }
    hard_end
}

/// Chunks one extracted page, tagging every chunk with the page's URL and
/// title and a strictly increasing sequence index.
pub fn chunk_page(
    page: &ExtractedPage,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<TextChunk>, IngestError> {
    let pieces = split(&page.text, chunk_size, chunk_overlap)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            text,
            overlap_with_previous: if index == 0 { 0 } else { chunk_overlap },
            source_url: page.source_url.clone(),
            title: page.title.clone(),
            sequence_index: index,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = split("hello world", 100, 10).unwrap();
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        assert!(matches!(
            split("text", 10, 10),
            Err(IngestError::Config(_))
        ));
        assert!(matches!(
            split("text", 10, 11),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn zero_chunk_size_fails_fast() {
        assert!(split("text", 0, 0).is_err());
    }

    #[test]
    fn uniform_text_produces_expected_windows() {
        // 2048 chars, size 1024, overlap 100: [0,1024) [924,1948) [1848,2048)
        let text = "a".repeat(2048);
        let chunks = split(&text, 1024, 100).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1024);
        assert_eq!(chunks[1].chars().count(), 1024);
        assert_eq!(chunks[2].chars().count(), 200);
        assert_eq!(reconstruct(&chunks, 100), text);
    }

    #[test]
    fn windows_prefer_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split(&text, 100, 10).unwrap();
        assert!(chunks[0].ends_with("\n\n"));
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn windows_prefer_sentence_ends_over_words() {
        let text = "First sentence here. Second sentence follows with more words after it";
        let chunks = split(text, 40, 5).unwrap();
        assert!(chunks[0].ends_with(". "));
        assert_eq!(reconstruct(&chunks, 5), text);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let text = "é".repeat(300);
        let chunks = split(&text, 100, 20).unwrap();
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
        assert_eq!(reconstruct(&chunks, 20), text);
    }

    #[test]
    fn chunk_page_tags_metadata_and_sequence() {
        let page = ExtractedPage {
            source_url: "https://site/doc".to_string(),
            title: "Doc".to_string(),
            text: "x".repeat(2048),
        };
        let chunks = chunk_page(&page, 1024, 100).unwrap();
        assert_eq!(chunks.len(), 3);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, index);
            assert_eq!(chunk.source_url, "https://site/doc");
            assert_eq!(chunk.title, "Doc");
            assert_eq!(
                chunk.overlap_with_previous,
                if index == 0 { 0 } else { 100 }
            );
        }
    }

    proptest! {
        #[test]
        fn reconstruction_is_exact(
            text in ".{0,600}",
            chunk_size in 2usize..120,
            overlap_fraction in 0.0f64..1.0,
        ) {
            let overlap = ((chunk_size - 1) as f64 * overlap_fraction) as usize;
            let chunks = split(&text, chunk_size, overlap).unwrap();
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= chunk_size);
            }
            prop_assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }
}
