//! Fixed-size overlapping text chunker.
//!
//! Splits normalized text into spans of at most `size` characters where
//! consecutive spans share exactly `overlap` characters. Spans cover the
//! whole input with no gaps; the last span may be shorter. Text shorter
//! than `size` yields exactly one span equal to the whole text.
//!
//! Splitting is pure and character-based (never mid-codepoint), so the
//! same input always produces the same spans.

/// One chunk of text with its position in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Zero-based sequence index within the file version.
    pub index: i64,
    pub text: String,
}

/// Split `text` into overlapping spans.
///
/// Requires `size > 0` and `overlap < size`; both are enforced by config
/// validation before this is reached.
pub fn chunk_spans(text: &str, size: usize, overlap: usize) -> Vec<TextSpan> {
    assert!(size > 0, "chunk size must be > 0");
    assert!(overlap < size, "overlap must be < chunk size");

    // Byte offset of every char boundary, plus the end of the text.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let n_chars = offsets.len() - 1;

    if n_chars <= size {
        return vec![TextSpan {
            index: 0,
            text: text.to_string(),
        }];
    }

    let step = size - overlap;
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let end = (start + size).min(n_chars);
        spans.push(TextSpan {
            index,
            text: text[offsets[start]..offsets[end]].to_string(),
        });
        if end == n_chars {
            break;
        }
        start += step;
        index += 1;
    }

    spans
}
