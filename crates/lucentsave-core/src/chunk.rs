//! Fixed-size text chunker.
//!
//! Splits text into contiguous, non-overlapping slices of at most
//! `max_chars` characters so each slice fits the embedding provider's input
//! limit. Boundaries may fall mid-word: chunk vectors are summed, not
//! concatenated, so semantic boundaries do not matter here.
//!
//! The unit is the Unicode scalar value (`char`), which keeps every slice a
//! valid `&str`.
//!
//! # Example
//!
//! ```rust
//! use lucentsave_core::chunk::split_into_chunks;
//!
//! let chunks = split_into_chunks("abcdefg", 3);
//! assert_eq!(chunks, vec!["abc", "def", "g"]);
//! assert!(split_into_chunks("", 3).is_empty());
//! ```

/// Split `text` into slices of at most `max_chars` characters.
///
/// # Guarantees
///
/// - Concatenating the chunks in order yields `text`.
/// - Every chunk is non-empty and at most `max_chars` characters; only the
///   last may be shorter.
/// - Chunk count is `ceil(chars / max_chars)`; empty text yields no chunks.
/// - `max_chars == 0` disables splitting (one chunk for non-empty text).
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text];
    }

    let mut chunks = Vec::with_capacity(text.len() / max_chars + 1);
    let mut start = 0usize;
    let mut count = 0usize;

    for (offset, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);

    chunks
}
