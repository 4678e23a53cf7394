//! UTF-8 byte-exact truncation and splitting for oversized text.
//!
//! Slices only ever happen at character boundaries, so results are always
//! valid UTF-8.

pub fn utf8_byte_length(text: &str) -> usize {
    text.len()
}

/// Longest prefix of whole characters that fits in `max_bytes`.
pub fn truncate_to_byte_limit(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next > max_bytes {
            break;
        }
        end = next;
    }
    &text[..end]
}

/// Greedily pack whole characters into chunks of at most `max_bytes`.
///
/// A character whose own encoding exceeds `max_bytes` is dropped.
pub fn split_by_byte_limit(text: &str, max_bytes: usize) -> Vec<String> {
    let mut parts = Vec::new();
    if max_bytes == 0 || text.is_empty() {
        return parts;
    }

    let mut current = String::new();
    for ch in text.chars() {
        let char_bytes = ch.len_utf8();
        if char_bytes > max_bytes {
            continue;
        }
        if current.len() + char_bytes > max_bytes {
            parts.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
