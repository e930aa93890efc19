//! Overlapping-window text splitter for long inputs.
//!
//! Texts at or under `max_chars` are returned whole. Longer texts are cut
//! into windows of `max_chars` where each window starts `max_chars - overlap`
//! characters after the previous one, so adjacent chunks share `overlap`
//! characters of context. Cut points back off to the nearest whitespace
//! within the window to avoid splitting words (and multi-byte characters
//! are never split).

/// Split `text` into overlapping chunks. Always returns at least one chunk.
///
/// `overlap` must be smaller than `max_chars`; it is clamped otherwise.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= max_chars || max_chars == 0 {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(max_chars.saturating_sub(1));
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());

        // Back off to whitespace near the window end, unless this is the
        // final window or no whitespace exists in the back half.
        let end = if hard_end < chars.len() {
            match chars[start..hard_end]
                .iter()
                .rposition(|c| c.is_whitespace())
            {
                Some(pos) if pos > max_chars / 2 => start + pos,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }
        // Next window re-covers the last `overlap` characters.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}
