//! Char-indexed helpers over chapter text.
//!
//! Offsets everywhere in the reader count Unicode scalar values, not bytes, so
//! slicing has to go through `char_indices`.

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the `char_idx`-th character, or `text.len()` past the end.
fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Up to `count` characters starting at character `start`.
pub fn char_window(text: &str, start: usize, count: usize) -> &str {
    let begin = byte_offset(text, start);
    let rest = &text[begin..];
    let end = byte_offset(rest, count);
    &rest[..end]
}

/// Up to `count` characters ending right before character `end`.
pub fn char_window_before(text: &str, end: usize, count: usize) -> &str {
    let start = end.saturating_sub(count);
    char_window(text, start, end - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_respect_multibyte_characters() {
        let text = "第一章 abc";
        assert_eq!(char_len(text), 7);
        assert_eq!(char_window(text, 1, 3), "一章 ");
        assert_eq!(char_window(text, 5, 10), "bc");
        assert_eq!(char_window(text, 20, 3), "");
    }

    #[test]
    fn window_before_clamps_at_start() {
        let text = "假如这是一本书";
        assert_eq!(char_window_before(text, 3, 2), "如这");
        assert_eq!(char_window_before(text, 2, 10), "假如");
        assert_eq!(char_window_before(text, 0, 5), "");
    }
}
