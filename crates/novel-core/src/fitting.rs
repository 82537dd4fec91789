//! Text fitting: how many characters of a span fit into a pixel budget.
//!
//! Both input stepping and render truncation are built on [`fitting_count`],
//! so a step always advances by exactly what was on screen.

use crate::text_utils::char_window_before;
use unicode_width::UnicodeWidthChar;

/// Maximum number of characters inspected when walking backwards.
pub const LOOKBACK_CHARS: usize = 100;

/// Per-character advance widths in pixels.
pub trait CharMetrics {
    fn char_width(&self, ch: char) -> u32;
}

impl<F> CharMetrics for F
where
    F: Fn(char) -> u32,
{
    fn char_width(&self, ch: char) -> u32 {
        self(ch)
    }
}

/// Two-class metrics: wide (CJK, fullwidth) characters and everything else.
/// Control and zero-width characters take no space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidthMetrics {
    pub narrow: u32,
    pub wide: u32,
}

impl Default for FixedWidthMetrics {
    fn default() -> Self {
        Self {
            narrow: 8,
            wide: 16,
        }
    }
}

impl CharMetrics for FixedWidthMetrics {
    fn char_width(&self, ch: char) -> u32 {
        if ch.is_control() {
            return 0;
        }
        match UnicodeWidthChar::width(ch).unwrap_or(0) {
            0 => 0,
            1 => self.narrow,
            _ => self.wide,
        }
    }
}

/// Count of leading characters of `text` whose summed width stays within
/// `width_limit`. Stops before the first character that would overflow.
pub fn fitting_count<M: CharMetrics + ?Sized>(text: &str, metrics: &M, width_limit: u32) -> usize {
    fit_chars(text.chars(), metrics, width_limit)
}

/// Backward variant: walks left from character `offset` over at most
/// [`LOOKBACK_CHARS`] characters.
///
/// Returns at least 1 whenever a character precedes `offset`, so a backward
/// step never stalls on a glyph wider than the budget.
pub fn fitting_count_backward<M: CharMetrics + ?Sized>(
    text: &str,
    offset: usize,
    metrics: &M,
    width_limit: u32,
) -> usize {
    let window = char_window_before(text, offset, LOOKBACK_CHARS);
    if window.is_empty() {
        return 0;
    }
    fit_chars(window.chars().rev(), metrics, width_limit).max(1)
}

fn fit_chars<M, I>(chars: I, metrics: &M, width_limit: u32) -> usize
where
    M: CharMetrics + ?Sized,
    I: Iterator<Item = char>,
{
    let mut used: u64 = 0;
    let mut count = 0;
    for ch in chars {
        let width = u64::from(metrics.char_width(ch));
        if used + width > u64::from(width_limit) {
            break;
        }
        used += width;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width_of(text: &str, metrics: &impl CharMetrics) -> u32 {
        text.chars().map(|ch| metrics.char_width(ch)).sum()
    }

    #[test]
    fn empty_text_fits_nothing() {
        let metrics = FixedWidthMetrics::default();
        assert_eq!(fitting_count("", &metrics, 0), 0);
        assert_eq!(fitting_count("", &metrics, 500), 0);
    }

    #[test]
    fn stops_before_the_overflowing_character() {
        let metrics = |_: char| 10u32;
        assert_eq!(fitting_count("abcdef", &metrics, 35), 3);
        assert_eq!(fitting_count("abcdef", &metrics, 30), 3);
        assert_eq!(fitting_count("abcdef", &metrics, 29), 2);
        assert_eq!(fitting_count("abc", &metrics, 1000), 3);
    }

    #[test]
    fn fitted_prefix_is_maximal_for_mixed_widths() {
        let metrics = FixedWidthMetrics::default();
        let samples = ["hello 世界 and more", "第一章 起点", "plain ascii text", "龍龍龍a"];
        for text in samples {
            for limit in [0, 7, 8, 15, 16, 17, 40, 64, 1000] {
                let count = fitting_count(text, &metrics, limit);
                assert!(count <= text.chars().count());
                let prefix: String = text.chars().take(count).collect();
                assert!(width_of(&prefix, &metrics) <= limit);
                if let Some(next) = text.chars().nth(count) {
                    assert!(width_of(&prefix, &metrics) + metrics.char_width(next) > limit);
                }
            }
        }
    }

    #[test]
    fn wide_characters_take_the_wide_width() {
        let metrics = FixedWidthMetrics { narrow: 5, wide: 12 };
        assert_eq!(metrics.char_width('a'), 5);
        assert_eq!(metrics.char_width('书'), 12);
        assert_eq!(metrics.char_width('，'), 12);
        assert_eq!(metrics.char_width('\n'), 0);
    }

    #[test]
    fn backward_counts_from_offset() {
        let metrics = |_: char| 10u32;
        assert_eq!(fitting_count_backward("abcdefgh", 6, &metrics, 30), 3);
        assert_eq!(fitting_count_backward("abcdefgh", 2, &metrics, 30), 2);
    }

    #[test]
    fn backward_never_returns_zero_after_start() {
        let metrics = |_: char| 50u32;
        for offset in 1..=4 {
            assert_eq!(fitting_count_backward("wxyz", offset, &metrics, 10), 1);
        }
        assert_eq!(fitting_count_backward("wxyz", 0, &metrics, 10), 0);
        assert_eq!(fitting_count_backward("", 3, &metrics, 10), 0);
    }

    #[test]
    fn backward_is_bounded_by_lookback() {
        let text = "a".repeat(500);
        let metrics = |_: char| 1u32;
        assert_eq!(fitting_count_backward(&text, 400, &metrics, 10_000), LOOKBACK_CHARS);
    }
}
