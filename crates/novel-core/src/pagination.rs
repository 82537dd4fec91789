//! Line layout for the inline reader.
//!
//! A "page" here is a single rendered line: the characters starting at the
//! reading offset that fit into the viewport. Stepping forward advances by
//! exactly that line, stepping backward walks the same budget right-to-left.

use crate::fitting::{CharMetrics, fitting_count, fitting_count_backward};
use crate::text_utils::{char_len, char_window};

/// Characters considered when laying out one line.
pub const RENDER_BUFFER_CHARS: usize = 100;

/// Pixel geometry of the line the reader draws into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub padding_left: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 600,
            padding_left: 10,
        }
    }
}

impl Viewport {
    pub fn available_width(&self) -> u32 {
        self.width.saturating_sub(self.padding_left)
    }
}

/// The visible line at `offset`.
///
/// Offsets at or past the end collapse onto the last character so the end of
/// a chapter still renders something.
pub fn line_at<'a, M: CharMetrics + ?Sized>(
    content: &'a str,
    offset: usize,
    metrics: &M,
    viewport: Viewport,
) -> &'a str {
    let len = char_len(content);
    let offset = offset.min(len.saturating_sub(1));
    fit_line(content, offset, metrics, viewport)
}

fn fit_line<'a, M: CharMetrics + ?Sized>(
    content: &'a str,
    offset: usize,
    metrics: &M,
    viewport: Viewport,
) -> &'a str {
    let window = char_window(content, offset, RENDER_BUFFER_CHARS);
    let count = fitting_count(window, metrics, viewport.available_width());
    char_window(window, 0, count)
}

/// Characters to advance for one forward step. Never zero.
pub fn step_forward<M: CharMetrics + ?Sized>(
    content: &str,
    offset: usize,
    metrics: &M,
    viewport: Viewport,
) -> usize {
    char_len(fit_line(content, offset, metrics, viewport)).max(1)
}

/// Characters to retreat for one backward step. Never zero; at offset 0 the
/// step is 1 so the resulting index goes negative and crosses into the
/// previous chapter.
pub fn step_backward<M: CharMetrics + ?Sized>(
    content: &str,
    offset: usize,
    metrics: &M,
    viewport: Viewport,
) -> usize {
    if offset == 0 {
        return 1;
    }
    fitting_count_backward(content, offset, metrics, viewport.available_width()).max(1)
}

/// Offset requested by a wheel rotation. Positive rotation reads forward.
pub fn next_offset<M: CharMetrics + ?Sized>(
    content: &str,
    offset: usize,
    rotation: i32,
    metrics: &M,
    viewport: Viewport,
) -> i64 {
    let current = i64::try_from(offset).unwrap_or(i64::MAX);
    match rotation.signum() {
        1 => current.saturating_add(step_forward(content, offset, metrics, viewport) as i64),
        -1 => current.saturating_sub(step_backward(content, offset, metrics, viewport) as i64),
        _ => current,
    }
}
