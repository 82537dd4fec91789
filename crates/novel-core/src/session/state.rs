use super::{ReadingPosition, ReadingSnapshot, SessionStatus};
use crate::library::{Book, Chapter};
use crate::text_utils::char_len;
use std::sync::Arc;

pub const EMPTY_CHAPTER_PLACEHOLDER: &str = "This chapter has no content.";

/// Where a freshly loaded chapter places the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Start,
    End,
    Saved(usize),
}

/// Outcome of a navigation request against the current chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepPlan {
    Move(usize),
    EndOfBook,
    StartOfBook,
    Cross { chapter: usize, target: LoadTarget },
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub status: SessionStatus,
    pub message: String,
    pub book: Option<Book>,
    pub chapters: Vec<Chapter>,
    pub position: ReadingPosition,
    pub content: Arc<str>,
    pub content_len: usize,
    /// A connect or chapter load is queued or running.
    pub in_flight: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Connecting,
            message: "Waiting for connection...".to_string(),
            book: None,
            chapters: Vec::new(),
            position: ReadingPosition::default(),
            content: Arc::from(""),
            content_len: 0,
            in_flight: false,
        }
    }
}

impl SessionState {
    pub fn chapter_title(&self, index: usize) -> &str {
        self.chapters
            .get(index)
            .map(|chapter| chapter.title.as_str())
            .unwrap_or_default()
    }

    pub fn plan_step(&self, new_offset: i64) -> StepPlan {
        let len = i64::try_from(self.content_len).unwrap_or(i64::MAX);
        let current = self.position.chapter_index;
        if new_offset >= len {
            if current + 1 < self.chapters.len() {
                StepPlan::Cross {
                    chapter: current + 1,
                    target: LoadTarget::Start,
                }
            } else {
                StepPlan::EndOfBook
            }
        } else if new_offset < 0 {
            if current > 0 {
                StepPlan::Cross {
                    chapter: current - 1,
                    target: LoadTarget::End,
                }
            } else {
                StepPlan::StartOfBook
            }
        } else {
            StepPlan::Move(new_offset as usize)
        }
    }

    pub fn set_connecting(&mut self, book_name: &str) {
        self.status = SessionStatus::Connecting;
        self.message = format!("Connecting to library for {book_name}...");
        self.in_flight = true;
    }

    /// Announce a load of `chapter` without touching the position yet.
    pub fn set_loading(&mut self, chapter: usize) {
        self.status = SessionStatus::Loading;
        self.message = format!("Loading: {}...", self.chapter_title(chapter));
        self.in_flight = true;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.message = message.into();
        self.position.text_offset = 0;
        self.in_flight = false;
    }

    pub fn apply_content(&mut self, text: String, target: LoadTarget) {
        let text = if text.is_empty() {
            EMPTY_CHAPTER_PLACEHOLDER.to_string()
        } else {
            text
        };
        self.content_len = char_len(&text);
        self.content = Arc::from(text);
        let last = self.content_len.saturating_sub(1);
        let offset = match target {
            LoadTarget::Start => 0,
            LoadTarget::End => last,
            LoadTarget::Saved(offset) => offset,
        };
        self.position.text_offset = offset.min(last);
        self.status = SessionStatus::Ready;
        self.message.clear();
        self.in_flight = false;
    }

    /// Chapter text when ready, otherwise the status message.
    pub fn display_text(&self) -> Arc<str> {
        if self.status == SessionStatus::Ready {
            Arc::clone(&self.content)
        } else {
            Arc::from(self.message.as_str())
        }
    }

    pub fn snapshot(&self) -> ReadingSnapshot {
        ReadingSnapshot {
            status: self.status,
            text: self.display_text(),
            offset: self.position.text_offset,
            chapter_index: self.position.chapter_index,
            chapter_title: self.chapter_title(self.position.chapter_index).to_string(),
            chapter_count: self.chapters.len(),
            book_name: self.book.as_ref().map(|book| book.name.clone()),
        }
    }
}
