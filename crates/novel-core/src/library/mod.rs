//! Remote library service: models, the client seam and its errors.

mod http;

pub use http::{HttpLibraryClient, normalize_base_url};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bookshelf entry. Missing fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    pub name: String,
    pub author: String,
    pub book_url: String,
    pub cover_url: String,
    pub dur_chapter_index: i64,
    pub dur_chapter_pos: i64,
    pub dur_chapter_time: i64,
    pub total_chapter_num: i64,
}

impl Book {
    /// Saved chapter index, clamped into `0..chapter_count`.
    pub fn saved_chapter(&self, chapter_count: usize) -> usize {
        let last = chapter_count.saturating_sub(1);
        usize::try_from(self.dur_chapter_index.max(0))
            .unwrap_or(usize::MAX)
            .min(last)
    }

    /// Saved in-chapter offset; negative values read as the chapter start.
    pub fn saved_offset(&self) -> usize {
        usize::try_from(self.dur_chapter_pos.max(0)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    pub title: String,
    pub index: usize,
    pub url: String,
}

/// What a progress save reports. The send time is stamped by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub book_name: String,
    pub author: String,
    pub book_url: String,
    pub chapter_index: usize,
    pub chapter_pos: usize,
    pub chapter_title: String,
}

impl ProgressRecord {
    pub fn for_book(book: &Book, chapter_index: usize, chapter_pos: usize, title: &str) -> Self {
        Self {
            book_name: book.name.clone(),
            author: book.author.clone(),
            book_url: book.book_url.clone(),
            chapter_index,
            chapter_pos,
            chapter_title: title.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LibraryError {
    #[error("no book on the shelf matches {0:?}")]
    BookNotFound(String),
    #[error("library request {path} failed with status {status}")]
    HttpStatus {
        path: String,
        status: reqwest::StatusCode,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to decode library response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected library response: {0}")]
    UnexpectedPayload(String),
}

/// Blocking access to the remote library. Calls are made from the session
/// worker thread only.
pub trait LibraryClient: Send + Sync + 'static {
    /// First bookshelf entry whose name contains `name`.
    fn find_book_by_name(&self, name: &str) -> Result<Book, LibraryError>;

    fn chapter_list(&self, book: &Book) -> Result<Vec<Chapter>, LibraryError>;

    fn book_content(&self, book: &Book, chapter_index: usize) -> Result<String, LibraryError>;

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), LibraryError>;
}
