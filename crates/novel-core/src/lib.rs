//! Scroll-driven reading of a remotely hosted book.
//!
//! The session keeps one reading position in sync with a Legado-style library
//! service; the inline reader turns host input into steps and renders the
//! line after the activation trigger.

pub mod bus;
pub mod cancellation;
pub mod config;
pub mod fitting;
pub mod library;
pub mod pagination;
pub mod persister;
pub mod reader;
pub mod session;
pub mod text_utils;
pub mod worker;

pub use config::{LogLevel, ReaderConfig, load_config};
pub use library::{Book, Chapter, HttpLibraryClient, LibraryClient, LibraryError, ProgressRecord};
pub use reader::InlineReader;
pub use session::{ReadingPosition, ReadingSession, ReadingSnapshot, SessionEvent, SessionStatus};
