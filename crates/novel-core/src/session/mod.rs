//! The reading session: one book, one position, kept in sync with the library.
//!
//! Navigation arrives through [`ReadingSession::set_index`] on the caller's
//! thread. In-chapter moves update state immediately; chapter changes, the
//! initial connect and every progress save run on the session's serial
//! worker, so the remote service sees requests in the order they were made.
//! Every displayable change is published as a [`SessionEvent`].

mod state;

pub use state::{EMPTY_CHAPTER_PLACEHOLDER, LoadTarget};

use crate::bus::NotificationBus;
use crate::config::ReaderConfig;
use crate::library::{LibraryClient, LibraryError, ProgressRecord};
use crate::persister::{ProgressPersister, SaveFn};
use crate::worker::SerialWorker;
use anyhow::Result;
use state::{SessionState, StepPlan};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on how long [`ReadingSession::shutdown`] waits for the worker.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const CONFIG_MISSING_MESSAGE: &str = "Configure legado_url and book_name to start reading";
const LOAD_FAILED_MESSAGE: &str = "Failed to load chapter, scroll to retry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingPosition {
    pub chapter_index: usize,
    pub text_offset: usize,
}

/// What a renderer needs to draw the session at one instant.
#[derive(Debug, Clone)]
pub struct ReadingSnapshot {
    pub status: SessionStatus,
    /// Chapter text when ready, otherwise the status message.
    pub text: Arc<str>,
    pub offset: usize,
    pub chapter_index: usize,
    pub chapter_title: String,
    pub chapter_count: usize,
    pub book_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub action: &'static str,
    pub snapshot: ReadingSnapshot,
}

struct Inner<C> {
    config: ReaderConfig,
    client: C,
    worker: SerialWorker,
    persister: ProgressPersister,
    bus: NotificationBus<SessionEvent>,
    state: Mutex<SessionState>,
    /// Runs a cancelled pending save inline when the last handle goes away.
    teardown_save: fn(&Self),
}

impl<C> Drop for Inner<C> {
    fn drop(&mut self) {
        if self.persister.cancel_pending() {
            debug!("Session dropped with a pending save; saving inline");
            (self.teardown_save)(self);
        }
        self.worker.close();
    }
}

/// Cloneable handle to a reading session.
///
/// Call [`ReadingSession::shutdown`] before exiting. Dropping the last handle
/// instead still writes a pending debounced save, but on the dropping thread
/// and without waiting for work already queued on the worker.
pub struct ReadingSession<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ReadingSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: LibraryClient> ReadingSession<C> {
    /// Start the session worker. Nothing is fetched until [`Self::reload`] or
    /// [`Self::ensure_connected`].
    pub fn new(config: ReaderConfig, client: C) -> Result<Self> {
        let worker = SerialWorker::spawn("novel-session")?;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner<C>>| {
            let weak = weak.clone();
            let save: SaveFn = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.save_progress();
                }
            });
            let persister = ProgressPersister::new(worker.clone(), config.save_debounce(), save);
            Inner {
                config,
                client,
                worker,
                persister,
                bus: NotificationBus::new(),
                state: Mutex::new(SessionState::default()),
                teardown_save: Inner::save_progress,
            }
        });
        Ok(Self { inner })
    }

    /// Fetch the configured book and restore its saved position.
    pub fn reload(&self) {
        Inner::reload(&self.inner);
    }

    /// Connect lazily: only when no book is loaded and nothing is in flight.
    pub fn ensure_connected(&self) {
        let idle = {
            let state = self.inner.lock_state();
            state.book.is_none() && !state.in_flight
        };
        if idle {
            self.reload();
        }
    }

    /// Move to character `new_offset` of the current chapter.
    ///
    /// Offsets past either end of the chapter move to the neighbouring
    /// chapter. Ignored while a connect or load is in progress; after an
    /// error any call retries the connection.
    pub fn set_index(&self, new_offset: i64) {
        Inner::set_index(&self.inner, new_offset);
    }

    /// Chapter text when ready, otherwise the status message.
    pub fn content(&self) -> Arc<str> {
        self.inner.lock_state().display_text()
    }

    pub fn index(&self) -> usize {
        self.inner.lock_state().position.text_offset
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock_state().status
    }

    pub fn position(&self) -> ReadingPosition {
        self.inner.lock_state().position
    }

    pub fn snapshot(&self) -> ReadingSnapshot {
        self.inner.lock_state().snapshot()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.inner.bus.subscribe()
    }

    /// Block until all work submitted so far and already due has run.
    pub fn sync(&self, timeout: Duration) -> bool {
        self.inner.worker.flush(timeout)
    }

    /// Save now, then stop the worker. Delayed saves are dropped; the
    /// flushed one runs first.
    pub fn shutdown(&self) -> bool {
        info!("Shutting down reading session");
        self.inner.persister.flush_immediately();
        self.inner.worker.shutdown(SHUTDOWN_GRACE)
    }
}

impl<C> Inner<C> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, action: &'static str, state: &SessionState) {
        self.bus.publish(SessionEvent {
            action,
            snapshot: state.snapshot(),
        });
    }
}

impl<C: LibraryClient> Inner<C> {
    fn reload(this: &Arc<Self>) {
        let book_name = this.config.book_name.trim().to_string();
        if !this.config.is_complete() {
            warn!("Reader is not configured; legado_url and book_name are required");
            let mut state = this.lock_state();
            state.set_error(CONFIG_MISSING_MESSAGE);
            this.publish("session_error", &state);
            return;
        }

        let was_reading = {
            let mut state = this.lock_state();
            let was_reading = state.status == SessionStatus::Ready && state.book.is_some();
            state.set_connecting(&book_name);
            this.publish("session_connecting", &state);
            was_reading
        };
        // The connect task restores the remote position, so the local one
        // must reach the library first.
        if was_reading {
            this.persister.flush_immediately();
        }
        info!(book = %book_name, "Connecting to library");
        let inner = Arc::clone(this);
        this.worker.submit(move || inner.connect(&book_name));
    }

    /// Runs on the worker.
    fn connect(&self, book_name: &str) {
        let fetched = self.client.find_book_by_name(book_name).and_then(|book| {
            let chapters = self.client.chapter_list(&book)?;
            Ok((book, chapters))
        });
        let (book, chapters) = match fetched {
            Ok(found) => found,
            Err(LibraryError::BookNotFound(_)) => {
                warn!(book = %book_name, "Book not found on shelf");
                self.fail(format!("Book not found: {book_name}"));
                return;
            }
            Err(err) => {
                warn!(book = %book_name, "Library connection failed: {err}");
                self.fail(format!("Connection error: {err}"));
                return;
            }
        };
        if chapters.is_empty() {
            warn!(book = %book_name, "Library returned no chapters");
            self.fail(format!("No chapters found for {book_name}"));
            return;
        }

        let chapter = book.saved_chapter(chapters.len());
        let offset = book.saved_offset();
        info!(
            book = %book.name,
            chapters = chapters.len(),
            chapter,
            offset,
            "Restoring saved position"
        );
        {
            let mut state = self.lock_state();
            state.book = Some(book);
            state.chapters = chapters;
            state.position.chapter_index = chapter;
            state.set_loading(chapter);
            self.publish("chapter_loading", &state);
        }
        self.fetch_chapter(chapter, LoadTarget::Saved(offset));
    }

    /// Runs on the worker. Moves to `chapter` and loads its text.
    fn fetch_chapter(&self, chapter: usize, target: LoadTarget) {
        let book = {
            let mut state = self.lock_state();
            state.position = ReadingPosition {
                chapter_index: chapter,
                text_offset: 0,
            };
            state.book.clone()
        };
        let Some(book) = book else {
            self.fail(LOAD_FAILED_MESSAGE);
            return;
        };

        match self.client.book_content(&book, chapter) {
            Ok(text) => {
                let mut state = self.lock_state();
                state.apply_content(text, target);
                debug!(
                    chapter,
                    offset = state.position.text_offset,
                    len = state.content_len,
                    "Chapter loaded"
                );
                self.publish("chapter_loaded", &state);
            }
            Err(err) => {
                warn!(chapter, "Chapter load failed: {err}");
                self.fail(LOAD_FAILED_MESSAGE);
            }
        }
    }

    fn fail(&self, message: impl Into<String>) {
        let mut state = self.lock_state();
        state.set_error(message);
        self.publish("session_error", &state);
    }

    fn set_index(this: &Arc<Self>, new_offset: i64) {
        let mut state = this.lock_state();
        let status = state.status;
        match status {
            SessionStatus::Ready => {}
            SessionStatus::Error => {
                drop(state);
                debug!("Navigation after error; reconnecting");
                Inner::reload(this);
                return;
            }
            SessionStatus::Connecting | SessionStatus::Loading => {
                debug!(new_offset, "Navigation dropped while loading");
                return;
            }
        }

        match state.plan_step(new_offset) {
            StepPlan::Move(offset) => {
                state.position.text_offset = offset;
                this.publish("position_changed", &state);
                drop(state);
                this.persister.schedule_debounced();
            }
            StepPlan::EndOfBook => {
                state.position.text_offset = state.content_len;
                debug!("Reached end of book");
                this.publish("end_of_book", &state);
            }
            StepPlan::StartOfBook => {
                state.position.text_offset = 0;
                debug!("Reached start of book");
                this.publish("start_of_book", &state);
            }
            StepPlan::Cross { chapter, target } => {
                debug!(
                    from = state.position.chapter_index,
                    to = chapter,
                    "Crossing chapter boundary"
                );
                state.set_loading(chapter);
                this.publish("chapter_loading", &state);
                drop(state);

                // The flushed save runs before the crossing task and records
                // the position being left.
                this.persister.flush_immediately();
                let inner = Arc::clone(this);
                this.worker.submit(move || inner.fetch_chapter(chapter, target));
                this.persister.schedule_debounced();
            }
        }
    }

    /// Runs on the worker; reads the position at execution time.
    fn save_progress(&self) {
        let record = {
            let state = self.lock_state();
            let Some(book) = state.book.as_ref() else {
                debug!("No book loaded; skipping progress save");
                return;
            };
            if state.chapters.is_empty() {
                return;
            }
            let chapter = state.position.chapter_index;
            ProgressRecord::for_book(
                book,
                chapter,
                state.position.text_offset,
                state.chapter_title(chapter),
            )
        };
        if let Err(err) = self.client.save_progress(&record) {
            warn!(
                chapter = record.chapter_index,
                offset = record.chapter_pos,
                "Progress save failed: {err}"
            );
        }
    }
}
