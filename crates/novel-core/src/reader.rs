//! Host-facing adapter: trigger activation, wheel input and the rendered line.
//!
//! A host feeds caret moves and wheel rotations in, and asks for the line to
//! draw after the trigger whenever [`InlineReader::poll_render`] says
//! something changed. Offsets into the host document count characters.

use crate::config::ReaderConfig;
use crate::fitting::{CharMetrics, FixedWidthMetrics};
use crate::library::LibraryClient;
use crate::pagination::{Viewport, line_at, next_offset};
use crate::session::{ReadingSession, SessionEvent};
use crate::text_utils::{char_len, char_window};
use std::sync::mpsc::Receiver;
use tracing::debug;

pub struct InlineReader<C, M = FixedWidthMetrics> {
    session: ReadingSession<C>,
    events: Receiver<SessionEvent>,
    metrics: M,
    viewport: Viewport,
    trigger: String,
    trigger_offset: Option<usize>,
    needs_render: bool,
}

impl<C: LibraryClient> InlineReader<C, FixedWidthMetrics> {
    /// Reader using the session's configured trigger, viewport and widths.
    pub fn from_config(session: ReadingSession<C>) -> Self {
        let config: &ReaderConfig = session.config();
        let (metrics, viewport, trigger) = (
            config.metrics(),
            config.viewport(),
            config.match_prefix.clone(),
        );
        Self::new(session, metrics, viewport, trigger)
    }
}

impl<C: LibraryClient, M: CharMetrics> InlineReader<C, M> {
    pub fn new(
        session: ReadingSession<C>,
        metrics: M,
        viewport: Viewport,
        trigger: impl Into<String>,
    ) -> Self {
        let events = session.subscribe();
        Self {
            session,
            events,
            metrics,
            viewport,
            trigger: trigger.into(),
            trigger_offset: None,
            needs_render: false,
        }
    }

    pub fn session(&self) -> &ReadingSession<C> {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.trigger_offset.is_some()
    }

    /// Character offset right after the trigger the reader is attached to.
    pub fn trigger_offset(&self) -> Option<usize> {
        self.trigger_offset
    }

    /// Activate when the characters just before `caret` spell the trigger.
    pub fn on_caret_moved(&mut self, document: &str, caret: usize) {
        let trigger_len = char_len(&self.trigger);
        let matched = trigger_len > 0
            && caret >= trigger_len
            && char_window(document, caret - trigger_len, trigger_len) == self.trigger;
        if !matched {
            self.deactivate();
            return;
        }
        if self.trigger_offset == Some(caret) {
            return;
        }
        self.trigger_offset = Some(caret);
        self.needs_render = true;
        debug!(caret, "Inline reader attached");
        // No-op once a book is loaded or a request is in flight.
        self.session.ensure_connected();
    }

    pub fn deactivate(&mut self) {
        if self.trigger_offset.take().is_some() {
            self.needs_render = false;
            debug!("Inline reader detached");
        }
    }

    /// Turn a wheel rotation into a step. Returns whether the event was
    /// consumed; inactive readers leave it to the host.
    pub fn on_wheel(&mut self, rotation: i32) -> bool {
        if !self.is_active() {
            return false;
        }
        if rotation == 0 {
            return true;
        }
        let snapshot = self.session.snapshot();
        let target = next_offset(
            &snapshot.text,
            snapshot.offset,
            rotation,
            &self.metrics,
            self.viewport,
        );
        self.session.set_index(target);
        true
    }

    /// The line drawn after the trigger: exactly what one forward step skips.
    pub fn visible_line(&self) -> String {
        let snapshot = self.session.snapshot();
        line_at(&snapshot.text, snapshot.offset, &self.metrics, self.viewport).to_string()
    }

    /// Drain session events; `Some(line)` when an active reader should redraw.
    pub fn poll_render(&mut self) -> Option<String> {
        let mut changed = std::mem::take(&mut self.needs_render);
        for _ in self.events.try_iter() {
            changed = true;
        }
        (changed && self.is_active()).then(|| self.visible_line())
    }
}
