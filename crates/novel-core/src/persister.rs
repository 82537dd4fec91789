//! Debounced progress saves.
//!
//! At most one scheduled save is live. Rescheduling cancels the previous one
//! if it has not started, so a burst of scroll events collapses into a single
//! remote write once input goes quiet.

use crate::worker::{SerialWorker, TaskHandle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

pub type SaveFn = Arc<dyn Fn() + Send + Sync + 'static>;

pub struct ProgressPersister {
    worker: SerialWorker,
    delay: Duration,
    save: SaveFn,
    pending: Mutex<Option<TaskHandle>>,
}

impl ProgressPersister {
    pub fn new(worker: SerialWorker, delay: Duration, save: SaveFn) -> Self {
        Self {
            worker,
            delay,
            save,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn pending(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any pending save with one that runs after the quiet period.
    pub fn schedule_debounced(&self) {
        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
        let save = Arc::clone(&self.save);
        *pending = Some(self.worker.schedule(self.delay, move || save()));
        debug!(delay_ms = self.delay.as_millis(), "Progress save scheduled");
    }

    /// Cancel the pending save and queue one to run now.
    pub fn flush_immediately(&self) {
        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
        let save = Arc::clone(&self.save);
        self.worker.submit(move || save());
        debug!("Progress save flushed");
    }

    /// Cancel the pending save. True when one was still waiting to run.
    pub fn cancel_pending(&self) -> bool {
        self.pending()
            .take()
            .is_some_and(|previous| previous.cancel())
    }

    pub fn has_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|handle| !handle.is_done())
    }
}
