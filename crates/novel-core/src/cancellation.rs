use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle of one queued task, shared between the queue and its handle.
///
/// Cancellation only wins while the task is still pending; once the worker
/// has claimed it with [`CancellationToken::try_start`] it runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the task already started, finished or was cancelled.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Ran to completion or was cancelled before starting.
    pub fn is_done(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), FINISHED | CANCELLED)
    }

    pub(crate) fn try_start(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish(&self) {
        self.state.store(FINISHED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_wins_only_before_start() {
        let token = CancellationToken::new();
        assert!(!token.is_done());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert!(token.is_done());
        assert!(!token.try_start());
        assert!(!token.cancel());

        let started = CancellationToken::new();
        assert!(started.try_start());
        assert!(!started.cancel());
        assert!(!started.is_done());
        started.finish();
        assert!(started.is_done());
        assert!(!started.is_cancelled());
    }
}
