//! Single serialized background worker.
//!
//! Every network call and every progress save runs here, one at a time, so
//! session mutations made by tasks never race each other. Tasks are ordered
//! by due time and then by submission order; immediate tasks therefore run
//! FIFO, delayed tasks run once their delay has elapsed. The thread sleeps on
//! a condvar until the next task is due.
//!
//! Cancelling a [`TaskHandle`] only affects a task that has not started yet.

use crate::cancellation::CancellationToken;
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    job: Job,
    token: CancellationToken,
}

#[derive(Default)]
struct Queue {
    tasks: BTreeMap<(Instant, u64), QueuedTask>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    name: String,
    queue: Mutex<Queue>,
    wake: Condvar,
    thread: Mutex<Option<(JoinHandle<()>, mpsc::Receiver<()>)>>,
}

/// Handle to a submitted task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    /// Prevents the task from running if it has not started.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the task ran, or was cancelled or discarded before running.
    pub fn is_done(&self) -> bool {
        self.token.is_done()
    }
}

/// Cloneable handle to the worker thread.
#[derive(Clone)]
pub struct SerialWorker {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SerialWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWorker")
            .field("name", &self.shared.name)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SerialWorker {
    pub fn spawn(name: &str) -> Result<Self> {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            thread: Mutex::new(None),
        });
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Dropped on exit; shutdown() waits for the disconnect.
                let _done = done_tx;
                run_loop(&worker_shared);
            })
            .with_context(|| format!("failed to spawn worker thread {name}"))?;
        *lock(&shared.thread) = Some((handle, done_rx));
        info!(worker = name, "Serial worker started");
        Ok(Self { shared })
    }

    /// Queue `job` to run as soon as every earlier task has finished.
    pub fn submit<F>(&self, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Duration::ZERO, Box::new(job))
    }

    /// Queue `job` to run after `delay`.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(delay, Box::new(job))
    }

    fn enqueue(&self, delay: Duration, job: Job) -> TaskHandle {
        let handle = TaskHandle::default();
        let mut queue = lock(&self.shared.queue);
        if queue.shutdown {
            drop(queue);
            debug!(worker = %self.shared.name, "Dropping task submitted after shutdown");
            handle.cancel();
            drop(job);
            return handle;
        }
        let due = Instant::now() + delay;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.tasks.insert(
            (due, seq),
            QueuedTask {
                job,
                token: handle.token.clone(),
            },
        );
        drop(queue);
        self.shared.wake.notify_one();
        handle
    }

    /// Block until every task that is due now has run, or `timeout` passes.
    ///
    /// Must not be called from a task running on this worker.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (tx, rx) = mpsc::channel();
        self.submit(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(timeout).is_ok()
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared.queue).shutdown
    }

    /// Stop accepting work without waiting. Tasks already due still run.
    pub fn close(&self) {
        lock(&self.shared.queue).shutdown = true;
        self.shared.wake.notify_all();
    }

    /// Stop accepting work, run what is already due, discard delayed tasks,
    /// and wait up to `grace` for the thread to exit.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.close();

        let Some((handle, done)) = lock(&self.shared.thread).take() else {
            return true;
        };
        if handle.thread().id() == thread::current().id() {
            warn!(worker = %self.shared.name, "Worker cannot wait for itself to shut down");
            return false;
        }
        match done.recv_timeout(grace) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if handle.join().is_err() {
                    warn!(worker = %self.shared.name, "Worker thread panicked during shutdown");
                }
                info!(worker = %self.shared.name, "Serial worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = %self.shared.name,
                    grace_ms = grace.as_millis(),
                    "Worker still busy after shutdown grace period; detaching"
                );
                false
            }
        }
    }
}

fn run_loop(shared: &Shared) {
    while let Some(task) = next_task(shared) {
        if !task.token.try_start() {
            continue;
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task.job)) {
            error!(
                worker = %shared.name,
                "Worker task panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        task.token.finish();
    }
    debug!(worker = %shared.name, "Worker loop exited");
}

fn next_task(shared: &Shared) -> Option<QueuedTask> {
    let mut queue = lock(&shared.queue);
    loop {
        let now = Instant::now();
        match queue.tasks.first_key_value().map(|(key, _)| *key) {
            Some(key) if key.0 <= now => return queue.tasks.remove(&key),
            _ if queue.shutdown => {
                let discarded = std::mem::take(&mut queue.tasks);
                drop(queue);
                if !discarded.is_empty() {
                    debug!(
                        worker = %shared.name,
                        count = discarded.len(),
                        "Discarding delayed tasks on shutdown"
                    );
                }
                for task in discarded.into_values() {
                    task.token.cancel();
                }
                return None;
            }
            Some((due, _)) => {
                queue = shared
                    .wake
                    .wait_timeout(queue, due - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            None => {
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_jobs = Arc::clone(&log);
        let make = move |label: &'static str| -> Box<dyn FnOnce() + Send> {
            let log = Arc::clone(&log_for_jobs);
            Box::new(move || log.lock().expect("log lock").push(label))
        };
        (log, make)
    }

    #[test]
    fn immediate_tasks_run_in_submission_order() {
        let worker = SerialWorker::spawn("test-fifo").expect("spawn worker");
        let (log, job) = recorder();
        for label in ["a", "b", "c", "d"] {
            worker.submit(job(label));
        }
        assert!(worker.flush(WAIT));
        assert_eq!(*log.lock().expect("log lock"), vec!["a", "b", "c", "d"]);
        worker.shutdown(WAIT);
    }

    #[test]
    fn delayed_task_runs_after_later_immediate_tasks() {
        let worker = SerialWorker::spawn("test-delay").expect("spawn worker");
        let (log, job) = recorder();
        let delayed = worker.schedule(Duration::from_millis(60), job("delayed"));
        worker.submit(job("now"));
        assert!(worker.flush(WAIT));
        assert_eq!(*log.lock().expect("log lock"), vec!["now"]);
        assert!(!delayed.is_done());

        thread::sleep(Duration::from_millis(200));
        assert!(worker.flush(WAIT));
        assert_eq!(*log.lock().expect("log lock"), vec!["now", "delayed"]);
        assert!(delayed.is_done());
        worker.shutdown(WAIT);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let worker = SerialWorker::spawn("test-cancel").expect("spawn worker");
        let (log, job) = recorder();
        let handle = worker.schedule(Duration::from_millis(30), job("cancelled"));
        handle.cancel();
        thread::sleep(Duration::from_millis(120));
        assert!(worker.flush(WAIT));
        assert!(log.lock().expect("log lock").is_empty());
        assert!(handle.is_done());
        worker.shutdown(WAIT);
    }

    #[test]
    fn panicking_task_does_not_stop_the_worker() {
        let worker = SerialWorker::spawn("test-panic").expect("spawn worker");
        let (log, job) = recorder();
        worker.submit(|| panic!("boom"));
        worker.submit(job("after"));
        assert!(worker.flush(WAIT));
        assert_eq!(*log.lock().expect("log lock"), vec!["after"]);
        worker.shutdown(WAIT);
    }

    #[test]
    fn shutdown_runs_due_tasks_and_discards_delayed_ones() {
        let worker = SerialWorker::spawn("test-shutdown").expect("spawn worker");
        let (log, job) = recorder();
        let delayed = worker.schedule(Duration::from_secs(30), job("delayed"));
        worker.submit(job("due"));
        assert!(worker.shutdown(WAIT));
        assert_eq!(*log.lock().expect("log lock"), vec!["due"]);
        assert!(delayed.is_done());

        let late = worker.submit(job("late"));
        assert!(late.is_done());
        assert!(worker.is_shutdown());
        assert!(!worker.flush(Duration::from_millis(50)));
        assert_eq!(log.lock().expect("log lock").len(), 1);
    }
}
