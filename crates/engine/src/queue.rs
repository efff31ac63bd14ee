//! Work queue between the watch loop and the stability poller.
//!
//! A path is either queued, in flight (settling or being moved), or absent.
//! Pushing a path that is already queued or in flight is a no-op, so a burst
//! of write events for one file never produces two concurrent moves.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
    in_flight: HashSet<PathBuf>,
    closed: bool,
}

/// Deduplicating FIFO of wormhole paths awaiting a worker.
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `path`. Returns `false` if it was already queued or claimed,
    /// or if the queue is closed.
    pub fn push(&self, path: PathBuf) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");
        if state.closed || state.queued.contains(&path) || state.in_flight.contains(&path) {
            return false;
        }
        trace!(path = %path.display(), "queued");
        state.queued.insert(path.clone());
        state.order.push_back(path);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Wait for the next path and mark it in flight. `None` once the queue is
    /// closed and drained of waiting work.
    pub async fn claim(&self) -> Option<PathBuf> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("queue lock poisoned");
                if state.closed {
                    return None;
                }
                if let Some(path) = state.order.pop_front() {
                    state.queued.remove(&path);
                    state.in_flight.insert(path.clone());
                    let more = !state.order.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on; notify_one may have been consumed.
                        self.notify.notify_one();
                    }
                    return Some(path);
                }
            }

            notified.await;
        }
    }

    /// Mark a claimed path as finished so it can be queued again.
    pub fn release(&self, path: &Path) {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .in_flight
            .remove(path);
    }

    /// Stop handing out work and wake every waiting worker. Queued paths are
    /// dropped; files stay in the wormhole for the next sweep.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.closed = true;
        state.order.clear();
        state.queued.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("queue lock poisoned").closed
    }

    /// Paths waiting for a worker (not counting in-flight ones).
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `path` is queued or being worked on.
    pub fn contains(&self, path: &Path) -> bool {
        let state = self.state.lock().expect("queue lock poisoned");
        state.queued.contains(path) || state.in_flight.contains(path)
    }
}
