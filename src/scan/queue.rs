// src/scan/queue.rs
// =============================================================================
// The pending-task queue shared by every worker.
//
// How it works:
// 1. Anyone can push tasks at any time; pushing never waits
// 2. A worker pulling from an empty queue sleeps until something arrives
// 3. The coordinator closes the queue exactly when the run is over
// 4. Closing wakes every sleeping worker and they all get `None`
//
// An empty queue is NOT a sign the run is finished: a worker that is still
// probing may be about to push children. Only the coordinator (which watches
// the outstanding-work counter) decides when to close.
//
// Rust concepts:
// - VecDeque: FIFO buffer, push_back() to add, pop_front() to take
// - Mutex: only one thread touches the buffer at a time
// - tokio::sync::Notify: async "wake up" signal without polling
// =============================================================================

use super::task::ScanTask;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<ScanTask>,
    closed: bool,
}

/// Unbounded multi-producer multi-consumer queue that can be closed once.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await, and the state stays valid even
    // if a holder panicked, so a poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends tasks and wakes waiting workers.
    ///
    /// Returns how many tasks were accepted; a closed queue accepts none.
    pub fn enqueue(&self, tasks: impl IntoIterator<Item = ScanTask>) -> usize {
        let accepted = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            let before = state.tasks.len();
            state.tasks.extend(tasks);
            state.tasks.len() - before
        };

        if accepted > 0 {
            self.available.notify_waiters();
        }
        accepted
    }

    /// Takes the next task, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed, even if tasks are still
    /// buffered (those are discarded on cancellation).
    pub async fn dequeue(&self) -> Option<ScanTask> {
        loop {
            // Register interest BEFORE looking at the buffer, otherwise a
            // notify_waiters() between the check and the await would be missed
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.tasks.pop_front() {
                    return Some(task);
                }
            }

            notified.await;
        }
    }

    /// Closes the queue and releases every blocked `dequeue`.
    /// Closing twice is harmless.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }
}
