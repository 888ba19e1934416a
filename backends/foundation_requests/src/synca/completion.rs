// Implements a one-shot completion primitive usable across threads.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// `CompletionState` is the state behind a [`Completion`].
#[derive(Clone, Debug)]
pub enum CompletionState<T> {
    Pending,
    Completed(T),
    Taken,
}

/// `Completion` lets one thread block, with a timeout, until another thread
/// delivers a single value.
///
/// Each request creates its own completions, so concurrent requests never
/// share a wait handle. The first call to [`Completion::complete`] wins;
/// later calls are ignored and report `false`.
pub struct Completion<T> {
    /// The condition variable used to wake the waiting thread.
    event: Condvar,

    /// Inside is the delivered value, if any.
    lock: Mutex<CompletionState<T>>,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event: Condvar::new(),
            lock: Mutex::new(CompletionState::Pending),
        }
    }

    /// Delivers `value` and wakes the waiter.
    ///
    /// Returns false when a value was already delivered.
    pub fn complete(&self, value: T) -> bool {
        let mut state = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, CompletionState::Pending) {
            return false;
        }
        *state = CompletionState::Completed(value);
        drop(state);

        self.event.notify_all();
        true
    }

    /// Returns true once a value has been delivered.
    pub fn is_completed(&self) -> bool {
        let state = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, CompletionState::Pending)
    }

    /// Blocks until a value is delivered or `timeout` elapses.
    ///
    /// The value is handed out once; a second wait after a successful one
    /// returns `None` immediately.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            match std::mem::replace(&mut *state, CompletionState::Taken) {
                CompletionState::Completed(value) => return Some(value),
                CompletionState::Taken => return None,
                CompletionState::Pending => *state = CompletionState::Pending,
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::debug!("Completion timed out after {:?}", timeout);
                        return None;
                    }
                    self.event
                        .wait_timeout(state, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                // timeout too large to represent, wait without bound
                None => self
                    .event
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
