use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::{Error, Result};

/// Completion token pairing a command submitted to the tracer thread
/// with the caller awaiting its result.
///
/// The tracer thread fulfills the handle exactly once; [`join`] blocks
/// until then and returns the cached result (joining again is safe and
/// returns the same value). [`detach`] consumes the handle, converting
/// the result into a fire-and-forget one: the tracer thread still runs
/// the command to completion, but nobody can wait on it anymore.
///
/// [`join`]: Self::join
/// [`detach`]: Self::detach
#[must_use = "commands are executed regardless, but errors surface only through `join`"]
pub struct JoinHandle<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    cell: Mutex<Option<Result<T>>>,
    cond: Condvar,
}

/// Fulfilling half of a [JoinHandle], owned by the tracer thread.
///
/// Dropping an unfulfilled completer publishes [Error::TornDown], so a
/// joiner can never hang on a command the tracer thread abandoned.
pub(crate) struct Completer<T> {
    shared: Arc<Shared<T>>,
    fulfilled: bool,
}

/// Creates a connected completer/handle pair.
pub(crate) fn completion_pair<T>() -> (Completer<T>, JoinHandle<T>) {
    let shared = Arc::new(Shared {
        cell: Mutex::new(None),
        cond: Condvar::new(),
    });

    (
        Completer {
            shared: shared.clone(),
            fulfilled: false,
        },
        JoinHandle { shared },
    )
}

impl<T> JoinHandle<T> {
    /// Creates an already-completed handle (for submission-time errors).
    pub(crate) fn ready(res: Result<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(Some(res)),
                cond: Condvar::new(),
            }),
        }
    }

    /// Returns whether the command has been executed.
    pub fn is_finished(&self) -> bool {
        self.shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Abandons interest in the result.
    ///
    /// The command still executes; its outcome is discarded. Joining
    /// after detaching is impossible by construction (this consumes the
    /// handle), which is the supported resolution of the
    /// abandoned-handle hazard.
    pub fn detach(self) {}
}

impl<T: Clone> JoinHandle<T> {
    /// Blocks the calling thread until the tracer thread has executed
    /// the command, then returns its result.
    ///
    /// Returns immediately if the command already completed; repeated
    /// joins return the cached result.
    pub fn join(&self) -> Result<T> {
        let mut cell = self
            .shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while cell.is_none() {
            cell = self
                .shared
                .cond
                .wait(cell)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match *cell {
            Some(ref res) => res.clone(),
            None => unreachable!("completion cell checked above"),
        }
    }
}

impl<T> Completer<T> {
    /// Publishes the command result and wakes every joiner.
    pub fn fulfill(mut self, res: Result<T>) {
        self.set(res);
    }

    fn set(&mut self, res: Result<T>) {
        let mut cell = self
            .shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // write-once: the first outcome wins
        if cell.is_none() {
            *cell = Some(res);
            self.shared.cond.notify_all();
        }

        self.fulfilled = true;
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.set(Err(Error::TornDown));
        }
    }
}
