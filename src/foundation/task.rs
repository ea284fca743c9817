use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{TexforgeError, TexforgeResult};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A shareable write-once completion handle.
///
/// One side resolves the handle exactly once; any number of waiters block on
/// it, polling their own cancellation token at a coarse interval. Used for
/// the geometry mailbox hand-off and for shared in-flight cache outcomes.
#[derive(Debug)]
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    slot: Mutex<Option<TexforgeResult<T>>>,
    cv: Condvar,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    /// Create an unresolved handle.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                cv: Condvar::new(),
            }),
        }
    }

    /// Resolve the handle. The first resolution wins; later ones are ignored.
    pub fn resolve(&self, outcome: TexforgeResult<T>) {
        let mut slot = self.inner.slot.lock().expect("completion slot poisoned");
        if slot.is_none() {
            *slot = Some(outcome);
            self.inner.cv.notify_all();
        }
    }
}

impl<T: Clone> Completion<T> {
    /// Return the outcome without blocking, if resolved.
    pub fn try_get(&self) -> Option<TexforgeResult<T>> {
        self.inner
            .slot
            .lock()
            .expect("completion slot poisoned")
            .clone()
    }

    /// Block until resolved, or until `token` is cancelled.
    pub fn wait(&self, token: &CancelToken, poll: Duration) -> TexforgeResult<T> {
        let mut slot = self.inner.slot.lock().expect("completion slot poisoned");
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            if token.is_cancelled() {
                return Err(TexforgeError::Cancelled);
            }
            let (guard, _) = self
                .inner
                .cv
                .wait_timeout(slot, poll)
                .expect("completion slot poisoned");
            slot = guard;
        }
    }
}
