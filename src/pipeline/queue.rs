use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{TexforgeError, TexforgeResult};
use crate::pipeline::request::RenderRequest;
use crate::pipeline::stage::RenderStage;
use crate::scene::glyph::Expression;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

const TURN_WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct QueueState {
    next_ticket: u64,
    now_serving: u64,
    // Tickets whose owners gave up before their turn; skipped when the
    // serving counter reaches them so successors never stall.
    abandoned: HashSet<u64>,
}

impl QueueState {
    fn advance(&mut self) {
        self.now_serving += 1;
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }
}

/// Guarantees at most one in-flight call into the wrapped stage.
///
/// Arrival order is FIFO by ticket. The queue never drops entries on its
/// own: "only the latest matters" semantics belong to the caller via
/// explicit cancellation. A request cancelled before its turn is removed
/// without ever invoking the wrapped stage; one cancelled after starting is
/// left to the wrapped stage's own cancellation cooperation.
pub struct QueueStage<S> {
    inner: S,
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl<S: RenderStage> QueueStage<S> {
    /// Wrap `inner` with an empty queue.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
        }
    }

    /// Borrow the wrapped stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of callers queued or executing.
    pub fn depth(&self) -> usize {
        let state = self.state.lock().expect("queue state poisoned");
        (state.next_ticket - state.now_serving) as usize - state.abandoned.len()
    }
}

impl<S: RenderStage> RenderStage for QueueStage<S> {
    fn process(&self, request: &RenderRequest, token: &CancelToken) -> TexforgeResult<Expression> {
        let mut state = self.state.lock().expect("queue state poisoned");
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        loop {
            if token.is_cancelled() {
                if state.now_serving == ticket {
                    state.advance();
                    self.cv.notify_all();
                } else {
                    state.abandoned.insert(ticket);
                }
                return Err(TexforgeError::Cancelled);
            }
            if state.now_serving == ticket {
                break;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, TURN_WAIT_POLL)
                .expect("queue state poisoned");
            state = guard;
        }
        drop(state);

        let outcome = self.inner.process(request, token);

        let mut state = self.state.lock().expect("queue state poisoned");
        state.advance();
        self.cv.notify_all();
        drop(state);

        outcome
    }
}
