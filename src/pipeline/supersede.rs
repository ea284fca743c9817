use crate::foundation::cancel::{CancelSource, CancelToken};
use crate::foundation::error::{TexforgeError, TexforgeResult};
use crate::pipeline::request::RenderRequest;
use crate::pipeline::stage::RenderStage;
use crate::scene::glyph::Expression;
use std::sync::Mutex;

/// Outermost façade stage: starting a new render supersedes the previous
/// one.
///
/// Each [`SupersedeStage::process`] call mints a fresh cancellation scope
/// and cancels whichever render the caller had outstanding; typing
/// invalidates the prior render. The most recent non-cancellation error is
/// retained for display so callers can show it without handling errors at
/// the call site; a later successful render clears it.
pub struct SupersedeStage<S> {
    inner: S,
    current: Mutex<Option<CancelSource>>,
    last_error: Mutex<Option<TexforgeError>>,
}

impl<S: RenderStage> SupersedeStage<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            current: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Borrow the wrapped stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Process `request` under a fresh scope, superseding the previous one.
    pub fn process(&self, request: &RenderRequest) -> TexforgeResult<Expression> {
        let token = self.supersede();
        let outcome = self.inner.process(request, &token);

        let mut last = self.last_error.lock().expect("last_error poisoned");
        match &outcome {
            Ok(_) => *last = None,
            Err(e) if !e.is_cancelled() => *last = Some(e.clone()),
            // Cancellation is not a real error; never record it.
            Err(_) => {}
        }
        outcome
    }

    /// Abort the current logical render, if any.
    pub fn cancel(&self) {
        if let Some(current) = self.current.lock().expect("current scope poisoned").as_ref() {
            current.cancel();
        }
    }

    /// The most recent non-cancellation error, if the last render failed.
    pub fn last_error(&self) -> Option<TexforgeError> {
        self.last_error.lock().expect("last_error poisoned").clone()
    }

    fn supersede(&self) -> CancelToken {
        let mut current = self.current.lock().expect("current scope poisoned");
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        let source = CancelSource::new();
        let token = source.token();
        *current = Some(source);
        token
    }
}
