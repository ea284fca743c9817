use crate::foundation::cancel::CancelToken;
use crate::foundation::error::TexforgeResult;
use crate::foundation::task::Completion;
use crate::pipeline::request::{RenderRequest, RequestKey};
use crate::pipeline::stage::RenderStage;
use crate::scene::glyph::Expression;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const INFLIGHT_WAIT_POLL: Duration = Duration::from_millis(10);

enum Entry {
    Ready(Expression),
    InFlight(Completion<Expression>),
}

/// Memoizes `request → expression` around any wrapped stage.
///
/// - A hit returns the cached clone without touching the wrapped stage.
/// - A miss publishes a shared in-flight handle before delegating, so
///   concurrent identical requests await the same work instead of
///   duplicating it (at-most-once-per-key).
/// - Only successes are stored; a failed request is retried in full next
///   time.
/// - Entries are never evicted automatically. `disable` makes every lookup
///   miss and every store a no-op without discarding entries; `enable`
///   resumes using them.
pub struct CacheStage<S> {
    inner: S,
    enabled: AtomicBool,
    entries: Mutex<HashMap<RequestKey, Entry>>,
}

impl<S: RenderStage> CacheStage<S> {
    /// Wrap `inner` with an enabled, empty cache.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(true),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Borrow the wrapped stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Resume lookups and stores against the retained entries.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Stop lookups and stores; existing entries are retained.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Return `true` while the cache is participating.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of completed entries (in-flight handles excluded).
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("cache entries poisoned")
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count()
    }

    /// Return `true` when no completed entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` when `request` has a completed entry.
    pub fn contains(&self, request: &RenderRequest) -> bool {
        matches!(
            self.entries
                .lock()
                .expect("cache entries poisoned")
                .get(&request.key()),
            Some(Entry::Ready(_))
        )
    }
}

impl<S: RenderStage> RenderStage for CacheStage<S> {
    fn process(&self, request: &RenderRequest, token: &CancelToken) -> TexforgeResult<Expression> {
        if !self.is_enabled() {
            return self.inner.process(request, token);
        }

        let key = request.key();
        let mut entries = self.entries.lock().expect("cache entries poisoned");
        match entries.get(&key) {
            Some(Entry::Ready(expr)) => {
                tracing::debug!("cache hit");
                return Ok(expr.clone());
            }
            Some(Entry::InFlight(completion)) => {
                // Late arrival: await the leader's outcome with our own
                // token, so a cancelled waiter stops waiting without
                // disturbing the in-flight work.
                let completion = completion.clone();
                drop(entries);
                return completion.wait(token, INFLIGHT_WAIT_POLL);
            }
            None => {}
        }
        let completion = Completion::new();
        entries.insert(key, Entry::InFlight(completion.clone()));
        drop(entries);

        let outcome = self.inner.process(request, token);

        {
            let mut entries = self.entries.lock().expect("cache entries poisoned");
            match &outcome {
                Ok(expr) if self.is_enabled() => {
                    entries.insert(key, Entry::Ready(expr.clone()));
                }
                // Failures (and stores while disabled) are never memoized;
                // drop the in-flight marker so the next call retries in full.
                _ => {
                    entries.remove(&key);
                }
            }
        }
        completion.resolve(outcome.clone());
        outcome
    }
}
