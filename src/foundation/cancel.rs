use crate::foundation::error::{TexforgeError, TexforgeResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owner side of a cancellation scope.
///
/// Minted per logical render by the supersession stage; cancelling the source
/// makes every [`CancelToken`] handed out from it observe cancellation.
#[derive(Debug, Default)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
}

impl CancelSource {
    /// Create a fresh, un-cancelled scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a token observing this scope.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Cancel the scope. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return `true` once the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Observer side of a cancellation scope.
///
/// Cheap to clone; stages check it at their boundaries and around blocking
/// calls. A default-constructed token can never be cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that never cancels (preload and standalone stage use).
    pub fn never() -> Self {
        Self::default()
    }

    /// Return `true` once the owning scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`TexforgeError::Cancelled`] once the scope is cancelled.
    pub fn checkpoint(&self) -> TexforgeResult<()> {
        if self.is_cancelled() {
            return Err(TexforgeError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_source_cancellation() {
        let src = CancelSource::new();
        let token = src.token();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint().is_ok());

        src.cancel();
        assert!(token.is_cancelled());
        assert!(token.checkpoint().unwrap_err().is_cancelled());
    }

    #[test]
    fn never_token_stays_live() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn clones_share_the_scope() {
        let src = CancelSource::new();
        let a = src.token();
        let b = a.clone();
        src.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
