//! Stage contract, decorator stages, and the assembled pipeline façade.

/// Request memoization.
pub mod cache;
/// One-at-a-time admission into the wrapped stage.
pub mod queue;
/// The unit of work and its cache key.
pub mod request;
/// The shared stage contract.
pub mod stage;
/// Latest-render-wins façade.
pub mod supersede;

pub use cache::CacheStage;
pub use queue::QueueStage;
pub use request::{DEFAULT_HEADERS, RenderRequest, RequestKey};
pub use stage::RenderStage;
pub use supersede::SupersedeStage;

use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{TexforgeError, TexforgeResult};
use crate::scene::glyph::Expression;
use crate::typeset::{TypesetConfig, TypesetStage};
use crate::vector::mailbox::{GlyphFactory, TickMailbox};
use crate::vector::stage::GeometryStage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for [`Pipeline::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// External tool configuration.
    pub typeset: TypesetConfig,
    /// Start with the cache disabled (entries still accumulate once
    /// re-enabled).
    pub cache_disabled: bool,
}

/// Operator-facing snapshot of pipeline state. A debugging aid, not a
/// steady-state contract.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDiagnostics {
    /// Working-directory root holding per-request render directories.
    pub work_root: PathBuf,
    /// Completed cache entries.
    pub cached_entries: usize,
    /// Whether the cache is participating.
    pub cache_enabled: bool,
    /// Callers queued or executing.
    pub queue_depth: usize,
    /// Whether tessellated geometry is waiting for the host tick.
    pub mailbox_pending: bool,
}

type Chain = SupersedeStage<QueueStage<CacheStage<GeometryStage>>>;

/// The assembled compilation pipeline.
///
/// Stage order (innermost to outermost): geometry (which drives
/// typesetting) → cache → queue → supersession. The cache sees the caller's
/// exact request; the queue admits one render at a time into the external
/// tools; the supersession façade makes each new `process` call cancel the
/// previous one.
///
/// Within one instance exactly one typeset+convert subprocess pair runs at
/// a time. Independently constructed pipelines do not coordinate: treat the
/// pipeline as an effective singleton or accept subprocess contention.
///
/// The host must call [`Pipeline::pump`] from its per-tick update context;
/// mesh build-out only happens there.
pub struct Pipeline {
    chain: Chain,
    mailbox: Arc<TickMailbox>,
}

impl Pipeline {
    /// Assemble the stage chain.
    pub fn new(cfg: PipelineConfig) -> TexforgeResult<Self> {
        let mailbox = Arc::new(TickMailbox::new());
        let typeset = TypesetStage::new(cfg.typeset)?;
        let geometry = GeometryStage::new(typeset, Arc::clone(&mailbox));
        let cache = CacheStage::new(geometry);
        if cfg.cache_disabled {
            cache.disable();
        }
        let chain = SupersedeStage::new(QueueStage::new(cache));
        Ok(Self { chain, mailbox })
    }

    /// Render `request`, superseding whichever render was outstanding.
    pub fn process(&self, request: &RenderRequest) -> TexforgeResult<Expression> {
        self.chain.process(request)
    }

    /// Abort the current logical render.
    pub fn cancel(&self) {
        self.chain.cancel();
    }

    /// The most recent non-cancellation error, for inline display.
    pub fn last_error(&self) -> Option<TexforgeError> {
        self.chain.last_error()
    }

    /// Resume cache participation.
    pub fn enable_cache(&self) {
        self.cache().enable();
    }

    /// Suspend cache participation without discarding entries.
    pub fn disable_cache(&self) {
        self.cache().disable();
    }

    /// Warm cache entries for `requests` without blocking per entry.
    ///
    /// Warming enters the chain below the supersession stage, so it never
    /// cancels an interactive render; the queue still serializes the actual
    /// tool runs and identical requests dedupe at the cache. Failed entries
    /// are logged and skipped. Returns the number of requests that resolved.
    pub fn preload(&self, requests: &[RenderRequest]) -> usize {
        let queue = self.chain.inner();
        std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| {
                    scope.spawn(move || queue.process(request, &CancelToken::never()))
                })
                .collect();
            let mut warmed = 0;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(_)) => warmed += 1,
                    Ok(Err(e)) => tracing::warn!("preload entry failed: {e}"),
                    Err(_) => tracing::warn!("preload worker panicked"),
                }
            }
            warmed
        })
    }

    /// Host tick hook: drain pending geometry and build meshes on the
    /// calling context. Returns `true` when an expression was built.
    pub fn pump(&self, factory: &dyn GlyphFactory) -> bool {
        self.mailbox.pump(factory)
    }

    /// The mailbox shared with the host, for hosts that pump directly.
    pub fn mailbox(&self) -> Arc<TickMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Working-directory root, for operator inspection of logs and
    /// timeout sidecars.
    pub fn work_root(&self) -> &Path {
        self.geometry().typeset().work_root()
    }

    /// Snapshot pipeline state for operator inspection.
    pub fn diagnostics(&self) -> PipelineDiagnostics {
        PipelineDiagnostics {
            work_root: self.work_root().to_path_buf(),
            cached_entries: self.cache().len(),
            cache_enabled: self.cache().is_enabled(),
            queue_depth: self.chain.inner().depth(),
            mailbox_pending: self.mailbox.has_pending(),
        }
    }

    fn cache(&self) -> &CacheStage<GeometryStage> {
        self.chain.inner().inner()
    }

    fn geometry(&self) -> &GeometryStage {
        self.cache().inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_serde() {
        let cfg = PipelineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.typeset.tex_binary, cfg.typeset.tex_binary);
        assert_eq!(back.typeset.timeout, cfg.typeset.timeout);
        assert_eq!(back.cache_disabled, cfg.cache_disabled);
    }

    #[test]
    fn fresh_pipeline_reports_clean_diagnostics() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let d = pipeline.diagnostics();
        assert_eq!(d.cached_entries, 0);
        assert!(d.cache_enabled);
        assert_eq!(d.queue_depth, 0);
        assert!(!d.mailbox_pending);
        assert!(d.work_root.is_dir());
        assert!(pipeline.last_error().is_none());
    }

    #[test]
    fn cache_toggle_is_exposed_on_the_facade() {
        let pipeline = Pipeline::new(PipelineConfig {
            cache_disabled: true,
            ..PipelineConfig::default()
        })
        .unwrap();
        assert!(!pipeline.diagnostics().cache_enabled);
        pipeline.enable_cache();
        assert!(pipeline.diagnostics().cache_enabled);
        pipeline.disable_cache();
        assert!(!pipeline.diagnostics().cache_enabled);
    }
}
