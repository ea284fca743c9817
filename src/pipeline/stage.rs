use crate::foundation::cancel::CancelToken;
use crate::foundation::error::TexforgeResult;
use crate::pipeline::request::RenderRequest;
use crate::scene::glyph::Expression;

/// Shared contract for every pipeline stage.
///
/// Each decorator stage holds the stage it wraps and delegates through this
/// trait; the chain is assembled explicitly at startup (see
/// [`crate::pipeline::Pipeline::new`]). Cancellation is cooperative: no
/// stage may swallow a cancellation outcome silently.
pub trait RenderStage: Send + Sync {
    /// Resolve one request to its rendered expression.
    fn process(&self, request: &RenderRequest, token: &CancelToken) -> TexforgeResult<Expression>;
}

impl<S: RenderStage + ?Sized> RenderStage for std::sync::Arc<S> {
    fn process(&self, request: &RenderRequest, token: &CancelToken) -> TexforgeResult<Expression> {
        (**self).process(request, token)
    }
}
