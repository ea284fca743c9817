use crate::foundation::cancel::CancelToken;
use crate::foundation::error::TexforgeResult;
use crate::foundation::task::Completion;
use crate::pipeline::request::RenderRequest;
use crate::pipeline::stage::RenderStage;
use crate::scene::glyph::Expression;
use crate::typeset::TypesetStage;
use crate::vector::mailbox::TickMailbox;
use crate::vector::parse::parse_vector_document;
use crate::vector::tessellate::{TessellatedGlyph, overall_bounds, tessellate_outline};
use std::sync::Arc;
use std::time::Duration;

const MAILBOX_WAIT_POLL: Duration = Duration::from_millis(10);

/// Innermost compile stage: typesets a request and converts the resulting
/// vector document into tessellated glyph geometry.
///
/// Parsing and tessellation run on the calling (background) task; mesh
/// build-out is handed to the host's per-tick context through the shared
/// [`TickMailbox`]. A malformed vector document is a soft failure: it is
/// logged and produces an empty expression so one bad render does not abort
/// a batch.
pub struct GeometryStage {
    typeset: TypesetStage,
    mailbox: Arc<TickMailbox>,
}

impl GeometryStage {
    /// Create the stage around a typeset stage and the host-shared mailbox.
    pub fn new(typeset: TypesetStage, mailbox: Arc<TickMailbox>) -> Self {
        Self { typeset, mailbox }
    }

    /// The underlying typeset stage (diagnostics).
    pub fn typeset(&self) -> &TypesetStage {
        &self.typeset
    }

    /// Convert vector document text into an expression.
    pub fn convert(
        &self,
        vector_text: &str,
        token: &CancelToken,
    ) -> TexforgeResult<Expression> {
        let outlines = match parse_vector_document(vector_text) {
            Ok(outlines) => outlines,
            Err(e) => {
                tracing::warn!("discarding malformed vector document: {e}");
                return Ok(Expression::default());
            }
        };

        let mut glyphs: Vec<TessellatedGlyph> = Vec::with_capacity(outlines.len());
        for outline in &outlines {
            match tessellate_outline(outline) {
                Ok(glyph) => glyphs.push(glyph),
                Err(e) => tracing::warn!("skipping untessellatable outline: {e}"),
            }
        }
        if let Some(bounds) = overall_bounds(&glyphs) {
            tracing::debug!(
                glyphs = glyphs.len(),
                width = bounds.width(),
                height = bounds.height(),
                "tessellated expression"
            );
        }

        token.checkpoint()?;
        let completion = Completion::new();
        self.mailbox.submit(glyphs, completion.clone())?;
        completion.wait(token, MAILBOX_WAIT_POLL)
    }
}

impl RenderStage for GeometryStage {
    fn process(&self, request: &RenderRequest, token: &CancelToken) -> TexforgeResult<Expression> {
        let vector_text = self.typeset.render_to_vector(request, token)?;
        self.convert(&vector_text, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeset::TypesetConfig;
    use crate::vector::mailbox::MeshFactory;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn stage() -> (GeometryStage, Arc<TickMailbox>) {
        let mailbox = Arc::new(TickMailbox::new());
        let typeset = TypesetStage::new(TypesetConfig::default()).unwrap();
        (GeometryStage::new(typeset, Arc::clone(&mailbox)), mailbox)
    }

    /// Pump the mailbox from a worker thread until `done` flips, so convert
    /// calls in the test thread can complete.
    fn with_pump<T>(mailbox: Arc<TickMailbox>, f: impl FnOnce() -> T) -> T {
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let pump = std::thread::spawn(move || {
            while !done_flag.load(Ordering::SeqCst) {
                mailbox.pump(&MeshFactory);
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        let out = f();
        done.store(true, Ordering::SeqCst);
        pump.join().unwrap();
        out
    }

    #[test]
    fn malformed_document_is_soft_and_empty() {
        let (stage, _mailbox) = stage();
        let expr = stage
            .convert("definitely not svg", &CancelToken::never())
            .unwrap();
        assert!(expr.is_empty());
    }

    #[test]
    fn valid_document_produces_one_glyph_per_path() {
        let (stage, mailbox) = stage();
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10">
  <path d="M 0 0 L 2 0 L 0 2 Z"/>
  <path d="M 4 0 L 6 0 L 4 2 Z"/>
  <path d="M 0 4 L 2 4 L 0 6 Z"/>
</svg>"##;
        let expr = with_pump(mailbox, || {
            stage.convert(svg, &CancelToken::never()).unwrap()
        });
        assert_eq!(expr.len(), 3);
        for glyph in expr.glyphs() {
            assert!(!glyph.mesh.is_empty());
            assert_eq!(glyph.anchor, glyph.bounds.center());
        }
    }

    #[test]
    fn glyph_order_follows_document_order() {
        let (stage, mailbox) = stage();
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10">
  <path d="M 0 0 L 1 0 L 0 1 Z"/>
  <path d="M 5 0 L 6 0 L 5 1 Z"/>
</svg>"##;
        let expr = with_pump(mailbox, || {
            stage.convert(svg, &CancelToken::never()).unwrap()
        });
        assert_eq!(expr.len(), 2);
        assert!(expr.glyphs()[0].bounds.x0 < expr.glyphs()[1].bounds.x0);
    }
}
