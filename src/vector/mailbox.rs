use crate::foundation::error::{TexforgeError, TexforgeResult};
use crate::foundation::task::Completion;
use crate::scene::glyph::{Expression, GlyphGeometry, Mesh};
use crate::vector::tessellate::TessellatedGlyph;
use std::sync::Mutex;

/// Builds renderable glyphs from tessellated buffers.
///
/// Implementations are only invoked from [`TickMailbox::pump`], i.e. on the
/// host's constrained per-tick context, the one place the host's
/// mesh-building facility may be touched.
pub trait GlyphFactory: Send + Sync {
    /// Build one glyph from its tessellated buffers.
    fn build(&self, tess: &TessellatedGlyph) -> TexforgeResult<GlyphGeometry>;
}

/// Default factory producing plain mesh data, for hosts (and tests) whose
/// mesh type is the crate's own [`Mesh`].
#[derive(Debug, Default)]
pub struct MeshFactory;

impl GlyphFactory for MeshFactory {
    fn build(&self, tess: &TessellatedGlyph) -> TexforgeResult<GlyphGeometry> {
        Ok(GlyphGeometry {
            mesh: Mesh {
                positions: tess.positions.clone(),
                indices: tess.indices.clone(),
            },
            bounds: tess.bounds,
            anchor: tess.anchor,
        })
    }
}

struct PendingExpression {
    glyphs: Vec<TessellatedGlyph>,
    completion: Completion<Expression>,
}

/// Single-slot hand-off between background geometry completion and the
/// host's per-tick update context.
///
/// Background tasks submit tessellated geometry plus a completion handle;
/// the host calls [`TickMailbox::pump`] once per tick, which drains the slot
/// (if occupied), builds the meshes synchronously on the tick context, and
/// resolves the completion. Only one pending entry is supported: a second
/// submission before drain is rejected rather than silently overwriting the
/// first.
#[derive(Default)]
pub struct TickMailbox {
    slot: Mutex<Option<PendingExpression>>,
}

impl TickMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `true` while a submission is waiting to be drained.
    pub fn has_pending(&self) -> bool {
        self.slot.lock().expect("mailbox slot poisoned").is_some()
    }

    pub(crate) fn submit(
        &self,
        glyphs: Vec<TessellatedGlyph>,
        completion: Completion<Expression>,
    ) -> TexforgeResult<()> {
        let mut slot = self.slot.lock().expect("mailbox slot poisoned");
        if slot.is_some() {
            return Err(TexforgeError::validation(
                "geometry mailbox already holds a pending expression; is the host still pumping?",
            ));
        }
        *slot = Some(PendingExpression { glyphs, completion });
        Ok(())
    }

    /// Drain the mailbox on the constrained tick context.
    ///
    /// Builds every pending glyph through `factory` and resolves the
    /// submission's completion handle with the expression (or the first
    /// build error). Returns `true` when an entry was drained.
    pub fn pump(&self, factory: &dyn GlyphFactory) -> bool {
        let pending = self.slot.lock().expect("mailbox slot poisoned").take();
        let Some(pending) = pending else {
            return false;
        };

        let mut glyphs = Vec::with_capacity(pending.glyphs.len());
        let mut outcome = None;
        for tess in &pending.glyphs {
            match factory.build(tess) {
                Ok(glyph) => glyphs.push(glyph),
                Err(e) => {
                    outcome = Some(Err(e));
                    break;
                }
            }
        }
        pending
            .completion
            .resolve(outcome.unwrap_or_else(|| Ok(Expression::new(glyphs))));
        true
    }
}
