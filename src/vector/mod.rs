//! Vector document parsing, tessellation, and tick-context mesh hand-off.

/// Single-slot hand-off to the host's per-tick context.
pub mod mailbox;
pub(crate) mod parse;
/// The geometry compile stage.
pub mod stage;
/// Outline fill tessellation.
pub mod tessellate;

pub use mailbox::{GlyphFactory, MeshFactory, TickMailbox};
pub use stage::GeometryStage;
pub use tessellate::TessellatedGlyph;
