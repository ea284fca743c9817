//! Texforge compiles a markup expression into positioned, renderable glyph
//! geometry by orchestrating external typesetting tools.
//!
//! The pipeline typesets a [`RenderRequest`] through two external binaries
//! (typesetting, then vector conversion), parses the intermediate vector
//! document, and tessellates its outlines into triangle meshes. Around that
//! core sit three decorator stages sharing one contract ([`RenderStage`]):
//! content-addressed caching, request serialization, and a supersession
//! façade where each new render cancels the previous one.
//!
//! Host integration:
//!
//! - Call [`Pipeline::process`] from a background task; it blocks until the
//!   expression is built.
//! - Call [`Pipeline::pump`] once per tick from the host's update context;
//!   mesh build-out only happens there, through a [`GlyphFactory`].
//! - `cancel()` aborts the outstanding render; `last_error()` exposes the
//!   most recent failure for inline display.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// External tool execution.
pub mod exec;
/// Stage contract, decorator stages, and the assembled pipeline.
pub mod pipeline;
/// Boundary data model handed back to callers.
pub mod scene;
/// Typesetting orchestration.
pub mod typeset;
/// Vector parsing, tessellation, and the tick mailbox.
pub mod vector;

pub use crate::foundation::cancel::{CancelSource, CancelToken};
pub use crate::foundation::error::{TexforgeError, TexforgeResult};
pub use crate::foundation::task::Completion;

pub use crate::exec::{BinaryResolver, ProcessOutcome, ProcessRunner};
pub use crate::pipeline::{
    CacheStage, DEFAULT_HEADERS, Pipeline, PipelineConfig, PipelineDiagnostics, QueueStage,
    RenderRequest, RenderStage, RequestKey, SupersedeStage,
};
pub use crate::scene::glyph::{Expression, GlyphGeometry, Mesh, Point, Rect};
pub use crate::typeset::{TypesetConfig, TypesetStage};
pub use crate::vector::{GeometryStage, GlyphFactory, MeshFactory, TessellatedGlyph, TickMailbox};
