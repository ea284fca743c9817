//! Boundary data model: the glyph geometry handed back to callers.

/// Meshes, glyphs, and expressions.
pub mod glyph;
