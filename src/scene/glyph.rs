use serde::{Deserialize, Serialize};

pub use kurbo::{Point, Rect};

/// Renderable triangle mesh in document coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions, `[x, y]`.
    pub positions: Vec<[f32; 2]>,
    /// Triangle list indices into `positions`.
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Return `true` when the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One visually distinct shape extracted from a rendered request.
///
/// Immutable after creation; a changed input produces an entirely new
/// [`Expression`] rather than mutating glyphs in place. Compared by content
/// so callers can skip redundant scene updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphGeometry {
    /// Tessellated fill mesh.
    pub mesh: Mesh,
    /// Axis-aligned bounds over the mesh vertices.
    pub bounds: Rect,
    /// Anchor position for this shape (bounds center). Reporting metadata;
    /// vertex positions are already absolute and are never re-derived from
    /// the anchor.
    pub anchor: Point,
}

/// The full ordered set of glyph geometries for one rendered request.
///
/// Equality is element-wise sequence equality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    glyphs: Vec<GlyphGeometry>,
}

impl Expression {
    /// Wrap an ordered glyph sequence.
    pub fn new(glyphs: Vec<GlyphGeometry>) -> Self {
        Self { glyphs }
    }

    /// Borrow the glyphs in document order.
    pub fn glyphs(&self) -> &[GlyphGeometry] {
        &self.glyphs
    }

    /// Number of glyph shapes.
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Return `true` when the expression rendered to nothing (including the
    /// soft-failure path for malformed vector documents).
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Union of all member glyph bounds, or `None` when empty.
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut it = self.glyphs.iter();
        let first = it.next()?.bounds;
        Some(it.fold(first, |acc, g| acc.union(g.bounds)))
    }
}

impl IntoIterator for Expression {
    type Item = GlyphGeometry;
    type IntoIter = std::vec::IntoIter<GlyphGeometry>;

    fn into_iter(self) -> Self::IntoIter {
        self.glyphs.into_iter()
    }
}
