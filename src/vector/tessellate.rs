use crate::foundation::error::{TexforgeError, TexforgeResult};
use kurbo::{Point, Rect};
use lyon::path::Path as OutlinePath;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, FillVertexConstructor,
    VertexBuffers,
};

/// Maximum chord deviation when subdividing curves, in document units.
/// Chosen for legible curvature at typical render scale.
pub(crate) const FILL_TOLERANCE: f32 = 0.02;

/// Tessellated buffers for one shape, produced on a background task and
/// turned into a [`crate::scene::glyph::GlyphGeometry`] on the constrained
/// tick context.
#[derive(Debug, Clone, PartialEq)]
pub struct TessellatedGlyph {
    /// Vertex positions, `[x, y]`, in document coordinates.
    pub positions: Vec<[f32; 2]>,
    /// Triangle list indices into `positions`.
    pub indices: Vec<u32>,
    /// Axis-aligned bounds over `positions`.
    pub bounds: Rect,
    /// Anchor position for the shape (bounds center).
    pub anchor: Point,
}

struct MeshVertexCtor;

impl FillVertexConstructor<[f32; 2]> for MeshVertexCtor {
    fn new_vertex(&mut self, v: FillVertex) -> [f32; 2] {
        let p = v.position();
        [p.x, p.y]
    }
}

/// Fill-tessellate one outline path.
///
/// Glyph outlines can self-intersect; the tessellator is left at its
/// correctness-preserving defaults, with a non-zero fill rule as fonts are
/// authored for.
pub(crate) fn tessellate_outline(outline: &OutlinePath) -> TexforgeResult<TessellatedGlyph> {
    let mut tess = FillTessellator::new();
    let mut buffers: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
    let options = FillOptions::tolerance(FILL_TOLERANCE).with_fill_rule(FillRule::NonZero);

    tess.tessellate_path(
        outline,
        &options,
        &mut BuffersBuilder::new(&mut buffers, MeshVertexCtor),
    )
    .map_err(|e| TexforgeError::invalid_vector(format!("tessellation failed: {e:?}")))?;

    if buffers.vertices.is_empty() || buffers.indices.is_empty() {
        return Err(TexforgeError::invalid_vector(
            "outline tessellated to an empty mesh",
        ));
    }

    let bounds = vertex_bounds(&buffers.vertices);
    Ok(TessellatedGlyph {
        positions: buffers.vertices,
        indices: buffers.indices,
        bounds,
        anchor: bounds.center(),
    })
}

/// Overall bounding box across a set of tessellated shapes. Reporting only;
/// per-glyph positions are never re-derived from it.
pub(crate) fn overall_bounds(glyphs: &[TessellatedGlyph]) -> Option<Rect> {
    let mut it = glyphs.iter();
    let first = it.next()?.bounds;
    Some(it.fold(first, |acc, g| acc.union(g.bounds)))
}

fn vertex_bounds(vertices: &[[f32; 2]]) -> Rect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for [x, y] in vertices {
        let (x, y) = (f64::from(*x), f64::from(*y));
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    Rect::new(min_x, min_y, max_x, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyon::math::point;

    fn rect_outline(x0: f32, y0: f32, x1: f32, y1: f32) -> OutlinePath {
        let mut b = OutlinePath::builder();
        b.begin(point(x0, y0));
        b.line_to(point(x1, y0));
        b.line_to(point(x1, y1));
        b.line_to(point(x0, y1));
        b.close();
        b.build()
    }

    #[test]
    fn rectangle_tessellates_to_two_triangles() {
        let g = tessellate_outline(&rect_outline(0.0, 0.0, 2.0, 1.0)).unwrap();
        assert_eq!(g.positions.len(), 4);
        assert_eq!(g.indices.len(), 6);
        assert_eq!(g.bounds, Rect::new(0.0, 0.0, 2.0, 1.0));
        assert_eq!(g.anchor, g.bounds.center());
    }

    #[test]
    fn degenerate_outline_is_rejected() {
        let mut b = OutlinePath::builder();
        b.begin(point(0.0, 0.0));
        b.line_to(point(1.0, 0.0));
        b.end(false);
        let err = tessellate_outline(&b.build()).unwrap_err();
        assert!(matches!(err, TexforgeError::InvalidVector(_)));
    }

    #[test]
    fn overall_bounds_spans_all_shapes() {
        let a = tessellate_outline(&rect_outline(0.0, 0.0, 1.0, 1.0)).unwrap();
        let b = tessellate_outline(&rect_outline(3.0, -1.0, 4.0, 2.0)).unwrap();
        assert_eq!(
            overall_bounds(&[a, b]),
            Some(Rect::new(0.0, -1.0, 4.0, 2.0))
        );
        assert_eq!(overall_bounds(&[]), None);
    }
}
