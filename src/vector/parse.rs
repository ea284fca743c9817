use crate::foundation::error::{TexforgeError, TexforgeResult};
use lyon::math::point;
use lyon::path::Path as OutlinePath;
use usvg::tiny_skia_path::{PathSegment, Transform};

/// Parse a vector document into one outline path per visually distinct
/// shape, in document order, with each node's absolute transform applied.
///
/// Malformed input yields a typed error; the geometry stage decides whether
/// that propagates (it does not; the failure is soft there).
pub(crate) fn parse_vector_document(text: &str) -> TexforgeResult<Vec<OutlinePath>> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_str(text, &options)
        .map_err(|e| TexforgeError::invalid_vector(e.to_string()))?;

    let mut outlines = Vec::new();
    collect_group(tree.root(), &mut outlines);
    Ok(outlines)
}

fn collect_group(group: &usvg::Group, outlines: &mut Vec<OutlinePath>) {
    for node in group.children() {
        match node {
            usvg::Node::Group(g) => collect_group(g, outlines),
            usvg::Node::Path(p) => {
                if let Some(outline) = convert_path(p) {
                    outlines.push(outline);
                }
            }
            // Raster content and retained text have no outline geometry.
            usvg::Node::Image(_) | usvg::Node::Text(_) => {}
        }
    }
}

/// Convert one usvg path into a lyon outline, flattening nothing yet; curve
/// subdivision happens at tessellation time under the fixed tolerance.
fn convert_path(path: &usvg::Path) -> Option<OutlinePath> {
    let transform = path.abs_transform();
    let mut builder = OutlinePath::builder();
    let mut open = false;
    let mut seen = false;

    for segment in path.data().segments() {
        match segment {
            PathSegment::MoveTo(p) => {
                if open {
                    builder.end(false);
                }
                let (x, y) = apply(transform, p.x, p.y);
                builder.begin(point(x, y));
                open = true;
                seen = true;
            }
            PathSegment::LineTo(p) => {
                if open {
                    let (x, y) = apply(transform, p.x, p.y);
                    builder.line_to(point(x, y));
                }
            }
            PathSegment::QuadTo(c, p) => {
                if open {
                    let (cx, cy) = apply(transform, c.x, c.y);
                    let (x, y) = apply(transform, p.x, p.y);
                    builder.quadratic_bezier_to(point(cx, cy), point(x, y));
                }
            }
            PathSegment::CubicTo(c1, c2, p) => {
                if open {
                    let (c1x, c1y) = apply(transform, c1.x, c1.y);
                    let (c2x, c2y) = apply(transform, c2.x, c2.y);
                    let (x, y) = apply(transform, p.x, p.y);
                    builder.cubic_bezier_to(point(c1x, c1y), point(c2x, c2y), point(x, y));
                }
            }
            PathSegment::Close => {
                if open {
                    builder.close();
                    open = false;
                }
            }
        }
    }
    if open {
        builder.end(false);
    }
    if !seen {
        return None;
    }
    Some(builder.build())
}

fn apply(t: Transform, x: f32, y: f32) -> (f32, f32) {
    (t.sx * x + t.kx * y + t.tx, t.ky * x + t.sy * y + t.ty)
}
