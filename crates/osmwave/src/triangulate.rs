//! Planar triangulation of terrain samples.

/// Triangulates points on their `(x, y)` plane. Returned triples index into
/// `points`; `z` is carried along untouched.
pub trait Triangulator: Send + Sync {
    fn triangulate(&self, points: &[[f64; 3]]) -> Vec<[usize; 3]>;
}

/// Delaunay triangulation; every triangle is counter-clockwise in plan.
#[derive(Clone, Copy, Debug, Default)]
pub struct DelaunayTriangulator;

/// Twice the signed plan area of `abc`, positive when counter-clockwise.
#[inline(always)]
fn orient2d(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

impl Triangulator for DelaunayTriangulator {
    fn triangulate(&self, points: &[[f64; 3]]) -> Vec<[usize; 3]> {
        if points.len() < 3 {
            return Vec::new();
        }

        let coords: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point { x: p[0], y: p[1] })
            .collect();
        let triangulation = delaunator::triangulate(&coords);

        triangulation
            .triangles
            .chunks_exact(3)
            .map(|t| {
                if orient2d(&points[t[0]], &points[t[1]], &points[t[2]]) < 0.0 {
                    [t[0], t[2], t[1]]
                } else {
                    [t[0], t[1], t[2]]
                }
            })
            .collect()
    }
}
