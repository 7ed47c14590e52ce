//! Adaptive terrain mesh: regular sampling, iterative thinning, Delaunay
//! triangulation and smooth vertex normals.
//!
//! Grid layout: column-major, `index = col * rows + row`. Column 0 is the
//! western edge and `x` grows with the column; row 0 is the southern edge. A
//! removed or unsampled point keeps its slot with `z = NaN` until
//! [`TerrainGrid::compact`].

use std::io::Write;

use log::{debug, info, warn};
use rayon::prelude::*;

use hgt::ElevationStore;

use crate::error::{Error, Result};
use crate::obj::ObjWriter;
use crate::projection::Projection;
use crate::triangulate::Triangulator;
use crate::GeoBboxDeg;

/// Maximum height difference (metres) to an eastward neighbour that still
/// counts as redundant.
pub const DEFAULT_TOLERANCE: f64 = 2.0;

/// One arc-second, the SRTM1 sample spacing.
pub const DEFAULT_STEP_DEG: f64 = 1.0 / 3600.0;

pub const DEFAULT_MAX_PASSES: usize = 1000;

/// Directions `(dcol, drow)` searched from each interior point: east-south,
/// east, east-north.
const THIN_DIRECTIONS: [(isize, isize); 3] = [(1, -1), (1, 0), (1, 1)];

/// How per-face normals are combined at a vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormalMode {
    /// Sum of the unit normals of the adjacent faces.
    #[default]
    Accumulated,
    /// The same sum scaled to unit length.
    Unit,
}

#[derive(Clone, Debug)]
pub struct TerrainOptions {
    pub tolerance: f64,
    /// Grid spacing in degrees of latitude/longitude.
    pub step_deg: f64,
    /// Upper bound on thinning passes.
    pub max_passes: usize,
    pub normals: NormalMode,
}

impl Default for TerrainOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            step_deg: DEFAULT_STEP_DEG,
            max_passes: DEFAULT_MAX_PASSES,
            normals: NormalMode::default(),
        }
    }
}

impl TerrainOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Configuration(format!(
                "terrain tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        if !self.step_deg.is_finite() || self.step_deg <= 0.0 {
            return Err(Error::Configuration(format!(
                "terrain step must be > 0, got {}",
                self.step_deg
            )));
        }
        if self.max_passes == 0 {
            return Err(Error::Configuration("max_passes must be at least 1".into()));
        }
        Ok(())
    }
}

/// Outcome of [`TerrainGrid::simplify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimplifyReport {
    pub passes: usize,
    /// Valid points left.
    pub valid: usize,
    /// `false` when `max_passes` ran out before two passes agreed.
    pub converged: bool,
}

/// Regular grid of projected sample points.
#[derive(Clone, Debug)]
pub struct TerrainGrid {
    rows: usize,
    cols: usize,
    points: Vec<[f64; 3]>,
}

impl TerrainGrid {
    /// Wrap column-major points.
    pub fn from_points(rows: usize, cols: usize, points: Vec<[f64; 3]>) -> Result<Self> {
        if points.len() != rows * cols {
            return Err(Error::Configuration(format!(
                "{} points do not fill a {rows}x{cols} grid",
                points.len()
            )));
        }
        Ok(Self { rows, cols, points })
    }

    /// Sample `bbox` every `step_deg` degrees.
    ///
    /// The grid is laid over the projected rectangle spanned by the bbox
    /// corners; each node is projected back and queried in `store`. Nodes
    /// without a valid elevation start out removed.
    pub fn sample(
        store: &ElevationStore,
        projection: &dyn Projection,
        bbox: &GeoBboxDeg,
        step_deg: f64,
    ) -> Result<Self> {
        let rows = ((bbox.lat_max - bbox.lat_min) / step_deg + 1.0).floor() as usize;
        let cols = ((bbox.lon_max - bbox.lon_min) / step_deg + 1.0).floor() as usize;

        if rows < 2 || cols < 2 {
            return Err(Error::DegenerateGeometry(format!(
                "terrain grid of {rows}x{cols} samples"
            )));
        }

        let corners = projection.forward(&[
            [bbox.lon_min, bbox.lat_min],
            [bbox.lon_max, bbox.lat_max],
        ])?;
        let [x0, y0] = corners[0];
        let [x1, y1] = corners[1];

        info!("Sampling terrain: {} rows x {} cols", rows, cols);

        let columns = (0..cols)
            .into_par_iter()
            .map(|c| -> Result<Vec<[f64; 3]>> {
                let x = x0 + (x1 - x0) * c as f64 / (cols - 1) as f64;
                let xy: Vec<[f64; 2]> = (0..rows)
                    .map(|r| [x, y0 + (y1 - y0) * r as f64 / (rows - 1) as f64])
                    .collect();
                let lonlat = projection.inverse(&xy)?;

                Ok(xy
                    .iter()
                    .zip(lonlat)
                    .map(|(&[x, y], [lon, lat])| {
                        [x, y, store.elevation(lat, lon).unwrap_or(f64::NAN)]
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>>>()?;

        let points: Vec<[f64; 3]> = columns.into_iter().flatten().collect();
        let grid = Self { rows, cols, points };

        let invalid = grid.points.len() - grid.valid_count();
        if invalid > 0 {
            warn!("{} of {} terrain samples have no elevation", invalid, grid.points.len());
        }

        Ok(grid)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    #[inline(always)]
    fn index(&self, row: usize, col: usize) -> usize {
        col * self.rows + row
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&[f64; 3]> {
        if row < self.rows && col < self.cols {
            self.points.get(self.index(row, col))
        } else {
            None
        }
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| !p[2].is_nan()).count()
    }

    /// First valid point walking from `(row, col)` in direction
    /// `(dcol, drow)`, `None` once the walk leaves the grid.
    fn walk(&self, row: usize, col: usize, (dcol, drow): (isize, isize)) -> Option<f64> {
        let (mut r, mut c) = (row as isize, col as isize);
        loop {
            r += drow;
            c += dcol;
            if r < 0 || c < 0 || r >= self.rows as isize || c >= self.cols as isize {
                return None;
            }
            let z = self.points[self.index(r as usize, c as usize)][2];
            if !z.is_nan() {
                return Some(z);
            }
        }
    }

    /// One pass over the interior. A point is removed when each of its three
    /// eastward neighbours is within `tolerance` of it. Returns the number of
    /// valid points left in the whole grid.
    pub fn thin_pass(&mut self, tolerance: f64) -> usize {
        for c in 1..self.cols.saturating_sub(1) {
            for r in 1..self.rows.saturating_sub(1) {
                let i = self.index(r, c);
                let z = self.points[i][2];
                if z.is_nan() {
                    continue;
                }

                let redundant = THIN_DIRECTIONS.iter().all(|&dir| {
                    self.walk(r, c, dir)
                        .map_or(false, |nz| (nz - z).abs() <= tolerance)
                });

                if redundant {
                    self.points[i][2] = f64::NAN;
                }
            }
        }

        self.valid_count()
    }

    /// Thin until two consecutive passes leave the same number of points.
    pub fn simplify(&mut self, tolerance: f64, max_passes: usize) -> SimplifyReport {
        let mut previous = self.valid_count();
        let mut passes = 0;

        while passes < max_passes {
            let valid = self.thin_pass(tolerance);
            passes += 1;
            debug!("Thinning pass {}: {} points", passes, valid);

            if valid == previous {
                return SimplifyReport {
                    passes,
                    valid,
                    converged: true,
                };
            }
            previous = valid;
        }

        warn!(
            "Thinning stopped after {} passes without settling ({} points)",
            passes, previous
        );
        SimplifyReport {
            passes,
            valid: previous,
            converged: false,
        }
    }

    /// Valid points in grid order.
    pub fn compact(&self) -> Vec<[f64; 3]> {
        self.points
            .iter()
            .filter(|p| !p[2].is_nan())
            .copied()
            .collect()
    }
}

#[inline(always)]
fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline(always)]
fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline(always)]
fn length(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Unit normal of `(p2 - p1) x (p3 - p1)`, `None` for zero-area triangles.
pub fn face_normal(p1: &[f64; 3], p2: &[f64; 3], p3: &[f64; 3]) -> Option<[f64; 3]> {
    let n = cross(&sub(p2, p1), &sub(p3, p1));
    let len = length(&n);
    if len > 0.0 && len.is_finite() {
        Some([n[0] / len, n[1] / len, n[2] / len])
    } else {
        None
    }
}

/// Per-vertex normals from the faces around each vertex. Callers validate
/// triangle indices beforehand.
pub fn vertex_normals(
    points: &[[f64; 3]],
    triangles: &[[usize; 3]],
    mode: NormalMode,
) -> Vec<[f64; 3]> {
    let mut normals = vec![[0.0f64; 3]; points.len()];

    for t in triangles {
        let Some(n) = face_normal(&points[t[0]], &points[t[1]], &points[t[2]]) else {
            continue;
        };
        for &i in t {
            normals[i][0] += n[0];
            normals[i][1] += n[1];
            normals[i][2] += n[2];
        }
    }

    if mode == NormalMode::Unit {
        for n in &mut normals {
            let len = length(n);
            if len > 0.0 {
                n.iter_mut().for_each(|v| *v /= len);
            }
        }
    }

    normals
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainStats {
    pub rows: usize,
    pub cols: usize,
    /// Samples with a valid elevation before thinning.
    pub sampled: usize,
    pub passes: usize,
    pub vertices: usize,
    pub triangles: usize,
}

/// Builds terrain batches from an elevation store.
pub struct TerrainMesher<'a> {
    store: &'a ElevationStore,
    projection: &'a dyn Projection,
    triangulator: &'a dyn Triangulator,
}

impl<'a> TerrainMesher<'a> {
    pub fn new(
        store: &'a ElevationStore,
        projection: &'a dyn Projection,
        triangulator: &'a dyn Triangulator,
    ) -> Self {
        Self {
            store,
            projection,
            triangulator,
        }
    }

    /// Sample, thin, triangulate and write one terrain batch for `bbox`.
    pub fn generate<W: Write>(
        &self,
        writer: &mut ObjWriter<W>,
        bbox: &GeoBboxDeg,
        options: &TerrainOptions,
    ) -> Result<TerrainStats> {
        options.validate()?;

        let mut grid = TerrainGrid::sample(self.store, self.projection, bbox, options.step_deg)?;
        let sampled = grid.valid_count();

        let report = grid.simplify(options.tolerance, options.max_passes);
        info!(
            "Thinned {} samples to {} in {} passes",
            sampled, report.valid, report.passes
        );

        let stats = self.mesh_grid(writer, &grid, options.normals)?;
        Ok(TerrainStats {
            rows: grid.rows(),
            cols: grid.cols(),
            sampled,
            passes: report.passes,
            ..stats
        })
    }

    /// Triangulate the valid points of `grid` and write them as one batch.
    pub fn mesh_grid<W: Write>(
        &self,
        writer: &mut ObjWriter<W>,
        grid: &TerrainGrid,
        mode: NormalMode,
    ) -> Result<TerrainStats> {
        let points = grid.compact();
        if points.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "{} terrain points left after thinning",
                points.len()
            )));
        }
        debug_assert!(points.windows(2).all(|w| w[0][0] <= w[1][0]));

        let triangles = self.triangulator.triangulate(&points);
        if triangles.is_empty() {
            return Err(Error::DegenerateGeometry(
                "terrain points are collinear".into(),
            ));
        }
        if let Some(t) = triangles.iter().find(|t| t.iter().any(|&i| i >= points.len())) {
            return Err(Error::MeshIndex(format!(
                "triangle {t:?} references beyond {} points",
                points.len()
            )));
        }
        info!("Terrain: {} vertices, {} triangles", points.len(), triangles.len());

        let normals = vertex_normals(&points, &triangles, mode);

        writer.checkpoint()?;
        for (p, n) in points.iter().zip(&normals) {
            writer.vertex_with_normal(p[0], p[2], p[1], n[0], n[2], n[1])?;
        }
        // Writing (x, z, y) mirrors the frame, so plan-CCW triangles are
        // reversed to keep the upward side as the front face.
        for t in &triangles {
            writer.face(&[t[0], t[2], t[1]])?;
        }

        Ok(TerrainStats {
            rows: grid.rows(),
            cols: grid.cols(),
            sampled: grid.valid_count(),
            passes: 0,
            vertices: points.len(),
            triangles: triangles.len(),
        })
    }
}
