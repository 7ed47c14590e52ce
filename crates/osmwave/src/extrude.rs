//! Building footprint extrusion: vertical walls plus a flat roof.
//!
//! Batch layout for a ring of `n` points: vertex `2i` is the bottom and
//! `2i + 1` the top of point `i`. Walls are quads
//! `(bottom i-1, bottom i, top i, top i-1)`, closed back to point 0; the roof
//! is one polygon over the odd vertices in ring order.

use std::io::Write;

use hgt::ElevationStore;

use crate::error::{Error, Result};
use crate::obj::ObjWriter;
use crate::projection::Projection;
use crate::tags::{HeightRule, Tags, DEFAULT_BUILDING_HEIGHT};

#[derive(Clone, Debug)]
pub struct BuildingOptions {
    /// Height used when neither `height` nor `building:levels` is usable.
    pub default_height: f64,
    /// `mtllib` written ahead of the buildings.
    pub material_library: Option<String>,
    /// `mtl` written ahead of the buildings.
    pub material: Option<String>,
}

impl Default for BuildingOptions {
    fn default() -> Self {
        Self {
            default_height: DEFAULT_BUILDING_HEIGHT,
            material_library: None,
            material: None,
        }
    }
}

/// What one extruded ring produced.
#[derive(Debug)]
pub struct Extrusion {
    pub vertices: usize,
    pub faces: usize,
    /// Lowest ground elevation under the ring.
    pub ground: f64,
    pub base_height: f64,
    pub height: f64,
    /// Height tags that were present but unusable.
    pub malformed: Vec<Error>,
}

pub struct BuildingExtruder<'a> {
    store: &'a ElevationStore,
    projection: &'a dyn Projection,
    options: BuildingOptions,
}

impl<'a> BuildingExtruder<'a> {
    pub fn new(
        store: &'a ElevationStore,
        projection: &'a dyn Projection,
        options: BuildingOptions,
    ) -> Self {
        Self {
            store,
            projection,
            options,
        }
    }

    /// Extrude one `[lon, lat]` ring. Nothing is written unless every ring
    /// point has a ground elevation.
    pub fn extrude<W: Write>(
        &self,
        writer: &mut ObjWriter<W>,
        ring: &[[f64; 2]],
        tags: &Tags,
    ) -> Result<Extrusion> {
        let mut ring = ring.to_vec();
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(Error::DegenerateGeometry(format!(
                "ring with {} distinct points",
                ring.len()
            )));
        }

        let ground = ring
            .iter()
            .map(|&[lon, lat]| self.store.elevation(lat, lon))
            .collect::<std::result::Result<Vec<f64>, _>>()?
            .into_iter()
            .fold(f64::INFINITY, f64::min);

        let planar = self.projection.forward(&ring)?;

        let base = HeightRule::base().derive(tags);
        let height = HeightRule::building(self.options.default_height).derive(tags);
        let mut malformed = base.malformed;
        malformed.extend(height.malformed);

        let bottom = ground + base.value;
        let top = bottom + (height.value - base.value);

        writer.checkpoint()?;
        let n = planar.len();
        for (i, &[x, y]) in planar.iter().enumerate() {
            writer.vertex(x, bottom, y)?;
            writer.vertex(x, top, y)?;
            if i > 0 {
                writer.face(&[2 * (i - 1), 2 * i, 2 * i + 1, 2 * (i - 1) + 1])?;
            }
        }
        writer.face(&[2 * (n - 1), 0, 1, 2 * (n - 1) + 1])?;

        let roof: Vec<usize> = (0..n).map(|i| 2 * i + 1).collect();
        writer.face(&roof)?;

        Ok(Extrusion {
            vertices: 2 * n,
            faces: n + 1,
            ground,
            base_height: base.value,
            height: height.value,
            malformed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_store, PlateCarree};
    use hgt::{CellBounds, Tile};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const SQUARE: [[f64; 2]; 5] = [
        [20.25, 10.25],
        [20.5, 10.25],
        [20.5, 10.5],
        [20.25, 10.5],
        [20.25, 10.25],
    ];

    fn parse(obj: &str, prefix: &str) -> Vec<Vec<f64>> {
        obj.lines()
            .filter_map(|l| l.strip_prefix(prefix))
            .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
            .collect()
    }

    #[test]
    fn square_ring() {
        let store = flat_store(100);
        let extruder = BuildingExtruder::new(&store, &PlateCarree, BuildingOptions::default());
        let mut w = ObjWriter::new(Vec::new());

        let e = extruder
            .extrude(&mut w, &SQUARE, &tags(&[("building", "yes"), ("height", "10")]))
            .unwrap();
        assert_eq!((e.vertices, e.faces, e.ground, e.height), (8, 5, 100.0, 10.0));

        let obj = String::from_utf8(w.into_inner()).unwrap();
        let verts = parse(&obj, "v ");
        assert_eq!(verts.len(), 8);
        assert_eq!(verts.iter().filter(|v| v[1] == 100.0).count(), 4);
        assert_eq!(verts.iter().filter(|v| v[1] == 110.0).count(), 4);
        assert_eq!(verts[0], vec![20.25, 100.0, 10.25]);
        assert_eq!(verts[1], vec![20.25, 110.0, 10.25]);

        let faces = parse(&obj, "f ");
        assert_eq!(
            faces,
            vec![
                vec![1.0, 3.0, 4.0, 2.0],
                vec![3.0, 5.0, 6.0, 4.0],
                vec![5.0, 7.0, 8.0, 6.0],
                vec![7.0, 1.0, 2.0, 8.0],
                vec![2.0, 4.0, 6.0, 8.0],
            ]
        );
    }

    #[test]
    fn base_height_lifts_the_walls() {
        let store = flat_store(50);
        let extruder = BuildingExtruder::new(&store, &PlateCarree, BuildingOptions::default());
        let mut w = ObjWriter::new(Vec::new());

        extruder
            .extrude(
                &mut w,
                &SQUARE[..4],
                &tags(&[("building:levels", "4"), ("building:min_level", "1")]),
            )
            .unwrap();

        let verts = parse(&String::from_utf8(w.into_inner()).unwrap(), "v ");
        assert_eq!(verts.len(), 8);
        assert!(verts.iter().step_by(2).all(|v| v[1] == 53.0));
        assert!(verts.iter().skip(1).step_by(2).all(|v| v[1] == 62.0));
    }

    #[test]
    fn ground_is_the_lowest_ring_point() {
        // Rising to the east: 0 m on the western edge, 40 m on the eastern.
        let samples: Vec<i16> = (0..25).map(|i| (i % 5) as i16 * 10).collect();
        let tile = Tile::from_samples(5, &samples).unwrap();
        let store = ElevationStore::from_tiles(
            CellBounds::new(10, 20, 10, 20).unwrap(),
            vec![Some(tile)],
        )
        .unwrap();

        let extruder = BuildingExtruder::new(&store, &PlateCarree, BuildingOptions::default());
        let mut w = ObjWriter::new(Vec::new());
        let e = extruder.extrude(&mut w, &SQUARE, &Tags::new()).unwrap();

        assert_eq!(e.ground, 10.0);
        assert_eq!(e.height, DEFAULT_BUILDING_HEIGHT);
    }

    #[test]
    fn degenerate_rings_write_nothing() {
        let store = flat_store(100);
        let extruder = BuildingExtruder::new(&store, &PlateCarree, BuildingOptions::default());
        let mut w = ObjWriter::new(Vec::new());

        let two = [[20.25, 10.25], [20.5, 10.25], [20.25, 10.25]];
        let err = extruder.extrude(&mut w, &two, &Tags::new()).unwrap_err();
        assert!(matches!(err, Error::DegenerateGeometry(_)));

        let repeated = [[20.25, 10.25], [20.25, 10.25], [20.5, 10.5], [20.5, 10.5]];
        assert!(extruder.extrude(&mut w, &repeated, &Tags::new()).is_err());

        assert_eq!(w.vertex_count(), 0);
    }

    #[test]
    fn missing_elevation_rejects_the_whole_ring() {
        let store = flat_store(100);
        let extruder = BuildingExtruder::new(&store, &PlateCarree, BuildingOptions::default());
        let mut w = ObjWriter::new(Vec::new());

        let straddling = [[20.9, 10.5], [21.1, 10.5], [21.1, 10.6], [20.9, 10.6]];
        let err = extruder.extrude(&mut w, &straddling, &Tags::new()).unwrap_err();

        assert!(!err.is_fatal());
        assert!(matches!(err, Error::Elevation(_)));
        assert_eq!(w.vertex_count(), 0);
    }

    #[test]
    fn malformed_tags_are_reported() {
        let store = flat_store(100);
        let options = BuildingOptions {
            default_height: 12.0,
            ..Default::default()
        };
        let extruder = BuildingExtruder::new(&store, &PlateCarree, options);
        let mut w = ObjWriter::new(Vec::new());

        let e = extruder
            .extrude(&mut w, &SQUARE, &tags(&[("height", "very")]))
            .unwrap();
        assert_eq!(e.height, 12.0);
        assert_eq!(e.malformed.len(), 1);
    }
}
