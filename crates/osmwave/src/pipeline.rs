//! End-to-end runs: header, building batches and terrain into one OBJ stream.

use std::io::Write;

use log::{info, warn};

use hgt::ElevationStore;

use crate::error::{Error, Result};
use crate::extrude::{BuildingExtruder, BuildingOptions};
use crate::features::FeatureSet;
use crate::obj::ObjWriter;
use crate::projection::Projection;
use crate::terrain::{TerrainMesher, TerrainOptions, TerrainStats};
use crate::triangulate::Triangulator;
use crate::GeoBboxDeg;

/// The collaborators shared by every batch of a run.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub elevation: &'a ElevationStore,
    pub projection: &'a dyn Projection,
    pub triangulator: &'a dyn Triangulator,
}

impl<'a> Session<'a> {
    pub fn terrain_mesher(&self) -> TerrainMesher<'a> {
        TerrainMesher::new(self.elevation, self.projection, self.triangulator)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub rings_emitted: usize,
    /// Rings without enough distinct points.
    pub skipped_degenerate: usize,
    /// Rings with a point that has no usable elevation.
    pub skipped_elevation: usize,
    pub malformed_tags: usize,
    /// Vertices written by building batches.
    pub vertices: usize,
    pub terrain: Option<TerrainStats>,
}

impl RunStats {
    fn skip(&mut self, error: &Error) {
        match error {
            Error::Elevation(_) => self.skipped_elevation += 1,
            _ => self.skipped_degenerate += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_degenerate + self.skipped_elevation
    }
}

/// Comment block describing where the mesh came from.
pub fn write_header<W: Write>(
    writer: &mut ObjWriter<W>,
    input: &str,
    bounds: &GeoBboxDeg,
    projection: &dyn Projection,
) -> Result<()> {
    let projected = projection.forward(&[
        [bounds.lon_min, bounds.lat_min],
        [bounds.lon_max, bounds.lat_max],
    ])?;

    writer.comment("Created with OSMWAVE")?;
    writer.comment("")?;
    writer.comment(&format!("Input file: {input}"))?;
    writer.comment(&format!(
        "Lat/lng bounds: ({}, {}) - ({}, {})",
        bounds.lat_min, bounds.lon_min, bounds.lat_max, bounds.lon_max
    ))?;
    writer.comment(&format!("Projection: {}", projection.definition()))?;
    writer.comment(&format!(
        "Projected bounds: ({}, {}) - ({}, {})",
        projected[0][0], projected[0][1], projected[1][0], projected[1][1]
    ))?;

    Ok(())
}

/// Extrude every footprint ring of `features`, then optionally mesh the
/// terrain under the dataset bounds into the same stream.
///
/// A ring that fails for a per-feature reason is logged and counted; any
/// fatal error ends the run.
pub fn buildings_to_obj<W: Write>(
    writer: &mut ObjWriter<W>,
    session: &Session<'_>,
    input: &str,
    features: &FeatureSet,
    options: &BuildingOptions,
    terrain: Option<&TerrainOptions>,
) -> Result<RunStats> {
    let bounds = features
        .bounds
        .ok_or_else(|| Error::Configuration(format!("{input}: no building footprints")))?;

    write_header(writer, input, &bounds, session.projection)?;
    if let Some(path) = &options.material_library {
        writer.material_library(path)?;
    }
    if let Some(name) = &options.material {
        writer.material(name)?;
    }

    let extruder = BuildingExtruder::new(session.elevation, session.projection, options.clone());
    let mut stats = RunStats::default();

    for footprint in &features.footprints {
        for ring in &footprint.rings {
            match extruder.extrude(writer, ring, &footprint.tags) {
                Ok(extrusion) => {
                    for tag in &extrusion.malformed {
                        warn!("{}: {}", footprint.source_id, tag);
                    }
                    stats.malformed_tags += extrusion.malformed.len();
                    stats.vertices += extrusion.vertices;
                    stats.rings_emitted += 1;
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping {}: {}", footprint.source_id, e);
                    stats.skip(&e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        "Buildings: {} rings written, {} skipped, {} vertices",
        stats.rings_emitted,
        stats.skipped(),
        stats.vertices
    );

    if let Some(terrain) = terrain {
        match session.terrain_mesher().generate(writer, &bounds, terrain) {
            Ok(t) => stats.terrain = Some(t),
            Err(e) if !e.is_fatal() => warn!("Skipping terrain: {}", e),
            Err(e) => return Err(e),
        }
    }

    writer.flush()?;
    Ok(stats)
}

/// Header plus a single terrain batch over `bbox`.
pub fn terrain_to_obj<W: Write>(
    writer: &mut ObjWriter<W>,
    session: &Session<'_>,
    input: &str,
    bbox: &GeoBboxDeg,
    options: &TerrainOptions,
) -> Result<TerrainStats> {
    write_header(writer, input, bbox, session.projection)?;
    let stats = session.terrain_mesher().generate(writer, bbox, options)?;
    writer.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Footprint;
    use crate::tags::Tags;
    use crate::test_support::{flat_store, PlateCarree};
    use crate::triangulate::DelaunayTriangulator;

    fn footprint(id: &str, ring: &[[f64; 2]], tags: &[(&str, &str)]) -> Footprint {
        Footprint {
            source_id: id.into(),
            rings: vec![ring.to_vec()],
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Tags>(),
        }
    }

    fn face_indices(obj: &str) -> Vec<usize> {
        obj.lines()
            .filter_map(|l| l.strip_prefix("f "))
            .flat_map(|l| l.split_whitespace().map(|i| i.parse::<usize>().unwrap()))
            .collect()
    }

    #[test]
    fn header_lines() {
        let mut w = ObjWriter::new(Vec::new());
        let bbox = GeoBboxDeg::new(20.25, 10.25, 20.5, 10.75).unwrap();
        write_header(&mut w, "city.geojson", &bbox, &PlateCarree).unwrap();

        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# Created with OSMWAVE",
                "#",
                "# Input file: city.geojson",
                "# Lat/lng bounds: (10.25, 20.25) - (10.75, 20.5)",
                "# Projection: +proj=longlat +datum=WGS84",
                "# Projected bounds: (20.25, 10.25) - (20.5, 10.75)",
            ]
        );
    }

    #[test]
    fn buildings_with_terrain_share_one_stream() {
        let store = flat_store(100);
        let session = Session {
            elevation: &store,
            projection: &PlateCarree,
            triangulator: &DelaunayTriangulator,
        };

        let square = [[20.25, 10.25], [20.5, 10.25], [20.5, 10.5], [20.25, 10.5]];
        let outside = [[21.25, 10.25], [21.5, 10.25], [21.5, 10.5]];
        let sliver = [[20.3, 10.3], [20.4, 10.4], [20.3, 10.3]];
        let features = FeatureSet::from_footprints(vec![
            footprint(
                "way/1",
                &square,
                &[("building", "yes"), ("height", "tall"), ("building:levels", "5")],
            ),
            footprint("way/2", &outside, &[("building", "yes")]),
            footprint("way/3", &sliver, &[("building", "yes")]),
            footprint("way/4", &square, &[("building", "yes"), ("building:levels", "2")]),
        ]);

        let options = BuildingOptions {
            material_library: Some("city.mtl".into()),
            material: Some("building".into()),
            ..Default::default()
        };
        let terrain = TerrainOptions {
            step_deg: 0.25,
            ..Default::default()
        };

        let mut w = ObjWriter::new(Vec::new());
        let stats =
            buildings_to_obj(&mut w, &session, "test", &features, &options, Some(&terrain))
                .unwrap();

        assert_eq!(stats.rings_emitted, 2);
        assert_eq!(stats.skipped_elevation, 1);
        assert_eq!(stats.skipped_degenerate, 1);
        assert_eq!(stats.malformed_tags, 1);
        assert_eq!(stats.vertices, 16);
        let t = stats.terrain.unwrap();
        assert!(t.vertices >= 3);

        let text = String::from_utf8(w.into_inner()).unwrap();
        assert!(text.contains("\nmtllib city.mtl\nmtl building\n"));

        // way/1 falls back to the default height, way/4 uses its levels.
        let roofs: Vec<f64> = text
            .lines()
            .filter_map(|l| l.strip_prefix("v "))
            .take(16)
            .map(|l| l.split_whitespace().nth(1).unwrap().parse().unwrap())
            .filter(|&y: &f64| y > 100.0)
            .collect();
        assert_eq!(roofs, [vec![108.0; 4], vec![106.0; 4]].concat());

        // Every face resolves to a vertex in the stream.
        let total = 16 + t.vertices;
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), total);
        assert!(face_indices(&text).iter().all(|&i| (1..=total).contains(&i)));
    }

    #[test]
    fn empty_input_is_a_configuration_error() {
        let store = flat_store(100);
        let session = Session {
            elevation: &store,
            projection: &PlateCarree,
            triangulator: &DelaunayTriangulator,
        };

        let mut w = ObjWriter::new(Vec::new());
        let err = buildings_to_obj(
            &mut w,
            &session,
            "empty.geojson",
            &FeatureSet::default(),
            &BuildingOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn terrain_only_run() {
        let store = flat_store(100);
        let session = Session {
            elevation: &store,
            projection: &PlateCarree,
            triangulator: &DelaunayTriangulator,
        };
        let bbox = GeoBboxDeg::new(20.25, 10.25, 20.75, 10.75).unwrap();
        let options = TerrainOptions {
            step_deg: 0.25,
            ..Default::default()
        };

        let mut w = ObjWriter::new(Vec::new());
        let stats = terrain_to_obj(&mut w, &session, "srtm", &bbox, &options).unwrap();
        assert_eq!(stats.vertices, 8);
        assert_eq!(w.vertex_count(), 8);

        // Nothing to sample outside the store.
        let far = GeoBboxDeg::new(30.0, 30.0, 30.5, 30.5).unwrap();
        let mut w = ObjWriter::new(Vec::new());
        let err = terrain_to_obj(&mut w, &session, "srtm", &far, &options).unwrap_err();
        assert!(matches!(err, Error::DegenerateGeometry(_)));
    }
}
