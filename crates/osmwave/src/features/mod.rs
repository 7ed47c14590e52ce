//! Building footprint sources.

pub mod geojson;
pub mod osm;

use std::path::Path;

use crate::error::{Error, Result};
use crate::tags::Tags;
use crate::GeoBboxDeg;

/// One building: its outer rings of `[lon, lat]` and its tags.
#[derive(Clone, Debug, PartialEq)]
pub struct Footprint {
    /// Where the footprint came from, e.g. `way/42`.
    pub source_id: String,
    pub rings: Vec<Vec<[f64; 2]>>,
    pub tags: Tags,
}

#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    pub footprints: Vec<Footprint>,
    /// Extent of every ring point, `None` for an empty set.
    pub bounds: Option<GeoBboxDeg>,
}

impl FeatureSet {
    pub fn from_footprints(footprints: Vec<Footprint>) -> Self {
        let bounds = GeoBboxDeg::around(
            footprints
                .iter()
                .flat_map(|f| f.rings.iter())
                .flat_map(|r| r.iter()),
        );
        Self { footprints, bounds }
    }

    pub fn ring_count(&self) -> usize {
        self.footprints.iter().map(|f| f.rings.len()).sum()
    }
}

/// Read footprints, picking the format from the file extension:
/// `.pbf` is OpenStreetMap PBF, `.json` / `.geojson` is GeoJSON.
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<FeatureSet> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("pbf") => osm::read_pbf(path),
        Some("json") | Some("geojson") => geojson::read(path),
        _ => Err(Error::Configuration(format!(
            "{}: unknown input format (expected .pbf, .json or .geojson)",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_all_rings() {
        let set = FeatureSet::from_footprints(vec![
            Footprint {
                source_id: "a".into(),
                rings: vec![vec![[1.0, 2.0], [1.5, 2.5]], vec![[0.5, 3.0]]],
                tags: Tags::new(),
            },
            Footprint {
                source_id: "b".into(),
                rings: vec![vec![[2.0, 1.0]]],
                tags: Tags::new(),
            },
        ]);

        assert_eq!(set.ring_count(), 3);
        assert_eq!(set.bounds, Some(GeoBboxDeg::new(0.5, 1.0, 2.0, 3.0).unwrap()));
        assert!(FeatureSet::from_footprints(Vec::new()).bounds.is_none());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_features("buildings.shp").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
