//! GeoJSON `FeatureCollection` input.
//!
//! `Polygon` and `MultiPolygon` geometries contribute their outer rings;
//! holes and every other geometry type are ignored. Properties become tags:
//! strings as they are, numbers and booleans in their JSON spelling.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use super::{FeatureSet, Footprint};
use crate::error::{Error, Result};
use crate::tags::{is_building, Tags};

#[derive(Debug, Deserialize)]
struct GeoJsonRoot {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

type Positions = Vec<Vec<f64>>;

pub fn read<P: AsRef<Path>>(path: P) -> Result<FeatureSet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::Input {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let set = from_reader(BufReader::new(file)).map_err(|e| match e {
        Error::Input { message, .. } => Error::Input {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;

    info!(
        "{}: {} building footprints, {} rings",
        path.display(),
        set.footprints.len(),
        set.ring_count()
    );
    Ok(set)
}

pub fn from_reader<R: Read>(reader: R) -> Result<FeatureSet> {
    let root: GeoJsonRoot = serde_json::from_reader(reader).map_err(|e| Error::Input {
        path: "<geojson>".into(),
        message: e.to_string(),
    })?;

    let mut footprints = Vec::new();
    for (n, feature) in root.features.into_iter().enumerate() {
        let source_id = match &feature.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(v)) => v.to_string(),
            _ => format!("feature/{n}"),
        };

        let tags = feature.properties.map(properties_to_tags).unwrap_or_default();
        if !is_building(&tags) {
            continue;
        }

        let Some(geometry) = feature.geometry else {
            debug!("{source_id}: no geometry");
            continue;
        };

        match outer_rings(&geometry) {
            Ok(rings) if !rings.is_empty() => footprints.push(Footprint {
                source_id,
                rings,
                tags,
            }),
            Ok(_) => debug!("{source_id}: {} geometry has no outer ring", geometry.kind),
            Err(message) => warn!("Skipping {source_id}: {message}"),
        }
    }

    Ok(FeatureSet::from_footprints(footprints))
}

fn properties_to_tags(properties: serde_json::Map<String, Value>) -> Tags {
    properties
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Number(n) => Some((k, n.to_string())),
            Value::Bool(b) => Some((k, b.to_string())),
            _ => None,
        })
        .collect()
}

fn outer_rings(geometry: &Geometry) -> std::result::Result<Vec<Vec<[f64; 2]>>, String> {
    let polygons: Vec<Vec<Positions>> = match geometry.kind.as_str() {
        "Polygon" => vec![parse_coordinates(&geometry.coordinates)?],
        "MultiPolygon" => parse_coordinates(&geometry.coordinates)?,
        _ => return Ok(Vec::new()),
    };

    polygons
        .into_iter()
        .filter_map(|rings| rings.into_iter().next())
        .map(|outer| {
            outer
                .into_iter()
                .map(|p| match p[..] {
                    [lon, lat, ..] => Ok([lon, lat]),
                    _ => Err(format!("position with {} coordinates", p.len())),
                })
                .collect::<std::result::Result<Vec<_>, String>>()
        })
        .collect()
}

fn parse_coordinates<T: serde::de::DeserializeOwned>(
    coordinates: &Value,
) -> std::result::Result<T, String> {
    T::deserialize(coordinates).map_err(|e| format!("bad coordinates: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "way/1",
                "properties": { "building": "yes", "height": 12, "roof": null, "historic": true },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [
                        [[8.50, 47.30, 410.0], [8.51, 47.30], [8.51, 47.31], [8.50, 47.30]],
                        [[8.502, 47.302], [8.503, 47.302], [8.503, 47.303], [8.502, 47.302]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": { "building": "house" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[8.60, 47.40], [8.61, 47.40], [8.61, 47.41], [8.60, 47.40]]],
                        [[[8.62, 47.40], [8.63, 47.40], [8.63, 47.41], [8.62, 47.40]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": { "highway": "residential" },
                "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] }
            },
            {
                "type": "Feature",
                "properties": { "building": "yes" },
                "geometry": { "type": "Point", "coordinates": [8.7, 47.5] }
            },
            {
                "type": "Feature",
                "id": 7,
                "properties": { "building": "yes" },
                "geometry": { "type": "Polygon", "coordinates": [[[8.7], [8.8, 47.5]]] }
            }
        ]
    }"#;

    #[test]
    fn reads_building_polygons() {
        let set = from_reader(COLLECTION.as_bytes()).unwrap();

        assert_eq!(set.footprints.len(), 2);
        let first = &set.footprints[0];
        assert_eq!(first.source_id, "way/1");
        assert_eq!(first.rings.len(), 1);
        assert_eq!(first.rings[0][0], [8.50, 47.30]);
        assert_eq!(first.tags.get("height").map(String::as_str), Some("12"));
        assert_eq!(first.tags.get("historic").map(String::as_str), Some("true"));
        assert!(!first.tags.contains_key("roof"));

        let second = &set.footprints[1];
        assert_eq!(second.source_id, "feature/1");
        assert_eq!(second.rings.len(), 2);

        let bounds = set.bounds.unwrap();
        assert_eq!((bounds.lon_min, bounds.lat_min), (8.50, 47.30));
        assert_eq!((bounds.lon_max, bounds.lat_max), (8.63, 47.41));
    }

    #[test]
    fn rejects_non_collections() {
        let err = from_reader(r#"{"type": "Point", "coordinates": [0, 0]}"#.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Input { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn read_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        std::fs::write(&path, "{ not json").unwrap();

        match read(&path).unwrap_err() {
            Error::Input { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
