//! OSMWAVE: building footprints and SRTM terrain to Wavefront OBJ.
//!
//! Every producer writes through one [`ObjWriter`]. A producer takes a
//! checkpoint, emits its vertices and then faces whose indices are relative to
//! that checkpoint, so buildings and terrain patches can be interleaved in a
//! single stream without index collisions.
//!
//! Output axes: `x` = projected easting, `y` = elevation, `z` = projected
//! northing.

pub mod error;
pub mod extrude;
pub mod features;
pub mod obj;
pub mod pipeline;
pub mod projection;
pub mod tags;
pub mod terrain;
pub mod triangulate;

pub use error::{Error, Result};
pub use extrude::{BuildingExtruder, BuildingOptions, Extrusion};
pub use features::{FeatureSet, Footprint};
pub use obj::ObjWriter;
pub use pipeline::{buildings_to_obj, terrain_to_obj, RunStats, Session};
pub use projection::{Projection, TransverseMercator};
pub use tags::Tags;
pub use terrain::{NormalMode, TerrainGrid, TerrainMesher, TerrainOptions, TerrainStats};
pub use triangulate::{DelaunayTriangulator, Triangulator};

/// Geographic bounding box in degrees (CRS:84 axis order: lon, lat).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBboxDeg {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl GeoBboxDeg {
    /// Build from two corners in any order; rejects non-finite or
    /// out-of-range coordinates.
    pub fn new(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> Result<Self> {
        let finite = [lon1, lat1, lon2, lat2].iter().all(|v| v.is_finite());
        let in_range = [lat1, lat2].iter().all(|v| v.abs() <= 90.0)
            && [lon1, lon2].iter().all(|v| v.abs() <= 180.0);

        if !finite || !in_range {
            return Err(Error::Configuration(format!(
                "invalid bounding box ({lon1}, {lat1}) - ({lon2}, {lat2})"
            )));
        }

        Ok(Self {
            lon_min: lon1.min(lon2),
            lat_min: lat1.min(lat2),
            lon_max: lon1.max(lon2),
            lat_max: lat1.max(lat2),
        })
    }

    /// Extent of a set of `[lon, lat]` points, `None` when there are none.
    pub fn around<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [f64; 2]>,
    {
        let (mut min_lon, mut min_lat) = (f64::INFINITY, f64::INFINITY);
        let (mut max_lon, mut max_lat) = (f64::NEG_INFINITY, f64::NEG_INFINITY);

        for &[lon, lat] in points {
            if lon.is_finite() && lat.is_finite() {
                min_lon = min_lon.min(lon);
                max_lon = max_lon.max(lon);
                min_lat = min_lat.min(lat);
                max_lat = max_lat.max(lat);
            }
        }

        if !min_lon.is_finite() {
            return None;
        }

        Some(Self {
            lon_min: min_lon,
            lat_min: min_lat,
            lon_max: max_lon,
            lat_max: max_lat,
        })
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.lon_min + self.lon_max),
            0.5 * (self.lat_min + self.lat_max),
        )
    }

    /// Elevation cells touched by this box.
    pub fn cells(&self) -> Result<hgt::CellBounds> {
        Ok(hgt::CellBounds::covering(
            self.lat_min,
            self.lon_min,
            self.lat_max,
            self.lon_max,
        )?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use hgt::{CellBounds, ElevationStore, Tile};

    use crate::{Projection, Result};

    /// Degrees in, degrees out.
    pub struct PlateCarree;

    impl Projection for PlateCarree {
        fn forward(&self, lonlat: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
            Ok(lonlat.to_vec())
        }

        fn inverse(&self, xy: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
            Ok(xy.to_vec())
        }

        fn definition(&self) -> String {
            "+proj=longlat +datum=WGS84".into()
        }
    }

    /// Single cell (10 N, 20 E) at a constant height.
    pub fn flat_store(height: i16) -> ElevationStore {
        let tile = Tile::from_samples(5, &[height; 25]).unwrap();
        ElevationStore::from_tiles(CellBounds::new(10, 20, 10, 20).unwrap(), vec![Some(tile)])
            .unwrap()
    }
}
