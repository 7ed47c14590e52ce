//! HGT: SRTM elevation tiles and bilinear height queries.
//!
//! - One file per 1°x1° cell, named after its south-west corner:
//!   `{N|S}DD{E|W}DDD.hgt` (`N47E008.hgt`, `S09W078.hgt`).
//! - Samples are big-endian i16 metres, row-major, first row = northern edge.
//! - Side length is inferred from the byte size:
//!     2_884_802 bytes  => 1201 x 1201 (3 arc-second)
//!     25_934_402 bytes => 3601 x 3601 (1 arc-second)
//!   Neighbouring tiles share their edge row/column.
//! - `-32768` marks a void sample.
//!
//! An [`ElevationStore`] covers a rectangular block of cells. Cells whose file
//! is missing or broken stay empty and are listed in the load report; only
//! queries that land in them fail.

mod dir;
mod error;
mod tile;

use std::path::Path;

use log::{debug, info, warn};

pub use dir::{read_tile, tile_file_name};
pub use error::{ElevationError, TileLoadError};
pub use tile::{Tile, TileResolution, SRTM1_BYTES, SRTM3_BYTES, VOID_SAMPLE};

/// Integer degree bounds of a block of cells, all inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBounds {
    pub south: i32,
    pub west: i32,
    pub north: i32,
    pub east: i32,
}

impl CellBounds {
    pub fn new(south: i32, west: i32, north: i32, east: i32) -> Result<Self, ElevationError> {
        if south > north || west > east || south < -90 || north > 89 || west < -180 || east > 179 {
            return Err(ElevationError::InvalidBounds {
                south,
                west,
                north,
                east,
            });
        }

        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }

    /// Smallest block of cells containing the given degree rectangle.
    ///
    /// A maximum edge on a whole degree stays in the cell below it: that
    /// cell's tile already holds the shared edge row/column.
    pub fn covering(
        lat_min: f64,
        lon_min: f64,
        lat_max: f64,
        lon_max: f64,
    ) -> Result<Self, ElevationError> {
        Self::new(
            lat_min.floor() as i32,
            lon_min.floor() as i32,
            upper_cell(lat_min, lat_max),
            upper_cell(lon_min, lon_max),
        )
    }

    #[inline]
    pub fn rows(&self) -> usize {
        (self.north - self.south + 1) as usize
    }

    #[inline]
    pub fn cols(&self) -> usize {
        (self.east - self.west + 1) as usize
    }

    #[inline]
    pub fn contains(&self, lat: i32, lon: i32) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Cells in storage order: south to north, west to east within a row.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.south..=self.north).flat_map(move |lat| (self.west..=self.east).map(move |lon| (lat, lon)))
    }

    #[inline]
    fn slot(&self, lat: i32, lon: i32) -> usize {
        (lat - self.south) as usize * self.cols() + (lon - self.west) as usize
    }
}

/// Reprojected grid edges land a hair past the whole degree.
const EDGE_TOLERANCE_DEG: f64 = 1e-9;

/// `floor(v)`, except that `v` on (or within [`EDGE_TOLERANCE_DEG`] past) the
/// far edge of cell `last` stays in `last`.
#[inline]
fn edge_floor(v: f64, last: i32) -> f64 {
    let f = v.floor();
    if f as i32 == last + 1 && v - f <= EDGE_TOLERANCE_DEG {
        f - 1.0
    } else {
        f
    }
}

#[inline]
fn upper_cell(min: f64, max: f64) -> i32 {
    let cell = max.floor();
    if cell == max && max > min {
        cell as i32 - 1
    } else {
        cell as i32
    }
}

/// A cell that could not be loaded, kept for reporting.
#[derive(Debug)]
pub struct CellFailure {
    pub lat: i32,
    pub lon: i32,
    pub error: TileLoadError,
}

/// Read-only block of elevation tiles.
#[derive(Debug)]
pub struct ElevationStore {
    bounds: CellBounds,
    tile_size: usize,
    tiles: Vec<Option<Tile>>,
    failures: Vec<CellFailure>,
}

impl ElevationStore {
    /// Load every cell of `bounds` from `dir`.
    ///
    /// Missing or unreadable tiles are logged and recorded in
    /// [`load_report`](Self::load_report). An unreadable directory or tiles
    /// of different resolutions fail the whole store.
    pub fn open<P: AsRef<Path>>(bounds: CellBounds, dir: P) -> Result<Self, ElevationError> {
        let dir = dir.as_ref();
        let index = dir::TileIndex::scan(dir)?;

        let mut tiles = Vec::with_capacity(bounds.rows() * bounds.cols());
        let mut failures = Vec::new();
        let mut tile_size = 0usize;

        for (lat, lon) in bounds.cells() {
            let name = tile_file_name(lat, lon);

            match index.load(&name, dir) {
                Ok(tile) => {
                    if tile_size != 0 && tile_size != tile.size() {
                        return Err(ElevationError::MixedResolution {
                            name,
                            expected: tile_size,
                            found: tile.size(),
                        });
                    }

                    tile_size = tile.size();
                    debug!("Loaded {} ({}x{})", name, tile_size, tile_size);
                    tiles.push(Some(tile));
                }
                Err(error) => {
                    warn!("Elevation cell ({}, {}) unavailable: {}", lat, lon, error);
                    failures.push(CellFailure { lat, lon, error });
                    tiles.push(None);
                }
            }
        }

        info!(
            "Elevation store: {} of {} cells loaded from {}",
            tiles.iter().filter(|t| t.is_some()).count(),
            tiles.len(),
            dir.display()
        );

        Ok(Self {
            bounds,
            tile_size,
            tiles,
            failures,
        })
    }

    /// Build a store from tiles already in memory, in [`CellBounds::cells`]
    /// order. `None` entries behave like missing files.
    pub fn from_tiles(bounds: CellBounds, tiles: Vec<Option<Tile>>) -> Result<Self, ElevationError> {
        let expected = bounds.rows() * bounds.cols();
        if tiles.len() != expected {
            return Err(ElevationError::TileCount {
                expected,
                found: tiles.len(),
            });
        }

        let mut tile_size = 0usize;
        for ((lat, lon), tile) in bounds.cells().zip(&tiles) {
            if let Some(tile) = tile {
                if tile_size != 0 && tile_size != tile.size() {
                    return Err(ElevationError::MixedResolution {
                        name: tile_file_name(lat, lon),
                        expected: tile_size,
                        found: tile.size(),
                    });
                }
                tile_size = tile.size();
            }
        }

        Ok(Self {
            bounds,
            tile_size,
            tiles,
            failures: Vec::new(),
        })
    }

    #[inline]
    pub fn bounds(&self) -> CellBounds {
        self.bounds
    }

    /// Samples per tile side shared by every loaded tile, 0 if none loaded.
    #[inline]
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn load_report(&self) -> &[CellFailure] {
        &self.failures
    }

    pub fn is_loaded(&self, lat: i32, lon: i32) -> bool {
        self.bounds.contains(lat, lon) && self.tiles[self.bounds.slot(lat, lon)].is_some()
    }

    /// Interpolated height in metres at a geographic point (degrees).
    pub fn elevation(&self, lat: f64, lon: f64) -> Result<f64, ElevationError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(ElevationError::OutOfBounds { lat, lon });
        }

        // North and east store edges belong to the last tile's shared row/column.
        let f_lat = edge_floor(lat, self.bounds.north);
        let f_lon = edge_floor(lon, self.bounds.east);
        let lat_cell = f_lat as i32;
        let lon_cell = f_lon as i32;

        if !self.bounds.contains(lat_cell, lon_cell) {
            return Err(ElevationError::OutOfBounds { lat, lon });
        }

        let tile = self.tiles[self.bounds.slot(lat_cell, lon_cell)]
            .as_ref()
            .ok_or_else(|| ElevationError::MissingTile {
                name: tile_file_name(lat_cell, lon_cell),
                lat: lat_cell,
                lon: lon_cell,
            })?;

        tile.interpolate((lat - f_lat).min(1.0), (lon - f_lon).min(1.0))
            .ok_or(ElevationError::Void { lat, lon })
    }
}
