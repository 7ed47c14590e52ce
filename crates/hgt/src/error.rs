use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the store as a whole or of a single point query.
#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("elevation directory {} is not readable: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tile {name} has {found} samples per side but earlier tiles have {expected}")]
    MixedResolution {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid cell bounds: south={south} west={west} north={north} east={east}")]
    InvalidBounds {
        south: i32,
        west: i32,
        north: i32,
        east: i32,
    },

    #[error("tile table holds {found} entries, bounds need {expected}")]
    TileCount { expected: usize, found: usize },

    #[error("no elevation tile loaded for cell {name}")]
    MissingTile { name: String, lat: i32, lon: i32 },

    #[error("({lat}, {lon}) lies outside the loaded elevation cells")]
    OutOfBounds { lat: f64, lon: f64 },

    #[error("void elevation samples around ({lat}, {lon})")]
    Void { lat: f64, lon: f64 },
}

impl ElevationError {
    /// Session-level failures abort a run; the rest only affect the query
    /// that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ElevationError::Directory { .. }
                | ElevationError::MixedResolution { .. }
                | ElevationError::InvalidBounds { .. }
                | ElevationError::TileCount { .. }
        )
    }
}

/// Why a single cell could not be loaded.
#[derive(Debug, Error)]
pub enum TileLoadError {
    #[error("tile {name} not found in {}", .dir.display())]
    NotFound { name: String, dir: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: unknown tile resolution ({len} bytes)", .path.display())]
    UnknownResolution { path: PathBuf, len: u64 },

    #[error("{}: bad zip archive: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{}: no .hgt entry in archive", .path.display())]
    NoHgtInArchive { path: PathBuf },
}
