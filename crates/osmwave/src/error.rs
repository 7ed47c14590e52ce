use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad run setup: projection definition, bounding box, options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Store-level failures (directory, mixed resolutions) and per-query
    /// failures (missing tile, void samples).
    #[error(transparent)]
    Elevation(#[from] hgt::ElevationError),

    #[error("malformed tag {key}={value:?}")]
    MalformedTag { key: String, value: String },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Misuse of the mesh writer's checkpoint/face protocol.
    #[error("mesh index error: {0}")]
    MeshIndex(String),

    #[error("failed to read features from {}: {message}", .path.display())]
    Input { path: PathBuf, message: String },

    #[error("mesh output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error ends the run. Everything else only costs the
    /// feature being processed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Elevation(e) => e.is_fatal(),
            Error::MalformedTag { .. } | Error::DegenerateGeometry(_) => false,
            Error::Configuration(_) | Error::MeshIndex(_) | Error::Input { .. } | Error::Io(_) => {
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_feature_errors_are_not_fatal() {
        let missing = Error::from(hgt::ElevationError::MissingTile {
            name: "N00E000.hgt".into(),
            lat: 0,
            lon: 0,
        });
        assert!(!missing.is_fatal());
        assert!(!Error::DegenerateGeometry("ring".into()).is_fatal());
        assert!(!Error::MalformedTag {
            key: "height".into(),
            value: "tall".into()
        }
        .is_fatal());
    }

    #[test]
    fn session_errors_are_fatal() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
        assert!(io.is_fatal());
        assert!(Error::Configuration("bad proj".into()).is_fatal());

        let mixed = Error::from(hgt::ElevationError::MixedResolution {
            name: "N00E001.hgt".into(),
            expected: 1201,
            found: 3601,
        });
        assert!(mixed.is_fatal());
    }
}
