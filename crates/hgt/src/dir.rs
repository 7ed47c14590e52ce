use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{ElevationError, TileLoadError};
use crate::tile::Tile;

/// Canonical tile name for the cell whose south-west corner is `(lat, lon)`,
/// e.g. `N47E008.hgt` or `S09W078.hgt`.
pub fn tile_file_name(lat: i32, lon: i32) -> String {
    format!(
        "{}{:02}{}{:03}.hgt",
        if lat >= 0 { 'N' } else { 'S' },
        lat.unsigned_abs(),
        if lon >= 0 { 'E' } else { 'W' },
        lon.unsigned_abs()
    )
}

/// Tile files found under an elevation directory, keyed by upper-cased
/// stem (`N47E008`). Raw `.hgt` files win over `.hgt.zip` archives.
#[derive(Debug, Default)]
pub(crate) struct TileIndex {
    by_stem: HashMap<String, PathBuf>,
}

impl TileIndex {
    pub(crate) fn scan(dir: &Path) -> Result<Self, ElevationError> {
        let meta = std::fs::metadata(dir).map_err(|source| ElevationError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        if !meta.is_dir() {
            return Err(ElevationError::Directory {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut index = TileIndex::default();

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_ascii_uppercase();
            let (stem, zipped) = if let Some(stem) = name.strip_suffix(".HGT.ZIP") {
                (stem.to_owned(), true)
            } else if let Some(stem) = name.strip_suffix(".HGT") {
                (stem.to_owned(), false)
            } else {
                continue;
            };

            let path = entry.into_path();
            index
                .by_stem
                .entry(stem)
                .and_modify(|existing| {
                    if is_zip(existing) && !zipped {
                        *existing = path.clone();
                    }
                })
                .or_insert_with(|| path.clone());
        }

        debug!("Indexed {} elevation tiles under {}", index.by_stem.len(), dir.display());

        Ok(index)
    }

    pub(crate) fn load(&self, name: &str, dir: &Path) -> Result<Tile, TileLoadError> {
        let stem = name.trim_end_matches(".hgt").to_ascii_uppercase();
        let path = self.by_stem.get(&stem).ok_or_else(|| TileLoadError::NotFound {
            name: name.to_owned(),
            dir: dir.to_path_buf(),
        })?;

        read_tile(path)
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TileLoadError + '_ {
    move |source| TileLoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read one tile from a raw `.hgt` file or the first `.hgt` entry of a zip.
pub fn read_tile(path: &Path) -> Result<Tile, TileLoadError> {
    if !is_zip(path) {
        return read_raw(path);
    }

    let file = File::open(path).map_err(io_err(path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| TileLoadError::Archive {
        path: path.to_path_buf(),
        source,
    })?;

    let entry_name = archive
        .file_names()
        .find(|n| n.to_ascii_lowercase().ends_with(".hgt"))
        .ok_or_else(|| TileLoadError::NoHgtInArchive {
            path: path.to_path_buf(),
        })?
        .to_owned();

    let mut entry = archive.by_name(&entry_name).map_err(|source| TileLoadError::Archive {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).map_err(io_err(path))?;

    let len = bytes.len() as u64;
    Tile::from_bytes(bytes).ok_or_else(|| TileLoadError::UnknownResolution {
        path: path.to_path_buf(),
        len,
    })
}

/// Fast path: map the file instead of copying it.
#[cfg(feature = "mmap")]
fn read_raw(path: &Path) -> Result<Tile, TileLoadError> {
    let file = File::open(path).map_err(io_err(path))?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file) }.map_err(io_err(path))?;
    let len = map.len() as u64;

    Tile::from_mmap(map).ok_or_else(|| TileLoadError::UnknownResolution {
        path: path.to_path_buf(),
        len,
    })
}

#[cfg(not(feature = "mmap"))]
fn read_raw(path: &Path) -> Result<Tile, TileLoadError> {
    let bytes = std::fs::read(path).map_err(io_err(path))?;
    let len = bytes.len() as u64;

    Tile::from_bytes(bytes).ok_or_else(|| TileLoadError::UnknownResolution {
        path: path.to_path_buf(),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded_with_hemisphere_letters() {
        assert_eq!(tile_file_name(47, 8), "N47E008.hgt");
        assert_eq!(tile_file_name(-9, -78), "S09W078.hgt");
        assert_eq!(tile_file_name(0, -1), "N00W001.hgt");
        assert_eq!(tile_file_name(-1, 179), "S01E179.hgt");
    }

    #[test]
    fn scan_is_case_insensitive_and_prefers_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("n47e008.hgt"), b"x").unwrap();
        std::fs::write(dir.path().join("N47E008.hgt.zip"), b"x").unwrap();
        std::fs::write(dir.path().join("N46E008.HGT.zip"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let index = TileIndex::scan(dir.path()).unwrap();
        assert_eq!(index.by_stem.len(), 2);
        assert!(!is_zip(&index.by_stem["N47E008"]));
        assert!(is_zip(&index.by_stem["N46E008"]));
    }

    #[test]
    fn missing_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TileIndex::scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ElevationError::Directory { .. }));
    }

    #[test]
    fn wrong_size_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N10E010.hgt");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        match read_tile(&path) {
            Err(TileLoadError::UnknownResolution { len, .. }) => assert_eq!(len, 1234),
            other => panic!("unexpected {other:?}"),
        }
    }
}
