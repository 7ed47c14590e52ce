use std::fmt;
use std::ops::Deref;

/// SRTM void marker. Interpolating across it yields no value.
pub const VOID_SAMPLE: i16 = i16::MIN;

/// Byte size of a 3 arc-second tile (1201 x 1201 samples).
pub const SRTM3_BYTES: u64 = 2_884_802;

/// Byte size of a 1 arc-second tile (3601 x 3601 samples).
pub const SRTM1_BYTES: u64 = 25_934_402;

/// Tile resolutions distinguishable from the raw file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileResolution {
    /// 3 arc-second, 1201 samples per side.
    Srtm3,
    /// 1 arc-second, 3601 samples per side.
    Srtm1,
}

impl TileResolution {
    #[inline]
    pub fn from_byte_len(len: u64) -> Option<Self> {
        match len {
            SRTM3_BYTES => Some(TileResolution::Srtm3),
            SRTM1_BYTES => Some(TileResolution::Srtm1),
            _ => None,
        }
    }

    /// Samples per tile side, including the one-sample overlap with the
    /// neighbouring tiles.
    #[inline]
    pub fn samples(self) -> usize {
        match self {
            TileResolution::Srtm3 => 1201,
            TileResolution::Srtm1 => 3601,
        }
    }
}

impl fmt::Display for TileResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TileResolution::Srtm3 => "SRTM3 (1201x1201)",
            TileResolution::Srtm1 => "SRTM1 (3601x3601)",
        };

        f.write_str(s)
    }
}

pub(crate) enum TileData {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
}

impl Deref for TileData {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            TileData::Owned(bytes) => bytes,
            #[cfg(feature = "mmap")]
            TileData::Mapped(map) => map,
        }
    }
}

/// One 1°x1° cell of big-endian i16 samples, row 0 at the north edge.
pub struct Tile {
    size: usize,
    data: TileData,
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile").field("size", &self.size).finish_non_exhaustive()
    }
}

impl Tile {
    /// Wrap the raw contents of an `.hgt` file. Returns `None` when the byte
    /// count matches no known resolution.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let resolution = TileResolution::from_byte_len(bytes.len() as u64)?;

        Some(Self {
            size: resolution.samples(),
            data: TileData::Owned(bytes),
        })
    }

    #[cfg(feature = "mmap")]
    pub(crate) fn from_mmap(map: memmap2::Mmap) -> Option<Self> {
        let resolution = TileResolution::from_byte_len(map.len() as u64)?;

        Some(Self {
            size: resolution.samples(),
            data: TileData::Mapped(map),
        })
    }

    /// Build a tile of arbitrary side length from row-major samples (north
    /// row first). Used for synthetic rasters; `None` if `size < 2` or the
    /// sample count is not `size * size`.
    pub fn from_samples(size: usize, samples: &[i16]) -> Option<Self> {
        if size < 2 || samples.len() != size * size {
            return None;
        }

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_be_bytes());
        }

        Some(Self {
            size,
            data: TileData::Owned(bytes),
        })
    }

    /// Samples per side.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw sample at storage `(row, col)`; row 0 is the northern edge.
    #[inline(always)]
    pub fn sample(&self, row: usize, col: usize) -> i16 {
        let index = (row * self.size + col) * 2;
        i16::from_be_bytes([self.data[index], self.data[index + 1]])
    }

    /// Bilinear blend at a fractional position inside the cell, both
    /// fractions measured from the south-west corner in `[0, 1]`.
    ///
    /// `v00` sits at the computed node, `v10` one column east, `v01` one row
    /// north and `v11` north-east. Rows grow southward in storage, so "north"
    /// is the previous storage row.
    pub fn interpolate(&self, lat_frac: f64, lon_frac: f64) -> Option<f64> {
        let last = (self.size - 1) as f64;
        let row = lat_frac * last;
        let col = lon_frac * last;

        // Clamp so the east/north neighbours stay inside the tile.
        let row_i = (row.floor().max(0.0) as usize).min(self.size - 2);
        let col_i = (col.floor().max(0.0) as usize).min(self.size - 2);
        let row_frac = row - row_i as f64;
        let col_frac = col - col_i as f64;

        let south = self.size - 1 - row_i;
        let north = south - 1;

        let v00 = self.sample(south, col_i);
        let v10 = self.sample(south, col_i + 1);
        let v01 = self.sample(north, col_i);
        let v11 = self.sample(north, col_i + 1);

        if [v00, v10, v01, v11].contains(&VOID_SAMPLE) {
            return None;
        }

        let v1 = lerp(v00 as f64, v10 as f64, col_frac);
        let v2 = lerp(v01 as f64, v11 as f64, col_frac);

        Some(lerp(v1, v2, row_frac))
    }
}

#[inline(always)]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
