//! Geodetic <-> planar coordinate transforms.
//!
//! The only built-in projection is transverse Mercator on WGS-84 (USGS series
//! expansion, Snyder 1987, §8). It is accurate to well below a millimetre
//! within a few degrees of the central meridian, which covers any extent a
//! single mesh is built for.
//!
//! Definitions use PROJ syntax:
//!   `+proj=tmerc +lat_0=47.3 +lon_0=8.5 +k=1 +x_0=0 +y_0=0 +ellps=WGS84`
//!   `+proj=utm +zone=32 [+south]`

use std::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::GeoBboxDeg;

pub mod wgs84 {
    /// Semi-major axis (equatorial radius) in meters.
    pub const A: f64 = 6_378_137.0;

    /// Flattening factor (1 / 298.257223563).
    pub const F: f64 = 1.0 / 298.257_223_563;

    /// First eccentricity squared.
    pub const E2: f64 = F * (2.0 - F);

    /// Second eccentricity squared.
    pub const EP2: f64 = E2 / (1.0 - E2);
}

/// Forward and inverse transform between `[lon, lat]` degrees and `[x, y]`
/// linear units.
pub trait Projection: Send + Sync {
    fn forward(&self, lonlat: &[[f64; 2]]) -> Result<Vec<[f64; 2]>>;

    fn inverse(&self, xy: &[[f64; 2]]) -> Result<Vec<[f64; 2]>>;

    /// Definition string, as written into output headers.
    fn definition(&self) -> String;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransverseMercator {
    /// Latitude of origin, degrees.
    pub lat_0: f64,
    /// Central meridian, degrees.
    pub lon_0: f64,
    /// Scale factor on the central meridian.
    pub k_0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

// Meridional arc coefficients.
const E4: f64 = wgs84::E2 * wgs84::E2;
const E6: f64 = E4 * wgs84::E2;
const M1: f64 = 1.0 - wgs84::E2 / 4.0 - 3.0 * E4 / 64.0 - 5.0 * E6 / 256.0;
const M2: f64 = 3.0 * wgs84::E2 / 8.0 + 3.0 * E4 / 32.0 + 45.0 * E6 / 1024.0;
const M3: f64 = 15.0 * E4 / 256.0 + 45.0 * E6 / 1024.0;
const M4: f64 = 35.0 * E6 / 3072.0;

#[inline(always)]
fn meridian_arc(phi: f64) -> f64 {
    wgs84::A
        * (M1 * phi - M2 * (2.0 * phi).sin() + M3 * (4.0 * phi).sin() - M4 * (6.0 * phi).sin())
}

impl TransverseMercator {
    /// Unit scale, no false origin, centred on the middle of `bounds`.
    pub fn centered_on(bounds: &GeoBboxDeg) -> Self {
        let (lon, lat) = bounds.center();
        Self {
            lat_0: lat,
            lon_0: lon,
            k_0: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }

    pub fn utm(zone: u8, south: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(Error::Configuration(format!("UTM zone {zone} out of range")));
        }

        Ok(Self {
            lat_0: 0.0,
            lon_0: f64::from(zone) * 6.0 - 183.0,
            k_0: 0.9996,
            false_easting: 500_000.0,
            false_northing: if south { 10_000_000.0 } else { 0.0 },
        })
    }

    fn forward_one(&self, lon: f64, lat: f64) -> [f64; 2] {
        let phi = lat.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = wgs84::A / (1.0 - wgs84::E2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = wgs84::EP2 * cos_phi * cos_phi;
        let a = (lon - self.lon_0).to_radians() * cos_phi;
        let m = meridian_arc(phi);
        let m0 = meridian_arc(self.lat_0.to_radians());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = self.k_0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * wgs84::EP2) * a5 / 120.0);
        let y = self.k_0
            * (m - m0
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * wgs84::EP2) * a6
                            / 720.0));

        [x + self.false_easting, y + self.false_northing]
    }

    fn inverse_one(&self, x: f64, y: f64) -> [f64; 2] {
        let x = x - self.false_easting;
        let y = y - self.false_northing;

        let m = meridian_arc(self.lat_0.to_radians()) + y / self.k_0;
        let mu = m / (wgs84::A * M1);

        let root = (1.0 - wgs84::E2).sqrt();
        let e1 = (1.0 - root) / (1.0 + root);
        let e1_2 = e1 * e1;
        let e1_3 = e1_2 * e1;
        let e1_4 = e1_3 * e1;

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = phi1.tan();
        let w = 1.0 - wgs84::E2 * sin_phi1 * sin_phi1;

        let c1 = wgs84::EP2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let n1 = wgs84::A / w.sqrt();
        let r1 = wgs84::A * (1.0 - wgs84::E2) / (w * w.sqrt());
        let d = x / (n1 * self.k_0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let phi = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * wgs84::EP2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * wgs84::EP2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * wgs84::EP2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

        [self.lon_0 + lambda.to_degrees(), phi.to_degrees()]
    }
}

impl Projection for TransverseMercator {
    fn forward(&self, lonlat: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
        lonlat
            .iter()
            .map(|&[lon, lat]| {
                if !lon.is_finite() || !lat.is_finite() || lat.abs() >= 90.0 {
                    return Err(Error::DegenerateGeometry(format!(
                        "cannot project ({lon}, {lat})"
                    )));
                }
                Ok(self.forward_one(lon, lat))
            })
            .collect()
    }

    fn inverse(&self, xy: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
        xy.iter()
            .map(|&[x, y]| {
                if !x.is_finite() || !y.is_finite() {
                    return Err(Error::DegenerateGeometry(format!(
                        "cannot unproject ({x}, {y})"
                    )));
                }
                Ok(self.inverse_one(x, y))
            })
            .collect()
    }

    fn definition(&self) -> String {
        format!(
            "+proj=tmerc +lat_0={} +lon_0={} +k={:.6} +x_0={} +y_0={} +ellps=WGS84 +datum=WGS84 +units=m +no_defs",
            self.lat_0, self.lon_0, self.k_0, self.false_easting, self.false_northing
        )
    }
}

impl FromStr for TransverseMercator {
    type Err = Error;

    fn from_str(def: &str) -> Result<Self> {
        let bad = |msg: String| Error::Configuration(format!("projection {def:?}: {msg}"));

        let mut proj = None;
        let mut zone = None;
        let mut south = false;
        let mut tm = TransverseMercator {
            lat_0: 0.0,
            lon_0: 0.0,
            k_0: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
        };

        for token in def.split_whitespace() {
            let token = token
                .strip_prefix('+')
                .ok_or_else(|| bad(format!("expected +key=value, got {token:?}")))?;
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (token, None),
            };

            let number = |v: Option<&str>| -> Result<f64> {
                v.and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| bad(format!("+{key} needs a number")))
            };

            match key {
                "proj" => proj = value.map(str::to_owned),
                "lat_0" => tm.lat_0 = number(value)?,
                "lon_0" => tm.lon_0 = number(value)?,
                "k" | "k_0" => tm.k_0 = number(value)?,
                "x_0" => tm.false_easting = number(value)?,
                "y_0" => tm.false_northing = number(value)?,
                "zone" => {
                    zone = Some(
                        value
                            .and_then(|v| v.parse::<u8>().ok())
                            .ok_or_else(|| bad("+zone needs an integer".into()))?,
                    )
                }
                "south" => south = true,
                "ellps" | "datum" => {
                    if value != Some("WGS84") {
                        return Err(bad(format!("only WGS84 is supported, got +{token}")));
                    }
                }
                "units" => {
                    if value != Some("m") {
                        return Err(bad(format!("only metres are supported, got +{token}")));
                    }
                }
                "no_defs" | "type" | "wktext" => {}
                _ => debug!("ignoring projection parameter +{token}"),
            }
        }

        match proj.as_deref() {
            Some("tmerc") => {
                if tm.k_0 <= 0.0 {
                    return Err(bad("scale factor must be positive".into()));
                }
                if tm.lat_0.abs() >= 90.0 {
                    return Err(bad("latitude of origin out of range".into()));
                }
                Ok(tm)
            }
            Some("utm") => {
                let zone = zone.ok_or_else(|| bad("+proj=utm needs +zone".into()))?;
                TransverseMercator::utm(zone, south)
            }
            Some(other) => Err(bad(format!("unsupported projection {other:?}"))),
            None => Err(bad("missing +proj".into())),
        }
    }
}
