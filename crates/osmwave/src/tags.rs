//! Building height metadata from OSM-style tags.

use std::collections::BTreeMap;

use crate::error::Error;

/// Feature tags, key -> value.
pub type Tags = BTreeMap<String, String>;

pub const METERS_PER_LEVEL: f64 = 3.0;
pub const DEFAULT_BUILDING_HEIGHT: f64 = 8.0;

/// Whether the tags describe a building footprint.
pub fn is_building(tags: &Tags) -> bool {
    matches!(tags.get("building"), Some(v) if !v.is_empty() && v != "no")
}

/// `"12"`, `"12m"`, `"12 m"`, `" 7.5 ft "` -> the number; the unit token is
/// ignored. Anything else (two tokens after the number, no digits) is `None`.
/// A run with several dots reads up to the second one (`"1.2.3"` -> 1.2).
pub fn parse_height(value: &str) -> Option<f64> {
    let s = value.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (run, rest) = s.split_at(split);

    if rest.trim_start().contains(char::is_whitespace) {
        return None;
    }

    let number = match run.match_indices('.').nth(1) {
        Some((second_dot, _)) => &run[..second_dot],
        None => run,
    };
    if !number.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leading floating-point number of `value`, trailing text ignored
/// (`"3"`, `"2.5"`, `"4;5"` -> 4). Negative counts are rejected.
pub fn parse_levels(value: &str) -> Option<f64> {
    let s = value.trim_start();
    let bytes = s.as_bytes();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    let digits = &s[digits_start..end];
    if !digits.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    s[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Which rule produced a derived height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeightSource {
    Height,
    Levels,
    Default,
}

#[derive(Debug)]
pub struct Derived {
    pub value: f64,
    pub source: HeightSource,
    /// Present tags that failed to parse, in the order they were tried.
    pub malformed: Vec<Error>,
}

/// Explicit height tag, then levels tag times [`METERS_PER_LEVEL`], then a
/// default. An unparseable height tag goes straight to the default.
#[derive(Clone, Copy, Debug)]
pub struct HeightRule {
    pub height_key: &'static str,
    pub levels_key: &'static str,
    pub default: f64,
}

impl HeightRule {
    /// Total building height (`height`, `building:levels`).
    pub fn building(default: f64) -> Self {
        Self {
            height_key: "height",
            levels_key: "building:levels",
            default,
        }
    }

    /// Height of the lowest part above ground (`min_height`,
    /// `building:min_level`).
    pub fn base() -> Self {
        Self {
            height_key: "min_height",
            levels_key: "building:min_level",
            default: 0.0,
        }
    }

    pub fn derive(&self, tags: &Tags) -> Derived {
        let mut malformed = Vec::new();

        // A present height tag decides alone; levels are only read without one.
        if let Some(raw) = tags.get(self.height_key) {
            return match parse_height(raw) {
                Some(value) => Derived {
                    value,
                    source: HeightSource::Height,
                    malformed,
                },
                None => {
                    malformed.push(Error::MalformedTag {
                        key: self.height_key.to_owned(),
                        value: raw.clone(),
                    });
                    Derived {
                        value: self.default,
                        source: HeightSource::Default,
                        malformed,
                    }
                }
            };
        }

        if let Some(raw) = tags.get(self.levels_key) {
            match parse_levels(raw) {
                Some(levels) => {
                    return Derived {
                        value: levels * METERS_PER_LEVEL,
                        source: HeightSource::Levels,
                        malformed,
                    }
                }
                None => malformed.push(Error::MalformedTag {
                    key: self.levels_key.to_owned(),
                    value: raw.clone(),
                }),
            }
        }

        Derived {
            value: self.default,
            source: HeightSource::Default,
            malformed,
        }
    }
}
