// SPDX-License-Identifier: Apache-2.0

//! Maidenhead grid locator conversion.

use crate::ValidationError;

// Cell sizes in degrees (lon, lat) for field, square, subsquare, extended square.
const CELLS: [(f64, f64); 4] = [
    (20.0, 10.0),
    (2.0, 1.0),
    (2.0 / 24.0, 1.0 / 24.0),
    (2.0 / 240.0, 1.0 / 240.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorPrecision {
    /// `FN31`
    Square,
    /// `FN31pr`
    Subsquare,
    /// `FN31pr45`
    Extended,
}

impl LocatorPrecision {
    const fn pairs(self) -> usize {
        match self {
            Self::Square => 2,
            Self::Subsquare => 3,
            Self::Extended => 4,
        }
    }
}

pub fn lat_lon_to_locator(
    lat: f64,
    lon: f64,
    precision: LocatorPrecision,
) -> Result<String, ValidationError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError(format!("latitude out of range: {lat}")));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError(format!("longitude out of range: {lon}")));
    }
    // The northern and eastern edges belong to the last cell.
    let mut x = (lon + 180.0).min(360.0 - 1e-9);
    let mut y = (lat + 90.0).min(180.0 - 1e-9);

    let mut out = String::with_capacity(precision.pairs() * 2);
    for (pair, (cell_lon, cell_lat)) in CELLS.iter().take(precision.pairs()).enumerate() {
        let ix = (x / cell_lon).floor();
        let iy = (y / cell_lat).floor();
        x -= ix * cell_lon;
        y -= iy * cell_lat;
        let (ix, iy) = (ix as u8, iy as u8);
        match pair {
            0 => {
                out.push(char::from(b'A' + ix.min(17)));
                out.push(char::from(b'A' + iy.min(17)));
            }
            2 => {
                out.push(char::from(b'a' + ix.min(23)));
                out.push(char::from(b'a' + iy.min(23)));
            }
            _ => {
                out.push(char::from(b'0' + ix.min(9)));
                out.push(char::from(b'0' + iy.min(9)));
            }
        }
    }
    Ok(out)
}

/// Centre of the cell named by `locator`, as `(lat, lon)`.
pub fn locator_to_lat_lon(locator: &str) -> Result<(f64, f64), ValidationError> {
    let raw = locator.trim().as_bytes();
    if raw.is_empty() || raw.len() % 2 != 0 || raw.len() > 8 {
        return Err(ValidationError(format!(
            "locator must have 2, 4, 6 or 8 characters: `{locator}`"
        )));
    }
    let mut lon = -180.0;
    let mut lat = -90.0;
    let mut last = CELLS[0];
    for (pair, chunk) in raw.chunks(2).enumerate() {
        let (base, limit) = match pair {
            0 => (b'A', 18),
            2 => (b'A', 24),
            _ => (b'0', 10),
        };
        let decode = |c: u8| -> Result<f64, ValidationError> {
            let c = if base == b'A' { c.to_ascii_uppercase() } else { c };
            match c.checked_sub(base) {
                Some(v) if v < limit => Ok(f64::from(v)),
                _ => Err(ValidationError(format!(
                    "invalid locator character `{}` in `{locator}`",
                    char::from(c)
                ))),
            }
        };
        let (cell_lon, cell_lat) = CELLS[pair];
        lon += decode(chunk[0])? * cell_lon;
        lat += decode(chunk[1])? * cell_lat;
        last = (cell_lon, cell_lat);
    }
    Ok((lat + last.1 / 2.0, lon + last.0 / 2.0))
}
