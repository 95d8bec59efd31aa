//! Geohash encoding
//!
//! Standard base-32 geohash: bits alternate longitude, latitude (longitude
//! first), five bits per output character.

use crate::model::{GeoPoint, Position};
use crate::types::{CivicError, Result};

/// Characters used by geohash (no a, i, l, o)
const ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Precision used for stored positions
pub const DEFAULT_PRECISION: usize = 10;

/// Longest hash a 64-bit float can meaningfully fill
pub const MAX_PRECISION: usize = 22;

/// Whether the pair is a valid WGS84 coordinate
pub fn in_range(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

/// Encode a coordinate pair to `precision` characters.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Result<String> {
    if !in_range(latitude, longitude) {
        return Err(CivicError::InvalidArgument(format!(
            "Coordinates ({}, {}) are out of range",
            latitude, longitude
        )));
    }
    if precision == 0 || precision > MAX_PRECISION {
        return Err(CivicError::InvalidArgument(format!(
            "Geohash precision must be between 1 and {}",
            MAX_PRECISION
        )));
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bits = 0u8;
    let mut index = 0usize;

    while hash.len() < precision {
        let (range, value) = if even_bit {
            (&mut lng_range, longitude)
        } else {
            (&mut lat_range, latitude)
        };
        let mid = (range.0 + range.1) / 2.0;
        index <<= 1;
        if value >= mid {
            index |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even_bit = !even_bit;

        bits += 1;
        if bits == 5 {
            hash.push(ALPHABET[index] as char);
            bits = 0;
            index = 0;
        }
    }

    Ok(hash)
}

/// Position for a location at the default precision
pub fn position_for(location: GeoPoint) -> Result<Position> {
    Ok(Position {
        geohash: encode(location.latitude, location.longitude, DEFAULT_PRECISION)?,
        geopoint: location,
    })
}
