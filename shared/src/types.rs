//! Common types for the shared crate
//!
//! Identifier and geolocation primitives used across models.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Row Identifier
// ============================================================================

/// Opaque, server-assigned row identifier.
///
/// The platform hands out either integer keys or UUID strings depending on the
/// table, so the id is kept in its canonical string form and accepts both on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowIdVisitor;

        impl Visitor<'_> for RowIdVisitor {
            type Value = RowId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer row id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RowId, E> {
                Ok(RowId(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RowId, E> {
                Ok(RowId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RowId, E> {
                Ok(RowId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RowId, E> {
                Ok(RowId(v.to_string()))
            }
        }

        deserializer.deserialize_any(RowIdVisitor)
    }
}

// ============================================================================
// Geolocation
// ============================================================================

/// Mean Earth radius used for great-circle distances
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A pinned map location (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Haversine distance in meters
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Stored as `"lat,lng"` in the free-text location column
impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl FromStr for GeoPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("not a lat,lng pair: {s}"))?;
        let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude: {lat}"))?;
        let lng: f64 = lng.trim().parse().map_err(|_| format!("invalid longitude: {lng}"))?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("coordinates out of range: {s}"));
        }
        Ok(Self { lat, lng })
    }
}
