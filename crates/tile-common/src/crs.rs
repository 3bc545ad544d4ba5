//! Coordinate Reference System identifiers and the small set of
//! transformations the cache generator needs.

use crate::extent::Extent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half the width of the Web-Mercator world in meters.
pub const WEB_MERCATOR_MAX: f64 = 20037508.342789244;

/// Latitude limit of the square Web-Mercator world.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A normalized CRS authority id such as `EPSG:3857`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CrsCode(String);

impl CrsCode {
    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" / "epsg:4326"
    /// - "CRS:84" (equivalent to EPSG:4326)
    /// - "EPSG:900913" (legacy alias of EPSG:3857)
    /// - "urn:ogc:def:crs:EPSG::3857"
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CrsParseError::Empty);
        }
        let upper = trimmed.to_uppercase();

        let normalized = if let Some(rest) = upper.strip_prefix("URN:OGC:DEF:CRS:") {
            // urn:ogc:def:crs:EPSG:<version>:<code>
            let mut parts = rest.split(':');
            let authority = parts.next().unwrap_or_default().to_string();
            let code = parts.last().unwrap_or_default().to_string();
            if authority.is_empty() || code.is_empty() {
                return Err(CrsParseError::Malformed(s.to_string()));
            }
            format!("{}:{}", authority, code)
        } else {
            upper
        };

        let normalized = match normalized.as_str() {
            "CRS:84" | "OGC:CRS84" => "EPSG:4326".to_string(),
            "EPSG:900913" | "EPSG:3785" | "EPSG:102100" => "EPSG:3857".to_string(),
            _ => normalized,
        };

        match normalized.split_once(':') {
            Some((auth, code)) if !auth.is_empty() && !code.is_empty() => Ok(Self(normalized)),
            _ => Err(CrsParseError::Malformed(s.to_string())),
        }
    }

    pub fn web_mercator() -> Self {
        Self("EPSG:3857".to_string())
    }

    pub fn wgs84() -> Self {
        Self("EPSG:4326".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric EPSG code, when the authority is EPSG.
    pub fn epsg_number(&self) -> Option<u32> {
        self.0.strip_prefix("EPSG:").and_then(|c| c.parse().ok())
    }

    /// Code part after the authority prefix.
    pub fn code(&self) -> &str {
        self.0.split_once(':').map(|(_, c)| c).unwrap_or(&self.0)
    }

    pub fn is_web_mercator(&self) -> bool {
        self.epsg_number() == Some(3857)
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg_number(), Some(4326 | 4269 | 4258 | 4167 | 4283))
    }

    /// Axis order declared by the CRS authority.
    ///
    /// Geographic EPSG codes are latitude first; projected codes are
    /// easting first.
    pub fn axis_order(&self) -> AxisOrder {
        if self.is_geographic() {
            AxisOrder::Yx
        } else {
            AxisOrder::Xy
        }
    }

    /// Valid bounds for CRSs the generator knows natively.
    pub fn valid_bounds(&self) -> Option<Extent> {
        match self.epsg_number() {
            Some(3857) => Some(Extent::new(
                -WEB_MERCATOR_MAX,
                -WEB_MERCATOR_MAX,
                WEB_MERCATOR_MAX,
                WEB_MERCATOR_MAX,
            )),
            Some(4326) => Some(Extent::new(-180.0, -90.0, 180.0, 90.0)),
            _ => None,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&value)
    }
}

impl From<CrsCode> for String {
    fn from(value: CrsCode) -> Self {
        value.0
    }
}

impl std::str::FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

/// Axis order for interpreting a 2-element coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisOrder {
    /// X (longitude/easting), Y (latitude/northing)
    #[default]
    Xy,
    /// Y (latitude/northing), X (longitude/easting)
    Yx,
}

impl AxisOrder {
    /// Parse "xy"/"yx" (also "en"/"ne", "lonlat"/"latlon").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "xy" | "en" | "lonlat" => Some(AxisOrder::Xy),
            "yx" | "ne" | "latlon" => Some(AxisOrder::Yx),
            _ => None,
        }
    }

    /// Return `(x, y)` from a pair stored in this axis order.
    pub fn to_xy(self, pair: (f64, f64)) -> (f64, f64) {
        match self {
            AxisOrder::Xy => pair,
            AxisOrder::Yx => (pair.1, pair.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AxisOrder::Xy => "xy",
            AxisOrder::Yx => "yx",
        }
    }
}

impl fmt::Display for AxisOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transformations
// ============================================================================

/// Project a longitude/latitude pair to Web-Mercator meters.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = lon * WEB_MERCATOR_MAX / 180.0;
    let y = ((90.0 + lat) * std::f64::consts::PI / 360.0).tan().ln() / (std::f64::consts::PI / 180.0);
    (x, y * WEB_MERCATOR_MAX / 180.0)
}

/// Unproject Web-Mercator meters to longitude/latitude degrees.
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = x / WEB_MERCATOR_MAX * 180.0;
    let lat = (y / WEB_MERCATOR_MAX * std::f64::consts::PI).sinh().atan().to_degrees();
    (lon, lat)
}

/// Reproject an extent between two CRSs.
///
/// Only identity and EPSG:4326 <-> EPSG:3857 are supported natively; any
/// other pair returns [`CrsParseError::UnsupportedTransform`] so the caller
/// can decide whether to fall back to the untransformed extent.
pub fn transform_extent(extent: &Extent, from: &CrsCode, to: &CrsCode) -> Result<Extent, CrsParseError> {
    if from == to {
        return Ok(*extent);
    }

    match (from.epsg_number(), to.epsg_number()) {
        (Some(4326), Some(3857)) => {
            let (min_x, min_y) = lonlat_to_mercator(extent.min_x.max(-180.0), extent.min_y);
            let (max_x, max_y) = lonlat_to_mercator(extent.max_x.min(180.0), extent.max_y);
            Ok(Extent::new(min_x, min_y, max_x, max_y))
        }
        (Some(3857), Some(4326)) => {
            let (min_x, min_y) = mercator_to_lonlat(extent.min_x, extent.min_y);
            let (max_x, max_y) = mercator_to_lonlat(extent.max_x, extent.max_y);
            Ok(Extent::new(min_x, min_y, max_x, max_y))
        }
        _ => Err(CrsParseError::UnsupportedTransform {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CrsParseError {
    #[error("CRS string is empty")]
    Empty,

    #[error("Malformed CRS identifier: {0}")]
    Malformed(String),

    #[error("No transformation from {from} to {to}")]
    UnsupportedTransform { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("epsg:3857").unwrap().as_str(), "EPSG:3857");
        assert_eq!(CrsCode::parse("CRS:84").unwrap().as_str(), "EPSG:4326");
        assert_eq!(CrsCode::parse("EPSG:900913").unwrap().as_str(), "EPSG:3857");
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:EPSG::2056").unwrap().as_str(),
            "EPSG:2056"
        );
        assert!(CrsCode::parse("").is_err());
        assert!(CrsCode::parse("nonsense").is_err());
    }

    #[test]
    fn test_axis_order() {
        assert_eq!(CrsCode::wgs84().axis_order(), AxisOrder::Yx);
        assert_eq!(CrsCode::web_mercator().axis_order(), AxisOrder::Xy);
        assert_eq!(AxisOrder::Yx.to_xy((47.0, 8.0)), (8.0, 47.0));
    }

    #[test]
    fn test_mercator_roundtrip_corner() {
        let (x, y) = lonlat_to_mercator(180.0, WEB_MERCATOR_MAX_LAT);
        assert!((x - WEB_MERCATOR_MAX).abs() < 1e-6);
        assert!((y - WEB_MERCATOR_MAX).abs() < 1e-3);

        let (lon, lat) = mercator_to_lonlat(0.0, 0.0);
        assert_eq!(lon, 0.0);
        assert!(lat.abs() < 1e-12);
    }

    #[test]
    fn test_unsupported_transform() {
        let e = Extent::new(0.0, 0.0, 1.0, 1.0);
        let from = CrsCode::parse("EPSG:2056").unwrap();
        let result = transform_extent(&e, &from, &CrsCode::web_mercator());
        assert!(matches!(
            result,
            Err(CrsParseError::UnsupportedTransform { .. })
        ));
    }
}
