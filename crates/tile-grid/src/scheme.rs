//! Tiling scheme selectors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tile_common::CrsCode;

/// Requested tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Auto,
    Xyz,
    Wmts,
    Custom,
}

impl Scheme {
    /// Turn `auto` into a concrete scheme.
    ///
    /// A preset always means `wmts`. Otherwise `auto` picks `xyz` for
    /// Web-Mercator, `wmts` when WMTS output was requested, else `custom`.
    pub fn resolve(self, has_preset: bool, tile_crs: &CrsCode, prefer_wmts: bool) -> Scheme {
        if has_preset {
            return Scheme::Wmts;
        }
        match self {
            Scheme::Auto if tile_crs.is_web_mercator() => Scheme::Xyz,
            Scheme::Auto if prefer_wmts => Scheme::Wmts,
            Scheme::Auto => Scheme::Custom,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Auto => "auto",
            Scheme::Xyz => "xyz",
            Scheme::Wmts => "wmts",
            Scheme::Custom => "custom",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Scheme::Auto),
            "xyz" => Ok(Scheme::Xyz),
            "wmts" => Ok(Scheme::Wmts),
            "custom" => Ok(Scheme::Custom),
            other => Err(format!("unknown scheme '{}'", other)),
        }
    }
}

/// Coverage mode of the XYZ scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XyzMode {
    /// Only tiles intersecting the extent.
    #[default]
    Partial,
    /// The full `2^z x 2^z` grid.
    World,
}

impl XyzMode {
    pub fn as_str(self) -> &'static str {
        match self {
            XyzMode::Partial => "partial",
            XyzMode::World => "world",
        }
    }
}

impl fmt::Display for XyzMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for XyzMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partial" | "" => Ok(XyzMode::Partial),
            "world" => Ok(XyzMode::World),
            other => Err(format!("unknown xyz mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolution() {
        let merc = CrsCode::web_mercator();
        let lv95 = CrsCode::parse("EPSG:2056").unwrap();

        assert_eq!(Scheme::Auto.resolve(false, &merc, false), Scheme::Xyz);
        assert_eq!(Scheme::Auto.resolve(false, &lv95, true), Scheme::Wmts);
        assert_eq!(Scheme::Auto.resolve(false, &lv95, false), Scheme::Custom);
        assert_eq!(Scheme::Xyz.resolve(true, &merc, false), Scheme::Wmts);
        assert_eq!(Scheme::Custom.resolve(false, &merc, false), Scheme::Custom);
    }

    #[test]
    fn test_parse() {
        assert_eq!("WMTS".parse::<Scheme>().unwrap(), Scheme::Wmts);
        assert!("tms".parse::<Scheme>().is_err());
        assert_eq!("world".parse::<XyzMode>().unwrap(), XyzMode::World);
    }
}
