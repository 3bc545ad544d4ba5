//! Axis-aligned extents in a named CRS.

use serde::{Deserialize, Serialize};

/// A bounding box in CRS units.
///
/// Coordinates are always stored in x/y order (easting/northing or
/// longitude/latitude), independent of the CRS's declared axis order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Create an extent from corner coordinates without validation.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create an extent, rejecting empty or inverted boxes.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, ExtentError> {
        let extent = Self::new(min_x, min_y, max_x, max_y);
        extent.validate()?;
        Ok(extent)
    }

    /// Build from a four-element slice `[minx, miny, maxx, maxy]`.
    pub fn from_slice(values: &[f64]) -> Result<Self, ExtentError> {
        match values {
            [a, b, c, d] => Self::try_new(*a, *b, *c, *d),
            _ => Err(ExtentError::WrongArity(values.len())),
        }
    }

    /// Parse "minx,miny,maxx,maxy". Whitespace and commas are both accepted
    /// as separators.
    pub fn parse(s: &str) -> Result<Self, ExtentError> {
        let parts: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 4 {
            return Err(ExtentError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ExtentError::InvalidNumber(part.to_string()))?;
        }
        Self::from_slice(&values)
    }

    /// Check `max > min` on both axes and that every coordinate is finite.
    pub fn validate(&self) -> Result<(), ExtentError> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ExtentError::NotFinite);
        }
        if self.max_x <= self.min_x || self.max_y <= self.min_y {
            return Err(ExtentError::Empty(*self));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Top-left corner `(min_x, max_y)`.
    pub fn top_left(&self) -> (f64, f64) {
        (self.min_x, self.max_y)
    }

    /// True when the interiors overlap. Touching edges do not count.
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }

        Some(Extent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest extent covering both.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Clamp each coordinate into `bounds`. The result may be empty.
    pub fn clamp_to(&self, bounds: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.clamp(bounds.min_x, bounds.max_x),
            min_y: self.min_y.clamp(bounds.min_y, bounds.max_y),
            max_x: self.max_x.clamp(bounds.min_x, bounds.max_x),
            max_y: self.max_y.clamp(bounds.min_y, bounds.max_y),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Largest absolute coordinate value.
    pub fn max_abs(&self) -> f64 {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for Extent {
    fn from(v: [f64; 4]) -> Self {
        Extent::new(v[0], v[1], v[2], v[3])
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtentError {
    #[error("Invalid extent format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in extent: {0}")]
    InvalidNumber(String),

    #[error("Extent needs 4 values, got {0}")]
    WrongArity(usize),

    #[error("Extent contains non-finite coordinates")]
    NotFinite,

    #[error("Extent is empty or inverted: {0:?}")]
    Empty(Extent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extent() {
        let e = Extent::parse("-125.0,24.0,-66.0,50.0").unwrap();
        assert_eq!(e.min_x, -125.0);
        assert_eq!(e.min_y, 24.0);
        assert_eq!(e.max_x, -66.0);
        assert_eq!(e.max_y, 50.0);
    }

    #[test]
    fn test_parse_whitespace_separated() {
        let e = Extent::parse("0 0 100 50").unwrap();
        assert_eq!(e.width(), 100.0);
        assert_eq!(e.height(), 50.0);
    }

    #[test]
    fn test_rejects_inverted() {
        assert!(matches!(
            Extent::try_new(10.0, 0.0, 5.0, 10.0),
            Err(ExtentError::Empty(_))
        ));
        assert!(matches!(
            Extent::try_new(0.0, 0.0, 10.0, 0.0),
            Err(ExtentError::Empty(_))
        ));
    }

    #[test]
    fn test_union_and_clamp() {
        let a = Extent::new(0.0, 0.0, 10.0, 10.0);
        let b = Extent::new(5.0, -5.0, 20.0, 8.0);
        assert_eq!(a.union(&b), Extent::new(0.0, -5.0, 20.0, 10.0));

        let bounds = Extent::new(-1.0, -1.0, 1.0, 1.0);
        let clamped = Extent::new(5.0, 5.0, 10.0, 10.0).clamp_to(&bounds);
        assert!(!clamped.is_valid());
    }
}
