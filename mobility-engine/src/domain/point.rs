//! Planar coordinates and their quantized graph-node form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A location on the service plane.
///
/// Catalog segments always carry integer-valued points (the catalog rounds
/// them), but query origins and destinations may be anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns the point rounded to the integer grid.
    pub fn rounded(&self) -> Point {
        Point::new(self.x.round(), self.y.round())
    }

    /// Quantize to the graph node that owns this point.
    ///
    /// # Examples
    ///
    /// ```
    /// use mobility_engine::domain::{NodeId, Point};
    ///
    /// assert_eq!(Point::new(2.4, -0.6).quantize(), NodeId::new(2, -1));
    /// assert_eq!(Point::new(2.5, 0.5).quantize(), NodeId::new(3, 1));
    /// ```
    pub fn quantize(&self) -> NodeId {
        // `as` saturates for out-of-range floats; catalog points are finite.
        NodeId::new(self.x.round() as i64, self.y.round() as i64)
    }

    /// Returns true if both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Identity of a graph node: a rounded `(x, y)` coordinate.
///
/// Deliberately coarse so that segments whose endpoints fall within the same
/// grid cell connect to one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub x: i64,
    pub y: i64,
}

impl NodeId {
    /// Create a node id.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Returns the node's coordinate as a point.
    pub fn point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }

    /// Euclidean distance from this node to a point.
    pub fn distance_to(&self, point: &Point) -> f64 {
        self.point().distance(point)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn quantize_rounds_half_away_from_zero() {
        assert_eq!(Point::new(0.5, -0.5).quantize(), NodeId::new(1, -1));
        assert_eq!(Point::new(1.49, 1.51).quantize(), NodeId::new(1, 2));
    }

    #[test]
    fn node_round_trips_through_point() {
        let node = NodeId::new(-4, 7);
        assert_eq!(node.point().quantize(), node);
    }

    #[test]
    fn display() {
        assert_eq!(NodeId::new(3, -2).to_string(), "3,-2");
        assert_eq!(Point::new(1.5, 2.0).to_string(), "(1.5, 2)");
    }

    #[test]
    fn non_finite_detected() {
        assert!(!Point::new(f64::NAN, 0.0).is_finite());
        assert!(Point::new(1.0, 2.0).is_finite());
    }
}
