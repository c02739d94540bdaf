//! # Spatial Primitives
//!
//! Points, distances and the bounding rectangle used by every planning stage.
//! Coordinates are plain attributes here; identity lives in [`super::NodeId`].

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Planar distances below this are treated as coincident points
pub const COINCIDENT_EPSILON: f64 = 1e-9;

/// Hashable, totally ordered form of a coordinate triple (ingestion lookup only)
pub type PointKey = (OrderedFloat<f64>, OrderedFloat<f64>, OrderedFloat<f64>);

/// A point in 3-D space (metres)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Bearing on the XY plane from `self` towards `other`, in radians.
    ///
    /// Returns `None` when the two points coincide on the plane, so callers
    /// must pick their own ordering for that case.
    pub fn bearing_to(&self, other: &Point3) -> Option<f64> {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx.abs() < COINCIDENT_EPSILON && dy.abs() < COINCIDENT_EPSILON {
            return None;
        }
        Some(dy.atan2(dx))
    }

    /// Coordinate along one axis
    pub fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn key(&self) -> PointKey {
        (
            OrderedFloat(self.x),
            OrderedFloat(self.y),
            OrderedFloat(self.z),
        )
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Spatial axis used to group hubs into rows
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Axis {
    X,
    #[default]
    Y,
    Z,
}

/// Side of the bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

impl Side {
    /// All sides in canonical order
    pub const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Bottom, Side::Top];
}

/// Axis-aligned bounding rectangle of the network on the XY plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounding rectangle of a point set, `None` when the set is empty
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(iter.fold(init, |b, p| Self {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }

    pub fn center_x(&self) -> f64 {
        (self.min_x + self.max_x) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }

    /// Inclusive containment test on the XY plane
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Centre of one side, pushed `offset` outward
    pub fn side_center(&self, side: Side, offset: f64) -> Point3 {
        self.side_point(side, 0.5, offset)
    }

    /// Point at fraction `t` (0..=1) along one side, pushed `offset` outward.
    /// Left/right sides run bottom to top, bottom/top sides run left to right.
    pub fn side_point(&self, side: Side, t: f64, offset: f64) -> Point3 {
        let along_x = self.min_x + t * (self.max_x - self.min_x);
        let along_y = self.min_y + t * (self.max_y - self.min_y);
        match side {
            Side::Left => Point3::new(self.min_x - offset, along_y, 0.0),
            Side::Right => Point3::new(self.max_x + offset, along_y, 0.0),
            Side::Bottom => Point3::new(along_x, self.min_y - offset, 0.0),
            Side::Top => Point3::new(along_x, self.max_y + offset, 0.0),
        }
    }

    /// Keep a candidate position within `margin` of the rectangle and outside it.
    ///
    /// The position is first clamped to the rectangle grown by `margin`; if it
    /// then lies on or inside the rectangle it is pushed `offset` beyond the
    /// nearest side (ties resolve left, right, bottom, top).
    pub fn clamp_outside(&self, x: f64, y: f64, offset: f64, margin: f64) -> (f64, f64) {
        let x = x.clamp(self.min_x - margin, self.max_x + margin);
        let y = y.clamp(self.min_y - margin, self.max_y + margin);
        if !self.contains_xy(x, y) {
            return (x, y);
        }

        let gaps = [
            (x - self.min_x, Side::Left),
            (self.max_x - x, Side::Right),
            (y - self.min_y, Side::Bottom),
            (self.max_y - y, Side::Top),
        ];
        let nearest = gaps
            .iter()
            .fold(gaps[0], |best, &g| if g.0 < best.0 { g } else { best })
            .1;

        match nearest {
            Side::Left => (self.min_x - offset, y),
            Side::Right => (self.max_x + offset, y),
            Side::Bottom => (x, self.min_y - offset),
            Side::Top => (x, self.max_y + offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Bounds {
        Bounds {
            min_x: 0.0,
            max_x: 10.0,
            min_y: 0.0,
            max_y: 4.0,
        }
    }

    #[test]
    fn test_distance_is_euclidean() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(3.0, 4.0, 12.0);
        assert!((a.distance(&b) - 13.0).abs() < 1e-12);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_bearing_coincident_is_none() {
        let a = Point3::new(1.0, 1.0, 0.0);
        let above = Point3::new(1.0, 1.0, 5.0);
        assert!(a.bearing_to(&above).is_none());

        let east = Point3::new(2.0, 1.0, 0.0);
        assert_eq!(a.bearing_to(&east), Some(0.0));
    }

    #[test]
    fn test_bounds_from_points() {
        let pts = [
            Point3::new(1.0, -2.0, 0.0),
            Point3::new(-3.0, 5.0, 1.0),
            Point3::new(4.0, 0.0, 2.0),
        ];
        let b = Bounds::from_points(&pts).unwrap();
        assert_eq!(b.min_x, -3.0);
        assert_eq!(b.max_x, 4.0);
        assert_eq!(b.min_y, -2.0);
        assert_eq!(b.max_y, 5.0);
        assert!(Bounds::from_points(std::iter::empty::<&Point3>()).is_none());
    }

    #[test]
    fn test_side_centers_lie_outside() {
        let b = unit_box();
        for side in Side::ALL {
            let p = b.side_center(side, 2.0);
            assert!(!b.contains_xy(p.x, p.y), "{side} centre inside bounds");
        }
        assert_eq!(b.side_center(Side::Left, 2.0), Point3::new(-2.0, 2.0, 0.0));
        assert_eq!(b.side_center(Side::Top, 2.0), Point3::new(5.0, 6.0, 0.0));
    }

    #[test]
    fn test_clamp_outside_pushes_to_nearest_side() {
        let b = unit_box();
        // Inside, closest to bottom edge
        let (x, y) = b.clamp_outside(5.0, 0.5, 2.0, 10.0);
        assert_eq!((x, y), (5.0, -2.0));
        // Inside, closest to right edge
        let (x, y) = b.clamp_outside(9.5, 2.0, 2.0, 10.0);
        assert_eq!((x, y), (12.0, 2.0));
        // Already outside stays put
        assert_eq!(b.clamp_outside(-1.0, 2.0, 2.0, 10.0), (-1.0, 2.0));
        // Far away gets clamped to the margin
        assert_eq!(b.clamp_outside(-100.0, 2.0, 2.0, 10.0), (-10.0, 2.0));
    }
}
