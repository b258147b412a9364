//! Bounding box geometry in image pixel space

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned bounding box `(xmin, ymin, xmax, ymax)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox<T = f32> {
    pub xmin: T,
    pub ymin: T,
    pub xmax: T,
    pub ymax: T,
}

impl Bbox<f32> {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from bounds array [xmin, ymin, xmax, ymax]
    pub fn from_bounds(bounds: [f32; 4]) -> Self {
        Self::new(bounds[0], bounds[1], bounds[2], bounds[3])
    }

    /// Finite coordinates with strictly positive width and height
    pub fn is_valid(&self) -> bool {
        self.to_bounds().iter().all(|v| v.is_finite())
            && self.xmin < self.xmax
            && self.ymin < self.ymax
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.xmin + self.xmax) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.ymin + self.ymax) / 2.0
    }

    pub fn center(&self) -> [f32; 2] {
        [self.center_x(), self.center_y()]
    }

    /// Bottom-centre of the box, where a standing player touches the floor
    pub fn foot_point(&self) -> [f32; 2] {
        [self.center_x(), self.ymax]
    }

    /// Convert to bounds array [xmin, ymin, xmax, ymax]
    pub fn to_bounds(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// Grow the box by `margin` pixels on every side
    pub fn expanded(&self, margin: f32) -> Self {
        Self::new(
            self.xmin - margin,
            self.ymin - margin,
            self.xmax + margin,
            self.ymax + margin,
        )
    }

    /// Inclusive point-in-box test
    pub fn contains_point(&self, point: [f32; 2]) -> bool {
        point[0] >= self.xmin
            && point[0] <= self.xmax
            && point[1] >= self.ymin
            && point[1] <= self.ymax
    }

    /// Nearest point of the box (boundary or interior) to `point`
    ///
    /// Never panics; an inverted box snaps onto its max corner coordinates.
    pub fn nearest_point(&self, point: [f32; 2]) -> [f32; 2] {
        [
            point[0].max(self.xmin).min(self.xmax),
            point[1].max(self.ymin).min(self.ymax),
        ]
    }

    /// Euclidean distance from `point` to the box, zero when inside
    pub fn distance_to_point(&self, point: [f32; 2]) -> f32 {
        let nearest = self.nearest_point(point);
        let dx = point[0] - nearest[0];
        let dy = point[1] - nearest[1];
        (dx * dx + dy * dy).sqrt()
    }

    /// Corner-wise linear blend, `t = 0` gives `self`, `t = 1` gives `other`
    pub fn lerp(&self, other: &Bbox<f32>, t: f32) -> Self {
        let blend = |a: f32, b: f32| a + (b - a) * t;
        Self::new(
            blend(self.xmin, other.xmin),
            blend(self.ymin, other.ymin),
            blend(self.xmax, other.xmax),
            blend(self.ymax, other.ymax),
        )
    }
}

impl<T: fmt::Display> fmt::Display for Bbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bbox({}, {}, {}, {})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Euclidean distance between two image points
pub fn point_distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}
