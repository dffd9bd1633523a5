//! Fixed-shape hand landmark sets and wrist-relative normalization.
//!
//! Points are in frame-relative coordinates: x grows to the right, y grows
//! downward, both in [0,1]. A set always holds exactly [`LANDMARK_COUNT`]
//! points in the usual 21-keypoint hand topology (wrist first, then four
//! joints per finger from thumb to pinky).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Below this spread the hand is treated as a single point and left unscaled.
const SCALE_EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, o: Point3) -> Point3 {
        Point3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    pub fn scale(self, k: f32) -> Point3 {
        Point3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn norm(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Distance in the image plane, ignoring depth.
    pub fn planar_distance(self, o: Point3) -> f32 {
        let dx = self.x - o.x;
        let dy = self.y - o.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f32; 3]> for Point3 {
    fn from(v: [f32; 3]) -> Self {
        Point3::new(v[0], v[1], v[2])
    }
}

impl From<Point3> for [f32; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected {LANDMARK_COUNT} landmarks, got {0}")]
pub struct LandmarkCountError(pub usize);

/// One hand's keypoints for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point3>", into = "Vec<Point3>")]
pub struct LandmarkSet {
    points: [Point3; LANDMARK_COUNT],
}

impl TryFrom<Vec<Point3>> for LandmarkSet {
    type Error = LandmarkCountError;

    fn try_from(v: Vec<Point3>) -> Result<Self, Self::Error> {
        let points: [Point3; LANDMARK_COUNT] =
            v.try_into().map_err(|v: Vec<Point3>| LandmarkCountError(v.len()))?;
        Ok(Self { points })
    }
}

impl From<LandmarkSet> for Vec<Point3> {
    fn from(s: LandmarkSet) -> Self {
        s.points.to_vec()
    }
}

impl LandmarkSet {
    pub const fn new(points: [Point3; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point3; LANDMARK_COUNT] {
        &self.points
    }

    pub fn point(&self, i: usize) -> Point3 {
        self.points[i]
    }

    pub fn set_point(&mut self, i: usize, p: Point3) {
        self.points[i] = p;
    }

    pub fn map(&self, f: impl Fn(Point3) -> Point3) -> LandmarkSet {
        LandmarkSet {
            points: self.points.map(f),
        }
    }

    /// Planar distance between two landmarks of this set.
    pub fn distance(&self, a: usize, b: usize) -> f32 {
        self.points[a].planar_distance(self.points[b])
    }

    /// Axis-aligned (min_x, min_y, max_x, max_y) in frame-relative units.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// Pixel position of landmark `i` in a `width` x `height` frame.
    pub fn to_pixels(&self, i: usize, width: u32, height: u32) -> [i32; 2] {
        let p = self.points[i];
        [
            (p.x * width as f32) as i32,
            (p.y * height as f32) as i32,
        ]
    }
}

/// Wrist-centred, unit-extent view of a [`LandmarkSet`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedLandmarks {
    points: [Point3; LANDMARK_COUNT],
    /// Extent the centred points were divided by; `None` for a degenerate hand.
    pub scale: Option<f32>,
}

impl NormalizedLandmarks {
    pub fn point(&self, i: usize) -> Point3 {
        self.points[i]
    }

    pub fn points(&self) -> &[Point3; LANDMARK_COUNT] {
        &self.points
    }

    pub fn distance(&self, a: usize, b: usize) -> f32 {
        self.points[a].planar_distance(self.points[b])
    }

    /// Row-major x,y,z vector (63 values).
    pub fn flatten(&self) -> Vec<f32> {
        self.points().iter().flat_map(|p| [p.x, p.y, p.z]).collect()
    }
}

/// Translates the wrist to the origin and divides by the largest
/// wrist distance. Never fails; a zero-spread hand comes back centred only.
pub fn normalize(set: &LandmarkSet) -> NormalizedLandmarks {
    let wrist = set.points[WRIST];
    let centred = set.points.map(|p| p.sub(wrist));
    let max = centred.iter().map(|p| p.norm()).fold(0.0f32, f32::max);

    if max > SCALE_EPS {
        NormalizedLandmarks {
            points: centred.map(|p| p.scale(1.0 / max)),
            scale: Some(max),
        }
    } else {
        NormalizedLandmarks {
            points: centred,
            scale: None,
        }
    }
}
