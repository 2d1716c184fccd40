use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Grid position as (row, col). Row grows downward, col grows rightward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub r: i32,
    pub c: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordParseError {
    #[error("invalid coordinate '{0}' (expected \"<row>,<col>\")")]
    InvalidFormat(String),
}

impl Coord {
    pub const fn new(r: i32, c: i32) -> Self {
        Self { r, c }
    }

    pub fn in_bounds(self, dim: usize) -> bool {
        let dim = i64::try_from(dim).unwrap_or(i64::MAX);
        let r = i64::from(self.r);
        let c = i64::from(self.c);
        r >= 0 && c >= 0 && r < dim && c < dim
    }

    /// North, east, south, west. Not bounds-checked.
    pub fn neighbors(self) -> [Coord; 4] {
        [
            Coord::new(self.r - 1, self.c),
            Coord::new(self.r, self.c + 1),
            Coord::new(self.r + 1, self.c),
            Coord::new(self.r, self.c - 1),
        ]
    }

    pub fn manhattan(self, other: Coord) -> u32 {
        self.r.abs_diff(other.r) + self.c.abs_diff(other.c)
    }

    /// Ring distance: range checks use a square, not a diamond.
    pub fn chebyshev(self, other: Coord) -> u32 {
        self.r.abs_diff(other.r).max(self.c.abs_diff(other.c))
    }

    /// Angle in radians from `self` toward `other` in screen orientation.
    pub fn angle_to(self, other: Coord) -> f32 {
        ((other.r - self.r) as f32).atan2((other.c - self.c) as f32)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.r, self.c)
    }
}

impl FromStr for Coord {
    type Err = CoordParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || CoordParseError::InvalidFormat(raw.to_string());
        let (row, col) = raw.split_once(',').ok_or_else(invalid)?;
        if !is_signed_integer(row) || !is_signed_integer(col) {
            return Err(invalid());
        }
        let r = row.parse::<i32>().map_err(|_| invalid())?;
        let c = col.parse::<i32>().map_err(|_| invalid())?;
        Ok(Coord { r, c })
    }
}

fn is_signed_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordRepr {
    Text(String),
    Pair { r: i32, c: i32 },
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match CoordRepr::deserialize(deserializer)? {
            CoordRepr::Text(raw) => raw.parse().map_err(de::Error::custom),
            CoordRepr::Pair { r, c } => Ok(Coord { r, c }),
        }
    }
}

/// Screen-space point in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, to: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(self, other: Vec2) -> Vec2 {
        self.lerp(other, 0.5)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}
