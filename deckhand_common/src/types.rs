//! Core geometric and machine types.
//!
//! - [`Axis`] - Actuator axes of the gantry and the two plungers
//! - [`Mount`] - Left or right instrument mount
//! - [`Point`] - Deck-absolute 3D coordinate
//! - [`CriticalPoint`] - Reference point being positioned on a mount
//! - [`AxisMap`] - Per-axis position values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Per-axis position map, ordered XYZABC.
pub type AxisMap = BTreeMap<Axis, f64>;

/// Instrument mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    pub const ALL: [Mount; 2] = [Mount::Left, Mount::Right];

    /// The other mount.
    pub fn other(self) -> Mount {
        match self {
            Mount::Left => Mount::Right,
            Mount::Right => Mount::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mount::Left => "left",
            Mount::Right => "right",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actuator axis.
///
/// X and Y move the gantry, Z and A carry the left and right mounts
/// vertically, B and C drive the left and right plungers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    A,
    B,
    C,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// Gantry axes (everything that is not a plunger).
    pub const GANTRY: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::A];

    /// Vertical axis carrying `mount`.
    pub fn by_mount(mount: Mount) -> Axis {
        match mount {
            Mount::Left => Axis::Z,
            Mount::Right => Axis::A,
        }
    }

    /// Plunger axis of the instrument on `mount`.
    pub fn of_plunger(mount: Mount) -> Axis {
        match mount {
            Mount::Left => Axis::B,
            Mount::Right => Axis::C,
        }
    }

    pub fn is_gantry(self) -> bool {
        !self.is_plunger()
    }

    pub fn is_plunger(self) -> bool {
        matches!(self, Axis::B | Axis::C)
    }

    /// Mount-vertical axes Z and A.
    pub fn is_vertical(self) -> bool {
        matches!(self, Axis::Z | Axis::A)
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::A => "A",
            Axis::B => "B",
            Axis::C => "C",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deck-absolute coordinate in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const ZERO: Point = Point::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Point with only the component along `axis` set.
    ///
    /// Z and A both map onto the vertical component.
    pub fn along(axis: Axis, value: f64) -> Self {
        let mut p = Point::ZERO;
        match axis {
            Axis::X => p.x = value,
            Axis::Y => p.y = value,
            _ => p.z = value,
        }
        p
    }

    /// Component along `axis` (Z and A read the vertical component).
    pub fn component(self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            _ => self.z,
        }
    }

    pub fn with_x(self, x: f64) -> Self {
        Self { x, ..self }
    }

    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }

    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Physical reference point positioned by a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalPoint {
    /// Bare mount, ignores any instrument.
    Mount,
    /// Nozzle end of the instrument.
    Nozzle,
    /// End of the attached tip (nozzle when no tip is attached).
    Tip,
    /// Lateral centre of a multi-channel instrument.
    XyCenter,
}
