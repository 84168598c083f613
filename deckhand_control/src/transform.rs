//! Deck-to-actuator coordinate transform.
//!
//! A single 4x4 affine matrix maps deck-absolute points to raw actuator
//! coordinates. The inverse is computed once, at construction, so a singular
//! calibration is rejected up front rather than on the first move.
//!
//! Axis maps crossing the transform must name X, Y and one vertical axis
//! together, or no gantry axis at all. Plunger axes pass through unchanged.

use crate::error::ControlError;
use deckhand_common::types::{Axis, AxisMap, Mount, Point};
use nalgebra::{Matrix4, Vector4};

/// Smallest accepted determinant of the linear part.
const MIN_DETERMINANT: f64 = 1e-9;

/// Affine deck calibration and its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GantryCalibration {
    forward: Matrix4<f64>,
    inverse: Matrix4<f64>,
}

impl GantryCalibration {
    /// Build from a row-major matrix.
    ///
    /// # Errors
    /// `ControlError::SingularCalibration` if the matrix has no inverse or
    /// its linear part is numerically degenerate.
    pub fn new(rows: [[f64; 4]; 4]) -> Result<Self, ControlError> {
        let forward = Matrix4::from_row_slice(rows.as_flattened());
        if forward.fixed_view::<3, 3>(0, 0).determinant().abs() < MIN_DETERMINANT {
            return Err(ControlError::SingularCalibration);
        }
        let inverse = forward
            .try_inverse()
            .ok_or(ControlError::SingularCalibration)?;
        Ok(Self { forward, inverse })
    }

    pub fn identity() -> Self {
        Self {
            forward: Matrix4::identity(),
            inverse: Matrix4::identity(),
        }
    }

    /// Deck point to raw actuator coordinates.
    pub fn to_raw(&self, point: Point) -> Point {
        apply(&self.forward, point)
    }

    /// Raw actuator coordinates to a deck point.
    pub fn to_deck(&self, raw: Point) -> Point {
        apply(&self.inverse, raw)
    }

    /// Transform a deck-space target to raw actuator targets.
    pub fn axes_to_raw(&self, target: &AxisMap) -> Result<AxisMap, ControlError> {
        self.map_axes(target, |p| self.to_raw(p))
    }

    /// Transform raw actuator positions to deck space.
    pub fn axes_to_deck(&self, raw: &AxisMap) -> Result<AxisMap, ControlError> {
        self.map_axes(raw, |p| self.to_deck(p))
    }

    /// Deck positions for a full raw position report.
    ///
    /// Each mount is transformed together with the shared X and Y; the
    /// result carries X and Y from the right mount's solution and both
    /// vertical axes. Plunger axes pass through.
    pub fn deck_from_raw(&self, raw: &AxisMap) -> Result<AxisMap, ControlError> {
        let get = |axis: Axis| {
            raw.get(&axis)
                .copied()
                .ok_or_else(|| ControlError::InvalidAxisSet(raw.keys().copied().collect()))
        };
        let (x, y) = (get(Axis::X)?, get(Axis::Y)?);
        let right = self.to_deck(Point::new(x, y, get(Axis::by_mount(Mount::Right))?));
        let left = self.to_deck(Point::new(x, y, get(Axis::by_mount(Mount::Left))?));

        let mut deck: AxisMap = raw
            .iter()
            .filter(|(axis, _)| axis.is_plunger())
            .map(|(axis, value)| (*axis, *value))
            .collect();
        deck.insert(Axis::X, right.x);
        deck.insert(Axis::Y, right.y);
        deck.insert(Axis::by_mount(Mount::Right), right.z);
        deck.insert(Axis::by_mount(Mount::Left), left.z);
        Ok(deck)
    }

    fn map_axes(
        &self,
        positions: &AxisMap,
        transform: impl Fn(Point) -> Point,
    ) -> Result<AxisMap, ControlError> {
        let gantry: Vec<Axis> = positions.keys().copied().filter(|a| a.is_gantry()).collect();
        let mut out: AxisMap = positions
            .iter()
            .filter(|(axis, _)| axis.is_plunger())
            .map(|(axis, value)| (*axis, *value))
            .collect();
        if gantry.is_empty() {
            return Ok(out);
        }

        let vertical = validate_gantry_axes(&gantry)?;
        let point = Point::new(
            positions[&Axis::X],
            positions[&Axis::Y],
            positions[&vertical],
        );
        let mapped = transform(point);
        out.insert(Axis::X, mapped.x);
        out.insert(Axis::Y, mapped.y);
        out.insert(vertical, mapped.z);
        Ok(out)
    }
}

impl Default for GantryCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// Check `gantry` is exactly X, Y and one of Z/A; return the vertical axis.
fn validate_gantry_axes(gantry: &[Axis]) -> Result<Axis, ControlError> {
    let verticals: Vec<Axis> = gantry.iter().copied().filter(|a| a.is_vertical()).collect();
    let valid = gantry.len() == 3
        && gantry.contains(&Axis::X)
        && gantry.contains(&Axis::Y)
        && verticals.len() == 1;
    if !valid {
        return Err(ControlError::InvalidAxisSet(gantry.to_vec()));
    }
    Ok(verticals[0])
}

fn apply(matrix: &Matrix4<f64>, point: Point) -> Point {
    let v = matrix * Vector4::new(point.x, point.y, point.z, 1.0);
    Point::new(v.x, v.y, v.z)
}
