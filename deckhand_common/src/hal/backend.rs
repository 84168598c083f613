//! Motion backend trait and error types.
//!
//! This module defines:
//! - `Backend` trait - Capability set every motion backend provides
//! - `BackendError` enum - Error types for backend operations
//! - `CurrentGuard` - Scoped motor-current save/restore
//! - `AttachedInstrument`, `Lights` - Backend query results

use crate::hal::module::{Module, ModuleAddress, ModuleError};
use crate::types::{Axis, AxisMap, Mount};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error types for backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Hardware communication error.
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// A move, home or probe did not complete. Physical position is unknown.
    #[error("Motion failed: {0}")]
    MotionFailed(String),

    /// Attached instrument does not match what the caller requires.
    #[error("Instrument mismatch on {mount} mount: expected {expected}, found {found:?}")]
    InstrumentMismatch {
        mount: Mount,
        expected: String,
        found: Option<String>,
    },

    /// Another controller instance already owns the hardware.
    #[error("Hardware controller already in use")]
    AlreadyInUse,

    /// Peripheral module failure.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
}

/// Instrument reported on a mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedInstrument {
    pub model: Option<String>,
    pub id: Option<String>,
}

/// Light states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lights {
    pub button: bool,
    pub rails: bool,
}

/// Axis limits in raw actuator coordinates, `(min, max)`.
pub type AxisBounds = BTreeMap<Axis, (f64, f64)>;

/// Trait defining the interface for motion backends.
///
/// The motion coordinator drives a physical controller or the in-memory
/// simulator exclusively through this trait. All positions crossing it are
/// raw actuator coordinates.
///
/// Motion calls (`move_axes`, `home`, `fast_home`, `probe`) are serialized by
/// the caller; implementations need not guard against concurrent motion.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend identifier (e.g. "simulator", "smoothie").
    fn name(&self) -> &'static str;

    /// Move the listed axes to raw `target` positions.
    ///
    /// # Errors
    /// `BackendError::MotionFailed` leaves the physical state undefined.
    async fn move_axes(
        &self,
        target: &AxisMap,
        speed: Option<f64>,
        home_flagged_axes: bool,
    ) -> Result<(), BackendError>;

    /// Home `axes` and return the full raw position afterwards.
    async fn home(&self, axes: &[Axis]) -> Result<AxisMap, BackendError>;

    /// Home a single axis quickly, backing off by `margin` first.
    async fn fast_home(&self, axis: Axis, margin: f64) -> Result<AxisMap, BackendError>;

    /// Move `axis` by `distance` until a switch triggers; returns the position.
    async fn probe(&self, axis: Axis, distance: f64) -> Result<AxisMap, BackendError>;

    /// Report the instrument on each mount.
    ///
    /// `expected` maps mounts to a required model prefix. A mismatch is an
    /// error unless the backend cannot verify it, in which case the expected
    /// model is reported unverified.
    async fn get_attached_instruments(
        &self,
        expected: &BTreeMap<Mount, String>,
    ) -> Result<BTreeMap<Mount, AttachedInstrument>, BackendError>;

    /// Raw limits of the gantry axes.
    fn axis_bounds(&self) -> AxisBounds;

    fn engaged_axes(&self) -> BTreeMap<Axis, bool>;

    async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), BackendError>;

    /// Set the motor current for `axis` in amperes.
    fn set_active_current(&self, axis: Axis, amps: f64);

    /// Push the current motor-current settings onto a stack.
    fn push_active_current(&self);

    /// Restore the most recently pushed motor-current settings.
    fn pop_active_current(&self);

    async fn set_lights(&self, button: Option<bool>, rails: Option<bool>)
    -> Result<(), BackendError>;

    fn get_lights(&self) -> Lights;

    /// Firmware version, `None` when unavailable.
    fn fw_version(&self) -> Option<String>;

    fn pause(&self);

    fn resume(&self);

    /// Stop all motion immediately.
    async fn halt(&self) -> Result<(), BackendError>;

    /// Peripheral modules currently present.
    fn attached_modules(&self) -> Vec<ModuleAddress>;

    /// Construct and connect a module driver for `address`.
    async fn build_module(&self, address: &ModuleAddress) -> Result<Box<dyn Module>, BackendError>;
}

/// Restores motor currents when dropped.
///
/// Obtained from [`save_current`](trait.Backend.html#method.save_current);
/// every current change made while the guard lives is undone on all exit
/// paths, including early returns and cancellation.
#[must_use = "currents are restored when the guard is dropped"]
pub struct CurrentGuard<'a> {
    backend: &'a dyn Backend,
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        self.backend.pop_active_current();
    }
}

impl<'a> dyn Backend + 'a {
    /// Save the motor currents until the returned guard drops.
    pub fn save_current(&self) -> CurrentGuard<'_> {
        self.push_active_current();
        CurrentGuard { backend: self }
    }
}
