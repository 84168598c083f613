//! Firmware driver contract consumed by [`Controller`](super::Controller).

use async_trait::async_trait;
use deckhand_common::hal::backend::BackendError;
use deckhand_common::types::{Axis, AxisMap, Mount};
use std::collections::BTreeMap;

/// Low-level motion controller driver.
///
/// Serial framing, g-code generation and EEPROM access live behind this
/// trait. Speed and current settings are stacks so callers can scope
/// temporary overrides.
#[async_trait]
pub trait SmoothieDriver: Send + Sync {
    async fn move_axes(&self, target: &AxisMap, home_flagged_axes: bool)
    -> Result<(), BackendError>;

    async fn home(&self, axes: &[Axis]) -> Result<AxisMap, BackendError>;

    async fn fast_home(&self, axis: Axis, margin: f64) -> Result<AxisMap, BackendError>;

    async fn probe_axis(&self, axis: Axis, distance: f64) -> Result<AxisMap, BackendError>;

    /// Model name stored in the pipette EEPROM on `mount`.
    async fn read_pipette_model(&self, mount: Mount) -> Result<Option<String>, BackendError>;

    /// Serial number stored in the pipette EEPROM on `mount`.
    async fn read_pipette_id(&self, mount: Mount) -> Result<Option<String>, BackendError>;

    /// Position of each axis right after homing.
    fn homed_position(&self) -> AxisMap;

    fn engaged_axes(&self) -> BTreeMap<Axis, bool>;

    async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), BackendError>;

    fn set_speed(&self, speed: f64);

    fn push_speed(&self);

    fn pop_speed(&self);

    fn set_active_current(&self, axis: Axis, amps: f64);

    fn push_active_current(&self);

    fn pop_active_current(&self);

    async fn set_button_light(&self, on: bool) -> Result<(), BackendError>;

    async fn set_rail_lights(&self, on: bool) -> Result<(), BackendError>;

    fn button_light(&self) -> bool;

    fn rail_lights(&self) -> bool;

    fn firmware_version(&self) -> Option<String>;

    fn pause(&self);

    fn resume(&self);

    /// Stop immediately, discarding queued motion.
    async fn kill(&self) -> Result<(), BackendError>;
}
