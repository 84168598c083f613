//! Error types for the motion coordinator.

use deckhand_common::config::ConfigError;
use deckhand_common::hal::backend::BackendError;
use deckhand_common::hal::module::ModuleError;
use deckhand_common::types::{Axis, Mount};
use thiserror::Error;

/// Errors raised by coordinator operations.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// Position is unknown until the machine is homed.
    #[error("Cannot determine position: home the machine first")]
    MustHome,

    #[error("No pipette attached to {0} mount")]
    NotAttached(Mount),

    #[error("A tip is already attached to the {0} pipette")]
    TipAlreadyAttached(Mount),

    #[error("No tip attached to the {0} pipette")]
    NoTipAttached(Mount),

    /// Aspiration would exceed the pipette's maximum volume.
    #[error("Cannot aspirate {requested} µL on {mount} mount: {available} µL available")]
    VolumeExceeded {
        mount: Mount,
        requested: f64,
        available: f64,
    },

    #[error("Invalid volume: {0} µL")]
    InvalidVolume(f64),

    #[error("Invalid tip length: {0} mm")]
    InvalidTipLength(f64),

    /// Gantry targets must name X, Y and one vertical axis together, or none.
    #[error("Moves must specify either exactly an x, y, and (z or a) or none of them, got {0:?}")]
    InvalidAxisSet(Vec<Axis>),

    #[error("Gantry calibration is not invertible")]
    SingularCalibration,

    /// Both an attached tip and an explicit tip length were given.
    #[error("Tip already attached to the {0} pipette; pass no tip length")]
    TipLengthConflict(Mount),

    #[error("No module on port {0}")]
    UnknownModule(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Module(#[from] ModuleError),
}
