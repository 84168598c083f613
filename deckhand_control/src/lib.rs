//! # Deckhand Control
//!
//! Motion coordinator for a liquid-handling robot. Turns high-level intents
//! (move a mount, aspirate, pick up a tip, locate the tip probe) into
//! bounds-checked, failure-aware commands against a [`Backend`].
//!
//! ## Layers
//!
//! 1. **Transform** - affine deck-to-actuator calibration
//! 2. **Pipette** - per-mount tip, volume and plunger bookkeeping
//! 3. **HardwareControl** - position cache, motion lock, mount switching
//! 4. **Liquid handling / calibration / modules** - algorithms on top
//!
//! [`Backend`]: deckhand_common::hal::backend::Backend

pub mod calibration;
pub mod error;
pub mod hardware;
pub mod liquid;
pub mod modules;
pub mod motion;
pub mod pipette;
pub mod transform;

pub use crate::calibration::OffsetUpdate;
pub use crate::error::ControlError;
pub use crate::hardware::HardwareControl;
pub use crate::pipette::{Pipette, PipetteSummary};
pub use crate::transform::GantryCalibration;
