//! Prelude module for common re-exports.
//!
//! ```rust
//! use deckhand_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, PipetteClass, RobotConfig};

// ─── Geometry ───────────────────────────────────────────────────────
pub use crate::types::{Axis, AxisMap, CriticalPoint, Mount, Point};

// ─── Hardware Contracts ─────────────────────────────────────────────
pub use crate::hal::backend::{AttachedInstrument, Backend, BackendError, Lights};
pub use crate::hal::module::{DeviceInfo, Module, ModuleAddress, ModuleError};

// ─── Pipettes ───────────────────────────────────────────────────────
pub use crate::pipette::{PipetteModelConfig, PlungerAction, Quirk};
