//! Physical controller backend.
//!
//! [`Controller`] adapts a [`SmoothieDriver`] (the firmware-level serial
//! driver, provided elsewhere) to the `Backend` trait. It adds:
//! - per-move speed overrides, restored on every exit path
//! - strict instrument verification against the pipette EEPROMs
//! - a process-wide guard against two controllers driving one machine
//! - module discovery from the device directory

mod controller;
mod driver;

pub use controller::Controller;
pub use driver::SmoothieDriver;
