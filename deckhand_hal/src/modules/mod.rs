//! Peripheral module drivers.
//!
//! - [`registry`] - Module factory registration
//! - [`discovery`] - Device directory scanning
//! - [`thermocycler`] - Thermocycler serial and simulating drivers
//! - [`transport`] - Blocking serial transport

pub mod discovery;
pub mod registry;
pub mod thermocycler;
pub mod transport;

pub use registry::{ModuleFactory, ModuleRegistry};
