//! Motion backend implementations.
//!
//! - [`simulation`] - In-memory simulator for development and testing
//! - [`smoothie`] - Physical controller over a firmware driver
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `Backend` trait from `deckhand_common::hal::backend`
//! 3. Add export and documentation

pub mod simulation;
pub mod smoothie;

pub use simulation::Simulator;
pub use smoothie::{Controller, SmoothieDriver};
