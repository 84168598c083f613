//! Simulation backend module.
//!
//! Provides an in-memory motion backend for development and testing
//! without physical hardware.

mod driver;
mod state;

pub use driver::Simulator;
pub use state::SimState;
