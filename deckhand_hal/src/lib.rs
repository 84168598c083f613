//! # Deckhand HAL Library
//!
//! Motion backends and peripheral module drivers.
//!
//! Backends implement the `Backend` trait defined in
//! `deckhand_common::hal::backend`; module drivers implement `Module` from
//! `deckhand_common::hal::module`.
//!
//! # Module Structure
//!
//! - [`drivers`] - Simulator and physical controller backends
//! - [`modules`] - Thermocycler drivers, module registry and discovery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         deckhand_hal                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │  Simulator   │   │  Controller  │──►│  SmoothieDriver  │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────────┘  │
//! │         │  Backend trait   │                                 │
//! │         └────────┬─────────┘                                 │
//! │                  ▼                                           │
//! │         ┌────────────────┐     ┌─────────────────────────┐   │
//! │         │ ModuleRegistry │────►│ Thermocycler (+ serial) │   │
//! │         └────────────────┘     └─────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod drivers;
pub mod modules;

// Re-export key types for convenience
pub use crate::drivers::{Controller, Simulator, SmoothieDriver};
pub use crate::modules::ModuleRegistry;
