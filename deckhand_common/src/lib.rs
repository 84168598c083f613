//! Deckhand Common Library
//!
//! Shared types, configuration loading and hardware contracts for all
//! deckhand workspace crates.
//!
//! # Module Structure
//!
//! - [`types`] - Axes, mounts, points and critical points
//! - [`config`] - Configuration loading traits and robot configuration
//! - [`pipette`] - Built-in pipette model table
//! - [`hal`] - Motion backend and peripheral module contracts
//! - [`consts`] - Motion and liquid-handling constants
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod hal;
pub mod pipette;
pub mod prelude;
pub mod types;
