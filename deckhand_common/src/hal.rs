//! Hardware abstraction contracts.
//!
//! This module contains the traits every motion backend and peripheral
//! module driver implements.

pub mod backend;
pub mod module;
