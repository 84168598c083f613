//! Integration tests for the deckhand motion coordinator.
//!
//! These tests drive `HardwareControl` end to end against a recording
//! wrapper around the simulator, covering homing, moves, liquid handling,
//! tip-probe calibration and concurrent access.

mod integration;
