//! Peripheral module contract.
//!
//! Modules (thermocyclers and the like) are opaque addressable devices. The
//! motion engine only discovers them, builds a driver for each and forwards
//! commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for module operations.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// Command issued before `connect`.
    #[error("Module not connected")]
    NotConnected,

    /// No acknowledgement after every retry.
    #[error("No response to '{command}' after {attempts} attempts")]
    NoResponse { command: String, attempts: u32 },

    /// The device answered with an error.
    #[error("Device reported error: {0}")]
    DeviceError(String),

    /// No driver is registered under this name.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Command rejected before reaching the device.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Where a module was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleAddress {
    /// Registered module name (e.g. "thermocycler").
    pub name: String,
    /// Device path.
    pub port: String,
}

/// Identity reported by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: String,
    pub version: String,
}

/// Driver for one peripheral module.
#[async_trait]
pub trait Module: Send + Sync {
    /// Registered module name.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Device path the module is connected on.
    fn port(&self) -> &str;

    fn is_simulated(&self) -> bool;

    async fn connect(&mut self, port: &str) -> Result<(), ModuleError>;

    /// Send a raw command and return the device response.
    async fn send(&mut self, command: &str) -> Result<String, ModuleError>;

    /// Short status string (e.g. "idle", "holding at target").
    fn status(&self) -> String;

    fn device_info(&self) -> Option<DeviceInfo>;

    /// Snapshot of module-specific readings.
    fn live_data(&self) -> serde_json::Value;

    /// Turn off all active functions.
    async fn deactivate(&mut self) -> Result<(), ModuleError>;

    async fn disconnect(&mut self) -> Result<(), ModuleError>;
}
