//! Configuration loading traits and robot configuration types.
//!
//! Every deckhand binary loads its settings from TOML through [`ConfigLoader`].
//! [`RobotConfig`] holds the per-robot calibration data the motion engine
//! needs: deck calibration, mount offset, instrument offsets and the tip-probe
//! geometry.
//!
//! # Usage
//!
//! ```rust,no_run
//! use deckhand_common::config::{ConfigError, ConfigLoader, RobotConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RobotConfig::load(Path::new("robot.toml"))?;
//!     config.validate()?;
//!     println!("Mount offset: {:?}", config.mount_offset);
//!     Ok(())
//! }
//! ```

use crate::types::{Axis, Mount, Point};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Writing the configuration back to disk failed.
    #[error("Failed to persist configuration: {0}")]
    PersistenceError(String),

    /// No built-in pipette model matches the requested name.
    #[error("Unknown pipette model: {0}")]
    UnknownPipetteModel(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Robot Configuration ────────────────────────────────────────────

/// 4x4 identity, the default deck calibration.
pub const IDENTITY_CALIBRATION: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Offset of the left mount relative to the right one.
pub const DEFAULT_MOUNT_OFFSET: [f64; 3] = [-34.0, 0.0, 0.0];

/// Per-robot calibration and settings.
///
/// # TOML Example
///
/// ```toml
/// log_level = "debug"
/// gantry_calibration = [
///     [1.0, 0.0, 0.0, 0.0],
///     [0.0, 1.0, 0.0, 0.0],
///     [0.0, 0.0, 1.0, 0.0],
///     [0.0, 0.0, 0.0, 1.0],
/// ]
/// mount_offset = [-34.0, 0.0, 0.0]
///
/// [instrument_offset.left]
/// single = [0.0, 0.0, 0.0]
/// multi = [0.0, 0.0, 0.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Logging verbosity level.
    pub log_level: LogLevel,
    /// Affine deck-to-actuator transform, row-major.
    pub gantry_calibration: [[f64; 4]; 4],
    /// Offset applied to the left mount in deck space.
    pub mount_offset: [f64; 3],
    /// Calibrated instrument offsets per mount and pipette class.
    pub instrument_offset: InstrumentOffsets,
    /// Tip-probe geometry.
    pub tip_probe: TipProbeConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            gantry_calibration: IDENTITY_CALIBRATION,
            mount_offset: DEFAULT_MOUNT_OFFSET,
            instrument_offset: InstrumentOffsets::default(),
            tip_probe: TipProbeConfig::default(),
        }
    }
}

impl RobotConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the calibration's last row is not `[0, 0, 0, 1]`
    /// - any tip-probe dimension is not positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.gantry_calibration;
        if m[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(ConfigError::ValidationError(
                "gantry_calibration must be affine (last row [0, 0, 0, 1])".to_string(),
            ));
        }

        if self.tip_probe.dimensions.iter().any(|d| *d <= 0.0) {
            return Err(ConfigError::ValidationError(
                "tip_probe.dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Mount offset as a point.
    pub fn mount_offset(&self) -> Point {
        Point::from_array(self.mount_offset)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Ok(config) => {
                config.validate()?;
                info!("Loaded robot config from {:?}", path);
                Ok(config)
            }
            Err(ConfigError::FileNotFound) => {
                info!("No robot config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the configuration to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        debug!("Saving robot config to {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::PersistenceError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            ConfigError::PersistenceError(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content).map_err(|e| {
            ConfigError::PersistenceError(format!("Failed to write config file: {}", e))
        })?;

        info!("Saved robot config to {:?}", path);
        Ok(())
    }
}

// ─── Instrument Offsets ─────────────────────────────────────────────

/// Pipette class used to key instrument offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipetteClass {
    Single,
    Multi,
}

impl PipetteClass {
    pub fn from_channels(channels: u32) -> Self {
        if channels > 1 {
            PipetteClass::Multi
        } else {
            PipetteClass::Single
        }
    }
}

/// Offsets for one mount.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOffsets {
    pub single: [f64; 3],
    pub multi: [f64; 3],
}

/// Offsets for both mounts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentOffsets {
    pub left: MountOffsets,
    pub right: MountOffsets,
}

impl InstrumentOffsets {
    pub fn get(&self, mount: Mount, class: PipetteClass) -> Point {
        let offsets = match mount {
            Mount::Left => &self.left,
            Mount::Right => &self.right,
        };
        match class {
            PipetteClass::Single => Point::from_array(offsets.single),
            PipetteClass::Multi => Point::from_array(offsets.multi),
        }
    }

    pub fn set(&mut self, mount: Mount, class: PipetteClass, offset: Point) {
        let offsets = match mount {
            Mount::Left => &mut self.left,
            Mount::Right => &mut self.right,
        };
        match class {
            PipetteClass::Single => offsets.single = offset.to_array(),
            PipetteClass::Multi => offsets.multi = offset.to_array(),
        }
    }
}

// ─── Tip Probe ──────────────────────────────────────────────────────

/// Vertical clearances used while probing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZClearance {
    /// Clearance above the probe top for lateral approaches.
    pub normal: f64,
    /// Minimum height above the deck for lateral approaches.
    pub deck: f64,
    /// Height above the probe centre for travel between hotspots.
    pub crossover: f64,
    /// Height above the probe centre where the Z probe starts.
    pub start: f64,
}

/// Tip-probe geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipProbeConfig {
    /// Nominal centre of the probe in deck coordinates.
    pub center: [f64; 3],
    /// Width, depth and height of the probe.
    pub dimensions: [f64; 3],
    /// Lateral gap kept between nozzle and probe before probing.
    pub switch_clearance: f64,
    pub z_clearance: ZClearance,
    /// Offset of the switch contact from the probe edge.
    pub switch_offset: [f64; 3],
    /// Retreat distance after each probe contact.
    pub bounce_distance: f64,
    /// Tip length used when none is attached and none is supplied.
    pub default_tip_length: Option<f64>,
}

impl Default for TipProbeConfig {
    fn default() -> Self {
        Self {
            center: [293.03, 301.27, 74.3],
            dimensions: [35.0, 46.0, 82.0],
            switch_clearance: 7.5,
            z_clearance: ZClearance {
                normal: 5.0,
                deck: 5.0,
                crossover: 35.0,
                start: 20.0,
            },
            switch_offset: [3.0, 2.0, 5.0],
            bounce_distance: 15.0,
            default_tip_length: None,
        }
    }
}

/// A single probe approach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    /// Axis being probed (Z stands for the active mount's vertical axis).
    pub axis: Axis,
    /// X start relative to the running centre estimate.
    pub x_start_offset: f64,
    /// Y start relative to the running centre estimate.
    pub y_start_offset: f64,
    /// Absolute Z where probing starts.
    pub z_start_abs: f64,
    /// Signed travel of the probe move.
    pub probe_distance: f64,
}

impl TipProbeConfig {
    pub fn center(&self) -> Point {
        Point::from_array(self.center)
    }

    /// Height used when travelling between hotspots.
    pub fn safe_z(&self) -> f64 {
        self.z_clearance.crossover + self.center[2]
    }

    /// Build the five probe approaches for a tip of `tip_length`.
    ///
    /// Lateral hotspots start outside each face and probe across the full
    /// dimension toward the centre; the Z hotspot probes down from above.
    pub fn hotspots(&self, tip_length: f64) -> Vec<Hotspot> {
        let [size_x, size_y, size_z] = self.dimensions;
        let rel_x_start = size_x / 2.0 + self.switch_clearance;
        let rel_y_start = size_y / 2.0 + self.switch_clearance;
        let nozzle_safe_z = round3((size_z - tip_length) + self.z_clearance.normal);
        let z_start = self.z_clearance.deck.max(nozzle_safe_z);
        let offset = self.switch_offset;

        vec![
            Hotspot {
                axis: Axis::X,
                x_start_offset: -rel_x_start,
                y_start_offset: offset[0],
                z_start_abs: z_start,
                probe_distance: size_x,
            },
            Hotspot {
                axis: Axis::X,
                x_start_offset: rel_x_start,
                y_start_offset: offset[0],
                z_start_abs: z_start,
                probe_distance: -size_x,
            },
            Hotspot {
                axis: Axis::Y,
                x_start_offset: offset[1],
                y_start_offset: -rel_y_start,
                z_start_abs: z_start,
                probe_distance: size_y,
            },
            Hotspot {
                axis: Axis::Y,
                x_start_offset: offset[1],
                y_start_offset: rel_y_start,
                z_start_abs: z_start,
                probe_distance: -size_y,
            },
            Hotspot {
                axis: Axis::Z,
                x_start_offset: 0.0,
                y_start_offset: offset[2],
                z_start_abs: self.center[2] + self.z_clearance.start,
                probe_distance: -size_z,
            },
        ]
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
