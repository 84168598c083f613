//! Pipette model configuration.
//!
//! The model table ships embedded in the crate (`pipette_models.toml`) and is
//! parsed once on first use. Lookups are by exact model name
//! ([`load_model`]) or by prefix ([`find_config`]).

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

const MODELS_TOML: &str = include_str!("pipette_models.toml");

static MODELS: LazyLock<Result<BTreeMap<String, PipetteModelConfig>, ConfigError>> =
    LazyLock::new(|| {
        toml::from_str(MODELS_TOML).map_err(|e| ConfigError::ParseError(e.to_string()))
    });

/// Plunger travel landmarks in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlungerPositions {
    pub top: f64,
    pub bottom: f64,
    pub blow_out: f64,
    pub drop_tip: f64,
}

/// Direction of plunger travel used to pick a calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlungerAction {
    Aspirate,
    Dispense,
}

/// Piecewise-linear microlitre-per-millimetre curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UlPerMm {
    pub aspirate: Vec<[f64; 3]>,
    pub dispense: Vec<[f64; 3]>,
}

impl UlPerMm {
    /// Evaluate the curve for `action` at `ul`.
    ///
    /// Uses the first segment whose upper bound exceeds `ul`, else the last.
    pub fn at(&self, ul: f64, action: PlungerAction) -> f64 {
        let segments = match action {
            PlungerAction::Aspirate => &self.aspirate,
            PlungerAction::Dispense => &self.dispense,
        };
        let segment = segments
            .iter()
            .find(|s| s[0] > ul)
            .or_else(|| segments.last());
        match segment {
            Some([_, slope, intercept]) => slope * ul + intercept,
            None => 1.0,
        }
    }
}

/// Per-model behaviour adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quirk {
    /// Shake the tips off twice right after pickup.
    NeedsPickupShake,
    #[serde(other)]
    Unknown,
}

/// Static configuration of one pipette model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipetteModelConfig {
    /// Model family name (e.g. `p300_single`).
    pub name: String,
    pub display_name: String,
    pub channels: u32,
    pub min_volume: f64,
    pub max_volume: f64,
    /// Nozzle position relative to the mount.
    pub model_offset: [f64; 3],
    /// Nominal length of the model's tips.
    pub tip_length: f64,
    pub plunger_positions: PlungerPositions,
    /// Plunger motor current (A).
    pub plunger_current: f64,
    pub drop_tip_current: f64,
    pub drop_tip_speed: f64,
    /// Z motor current while pressing onto a tip (A).
    pub pick_up_current: f64,
    /// Press depth for the first tip pickup attempt.
    pub pick_up_distance: f64,
    /// Flow rates in µL/s.
    pub aspirate_flow_rate: f64,
    pub dispense_flow_rate: f64,
    #[serde(default)]
    pub quirks: Vec<Quirk>,
    pub ul_per_mm: UlPerMm,
}

impl PipetteModelConfig {
    pub fn has_quirk(&self, quirk: Quirk) -> bool {
        self.quirks.contains(&quirk)
    }
}

fn models() -> Result<&'static BTreeMap<String, PipetteModelConfig>, ConfigError> {
    MODELS.as_ref().map_err(Clone::clone)
}

/// Configuration of model `model`.
pub fn load_model(model: &str) -> Result<PipetteModelConfig, ConfigError> {
    models()?
        .get(model)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownPipetteModel(model.to_string()))
}

/// All known model names, sorted.
pub fn model_names() -> Vec<&'static str> {
    match models() {
        Ok(models) => models.keys().map(String::as_str).collect(),
        Err(_) => Vec::new(),
    }
}

/// Lexically first model name starting with `prefix`.
pub fn find_config(prefix: &str) -> Option<&'static str> {
    model_names().into_iter().find(|name| name.starts_with(prefix))
}
