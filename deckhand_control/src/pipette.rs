//! Live pipette state.
//!
//! A [`Pipette`] pairs a model's static configuration with what changes
//! during a run: tip presence and length, liquid volume, flow rates, plunger
//! calibration and the calibrated instrument offset.

use deckhand_common::config::{ConfigError, PipetteClass};
use deckhand_common::consts::PLUNGER_POSITION_DECIMALS;
use deckhand_common::pipette::{PipetteModelConfig, PlungerAction, PlungerPositions, load_model};
use deckhand_common::types::{CriticalPoint, Point};
use serde::Serialize;

/// Instrument on one mount.
#[derive(Debug, Clone)]
pub struct Pipette {
    model: String,
    id: Option<String>,
    config: PipetteModelConfig,
    instrument_offset: Point,
    has_tip: bool,
    current_tip_length: f64,
    current_volume: f64,
}

/// Serializable snapshot returned by `attached_instruments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipetteSummary {
    pub model: String,
    pub name: String,
    pub id: Option<String>,
    pub channels: u32,
    pub min_volume: f64,
    pub max_volume: f64,
    pub current_volume: f64,
    pub has_tip: bool,
    pub tip_length: f64,
    pub aspirate_flow_rate: f64,
    pub dispense_flow_rate: f64,
}

impl Pipette {
    /// Pipette of `model` with the given calibrated offset.
    pub fn new(model: &str, instrument_offset: Point, id: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self::from_config(model, load_model(model)?, instrument_offset, id))
    }

    pub fn from_config(
        model: &str,
        config: PipetteModelConfig,
        instrument_offset: Point,
        id: Option<String>,
    ) -> Self {
        Self {
            model: model.to_string(),
            id,
            config,
            instrument_offset,
            has_tip: false,
            current_tip_length: 0.0,
            current_volume: 0.0,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn config(&self) -> &PipetteModelConfig {
        &self.config
    }

    pub fn class(&self) -> PipetteClass {
        PipetteClass::from_channels(self.config.channels)
    }

    pub fn instrument_offset(&self) -> Point {
        self.instrument_offset
    }

    pub fn update_instrument_offset(&mut self, offset: Point) {
        self.instrument_offset = offset;
    }

    // ─── Tips ───────────────────────────────────────────────────────

    pub fn has_tip(&self) -> bool {
        self.has_tip
    }

    /// Length of the attached tip as picked up, without calibration.
    pub fn nominal_tip_length(&self) -> f64 {
        self.current_tip_length
    }

    /// Effective tip length.
    ///
    /// The Z instrument offset adjusts the nozzle-to-tip interface and only
    /// applies while a tip is attached.
    pub fn current_tip_length(&self) -> f64 {
        if self.has_tip {
            self.current_tip_length + self.instrument_offset.z
        } else {
            0.0
        }
    }

    pub fn add_tip(&mut self, tip_length: f64) {
        self.has_tip = true;
        self.current_tip_length = tip_length;
    }

    pub fn remove_tip(&mut self) {
        self.has_tip = false;
        self.current_tip_length = 0.0;
    }

    /// Offset of the requested critical point from the mount.
    ///
    /// `Tip` degrades to `Nozzle` when no tip is attached. `XyCenter` drops
    /// the lateral model offset so a multi-channel head is centred.
    pub fn critical_point(&self, cp_override: Option<CriticalPoint>) -> Point {
        let tip_length = if !self.has_tip || cp_override == Some(CriticalPoint::Nozzle) {
            0.0
        } else {
            self.current_tip_length()
        };
        let [mx, my, mz] = self.config.model_offset;
        let (mx, my) = if cp_override == Some(CriticalPoint::XyCenter) {
            (0.0, 0.0)
        } else {
            (mx, my)
        };
        Point::new(mx, my, mz - tip_length) + self.instrument_offset.with_z(0.0)
    }

    // ─── Volume ─────────────────────────────────────────────────────

    pub fn current_volume(&self) -> f64 {
        self.current_volume
    }

    pub fn available_volume(&self) -> f64 {
        (self.config.max_volume - self.current_volume).max(0.0)
    }

    pub fn ok_to_add_volume(&self, volume: f64) -> bool {
        self.current_volume + volume <= self.config.max_volume
    }

    pub fn set_current_volume(&mut self, volume: f64) {
        self.current_volume = volume.clamp(0.0, self.config.max_volume);
    }

    pub fn add_current_volume(&mut self, volume: f64) {
        self.set_current_volume(self.current_volume + volume);
    }

    pub fn remove_current_volume(&mut self, volume: f64) {
        self.set_current_volume(self.current_volume - volume);
    }

    // ─── Plunger ────────────────────────────────────────────────────

    pub fn plunger_positions(&self) -> PlungerPositions {
        self.config.plunger_positions
    }

    pub fn set_plunger_positions(&mut self, positions: PlungerPositions) {
        self.config.plunger_positions = positions;
    }

    pub fn ul_per_mm(&self, ul: f64, action: PlungerAction) -> f64 {
        self.config.ul_per_mm.at(ul, action)
    }

    /// Plunger position holding `ul` of liquid.
    pub fn plunger_position(&self, ul: f64, action: PlungerAction) -> f64 {
        let mm = ul / self.ul_per_mm(ul, action);
        let scale = 10f64.powi(PLUNGER_POSITION_DECIMALS);
        ((mm + self.config.plunger_positions.bottom) * scale).round() / scale
    }

    pub fn set_flow_rates(&mut self, aspirate: Option<f64>, dispense: Option<f64>) {
        if let Some(rate) = aspirate {
            self.config.aspirate_flow_rate = rate;
        }
        if let Some(rate) = dispense {
            self.config.dispense_flow_rate = rate;
        }
    }

    pub fn summary(&self) -> PipetteSummary {
        PipetteSummary {
            model: self.model.clone(),
            name: self.config.name.clone(),
            id: self.id.clone(),
            channels: self.config.channels,
            min_volume: self.config.min_volume,
            max_volume: self.config.max_volume,
            current_volume: self.current_volume,
            has_tip: self.has_tip,
            tip_length: self.current_tip_length,
            aspirate_flow_rate: self.config.aspirate_flow_rate,
            dispense_flow_rate: self.config.dispense_flow_rate,
        }
    }
}
