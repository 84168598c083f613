//! Simulation backend implementation.
//!
//! `Simulator` implements the `Backend` trait in memory. Moves and homes
//! update positions optimistically, `probe` is a pure coordinate offset, and
//! instruments and modules are whatever the simulator was built with.

use super::state::{SimState, home_position};
use crate::modules::ModuleRegistry;
use async_trait::async_trait;
use deckhand_common::hal::backend::{
    AttachedInstrument, AxisBounds, Backend, BackendError, Lights,
};
use deckhand_common::hal::module::{Module, ModuleAddress};
use deckhand_common::pipette::find_config;
use deckhand_common::types::{Axis, AxisMap, Mount};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Slack above the home position allowed by the simulated bounds (mm).
const BOUNDS_MARGIN: f64 = 0.5;

/// In-memory motion backend.
pub struct Simulator {
    /// Machine state
    state: Mutex<SimState>,
    /// Instruments reported per mount
    attached_instruments: BTreeMap<Mount, AttachedInstrument>,
    /// Modules reported by discovery
    attached_modules: Vec<ModuleAddress>,
    /// Fail instead of substituting when instruments mismatch
    strict_attached_instruments: bool,
    /// Module driver factories
    registry: ModuleRegistry,
}

impl Simulator {
    /// Simulator with empty mounts and no modules.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::new()),
            attached_instruments: BTreeMap::new(),
            attached_modules: Vec::new(),
            strict_attached_instruments: true,
            registry: ModuleRegistry::with_builtin(),
        }
    }

    /// Report `model` (with serial `id`) on `mount`.
    pub fn with_instrument(mut self, mount: Mount, model: &str, id: Option<&str>) -> Self {
        self.attached_instruments.insert(
            mount,
            AttachedInstrument {
                model: Some(model.to_string()),
                id: id.map(str::to_string),
            },
        );
        self
    }

    /// Report a module named `name` on `port`.
    pub fn with_module(mut self, name: &str, port: &str) -> Self {
        self.attached_modules.push(ModuleAddress {
            name: name.to_string(),
            port: port.to_string(),
        });
        self
    }

    /// Substitute the expected instrument instead of failing on mismatch.
    pub fn lenient(mut self) -> Self {
        self.strict_attached_instruments = false;
        self
    }

    /// Snapshot of the raw axis positions.
    pub fn position(&self) -> AxisMap {
        self.state().position.clone()
    }

    /// Snapshot of the active motor currents.
    pub fn active_currents(&self) -> BTreeMap<Axis, f64> {
        self.state().currents.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expected_model(expected: &str) -> Option<String> {
        find_config(expected).map(str::to_string)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    async fn move_axes(
        &self,
        target: &AxisMap,
        speed: Option<f64>,
        _home_flagged_axes: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.paused {
            warn!("Simulated move issued while paused");
        }
        debug!("Simulated move to {:?} at speed {:?}", target, speed);
        state.move_to(target);
        Ok(())
    }

    async fn home(&self, axes: &[Axis]) -> Result<AxisMap, BackendError> {
        let mut state = self.state();
        state.home(axes);
        debug!("Simulated home of {:?}", axes);
        Ok(state.position.clone())
    }

    async fn fast_home(&self, axis: Axis, margin: f64) -> Result<AxisMap, BackendError> {
        let mut state = self.state();
        state.home(&[axis]);
        debug!("Simulated fast home of {} (margin {})", axis, margin);
        Ok(state.position.clone())
    }

    async fn probe(&self, axis: Axis, distance: f64) -> Result<AxisMap, BackendError> {
        let mut state = self.state();
        let current = state.position.get(&axis).copied().unwrap_or_default();
        state.position.insert(axis, current + distance);
        Ok(state.position.clone())
    }

    async fn get_attached_instruments(
        &self,
        expected: &BTreeMap<Mount, String>,
    ) -> Result<BTreeMap<Mount, AttachedInstrument>, BackendError> {
        let mut found = BTreeMap::new();
        for mount in Mount::ALL {
            let expected_model = expected.get(&mount);
            let init = self.attached_instruments.get(&mount).cloned().unwrap_or_default();
            let found_model = init.model.clone();

            let instrument = match (expected_model, found_model) {
                (Some(want), Some(have)) if !have.starts_with(want.as_str()) => {
                    if self.strict_attached_instruments {
                        return Err(BackendError::InstrumentMismatch {
                            mount,
                            expected: want.clone(),
                            found: Some(have),
                        });
                    }
                    AttachedInstrument {
                        model: Self::expected_model(want),
                        id: None,
                    }
                }
                (_, Some(_)) => init,
                (Some(want), None) => AttachedInstrument {
                    model: Self::expected_model(want),
                    id: None,
                },
                (None, None) => AttachedInstrument::default(),
            };
            found.insert(mount, instrument);
        }
        Ok(found)
    }

    fn axis_bounds(&self) -> AxisBounds {
        home_position()
            .into_iter()
            .filter(|(axis, _)| axis.is_gantry())
            .map(|(axis, home)| (axis, (0.0, home + BOUNDS_MARGIN)))
            .collect()
    }

    fn engaged_axes(&self) -> BTreeMap<Axis, bool> {
        self.state().engaged.clone()
    }

    async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), BackendError> {
        let mut state = self.state();
        for axis in axes {
            state.engaged.insert(*axis, false);
        }
        Ok(())
    }

    fn set_active_current(&self, axis: Axis, amps: f64) {
        self.state().currents.insert(axis, amps);
    }

    fn push_active_current(&self) {
        self.state().push_current();
    }

    fn pop_active_current(&self) {
        self.state().pop_current();
    }

    async fn set_lights(
        &self,
        button: Option<bool>,
        rails: Option<bool>,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        if let Some(button) = button {
            state.lights.button = button;
        }
        if let Some(rails) = rails {
            state.lights.rails = rails;
        }
        Ok(())
    }

    fn get_lights(&self) -> Lights {
        self.state().lights
    }

    fn fw_version(&self) -> Option<String> {
        Some("Virtual Smoothie".to_string())
    }

    fn pause(&self) {
        self.state().paused = true;
    }

    fn resume(&self) {
        self.state().paused = false;
    }

    async fn halt(&self) -> Result<(), BackendError> {
        info!("Simulated halt");
        self.state().paused = true;
        Ok(())
    }

    fn attached_modules(&self) -> Vec<ModuleAddress> {
        self.attached_modules.clone()
    }

    async fn build_module(&self, address: &ModuleAddress) -> Result<Box<dyn Module>, BackendError> {
        let mut module = self.registry.create_module(&address.name, true)?;
        module.connect(&address.port).await?;
        Ok(module)
    }
}
