//! Shared fixtures for the integration suites.

mod concurrency;
mod liquid_handling;
mod motion;
mod tip_probe;

use async_trait::async_trait;
use deckhand_common::config::RobotConfig;
use deckhand_common::hal::backend::{
    AttachedInstrument, AxisBounds, Backend, BackendError, Lights,
};
use deckhand_common::hal::module::{Module, ModuleAddress};
use deckhand_common::types::{Axis, AxisMap, Mount};
use deckhand_control::HardwareControl;
use deckhand_hal::Simulator;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Backend call observed by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Move {
        target: AxisMap,
        speed: Option<f64>,
        currents: BTreeMap<Axis, f64>,
    },
    FastHome {
        axis: Axis,
        margin: f64,
    },
    Home(Vec<Axis>),
    Probe {
        axis: Axis,
        distance: f64,
    },
}

/// Simulator wrapper that records motion calls and can inject failures.
pub struct RecordingBackend {
    pub sim: Simulator,
    events: Mutex<Vec<Event>>,
    fail_moves: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingBackend {
    pub fn new(sim: Simulator) -> Self {
        Self {
            sim,
            events: Mutex::new(Vec::new()),
            fail_moves: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn fast_homes(&self) -> Vec<(Axis, f64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::FastHome { axis, margin } => Some((axis, margin)),
                _ => None,
            })
            .collect()
    }

    /// Moves as `(target, speed, currents)`.
    pub fn moves(&self) -> Vec<(AxisMap, Option<f64>, BTreeMap<Axis, f64>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Move {
                    target,
                    speed,
                    currents,
                } => Some((target, speed, currents)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn move_axes(
        &self,
        target: &AxisMap,
        speed: Option<f64>,
        home_flagged_axes: bool,
    ) -> Result<(), BackendError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::task::yield_now().await;

        self.record(Event::Move {
            target: target.clone(),
            speed,
            currents: self.sim.active_currents(),
        });
        let result = if self.fail_moves.load(Ordering::SeqCst) {
            Err(BackendError::MotionFailed("injected failure".to_string()))
        } else {
            self.sim.move_axes(target, speed, home_flagged_axes).await
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn home(&self, axes: &[Axis]) -> Result<AxisMap, BackendError> {
        self.record(Event::Home(axes.to_vec()));
        self.sim.home(axes).await
    }

    async fn fast_home(&self, axis: Axis, margin: f64) -> Result<AxisMap, BackendError> {
        self.record(Event::FastHome { axis, margin });
        self.sim.fast_home(axis, margin).await
    }

    async fn probe(&self, axis: Axis, distance: f64) -> Result<AxisMap, BackendError> {
        self.record(Event::Probe { axis, distance });
        self.sim.probe(axis, distance).await
    }

    async fn get_attached_instruments(
        &self,
        expected: &BTreeMap<Mount, String>,
    ) -> Result<BTreeMap<Mount, AttachedInstrument>, BackendError> {
        self.sim.get_attached_instruments(expected).await
    }

    fn axis_bounds(&self) -> AxisBounds {
        self.sim.axis_bounds()
    }

    fn engaged_axes(&self) -> BTreeMap<Axis, bool> {
        self.sim.engaged_axes()
    }

    async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), BackendError> {
        self.sim.disengage_axes(axes).await
    }

    fn set_active_current(&self, axis: Axis, amps: f64) {
        self.sim.set_active_current(axis, amps);
    }

    fn push_active_current(&self) {
        self.sim.push_active_current();
    }

    fn pop_active_current(&self) {
        self.sim.pop_active_current();
    }

    async fn set_lights(
        &self,
        button: Option<bool>,
        rails: Option<bool>,
    ) -> Result<(), BackendError> {
        self.sim.set_lights(button, rails).await
    }

    fn get_lights(&self) -> Lights {
        self.sim.get_lights()
    }

    fn fw_version(&self) -> Option<String> {
        self.sim.fw_version()
    }

    fn pause(&self) {
        self.sim.pause();
    }

    fn resume(&self) {
        self.sim.resume();
    }

    async fn halt(&self) -> Result<(), BackendError> {
        self.sim.halt().await
    }

    fn attached_modules(&self) -> Vec<ModuleAddress> {
        self.sim.attached_modules()
    }

    async fn build_module(&self, address: &ModuleAddress) -> Result<Box<dyn Module>, BackendError> {
        self.sim.build_module(address).await
    }
}

/// Homed coordinator over a recording simulator with instruments cached.
pub async fn homed(sim: Simulator, config: RobotConfig) -> (Arc<HardwareControl>, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::new(sim));
    let hardware = HardwareControl::new(backend.clone(), config).unwrap();
    hardware.cache_instruments(&BTreeMap::new()).await.unwrap();
    hardware.home(None).await.unwrap();
    backend.clear_events();
    (Arc::new(hardware), backend)
}

pub fn volume(hardware: &HardwareControl, mount: Mount) -> f64 {
    hardware.attached_instruments()[&mount]
        .as_ref()
        .unwrap()
        .current_volume
}
