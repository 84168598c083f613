//! The hardware controller.
//!
//! [`HardwareControl`] is the single authority over machine position and
//! instrument state. Operations are split across modules:
//! - this module: construction, configuration, instruments, lights and
//!   run control
//! - [`motion`](crate::motion): homing, positions, moves, retraction
//! - [`liquid`](crate::liquid): aspirate, dispense, tips
//! - [`calibration`](crate::calibration): tip probe and instrument offsets
//! - [`modules`](crate::modules): peripheral modules
//!
//! # Concurrency
//!
//! The position cache lives inside the motion lock (`tokio::sync::Mutex`).
//! Every operation that changes position holds it for exactly one backend
//! call plus the cache update that follows, so readers never observe a torn
//! cache. Instrument state sits behind a `std::sync::Mutex` that is never
//! held across an `.await`.

use crate::error::ControlError;
use crate::pipette::{Pipette, PipetteSummary};
use crate::transform::GantryCalibration;
use deckhand_common::config::{PipetteClass, RobotConfig};
use deckhand_common::hal::backend::{Backend, Lights};
use deckhand_common::hal::module::Module;
use deckhand_common::pipette::load_model;
use deckhand_common::types::{Axis, AxisMap, Mount};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blink period used by `identify`.
const IDENTIFY_BLINK: Duration = Duration::from_millis(500);

/// Motion coordinator for one robot.
pub struct HardwareControl {
    /// Motion backend (physical controller or simulator)
    pub(crate) backend: Arc<dyn Backend>,
    /// Deck-space position cache, guarded by the motion lock
    pub(crate) motion: tokio::sync::Mutex<AxisMap>,
    /// Set by `halt`, cleared by the next successful home
    pub(crate) halted: AtomicBool,
    /// Mount that moved last, for retraction on mount switch
    pub(crate) last_moved_mount: Mutex<Option<Mount>>,
    /// Attached pipettes
    pub(crate) instruments: Mutex<BTreeMap<Mount, Pipette>>,
    /// Robot configuration
    config: RwLock<RobotConfig>,
    /// Transform derived from `config.gantry_calibration`
    calibration: RwLock<GantryCalibration>,
    /// Where configuration changes are persisted
    settings_path: Option<PathBuf>,
    /// Connected peripheral modules keyed by port
    pub(crate) modules: tokio::sync::Mutex<BTreeMap<String, Box<dyn Module>>>,
}

impl HardwareControl {
    /// Coordinator over `backend` with `config`.
    ///
    /// # Errors
    /// Returns `ControlError::Config` if `config` fails validation and
    /// `ControlError::SingularCalibration` if the deck calibration has no
    /// inverse.
    pub fn new(backend: Arc<dyn Backend>, config: RobotConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let calibration = GantryCalibration::new(config.gantry_calibration)?;
        info!("Hardware control created on {} backend", backend.name());
        Ok(Self {
            backend,
            motion: tokio::sync::Mutex::new(AxisMap::new()),
            halted: AtomicBool::new(false),
            last_moved_mount: Mutex::new(None),
            instruments: Mutex::new(BTreeMap::new()),
            config: RwLock::new(config),
            calibration: RwLock::new(calibration),
            settings_path: None,
            modules: tokio::sync::Mutex::new(BTreeMap::new()),
        })
    }

    /// Persist configuration changes to `path`.
    pub fn with_settings_path(mut self, path: &Path) -> Self {
        self.settings_path = Some(path.to_path_buf());
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Snapshot of the robot configuration.
    pub fn config(&self) -> RobotConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn calibration(&self) -> GantryCalibration {
        *self
            .calibration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update` to the configuration, validate and persist it.
    ///
    /// A changed deck calibration invalidates every cached position, so the
    /// machine must be homed again afterwards.
    pub async fn update_config(
        &self,
        update: impl FnOnce(&mut RobotConfig),
    ) -> Result<(), ControlError> {
        let mut next = self.config();
        update(&mut next);
        next.validate()?;
        let calibration = GantryCalibration::new(next.gantry_calibration)?;

        let recalibrated = calibration != self.calibration();
        if recalibrated {
            self.motion.lock().await.clear();
            info!("Deck calibration changed; position cache cleared");
        }

        *self.calibration.write().unwrap_or_else(PoisonError::into_inner) = calibration;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.persist_config()
    }

    /// Replace the deck calibration matrix.
    pub async fn update_gantry_calibration(
        &self,
        rows: [[f64; 4]; 4],
    ) -> Result<(), ControlError> {
        self.update_config(|config| config.gantry_calibration = rows)
            .await
    }

    pub(crate) fn persist_config(&self) -> Result<(), ControlError> {
        if let Some(path) = &self.settings_path {
            self.config().save(path)?;
        }
        Ok(())
    }

    // ─── Instruments ────────────────────────────────────────────────

    pub(crate) fn pipettes(&self) -> MutexGuard<'_, BTreeMap<Mount, Pipette>> {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the pipette attached to `mount`.
    pub(crate) fn with_pipette<R>(
        &self,
        mount: Mount,
        f: impl FnOnce(&mut Pipette) -> R,
    ) -> Result<R, ControlError> {
        let mut pipettes = self.pipettes();
        let pipette = pipettes
            .get_mut(&mount)
            .ok_or(ControlError::NotAttached(mount))?;
        Ok(f(pipette))
    }

    /// Scan the mounts and rebuild the instrument table.
    ///
    /// `require` maps mounts to model prefixes that must be present.
    /// Every pipette is replaced, so tip and volume state reset.
    pub async fn cache_instruments(
        &self,
        require: &BTreeMap<Mount, String>,
    ) -> Result<(), ControlError> {
        debug!("Updating instrument model cache");
        let found = self.backend.get_attached_instruments(require).await?;
        let offsets = self.config().instrument_offset;

        let mut table = BTreeMap::new();
        for (mount, instrument) in found {
            let Some(model) = instrument.model else {
                continue;
            };
            let class = PipetteClass::from_channels(load_model(&model)?.channels);
            let pipette = Pipette::new(&model, offsets.get(mount, class), instrument.id)?;
            info!("Instrument on {} mount: {}", mount, model);
            table.insert(mount, pipette);
        }

        *self.pipettes() = table;
        Ok(())
    }

    /// Summary of the instrument on each mount.
    pub fn attached_instruments(&self) -> BTreeMap<Mount, Option<PipetteSummary>> {
        let pipettes = self.pipettes();
        Mount::ALL
            .into_iter()
            .map(|mount| (mount, pipettes.get(&mount).map(Pipette::summary)))
            .collect()
    }

    /// Record a tip of `tip_length` on `mount` without moving.
    pub fn add_tip(&self, mount: Mount, tip_length: f64) -> Result<(), ControlError> {
        if tip_length <= 0.0 {
            return Err(ControlError::InvalidTipLength(tip_length));
        }
        self.with_pipette(mount, |p| {
            if p.has_tip() {
                return Err(ControlError::TipAlreadyAttached(mount));
            }
            p.add_tip(tip_length);
            Ok(())
        })?
    }

    /// Forget the tip on `mount` without moving.
    pub fn remove_tip(&self, mount: Mount) -> Result<(), ControlError> {
        self.with_pipette(mount, |p| {
            if !p.has_tip() {
                return Err(ControlError::NoTipAttached(mount));
            }
            p.remove_tip();
            Ok(())
        })?
    }

    // ─── Axes, Lights and Run Control ───────────────────────────────

    pub fn engaged_axes(&self) -> BTreeMap<Axis, bool> {
        self.backend.engaged_axes()
    }

    pub async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), ControlError> {
        debug!("Disengaging {:?}", axes);
        self.backend.disengage_axes(axes).await?;
        Ok(())
    }

    pub async fn set_lights(
        &self,
        button: Option<bool>,
        rails: Option<bool>,
    ) -> Result<(), ControlError> {
        self.backend.set_lights(button, rails).await?;
        Ok(())
    }

    pub fn get_lights(&self) -> Lights {
        self.backend.get_lights()
    }

    /// Blink the button light for `duration`, then restore it.
    pub async fn identify(&self, duration: Duration) -> Result<(), ControlError> {
        let initial = self.get_lights().button;
        let mut on = initial;
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            on = !on;
            self.set_lights(Some(on), None).await?;
            tokio::time::sleep(IDENTIFY_BLINK).await;
            elapsed += IDENTIFY_BLINK;
        }
        self.set_lights(Some(initial), None).await
    }

    /// Firmware version, `"unknown"` when the backend cannot report it.
    pub fn fw_version(&self) -> String {
        self.backend
            .fw_version()
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn pause(&self) {
        info!("Pausing motion");
        self.backend.pause();
    }

    pub fn resume(&self) {
        info!("Resuming motion");
        self.backend.resume();
    }

    /// Stop immediately. Position is unknown afterwards.
    ///
    /// Does not wait for the motion lock. Moves and position queries fail
    /// with `MustHome` until the next successful home, even if a move in
    /// flight reports success.
    pub async fn halt(&self) -> Result<(), ControlError> {
        warn!("Halting");
        self.halted.store(true, Ordering::SeqCst);
        self.backend.halt().await?;
        if let Ok(mut cache) = self.motion.try_lock() {
            cache.clear();
        }
        Ok(())
    }

    /// Forget all cached state and rescan instruments and modules.
    pub async fn reset(&self) -> Result<(), ControlError> {
        info!("Resetting hardware state");
        self.motion.lock().await.clear();
        *self
            .last_moved_mount
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.cache_instruments(&BTreeMap::new()).await?;
        self.discover_modules().await?;
        Ok(())
    }
}
