//! Physical controller implementation.

use super::driver::SmoothieDriver;
use crate::modules::{ModuleRegistry, discovery};
use async_trait::async_trait;
use deckhand_common::consts::DEFAULT_MODULES_DIR;
use deckhand_common::hal::backend::{
    AttachedInstrument, AxisBounds, Backend, BackendError, Lights,
};
use deckhand_common::hal::module::{Module, ModuleAddress};
use deckhand_common::types::{Axis, AxisMap, Mount};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Slack above the homed position allowed by the bounds (mm).
const BOUNDS_MARGIN: f64 = 0.05;

/// Number of live `Controller` instances in this process.
static LIVE_CONTROLLERS: AtomicUsize = AtomicUsize::new(0);

/// Backend driving real hardware through a [`SmoothieDriver`].
pub struct Controller {
    driver: Box<dyn SmoothieDriver>,
    modules_dir: PathBuf,
    registry: ModuleRegistry,
}

/// Pops the driver speed when dropped.
struct SpeedGuard<'a> {
    driver: &'a dyn SmoothieDriver,
}

impl Drop for SpeedGuard<'_> {
    fn drop(&mut self) {
        self.driver.pop_speed();
    }
}

impl Controller {
    /// Take ownership of the hardware through `driver`.
    ///
    /// # Errors
    /// Returns `BackendError::AlreadyInUse` if another controller is alive in
    /// this process, unless `force` is set.
    pub fn new(driver: Box<dyn SmoothieDriver>, force: bool) -> Result<Self, BackendError> {
        if LIVE_CONTROLLERS.fetch_add(1, Ordering::SeqCst) > 0 {
            if !force {
                LIVE_CONTROLLERS.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::AlreadyInUse);
            }
            warn!("Forcing a second hardware controller");
        }
        info!("Hardware controller created");
        Ok(Self {
            driver,
            modules_dir: PathBuf::from(DEFAULT_MODULES_DIR),
            registry: ModuleRegistry::with_builtin(),
        })
    }

    /// Scan `dir` instead of the default module directory.
    pub fn with_modules_dir(mut self, dir: &Path) -> Self {
        self.modules_dir = dir.to_path_buf();
        self
    }

    async fn read_instrument(&self, mount: Mount) -> Result<AttachedInstrument, BackendError> {
        Ok(AttachedInstrument {
            model: self.driver.read_pipette_model(mount).await?,
            id: self.driver.read_pipette_id(mount).await?,
        })
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        LIVE_CONTROLLERS.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for Controller {
    fn name(&self) -> &'static str {
        "smoothie"
    }

    async fn move_axes(
        &self,
        target: &AxisMap,
        speed: Option<f64>,
        home_flagged_axes: bool,
    ) -> Result<(), BackendError> {
        let _speed = speed.map(|speed| {
            self.driver.push_speed();
            self.driver.set_speed(speed);
            SpeedGuard {
                driver: self.driver.as_ref(),
            }
        });
        self.driver.move_axes(target, home_flagged_axes).await
    }

    async fn home(&self, axes: &[Axis]) -> Result<AxisMap, BackendError> {
        self.driver.home(axes).await
    }

    async fn fast_home(&self, axis: Axis, margin: f64) -> Result<AxisMap, BackendError> {
        self.driver.fast_home(axis, margin).await
    }

    async fn probe(&self, axis: Axis, distance: f64) -> Result<AxisMap, BackendError> {
        self.driver.probe_axis(axis, distance).await
    }

    async fn get_attached_instruments(
        &self,
        expected: &BTreeMap<Mount, String>,
    ) -> Result<BTreeMap<Mount, AttachedInstrument>, BackendError> {
        let mut found = BTreeMap::new();
        for mount in Mount::ALL {
            let instrument = self.read_instrument(mount).await?;
            if let Some(want) = expected.get(&mount) {
                let matches = instrument
                    .model
                    .as_deref()
                    .is_some_and(|model| model.starts_with(want.as_str()));
                if !matches {
                    return Err(BackendError::InstrumentMismatch {
                        mount,
                        expected: want.clone(),
                        found: instrument.model,
                    });
                }
            }
            debug!("{} mount: {:?}", mount, instrument.model);
            found.insert(mount, instrument);
        }
        Ok(found)
    }

    fn axis_bounds(&self) -> AxisBounds {
        self.driver
            .homed_position()
            .into_iter()
            .filter(|(axis, _)| axis.is_gantry())
            .map(|(axis, home)| (axis, (0.0, home + BOUNDS_MARGIN)))
            .collect()
    }

    fn engaged_axes(&self) -> BTreeMap<Axis, bool> {
        self.driver.engaged_axes()
    }

    async fn disengage_axes(&self, axes: &[Axis]) -> Result<(), BackendError> {
        self.driver.disengage_axes(axes).await
    }

    fn set_active_current(&self, axis: Axis, amps: f64) {
        self.driver.set_active_current(axis, amps);
    }

    fn push_active_current(&self) {
        self.driver.push_active_current();
    }

    fn pop_active_current(&self) {
        self.driver.pop_active_current();
    }

    async fn set_lights(
        &self,
        button: Option<bool>,
        rails: Option<bool>,
    ) -> Result<(), BackendError> {
        if let Some(on) = button {
            self.driver.set_button_light(on).await?;
        }
        if let Some(on) = rails {
            self.driver.set_rail_lights(on).await?;
        }
        Ok(())
    }

    fn get_lights(&self) -> Lights {
        Lights {
            button: self.driver.button_light(),
            rails: self.driver.rail_lights(),
        }
    }

    fn fw_version(&self) -> Option<String> {
        self.driver.firmware_version()
    }

    fn pause(&self) {
        self.driver.pause();
    }

    fn resume(&self) {
        self.driver.resume();
    }

    async fn halt(&self) -> Result<(), BackendError> {
        warn!("Halting hardware controller");
        self.driver.kill().await
    }

    fn attached_modules(&self) -> Vec<ModuleAddress> {
        discovery::scan(&self.modules_dir, &self.registry.list_modules())
    }

    async fn build_module(&self, address: &ModuleAddress) -> Result<Box<dyn Module>, BackendError> {
        let mut module = self.registry.create_module(&address.name, false)?;
        module.connect(&address.port).await?;
        Ok(module)
    }
}
