//! Homing, position queries and moves.
//!
//! The position cache holds deck coordinates for X, Y, Z and A and raw
//! positions for the plungers. It is empty until the first successful home
//! and is cleared whenever a motion call fails, because the physical state
//! is unknown afterwards. Gantry and plunger moves both need the mount's
//! X, Y and vertical axis in the cache.

use crate::error::ControlError;
use crate::hardware::HardwareControl;
use deckhand_common::consts::MOUNT_SWITCH_RETRACT_MARGIN;
use deckhand_common::hal::backend::BackendError;
use deckhand_common::types::{Axis, AxisMap, CriticalPoint, Mount, Point};
use std::sync::PoisonError;
use std::sync::atomic::Ordering;
use tracing::{debug, error, warn};

impl HardwareControl {
    // ─── Homing ─────────────────────────────────────────────────────

    /// Home `axes`, or every axis when `None`.
    ///
    /// Gantry and plunger axes are homed as separate groups.
    pub async fn home(&self, axes: Option<&[Axis]>) -> Result<(), ControlError> {
        let axes = axes.unwrap_or(&Axis::ALL);
        debug!("Homing {:?}", axes);
        let (gantry, plungers): (Vec<Axis>, Vec<Axis>) =
            axes.iter().copied().partition(|a| a.is_gantry());

        for group in [gantry, plungers] {
            if group.is_empty() {
                continue;
            }
            let mut cache = self.motion.lock().await;
            let result = self.backend.home(&group).await;
            self.rebuild_cache(&mut cache, result)?;
        }
        self.halted.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Home the vertical axis of `mount`, or both when `None`.
    pub async fn home_z(&self, mount: Option<Mount>) -> Result<(), ControlError> {
        let axes: Vec<Axis> = match mount {
            Some(mount) => vec![Axis::by_mount(mount)],
            None => vec![Axis::Z, Axis::A],
        };
        self.home(Some(&axes)).await
    }

    /// Home the plunger of `mount` and return it to the bottom stop.
    pub async fn home_plunger(&self, mount: Mount) -> Result<(), ControlError> {
        let bottom = self.with_pipette(mount, |p| p.plunger_positions().bottom)?;
        self.home(Some(&[Axis::of_plunger(mount)])).await?;
        self.move_plunger(mount, bottom, None).await
    }

    // ─── Position ───────────────────────────────────────────────────

    /// Deck position of the critical point on `mount` plus its plunger.
    ///
    /// The returned map holds X, Y, the mount's vertical axis and the
    /// mount's plunger axis.
    pub async fn current_position(
        &self,
        mount: Mount,
        cp_override: Option<CriticalPoint>,
    ) -> Result<AxisMap, ControlError> {
        let cache = self.motion.lock().await.clone();
        if cache.is_empty() || self.halted.load(Ordering::SeqCst) {
            return Err(ControlError::MustHome);
        }
        let z_axis = Axis::by_mount(mount);
        let plunger = Axis::of_plunger(mount);
        let read = |axis: Axis| cache.get(&axis).copied().ok_or(ControlError::MustHome);

        let offset = self.mount_offset(mount) + self.critical_point_for(mount, cp_override);
        Ok(AxisMap::from([
            (Axis::X, read(Axis::X)? + offset.x),
            (Axis::Y, read(Axis::Y)? + offset.y),
            (z_axis, read(z_axis)? + offset.z),
            (plunger, read(plunger)?),
        ]))
    }

    /// Deck point of the critical point on `mount`.
    pub async fn gantry_position(
        &self,
        mount: Mount,
        cp_override: Option<CriticalPoint>,
    ) -> Result<Point, ControlError> {
        let position = self.current_position(mount, cp_override).await?;
        Ok(Point::new(
            position[&Axis::X],
            position[&Axis::Y],
            position[&Axis::by_mount(mount)],
        ))
    }

    // ─── Moves ──────────────────────────────────────────────────────

    /// Move the critical point of `mount` to the deck point `target`.
    pub async fn move_to(
        &self,
        mount: Mount,
        target: Point,
        speed: Option<f64>,
        cp_override: Option<CriticalPoint>,
    ) -> Result<(), ControlError> {
        debug!("Move {} mount to {}", mount, target);
        self.require_homed(mount).await?;
        self.cache_and_maybe_retract_mount(mount).await?;

        let mount_point = target - self.mount_offset(mount) - self.critical_point_for(mount, cp_override);
        let axes = AxisMap::from([
            (Axis::X, mount_point.x),
            (Axis::Y, mount_point.y),
            (Axis::by_mount(mount), mount_point.z),
        ]);
        self.execute_move(&axes, speed, true).await
    }

    /// Move `mount` by `delta` from its cached position.
    pub async fn move_rel(
        &self,
        mount: Mount,
        delta: Point,
        speed: Option<f64>,
    ) -> Result<(), ControlError> {
        debug!("Move {} mount by {}", mount, delta);
        self.require_homed(mount).await?;
        self.cache_and_maybe_retract_mount(mount).await?;

        let z_axis = Axis::by_mount(mount);
        let axes = {
            let cache = self.motion.lock().await;
            let read = |axis: Axis| cache.get(&axis).copied().ok_or(ControlError::MustHome);
            AxisMap::from([
                (Axis::X, read(Axis::X)? + delta.x),
                (Axis::Y, read(Axis::Y)? + delta.y),
                (z_axis, read(z_axis)? + delta.z),
            ])
        };
        self.execute_move(&axes, speed, true).await
    }

    /// Rapidly home the vertical axis of `mount`, backing off `margin` first.
    ///
    /// Works regardless of home status; the cache is rebuilt from the
    /// reported position.
    pub async fn retract(&self, mount: Mount, margin: f64) -> Result<(), ControlError> {
        debug!("Retracting {} mount by {}", mount, margin);
        self.fast_home(Axis::by_mount(mount), margin).await
    }

    /// Probe along `axis` for up to `distance`; returns the deck position.
    pub async fn probe(&self, axis: Axis, distance: f64) -> Result<AxisMap, ControlError> {
        debug!("Probing {} by {}", axis, distance);
        let mut cache = self.motion.lock().await;
        let result = self.backend.probe(axis, distance).await;
        self.rebuild_cache(&mut cache, result)?;
        Ok(cache.clone())
    }

    /// Drive the plunger of `mount` to `position`.
    ///
    /// Refused with `MustHome` while the mount's gantry position is unknown.
    pub(crate) async fn move_plunger(
        &self,
        mount: Mount,
        position: f64,
        speed: Option<f64>,
    ) -> Result<(), ControlError> {
        self.require_homed(mount).await?;
        let target = AxisMap::from([(Axis::of_plunger(mount), position)]);
        self.execute_move(&target, speed, false).await
    }

    pub(crate) async fn fast_home(&self, axis: Axis, margin: f64) -> Result<(), ControlError> {
        let mut cache = self.motion.lock().await;
        let result = self.backend.fast_home(axis, margin).await;
        self.rebuild_cache(&mut cache, result)
    }

    /// Transform `target`, check bounds and issue one backend move.
    ///
    /// Holds the motion lock for the backend call and the cache update.
    /// A failed move clears the whole cache.
    async fn execute_move(
        &self,
        target: &AxisMap,
        speed: Option<f64>,
        home_flagged_axes: bool,
    ) -> Result<(), ControlError> {
        let raw = self.calibration().axes_to_raw(target)?;

        let bounds = self.backend.axis_bounds();
        for (axis, value) in raw.iter().filter(|(axis, _)| axis.is_gantry()) {
            if let Some(&(min, max)) = bounds.get(axis) {
                if *value < min || *value > max {
                    warn!(
                        "Out of bounds move: {} = {:.3} (limits {:.3} to {:.3})",
                        axis, value, min, max
                    );
                }
            }
        }

        let mut cache = self.motion.lock().await;
        match self.backend.move_axes(&raw, speed, home_flagged_axes).await {
            Ok(()) => {
                cache.extend(target.iter().map(|(axis, value)| (*axis, *value)));
                Ok(())
            }
            Err(e) => {
                error!("Move to {:?} failed: {}", target, e);
                cache.clear();
                Err(e.into())
            }
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn rebuild_cache(
        &self,
        cache: &mut AxisMap,
        result: Result<AxisMap, BackendError>,
    ) -> Result<(), ControlError> {
        let deck = result
            .map_err(ControlError::from)
            .and_then(|raw| self.calibration().deck_from_raw(&raw));
        match deck {
            Ok(deck) => {
                *cache = deck;
                Ok(())
            }
            Err(e) => {
                error!("Position update failed: {}", e);
                cache.clear();
                Err(e)
            }
        }
    }

    /// X, Y and the vertical axis of `mount` must be known, and no halt
    /// may have happened since the last home.
    async fn require_homed(&self, mount: Mount) -> Result<(), ControlError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(ControlError::MustHome);
        }
        let cache = self.motion.lock().await;
        let known = [Axis::X, Axis::Y, Axis::by_mount(mount)]
            .iter()
            .all(|axis| cache.contains_key(axis));
        if !known {
            return Err(ControlError::MustHome);
        }
        Ok(())
    }

    /// Retract the previously moved mount if it differs from `mount`.
    async fn cache_and_maybe_retract_mount(&self, mount: Mount) -> Result<(), ControlError> {
        let last = *self
            .last_moved_mount
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last.filter(|m| *m != mount) {
            self.retract(previous, MOUNT_SWITCH_RETRACT_MARGIN).await?;
        }
        *self
            .last_moved_mount
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(mount);
        Ok(())
    }

    /// Offset of the requested critical point from the bare mount.
    ///
    /// Resolves through the pipette unless the override asks for the mount
    /// itself or nothing is attached.
    pub(crate) fn critical_point_for(
        &self,
        mount: Mount,
        cp_override: Option<CriticalPoint>,
    ) -> Point {
        if cp_override == Some(CriticalPoint::Mount) {
            return Point::ZERO;
        }
        self.pipettes()
            .get(&mount)
            .map(|p| p.critical_point(cp_override))
            .unwrap_or(Point::ZERO)
    }

    /// Left mount sits at the configured offset from the right.
    fn mount_offset(&self, mount: Mount) -> Point {
        match mount {
            Mount::Left => self.config().mount_offset(),
            Mount::Right => Point::ZERO,
        }
    }
}
