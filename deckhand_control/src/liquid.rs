//! Liquid handling: aspirate, dispense, blow out and tip handling.
//!
//! Every operation keeps `0 <= current_volume <= max_volume`. A failed
//! plunger move leaves the liquid state unknown, so the volume is reset to
//! zero before the error propagates.

use crate::error::ControlError;
use crate::hardware::HardwareControl;
use deckhand_common::consts::{
    DROP_TIP_RELEASE_DISTANCE, PICK_UP_SPEED, SHAKE_OFF_TIPS_DISTANCE, SHAKE_OFF_TIPS_SPEED,
};
use deckhand_common::pipette::{PlungerAction, Quirk};
use deckhand_common::types::{Axis, Mount, Point};
use tracing::{debug, error, info};

/// Press/back-up cycles used to seat a tip.
pub const DEFAULT_PRESSES: u32 = 3;

/// Extra press depth added on each successive press (mm).
pub const DEFAULT_INCREMENT: f64 = 1.0;

/// Plunger move planned from the pipette state.
struct PlungerMove {
    volume: f64,
    position: f64,
    speed: f64,
    current: f64,
}

impl HardwareControl {
    // ─── Aspirate / Dispense ────────────────────────────────────────

    /// Draw `volume` µL into the tip on `mount` at `rate` times the
    /// aspirate flow rate. `None` fills the remaining headroom.
    pub async fn aspirate(
        &self,
        mount: Mount,
        volume: Option<f64>,
        rate: f64,
    ) -> Result<(), ControlError> {
        let plan = self.with_pipette(mount, |p| -> Result<PlungerMove, ControlError> {
            let volume = volume.unwrap_or_else(|| p.available_volume());
            check_volume(volume)?;
            if !p.ok_to_add_volume(volume) {
                return Err(ControlError::VolumeExceeded {
                    mount,
                    requested: volume,
                    available: p.available_volume(),
                });
            }
            Ok(PlungerMove {
                volume,
                position: p.plunger_position(p.current_volume() + volume, PlungerAction::Aspirate),
                speed: p.config().aspirate_flow_rate * rate,
                current: p.config().plunger_current,
            })
        })??;

        if plan.volume == 0.0 {
            debug!("Aspirate of 0 µL on {} mount skipped", mount);
            return Ok(());
        }
        debug!("Aspirating {} µL on {} mount", plan.volume, mount);

        match self.drive_plunger(mount, &plan).await {
            Ok(()) => self.with_pipette(mount, |p| p.add_current_volume(plan.volume)),
            Err(e) => {
                error!("Aspirate failed on {} mount: {}", mount, e);
                self.with_pipette(mount, |p| p.set_current_volume(0.0))?;
                Err(e)
            }
        }
    }

    /// Expel `volume` µL from the tip on `mount` at `rate` times the
    /// dispense flow rate. `None` dispenses everything; larger requests are
    /// clamped to the current volume.
    pub async fn dispense(
        &self,
        mount: Mount,
        volume: Option<f64>,
        rate: f64,
    ) -> Result<(), ControlError> {
        let plan = self.with_pipette(mount, |p| -> Result<PlungerMove, ControlError> {
            let requested = volume.unwrap_or_else(|| p.current_volume());
            check_volume(requested)?;
            let volume = requested.min(p.current_volume());
            Ok(PlungerMove {
                volume,
                position: p.plunger_position(p.current_volume() - volume, PlungerAction::Dispense),
                speed: p.config().dispense_flow_rate * rate,
                current: p.config().plunger_current,
            })
        })??;

        if plan.volume == 0.0 {
            debug!("Dispense of 0 µL on {} mount skipped", mount);
            return Ok(());
        }
        debug!("Dispensing {} µL on {} mount", plan.volume, mount);

        match self.drive_plunger(mount, &plan).await {
            Ok(()) => self.with_pipette(mount, |p| p.remove_current_volume(plan.volume)),
            Err(e) => {
                error!("Dispense failed on {} mount: {}", mount, e);
                self.with_pipette(mount, |p| p.set_current_volume(0.0))?;
                Err(e)
            }
        }
    }

    /// Drive the plunger to the blow-out stop. The tip counts as empty
    /// afterwards whether or not the move succeeded.
    pub async fn blow_out(&self, mount: Mount) -> Result<(), ControlError> {
        let (position, current) = self.with_pipette(mount, |p| {
            (p.plunger_positions().blow_out, p.config().plunger_current)
        })?;
        debug!("Blowing out on {} mount", mount);

        self.backend
            .set_active_current(Axis::of_plunger(mount), current);
        let result = self.move_plunger(mount, position, None).await;
        self.with_pipette(mount, |p| p.set_current_volume(0.0))?;
        if let Err(e) = &result {
            error!("Blow out failed on {} mount: {}", mount, e);
        }
        result
    }

    async fn drive_plunger(&self, mount: Mount, plan: &PlungerMove) -> Result<(), ControlError> {
        self.backend
            .set_active_current(Axis::of_plunger(mount), plan.current);
        self.move_plunger(mount, plan.position, Some(plan.speed))
            .await
    }

    // ─── Tips ───────────────────────────────────────────────────────

    /// Seat a tip of `tip_length` on `mount`.
    ///
    /// Presses `presses` times, each press `increment` mm deeper than the
    /// last, at raised Z current. Sticky models shake twice afterwards.
    pub async fn pick_up_tip(
        &self,
        mount: Mount,
        tip_length: f64,
        presses: u32,
        increment: f64,
    ) -> Result<(), ControlError> {
        if tip_length <= 0.0 || !tip_length.is_finite() {
            return Err(ControlError::InvalidTipLength(tip_length));
        }
        let (config, has_tip) = self.with_pipette(mount, |p| (p.config().clone(), p.has_tip()))?;
        if has_tip {
            return Err(ControlError::TipAlreadyAttached(mount));
        }
        info!("Picking up tip on {} mount ({})", mount, config.display_name);

        self.backend
            .set_active_current(Axis::of_plunger(mount), config.plunger_current);
        self.move_plunger(mount, config.plunger_positions.bottom, None)
            .await?;

        for press in 0..presses {
            let depth = config.pick_up_distance + increment * f64::from(press);
            {
                let _current = self.backend.save_current();
                self.backend
                    .set_active_current(Axis::by_mount(mount), config.pick_up_current);
                self.move_rel(mount, Point::new(0.0, 0.0, -depth), Some(PICK_UP_SPEED))
                    .await?;
            }
            self.move_rel(mount, Point::new(0.0, 0.0, depth), None)
                .await?;
        }

        self.with_pipette(mount, |p| {
            p.add_tip(tip_length);
            p.set_current_volume(0.0);
        })?;

        if config.has_quirk(Quirk::NeedsPickupShake) {
            self.shake_off_tips(mount).await?;
            self.shake_off_tips(mount).await?;
        }
        self.retract(mount, config.pick_up_distance).await
    }

    /// Eject the tip on `mount`.
    ///
    /// With `home_after`, the plunger is re-homed and parked at the
    /// bottom-to-drop-tip distance.
    pub async fn drop_tip(&self, mount: Mount, home_after: bool) -> Result<(), ControlError> {
        let (config, has_tip) = self.with_pipette(mount, |p| (p.config().clone(), p.has_tip()))?;
        if !has_tip {
            return Err(ControlError::NoTipAttached(mount));
        }
        info!("Dropping tip on {} mount ({})", mount, config.display_name);

        let plunger = Axis::of_plunger(mount);
        let positions = config.plunger_positions;

        self.backend
            .set_active_current(plunger, config.plunger_current);
        self.move_plunger(mount, positions.bottom, None).await?;
        self.backend
            .set_active_current(plunger, config.drop_tip_current);
        self.move_plunger(mount, positions.drop_tip, Some(config.drop_tip_speed))
            .await?;
        self.shake_off_tips(mount).await?;
        self.backend
            .set_active_current(plunger, config.plunger_current);

        self.with_pipette(mount, |p| {
            p.set_current_volume(0.0);
            p.remove_tip();
        })?;

        if home_after {
            let margin = (positions.bottom - positions.drop_tip).abs();
            self.fast_home(plunger, margin).await?;
            self.move_plunger(mount, margin, None).await?;
        }
        Ok(())
    }

    /// Shake left, right, back to centre, then rise clear of the tip.
    pub async fn shake_off_tips(&self, mount: Mount) -> Result<(), ControlError> {
        debug!("Shaking off tips on {} mount", mount);
        let d = SHAKE_OFF_TIPS_DISTANCE;
        for dx in [-d, 2.0 * d, -d] {
            self.move_rel(mount, Point::new(dx, 0.0, 0.0), Some(SHAKE_OFF_TIPS_SPEED))
                .await?;
        }
        self.move_rel(mount, Point::new(0.0, 0.0, DROP_TIP_RELEASE_DISTANCE), None)
            .await
    }

    // ─── Pipette Settings ───────────────────────────────────────────

    /// Override plunger stops on the live pipette.
    pub fn calibrate_plunger(
        &self,
        mount: Mount,
        top: Option<f64>,
        bottom: Option<f64>,
        blow_out: Option<f64>,
        drop_tip: Option<f64>,
    ) -> Result<(), ControlError> {
        self.with_pipette(mount, |p| {
            let mut positions = p.plunger_positions();
            positions.top = top.unwrap_or(positions.top);
            positions.bottom = bottom.unwrap_or(positions.bottom);
            positions.blow_out = blow_out.unwrap_or(positions.blow_out);
            positions.drop_tip = drop_tip.unwrap_or(positions.drop_tip);
            debug!("Plunger positions on {} mount: {:?}", mount, positions);
            p.set_plunger_positions(positions);
        })
    }

    /// Override flow rates (µL/s) on the live pipette.
    pub fn set_flow_rate(
        &self,
        mount: Mount,
        aspirate: Option<f64>,
        dispense: Option<f64>,
    ) -> Result<(), ControlError> {
        self.with_pipette(mount, |p| p.set_flow_rates(aspirate, dispense))
    }
}

fn check_volume(volume: f64) -> Result<(), ControlError> {
    if volume < 0.0 || !volume.is_finite() {
        return Err(ControlError::InvalidVolume(volume));
    }
    Ok(())
}
