//! Tip-probe calibration and instrument offsets.
//!
//! The tip probe is a fixed switch block on the deck. Probing its four
//! sides and top with a tip attached locates the physical tip relative to
//! the configured nominal center; the difference becomes the instrument
//! offset of the pipette.

use crate::error::ControlError;
use crate::hardware::HardwareControl;
use deckhand_common::types::{Axis, Mount, Point};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// New instrument offset for `update_instrument_offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OffsetUpdate {
    /// Use this offset as is.
    Explicit(Point),
    /// Derive the offset from a measured tip-probe center.
    FromTipProbe(Point),
}

/// Tip state of one pipette held for the duration of a probe run.
///
/// Attaches the probing tip and zeroes the instrument offset on creation;
/// restores both on drop, whichever way the run ends.
struct TipScope<'a> {
    hardware: &'a HardwareControl,
    mount: Mount,
    had_tip: bool,
    tip_length: f64,
    offset: Point,
}

impl<'a> TipScope<'a> {
    fn enter(
        hardware: &'a HardwareControl,
        mount: Mount,
        probe_tip_length: f64,
    ) -> Result<Self, ControlError> {
        hardware.with_pipette(mount, |p| {
            let scope = TipScope {
                hardware,
                mount,
                had_tip: p.has_tip(),
                tip_length: p.nominal_tip_length(),
                offset: p.instrument_offset(),
            };
            p.update_instrument_offset(Point::ZERO);
            if !p.has_tip() {
                p.add_tip(probe_tip_length);
            }
            scope
        })
    }
}

impl Drop for TipScope<'_> {
    fn drop(&mut self) {
        let restored = self.hardware.with_pipette(self.mount, |p| {
            p.update_instrument_offset(self.offset);
            if self.had_tip {
                p.add_tip(self.tip_length);
            } else {
                p.remove_tip();
            }
        });
        if restored.is_err() {
            debug!("Pipette on {} mount removed during tip probe", self.mount);
        }
    }
}

impl HardwareControl {
    /// Locate the tip-probe center with the pipette on `mount`.
    ///
    /// Uses the attached tip, or a temporary tip of `tip_length` (falling
    /// back to the configured default and then the model's nominal length)
    /// when none is attached.
    ///
    /// # Errors
    /// `TipLengthConflict` when a tip is attached and `tip_length` is given.
    pub async fn locate_tip_probe_center(
        &self,
        mount: Mount,
        tip_length: Option<f64>,
    ) -> Result<Point, ControlError> {
        let probe = self.config().tip_probe;
        let (has_tip, attached_length, model_length) = self.with_pipette(mount, |p| {
            (p.has_tip(), p.nominal_tip_length(), p.config().tip_length)
        })?;

        let tip_length = match (has_tip, tip_length) {
            (true, Some(_)) => return Err(ControlError::TipLengthConflict(mount)),
            (true, None) => attached_length,
            (false, Some(length)) => length,
            (false, None) => probe.default_tip_length.unwrap_or(model_length),
        };
        if tip_length <= 0.0 || !tip_length.is_finite() {
            return Err(ControlError::InvalidTipLength(tip_length));
        }
        info!("Locating tip probe on {} mount with {} mm tip", mount, tip_length);

        let _scope = TipScope::enter(self, mount, tip_length)?;

        let nominal = probe.center();
        let safe_z = probe.safe_z();
        let mut samples: BTreeMap<Axis, Vec<f64>> = BTreeMap::new();

        for hotspot in probe.hotspots(tip_length) {
            let estimate = |axis: Axis| match samples.get(&axis) {
                Some(values) if values.len() == 2 => values.iter().sum::<f64>() / 2.0,
                _ => nominal.component(axis),
            };
            let x0 = estimate(Axis::X) + hotspot.x_start_offset;
            let y0 = estimate(Axis::Y) + hotspot.y_start_offset;
            let z0 = hotspot.z_start_abs;

            let here = self.gantry_position(mount, None).await?;
            self.move_to(mount, here.with_z(safe_z), None, None).await?;
            self.move_to(mount, Point::new(x0, y0, safe_z), None, None)
                .await?;
            self.move_to(mount, Point::new(x0, y0, z0), None, None)
                .await?;

            let probe_axis = if hotspot.axis == Axis::Z {
                Axis::by_mount(mount)
            } else {
                hotspot.axis
            };
            self.probe(probe_axis, hotspot.probe_distance).await?;
            let measured = self.gantry_position(mount, None).await?;
            debug!("Tip probe {:?}: {}", hotspot, measured);
            samples
                .entry(hotspot.axis)
                .or_default()
                .push(measured.component(hotspot.axis));

            let bounce = probe.bounce_distance * -hotspot.probe_distance.signum();
            self.move_rel(mount, Point::along(hotspot.axis, bounce), None)
                .await?;
            self.move_to(mount, measured.with_z(safe_z), None, None)
                .await?;
        }

        let mean = |axis: Axis| match samples.get(&axis) {
            Some(values) if !values.is_empty() => values.iter().sum::<f64>() / values.len() as f64,
            _ => nominal.component(axis),
        };
        let center = Point::new(mean(Axis::X), mean(Axis::Y), mean(Axis::Z));
        info!("Tip probe center on {} mount: {}", mount, center);
        Ok(center)
    }

    /// Store a new instrument offset for the pipette on `mount`.
    ///
    /// The offset is written to the configuration slot for the pipette's
    /// class (single or multi), persisted when a settings path is set and
    /// applied to the live pipette. Returns the stored offset.
    pub async fn update_instrument_offset(
        &self,
        mount: Mount,
        update: OffsetUpdate,
    ) -> Result<Point, ControlError> {
        let offset = match update {
            OffsetUpdate::Explicit(offset) => offset,
            OffsetUpdate::FromTipProbe(measured) => self.config().tip_probe.center() - measured,
        };
        let class = self.with_pipette(mount, |p| p.class())?;
        info!("Instrument offset for {} mount ({:?}): {}", mount, class, offset);

        self.update_config(|config| config.instrument_offset.set(mount, class, offset))
            .await?;
        self.with_pipette(mount, |p| p.update_instrument_offset(offset))?;
        Ok(offset)
    }
}
