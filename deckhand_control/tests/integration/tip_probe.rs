//! Tip-probe calibration and instrument offset persistence.

use super::{Event, homed};
use deckhand_common::config::RobotConfig;
use deckhand_common::types::{Axis, CriticalPoint, Mount, Point};
use deckhand_control::{HardwareControl, OffsetUpdate};
use deckhand_hal::Simulator;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Probe geometry where the Z hotspot starts one probe height above center.
///
/// The simulator's probe is a pure offset, so every probe runs its full
/// distance; with this start height the Z sample lands on the center too.
fn symmetric_config() -> RobotConfig {
    let mut config = RobotConfig::default();
    config.tip_probe.z_clearance.start = config.tip_probe.dimensions[2];
    config
}

fn assert_close(a: Point, b: Point) {
    assert!((a.x - b.x).abs() < 1e-6, "{a} vs {b}");
    assert!((a.y - b.y).abs() < 1e-6, "{a} vs {b}");
    assert!((a.z - b.z).abs() < 1e-6, "{a} vs {b}");
}

#[tokio::test]
async fn test_symmetric_probe_finds_nominal_center() {
    let sim = Simulator::new()
        .with_instrument(Mount::Right, "p300_single_v1", None)
        .with_instrument(Mount::Left, "p10_single_v1", None);
    let config = symmetric_config();
    let nominal = config.tip_probe.center();
    let (hw, backend) = homed(sim, config).await;

    let right = hw
        .locate_tip_probe_center(Mount::Right, Some(51.7))
        .await
        .unwrap();
    assert_close(right, nominal);

    let probes: Vec<(Axis, f64)> = backend
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Probe { axis, distance } => Some((axis, distance)),
            _ => None,
        })
        .collect();
    assert_eq!(
        probes,
        vec![
            (Axis::X, 35.0),
            (Axis::X, -35.0),
            (Axis::Y, 46.0),
            (Axis::Y, -46.0),
            (Axis::A, -82.0),
        ]
    );

    // The left mount carries the mount offset and still lands on center.
    let left = hw.locate_tip_probe_center(Mount::Left, None).await.unwrap();
    assert_close(left, nominal);
}

#[tokio::test]
async fn test_probe_keeps_attached_tip() {
    let sim = Simulator::new().with_instrument(Mount::Right, "p300_single_v1", None);
    let (hw, _) = homed(sim, symmetric_config()).await;
    hw.add_tip(Mount::Right, 51.7).unwrap();

    hw.locate_tip_probe_center(Mount::Right, None).await.unwrap();
    let summary = hw.attached_instruments()[&Mount::Right].clone().unwrap();
    assert!(summary.has_tip);
    assert_eq!(summary.tip_length, 51.7);
}

#[tokio::test]
async fn test_offset_persisted_and_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings").join("robot.toml");

    let sim = Simulator::new().with_instrument(Mount::Right, "p300_multi_v1", None);
    let hw = HardwareControl::new(Arc::new(sim), RobotConfig::default())
        .unwrap()
        .with_settings_path(&path);
    hw.cache_instruments(&BTreeMap::new()).await.unwrap();
    hw.home(None).await.unwrap();

    let center = hw.config().tip_probe.center();
    let measured = center - Point::new(0.4, -0.2, 0.3);
    let offset = hw
        .update_instrument_offset(Mount::Right, OffsetUpdate::FromTipProbe(measured))
        .await
        .unwrap();
    assert_close(offset, Point::new(0.4, -0.2, 0.3));

    let saved = RobotConfig::load_or_default(&path).unwrap();
    assert_close(Point::from_array(saved.instrument_offset.right.multi), offset);
    assert_eq!(saved.instrument_offset.right.single, [0.0; 3]);

    // Z lengthens the tip; X and Y shift the nozzle.
    hw.add_tip(Mount::Right, 50.0).unwrap();
    let mount = hw
        .gantry_position(Mount::Right, Some(CriticalPoint::Mount))
        .await
        .unwrap();
    let tip = hw.gantry_position(Mount::Right, None).await.unwrap();
    assert_close(tip - mount, Point::new(0.4, 31.5 - 0.2, -25.8 - 50.3));

    // A fresh coordinator picks the stored offset up on instrument scan.
    let reloaded = HardwareControl::new(
        Arc::new(Simulator::new().with_instrument(Mount::Right, "p300_multi_v1", None)),
        saved,
    )
    .unwrap();
    reloaded.cache_instruments(&BTreeMap::new()).await.unwrap();
    reloaded.home(None).await.unwrap();
    let nozzle = reloaded
        .gantry_position(Mount::Right, Some(CriticalPoint::Nozzle))
        .await
        .unwrap();
    assert_close(nozzle, Point::new(418.4, 353.0 + 31.3, 218.0 - 25.8));
}
