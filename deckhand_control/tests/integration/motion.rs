//! Homing, moves and position-cache behaviour.

use super::{Event, RecordingBackend, homed};
use deckhand_common::config::{IDENTITY_CALIBRATION, RobotConfig};
use deckhand_common::types::{Axis, Mount, Point};
use deckhand_control::{ControlError, GantryCalibration, HardwareControl};
use deckhand_hal::Simulator;
use std::collections::BTreeMap;
use std::sync::Arc;

const SKEWED: [[f64; 4]; 4] = [
    [1.002, 0.003, 0.0, -5.2],
    [-0.004, 0.998, 0.0, 3.1],
    [0.0, 0.0, 1.0, -12.5],
    [0.0, 0.0, 0.0, 1.0],
];

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9
}

#[tokio::test]
async fn test_failed_move_forces_rehome() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;
    hw.move_to(Mount::Right, Point::new(100.0, 100.0, 100.0), None, None)
        .await
        .unwrap();

    backend.fail_moves(true);
    let result = hw
        .move_to(Mount::Right, Point::new(120.0, 100.0, 100.0), None, None)
        .await;
    assert!(matches!(result, Err(ControlError::Backend(_))));
    assert!(matches!(
        hw.current_position(Mount::Right, None).await,
        Err(ControlError::MustHome)
    ));

    backend.fail_moves(false);
    assert!(matches!(
        hw.move_rel(Mount::Right, Point::new(1.0, 0.0, 0.0), None).await,
        Err(ControlError::MustHome)
    ));
    hw.home(None).await.unwrap();
    assert_eq!(
        hw.gantry_position(Mount::Right, None).await.unwrap(),
        Point::new(418.0, 353.0, 218.0)
    );
}

#[tokio::test]
async fn test_skewed_calibration_issues_raw_targets() {
    let mut config = RobotConfig::default();
    config.gantry_calibration = SKEWED;
    let (hw, backend) = homed(Simulator::new(), config).await;
    let cal = GantryCalibration::new(SKEWED).unwrap();

    let target = Point::new(150.0, 200.0, 100.0);
    hw.move_to(Mount::Right, target, None, None).await.unwrap();

    let moves = backend.moves();
    let (raw, _, _) = moves.last().unwrap();
    let expected = cal.to_raw(target);
    assert!(close(Point::new(raw[&Axis::X], raw[&Axis::Y], raw[&Axis::A]), expected));
    assert!(close(hw.gantry_position(Mount::Right, None).await.unwrap(), target));
}

#[tokio::test]
async fn test_mount_switch_retracts_previous_mount_once() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;

    hw.move_to(Mount::Left, Point::new(200.0, 200.0, 150.0), None, None)
        .await
        .unwrap();
    hw.move_to(Mount::Left, Point::new(210.0, 200.0, 150.0), None, None)
        .await
        .unwrap();
    assert!(backend.fast_homes().is_empty());

    hw.move_to(Mount::Right, Point::new(200.0, 200.0, 150.0), None, None)
        .await
        .unwrap();
    assert_eq!(backend.fast_homes(), vec![(Axis::Z, 10.0)]);

    // The retraction precedes the right mount's move.
    let events = backend.events();
    let retract_at = events
        .iter()
        .position(|e| matches!(e, Event::FastHome { .. }))
        .unwrap();
    assert!(matches!(&events[retract_at + 1], Event::Move { target, .. } if target.contains_key(&Axis::A)));

    hw.move_rel(Mount::Right, Point::new(0.0, 0.0, 5.0), None)
        .await
        .unwrap();
    assert_eq!(backend.fast_homes().len(), 1);
}

#[tokio::test]
async fn test_mount_recorded_even_when_move_fails() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;
    hw.move_to(Mount::Left, Point::new(200.0, 200.0, 150.0), None, None)
        .await
        .unwrap();

    backend.fail_moves(true);
    assert!(hw
        .move_to(Mount::Right, Point::new(200.0, 200.0, 150.0), None, None)
        .await
        .is_err());
    backend.fail_moves(false);
    hw.home(None).await.unwrap();
    backend.clear_events();

    // Right is now the last moved mount: no retraction for another right move.
    hw.move_to(Mount::Right, Point::new(100.0, 100.0, 100.0), None, None)
        .await
        .unwrap();
    assert!(backend.fast_homes().is_empty());
}

#[tokio::test]
async fn test_out_of_bounds_move_is_not_rejected() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;
    hw.move_to(Mount::Right, Point::new(500.0, 100.0, 100.0), None, None)
        .await
        .unwrap();
    let moves = backend.moves();
    assert_eq!(moves.last().unwrap().0[&Axis::X], 500.0);
}

#[tokio::test]
async fn test_gantry_and_plunger_homed_separately() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;
    hw.home(None).await.unwrap();
    let homes: Vec<Vec<Axis>> = backend
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Home(axes) => Some(axes),
            _ => None,
        })
        .collect();
    assert_eq!(homes, vec![Axis::GANTRY.to_vec(), vec![Axis::B, Axis::C]]);

    hw.update_gantry_calibration(IDENTITY_CALIBRATION).await.unwrap();
    // Unchanged calibration keeps the cache.
    assert!(hw.gantry_position(Mount::Left, None).await.is_ok());
}

#[tokio::test]
async fn test_plunger_move_keeps_rehome_lockout() {
    let sim = Simulator::new().with_instrument(Mount::Right, "p300_single_v1", None);
    let (hw, backend) = homed(sim, RobotConfig::default()).await;
    hw.move_to(Mount::Right, Point::new(100.0, 100.0, 100.0), None, None)
        .await
        .unwrap();

    backend.fail_moves(true);
    assert!(hw
        .move_to(Mount::Right, Point::new(120.0, 100.0, 100.0), None, None)
        .await
        .is_err());
    backend.fail_moves(false);
    backend.clear_events();

    assert!(matches!(
        hw.aspirate(Mount::Right, Some(10.0), 1.0).await,
        Err(ControlError::MustHome)
    ));
    assert!(matches!(
        hw.move_to(Mount::Right, Point::new(50.0, 50.0, 50.0), None, None)
            .await,
        Err(ControlError::MustHome)
    ));
    assert!(backend.moves().is_empty());
}

#[tokio::test]
async fn test_unhomed_coordinator_refuses_plunger_and_gantry_moves() {
    let sim = Simulator::new().with_instrument(Mount::Right, "p300_single_v1", None);
    let backend = Arc::new(RecordingBackend::new(sim));
    let hw = HardwareControl::new(backend.clone(), RobotConfig::default()).unwrap();
    hw.cache_instruments(&BTreeMap::new()).await.unwrap();

    assert!(matches!(
        hw.aspirate(Mount::Right, Some(10.0), 1.0).await,
        Err(ControlError::MustHome)
    ));
    assert!(matches!(
        hw.move_to(Mount::Right, Point::new(50.0, 50.0, 50.0), None, None)
            .await,
        Err(ControlError::MustHome)
    ));
    assert!(backend.moves().is_empty());
}

#[tokio::test]
async fn test_halt_during_move_forces_rehome() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;

    let mover = Arc::clone(&hw);
    let in_flight = tokio::spawn(async move {
        mover
            .move_to(Mount::Right, Point::new(100.0, 100.0, 100.0), None, None)
            .await
    });
    // Let the move reach the backend and park there with the motion lock held.
    tokio::task::yield_now().await;
    hw.halt().await.unwrap();

    // The interrupted move still reports success.
    in_flight.await.unwrap().unwrap();
    assert_eq!(backend.moves().len(), 1);
    assert!(matches!(
        hw.gantry_position(Mount::Right, None).await,
        Err(ControlError::MustHome)
    ));
    assert!(matches!(
        hw.move_rel(Mount::Right, Point::new(1.0, 0.0, 0.0), None).await,
        Err(ControlError::MustHome)
    ));

    hw.home(None).await.unwrap();
    assert!(hw.gantry_position(Mount::Right, None).await.is_ok());
}
