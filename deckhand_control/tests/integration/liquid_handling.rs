//! Aspirate, dispense, blow-out and tip handling against the recorder.

use super::{homed, volume};
use deckhand_common::config::RobotConfig;
use deckhand_common::consts::{PICK_UP_SPEED, SHAKE_OFF_TIPS_SPEED};
use deckhand_common::types::{Axis, Mount};
use deckhand_control::ControlError;
use deckhand_control::liquid::{DEFAULT_INCREMENT, DEFAULT_PRESSES};
use deckhand_hal::Simulator;

fn p300_right() -> Simulator {
    Simulator::new().with_instrument(Mount::Right, "p300_single_v1", Some("P3S0001"))
}

#[tokio::test]
async fn test_volume_accumulates_until_headroom() {
    let (hw, _) = homed(p300_right(), RobotConfig::default()).await;
    hw.aspirate(Mount::Right, Some(100.0), 1.0).await.unwrap();
    hw.aspirate(Mount::Right, Some(150.0), 1.0).await.unwrap();
    assert_eq!(volume(&hw, Mount::Right), 250.0);

    let result = hw.aspirate(Mount::Right, Some(100.0), 1.0).await;
    assert!(matches!(
        result,
        Err(ControlError::VolumeExceeded { requested, available, .. })
            if requested == 100.0 && available == 50.0
    ));
    assert_eq!(volume(&hw, Mount::Right), 250.0);
}

#[tokio::test]
async fn test_aspirate_speed_scales_with_rate() {
    let (hw, backend) = homed(p300_right(), RobotConfig::default()).await;
    hw.aspirate(Mount::Right, Some(50.0), 0.5).await.unwrap();
    let moves = backend.moves();
    let (target, speed, currents) = moves.last().unwrap();
    assert!(target.contains_key(&Axis::C));
    assert_eq!(*speed, Some(75.0));
    assert_eq!(currents[&Axis::C], 0.3);
}

#[tokio::test]
async fn test_dispense_clamps_to_current_volume() {
    let (hw, backend) = homed(p300_right(), RobotConfig::default()).await;
    hw.aspirate(Mount::Right, Some(40.0), 1.0).await.unwrap();
    hw.dispense(Mount::Right, Some(500.0), 1.0).await.unwrap();
    assert_eq!(volume(&hw, Mount::Right), 0.0);

    // The plunger returns to the bottom stop, never past it.
    let moves = backend.moves();
    assert_eq!(moves.last().unwrap().0[&Axis::C], 2.0);
}

#[tokio::test]
async fn test_failed_plunger_move_zeroes_volume() {
    let (hw, backend) = homed(p300_right(), RobotConfig::default()).await;
    hw.aspirate(Mount::Right, Some(50.0), 1.0).await.unwrap();

    backend.fail_moves(true);
    assert!(hw.aspirate(Mount::Right, Some(10.0), 1.0).await.is_err());
    assert_eq!(volume(&hw, Mount::Right), 0.0);

    backend.fail_moves(false);
    hw.home(None).await.unwrap();
    hw.aspirate(Mount::Right, Some(50.0), 1.0).await.unwrap();
    backend.fail_moves(true);
    assert!(hw.blow_out(Mount::Right).await.is_err());
    assert_eq!(volume(&hw, Mount::Right), 0.0);
}

#[tokio::test]
async fn test_operations_require_pipette() {
    let (hw, _) = homed(p300_right(), RobotConfig::default()).await;
    assert!(matches!(
        hw.aspirate(Mount::Left, Some(10.0), 1.0).await,
        Err(ControlError::NotAttached(Mount::Left))
    ));
    assert!(matches!(
        hw.pick_up_tip(Mount::Left, 51.7, DEFAULT_PRESSES, DEFAULT_INCREMENT).await,
        Err(ControlError::NotAttached(Mount::Left))
    ));
}

#[tokio::test]
async fn test_pick_up_press_schedule() {
    let (hw, backend) = homed(p300_right(), RobotConfig::default()).await;
    let idle_current = backend.sim.active_currents()[&Axis::A];

    hw.pick_up_tip(Mount::Right, 51.7, DEFAULT_PRESSES, DEFAULT_INCREMENT)
        .await
        .unwrap();

    let presses: Vec<_> = backend
        .moves()
        .into_iter()
        .filter(|(_, speed, _)| *speed == Some(PICK_UP_SPEED))
        .collect();
    let depths: Vec<f64> = presses.iter().map(|(t, _, _)| 218.0 - t[&Axis::A]).collect();
    assert_eq!(depths, vec![10.0, 11.0, 12.0]);
    for (_, _, currents) in &presses {
        assert_eq!(currents[&Axis::A], 0.1);
    }

    // Pressing current is undone after each press.
    assert_eq!(backend.sim.active_currents()[&Axis::A], idle_current);
    // Final retract by the pick-up distance.
    assert_eq!(backend.fast_homes().last(), Some(&(Axis::A, 10.0)));
    // No shake for a model without the quirk.
    assert!(backend
        .moves()
        .iter()
        .all(|(_, speed, _)| *speed != Some(SHAKE_OFF_TIPS_SPEED)));

    let summary = hw.attached_instruments()[&Mount::Right].clone().unwrap();
    assert!(summary.has_tip);
    assert_eq!(summary.current_volume, 0.0);
}

#[tokio::test]
async fn test_sticky_model_shakes_twice_after_pickup() {
    let sim = Simulator::new().with_instrument(Mount::Left, "p1000_single_v1", None);
    let (hw, backend) = homed(sim, RobotConfig::default()).await;
    hw.pick_up_tip(Mount::Left, 76.7, DEFAULT_PRESSES, DEFAULT_INCREMENT)
        .await
        .unwrap();

    let shakes = backend
        .moves()
        .iter()
        .filter(|(_, speed, _)| *speed == Some(SHAKE_OFF_TIPS_SPEED))
        .count();
    assert_eq!(shakes, 6);
    assert_eq!(backend.fast_homes().last(), Some(&(Axis::Z, 15.0)));
}

#[tokio::test]
async fn test_drop_tip_sequence() {
    let (hw, backend) = homed(p300_right(), RobotConfig::default()).await;
    hw.add_tip(Mount::Right, 51.7).unwrap();
    hw.aspirate(Mount::Right, Some(30.0), 1.0).await.unwrap();
    backend.clear_events();

    hw.drop_tip(Mount::Right, true).await.unwrap();

    let moves = backend.moves();
    let eject = moves
        .iter()
        .find(|(t, speed, _)| t.get(&Axis::C) == Some(&-5.0) && *speed == Some(5.0))
        .unwrap();
    assert_eq!(eject.2[&Axis::C], 0.5);

    let shakes = moves
        .iter()
        .filter(|(_, speed, _)| *speed == Some(SHAKE_OFF_TIPS_SPEED))
        .count();
    assert_eq!(shakes, 3);

    assert_eq!(backend.fast_homes(), vec![(Axis::C, 7.0)]);
    assert_eq!(moves.last().unwrap().0[&Axis::C], 7.0);
    assert_eq!(backend.sim.active_currents()[&Axis::C], 0.3);

    let summary = hw.attached_instruments()[&Mount::Right].clone().unwrap();
    assert!(!summary.has_tip);
    assert_eq!(summary.current_volume, 0.0);
}
