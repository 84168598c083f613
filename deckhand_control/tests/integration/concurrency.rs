//! Concurrent access to the coordinator from several tasks.

use super::homed;
use deckhand_common::config::RobotConfig;
use deckhand_common::types::{Axis, Mount, Point};
use deckhand_hal::Simulator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Targets where y and z are fixed multiples of x, so a torn read shows up
/// as a point off the line.
fn target(i: usize) -> Point {
    let x = 10.0 + i as f64;
    Point::new(x, 2.0 * x, 3.0 * x)
}

fn on_line(p: Point) -> bool {
    (p.y - 2.0 * p.x).abs() < 1e-9 && (p.z - 3.0 * p.x).abs() < 1e-9
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_never_tear_the_cache() {
    let (hw, backend) = homed(Simulator::new(), RobotConfig::default()).await;
    hw.move_to(Mount::Right, target(0), None, None).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let hw = Arc::clone(&hw);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut reads = 0;
            while !done.load(Ordering::SeqCst) {
                let p = hw.gantry_position(Mount::Right, None).await.unwrap();
                assert!(on_line(p), "torn position {p}");
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        })
    };

    let writers: Vec<_> = (0..8)
        .map(|task| {
            let hw = Arc::clone(&hw);
            tokio::spawn(async move {
                for step in 0..10 {
                    hw.move_to(Mount::Right, target(task * 10 + step), None, None)
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.await.unwrap() > 0);

    assert_eq!(backend.max_in_flight(), 1);

    // The cache agrees with the backend's final position.
    let cached = hw.gantry_position(Mount::Right, None).await.unwrap();
    let raw = backend.sim.position();
    assert_eq!(cached, Point::new(raw[&Axis::X], raw[&Axis::Y], raw[&Axis::A]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_plunger_and_gantry_tasks_interleave_safely() {
    let sim = Simulator::new().with_instrument(Mount::Left, "p300_single_v1", None);
    let (hw, backend) = homed(sim, RobotConfig::default()).await;

    let pipetting = {
        let hw = Arc::clone(&hw);
        tokio::spawn(async move {
            for _ in 0..10 {
                hw.aspirate(Mount::Left, Some(10.0), 1.0).await.unwrap();
            }
        })
    };
    let moving = {
        let hw = Arc::clone(&hw);
        tokio::spawn(async move {
            for i in 0..10 {
                hw.move_to(Mount::Right, target(i), None, None).await.unwrap();
            }
        })
    };
    pipetting.await.unwrap();
    moving.await.unwrap();

    assert_eq!(backend.max_in_flight(), 1);
    let summary = hw.attached_instruments()[&Mount::Left].clone().unwrap();
    assert!((summary.current_volume - 100.0).abs() < 1e-9);
    // Non-mutating queries never touch the motion lock.
    assert!(hw.engaged_axes()[&Axis::X]);
}
