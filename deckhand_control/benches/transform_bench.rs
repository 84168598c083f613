//! Coordinate transform micro-benchmark.
//!
//! Measures the per-move cost of the deck calibration:
//! - Point forward and inverse transforms
//! - Axis-map transform as issued by every move
//! - Full position rebuild after a home or probe

use criterion::{Criterion, criterion_group, criterion_main};
use deckhand_common::types::{Axis, AxisMap, Point};
use deckhand_control::GantryCalibration;
use std::hint::black_box;

const SKEWED: [[f64; 4]; 4] = [
    [1.002, 0.003, 0.0, -5.2],
    [-0.004, 0.998, 0.0, 3.1],
    [0.0, 0.0, 1.0, -12.5],
    [0.0, 0.0, 0.0, 1.0],
];

fn bench_point_transform(c: &mut Criterion) {
    let cal = GantryCalibration::new(SKEWED).expect("invertible");
    let point = Point::new(150.0, 200.0, 100.0);

    c.bench_function("to_raw", |b| b.iter(|| cal.to_raw(black_box(point))));
    c.bench_function("to_deck", |b| b.iter(|| cal.to_deck(black_box(point))));
}

fn bench_axis_map(c: &mut Criterion) {
    let cal = GantryCalibration::new(SKEWED).expect("invertible");
    let target: AxisMap = [(Axis::X, 100.0), (Axis::Y, 50.0), (Axis::A, 80.0), (Axis::C, 7.5)].into();
    let raw: AxisMap = [
        (Axis::X, 418.0),
        (Axis::Y, 353.0),
        (Axis::Z, 218.0),
        (Axis::A, 218.0),
        (Axis::B, 19.0),
        (Axis::C, 19.0),
    ]
    .into();

    c.bench_function("axes_to_raw", |b| {
        b.iter(|| cal.axes_to_raw(black_box(&target)))
    });
    c.bench_function("deck_from_raw", |b| {
        b.iter(|| cal.deck_from_raw(black_box(&raw)))
    });
}

criterion_group!(benches, bench_point_transform, bench_axis_map);
criterion_main!(benches);
