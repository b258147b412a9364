//! Benchmarks for ball track clean-up and homography fitting

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hooptrack::{BallDetection, BallTrack, BallTrackParams, Bbox, Homography, ObjectTracks, RansacParams};
use nalgebra::Point2;
use ndarray::Array2;
use std::hint::black_box;

/// Ball bouncing across the frame with periodic dropouts and glitches
fn create_ball_detections(n_frames: usize) -> Vec<Vec<BallDetection>> {
    (0..n_frames)
        .map(|frame| {
            if frame % 7 == 3 {
                return vec![];
            }
            let x = if frame % 53 == 0 {
                5000.0 // glitch far away from the real ball
            } else {
                (frame * 6 % 1800) as f32
            };
            let y = 400.0 + ((frame as f32) * 0.2).sin() * 200.0;
            vec![
                BallDetection {
                    bbox: Bbox::new(x, y, x + 12.0, y + 12.0),
                    confidence: 0.8,
                },
                BallDetection {
                    bbox: Bbox::new(x + 300.0, y, x + 312.0, y + 12.0),
                    confidence: 0.3,
                },
            ]
        })
        .collect()
}

fn create_tracker_rows(n_players: usize, n_frames: usize) -> Vec<Array2<f32>> {
    (0..n_frames)
        .map(|frame| {
            let mut data = Vec::with_capacity(n_players * 5);
            for i in 0..n_players {
                let x = (frame * 3 + i * 150) as f32;
                let y = (i * 40) as f32;
                data.extend(&[x, y, x + 60.0, y + 160.0, i as f32]); // [x1, y1, x2, y2, id]
            }
            Array2::from_shape_vec((n_players, 5), data).unwrap()
        })
        .collect()
}

fn bench_ball_cleanup(c: &mut Criterion) {
    let params = BallTrackParams {
        max_ball_speed_px_per_frame: 25.0,
        max_interpolation_gap: 30,
    };
    let mut group = c.benchmark_group("ball_cleanup");

    for &n_frames in &[300, 3000, 30000] {
        let detections = create_ball_detections(n_frames);
        group.bench_with_input(BenchmarkId::new("frames", n_frames), &detections, |b, detections| {
            b.iter(|| {
                BallTrack::from_detections(black_box(detections))
                    .remove_wrong_detections(&params)
                    .interpolate_ball_positions(&params)
            })
        });
    }
    group.finish();
}

fn bench_tracker_rows(c: &mut Criterion) {
    let rows = create_tracker_rows(10, 1000);

    c.bench_function("tracker_rows_10_players_1000_frames", |b| {
        b.iter(|| ObjectTracks::from_tracker_rows(black_box(&rows)))
    });
}

fn bench_homography(c: &mut Criterion) {
    let truth = Homography::from_matrix(nalgebra::Matrix3::new(
        0.8, 0.1, 20.0, //
        -0.05, 0.9, 15.0, //
        0.0001, 0.0002, 1.0,
    ));
    let src: Vec<Point2<f64>> = (0..12)
        .map(|i| Point2::new((i % 4) as f64 * 400.0 + 50.0, (i / 4) as f64 * 250.0 + 80.0))
        .collect();
    let mut dst: Vec<Point2<f64>> = src.iter().filter_map(|p| truth.project(p)).collect();
    dst[5] = Point2::new(900.0, -300.0);

    c.bench_function("homography_estimate_12_points", |b| {
        b.iter(|| Homography::estimate(black_box(&src), black_box(&dst)).unwrap())
    });

    c.bench_function("homography_ransac_12_points", |b| {
        b.iter(|| Homography::estimate_ransac(black_box(&src), black_box(&dst), &RansacParams::default()).unwrap())
    });
}

criterion_group!(benches, bench_ball_cleanup, bench_tracker_rows, bench_homography);
criterion_main!(benches);
