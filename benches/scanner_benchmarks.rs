//! Performance benchmarks for the scanning pipeline
//!
//! Run with: cargo bench
//!
//! Detection runs on every Nth preview frame, so it has to fit comfortably
//! inside N frame intervals. The tracker runs once per detection and should
//! be negligible next to it.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crabscan::detection::{otsu_threshold, DetectorAccuracy, LuminanceQuadDetector, QuadDetector};
use crabscan::testing::synthetic_document_frame;
use crabscan::{Rect, StabilityTracker};

fn bench_tracker(c: &mut Criterion) {
    let steady = Rect::new(100.0, 80.0, 400.0, 300.0);
    let jitter: Vec<Rect> = (0..64)
        .map(|i| Rect::new(100.0 + (i % 7) as f64, 80.0 - (i % 5) as f64, 400.0, 300.0))
        .collect();

    c.bench_function("tracker_evaluate_steady", |b| {
        let mut tracker = StabilityTracker::default();
        b.iter(|| black_box(tracker.evaluate(black_box(&steady))))
    });

    c.bench_function("tracker_evaluate_jitter", |b| {
        let mut tracker = StabilityTracker::default();
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % jitter.len();
            black_box(tracker.evaluate(&jitter[i]))
        })
    });
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("luminance_detect");
    group.sample_size(20);

    for &(width, height) in &[(640u32, 480u32), (1280, 720)] {
        let doc = Rect::new(
            width as f64 * 0.2,
            height as f64 * 0.15,
            width as f64 * 0.6,
            height as f64 * 0.7,
        );
        let frame = synthetic_document_frame(width, height, Some(doc));
        group.throughput(Throughput::Elements((width * height) as u64));

        for accuracy in [DetectorAccuracy::High, DetectorAccuracy::Low] {
            let id = BenchmarkId::new(format!("{:?}", accuracy), format!("{}x{}", width, height));
            group.bench_with_input(id, &frame, |b, frame| {
                let mut detector = LuminanceQuadDetector::new(accuracy);
                b.iter(|| black_box(detector.detect(frame).ok()))
            });
        }
    }
    group.finish();
}

fn bench_otsu(c: &mut Criterion) {
    let samples: Vec<u8> = (0..640 * 480).map(|i| (i % 251) as u8).collect();
    c.bench_function("otsu_640x480", |b| b.iter(|| otsu_threshold(black_box(&samples))));
}

criterion_group!(benches, bench_tracker, bench_detection, bench_otsu);
criterion_main!(benches);
