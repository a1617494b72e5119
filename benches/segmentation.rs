//! Criterion benchmarks for the analysis pipeline.
//!
//! Run with: `cargo bench --bench segmentation`
//! With rayon: `cargo bench --bench segmentation --features parallel`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use physio_analyzer::{
    analyze_activity, compute_power_peaks, find_stable_windows, AnalysisConfig, Sample,
    SegmentationConfig, PEAK_DURATIONS,
};

/// Synthetic ride: five-minute blocks alternating between coupled
/// sinusoidal efforts and steady efforts with creeping HR.
fn synthetic_ride(seconds: usize) -> Vec<Sample> {
    (0..seconds)
        .map(|t| {
            let block = t / 300;
            let phase = (t % 300) as f64;
            let (power, hr) = if block % 2 == 0 {
                let p = 180.0 + 60.0 * (t as f64 / 12.0).sin();
                (p, 0.28 * p + 88.0 + block as f64)
            } else {
                (210.0, 145.0 + 0.05 * phase)
            };
            Sample::new(t as f64, power, hr)
        })
        .collect()
}

fn bench_stable_windows(c: &mut Criterion) {
    let mut group = c.benchmark_group("stable_windows");
    let config = SegmentationConfig::default();

    for minutes in [15usize, 60] {
        let samples = synthetic_ride(minutes * 60);
        group.throughput(Throughput::Elements(samples.len() as u64));
        group.bench_with_input(BenchmarkId::new("find_stable_windows", minutes), &samples, |b, samples| {
            b.iter(|| find_stable_windows(black_box(samples), black_box(&config)));
        });
    }

    group.finish();
}

fn bench_power_peaks(c: &mut Criterion) {
    let samples = synthetic_ride(3600);
    c.bench_function("compute_power_peaks_1h", |b| {
        b.iter(|| compute_power_peaks(black_box(&samples), black_box(PEAK_DURATIONS)));
    });
}

fn bench_full_analysis(c: &mut Criterion) {
    let samples = synthetic_ride(3600);
    let config = AnalysisConfig::default();
    let mut group = c.benchmark_group("analyze_activity");
    group.sample_size(10);
    group.bench_function("1h", |b| {
        b.iter(|| analyze_activity(black_box(&samples), black_box(&config)));
    });
    group.finish();
}

criterion_group!(benches, bench_stable_windows, bench_power_peaks, bench_full_analysis);
criterion_main!(benches);
