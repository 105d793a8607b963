//! Criterion benchmarks for the trust hot paths.
//!
//! Covers: credibility scoring, content filtering, and the duplicate scan.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crowdwatch_core::types::{Coordinates, DuplicateCandidate, ReportId};
use crowdwatch_trust::credibility::{CredibilityCalculator, CredibilityConfig};
use crowdwatch_trust::duplicate::DuplicateDetector;
use crowdwatch_trust::filter::{ContentFilter, FilterConfig, SuppliedContext};
use crowdwatch_trust::reputation::ReputationManager;

fn bench_credibility(c: &mut Criterion) {
    let calc = CredibilityCalculator::new(
        Arc::new(ReputationManager::default()),
        CredibilityConfig::default(),
    );

    c.bench_function("credibility_calculation", |b| {
        b.iter(|| calc.calculate_credibility(black_box("alice"), black_box(12), black_box(3), false))
    });
}

fn bench_filter(c: &mut Criterion) {
    let filter = match ContentFilter::new(FilterConfig::default()) {
        Ok(f) => f,
        Err(e) => panic!("default filter config: {e}"),
    };
    let text = "Có một vụ va chạm nhỏ ở cầu Chương Dương, gây ùn ứ vào khoảng 7h sáng.";

    c.bench_function("content_filter_accept", |b| {
        b.iter(|| filter.check(black_box(text), SuppliedContext::default()))
    });
}

fn bench_duplicate_scan(c: &mut Criterion) {
    // 1 000 nearby candidates with 64-dimensional embeddings.
    let here = Coordinates::new(21.0167, 105.8163);
    let candidates: Vec<DuplicateCandidate> = (0..1_000)
        .map(|i| DuplicateCandidate {
            id: ReportId(format!("r-{i}")),
            coordinates: Coordinates::new(here.latitude + (i % 10) as f64 * 0.001, here.longitude),
            embedding: (0..64).map(|d| ((i * 31 + d * 7) % 97) as f32 / 97.0).collect(),
        })
        .collect();
    let query: Vec<f32> = (0..64).map(|d| (d % 13) as f32 / 13.0).collect();
    let detector = DuplicateDetector::default();

    c.bench_function("duplicate_scan_1000", |b| {
        b.iter(|| detector.find_duplicate(black_box(&query), here, black_box(&candidates)))
    });
}

criterion_group!(benches, bench_credibility, bench_filter, bench_duplicate_scan);
criterion_main!(benches);
