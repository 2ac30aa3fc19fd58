//! # moodmix Performance Benchmarks
//!
//! The k-d tree is rebuilt for every request, so construction cost matters as
//! much as search cost. These benchmarks cover both, plus the full playlist
//! path over in-memory and SQLite catalogs and the per-request emotion update.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench tree
//! cargo bench playlist
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use moodmix::algorithm::{self, NeighbourRanker, PlaylistParams, RankedCandidate, RestorePolicy};
use moodmix::db::{CandidateStore, Candidates, Catalog, CatalogRecord, MemoryCatalog};
use moodmix::emotion::{EmotionSample, EmotionWeights, EmotionWindow, MeanSnapshot, SlopeDetector};
use moodmix::features::{FeatureKey, FeatureKeys, FeatureVector};
use moodmix::genre::Genre;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tempfile::TempDir;

/// Helper function to create a catalog with random but reproducible features
fn create_test_records(count: usize) -> Vec<CatalogRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let features = FeatureKey::ALL
                .into_iter()
                .fold(FeatureVector::default(), |v, key| v.with(key, rng.gen_range(-1.0..1.0)));
            CatalogRecord {
                id: format!("song-{i}"),
                title: format!("Song {i}"),
                artist: format!("Artist {}", i % (count / 4).max(1)),
                album: None,
                duration_s: Some(rng.gen_range(120.0..420.0)),
                features,
                genres: vec![Genre::LABELS[i % Genre::LABELS.len()]],
            }
        })
        .collect()
}

fn random_candidates(count: usize, dims: usize) -> Candidates {
    let mut rng = StdRng::seed_from_u64(7);
    let mut candidates = Candidates::default();
    for i in 0..count {
        let vector = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        candidates.push(format!("song-{i}"), format!("Artist {}", i % 50), vector);
    }
    candidates
}

/// Benchmark k-d tree construction and search
fn benchmark_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");
    let seed = vec![0.1; 9];

    for size in [100, 1_000, 10_000].iter() {
        let candidates = random_candidates(*size, 9);

        group.bench_with_input(BenchmarkId::new("build", size), &candidates, |b, candidates| {
            b.iter(|| NeighbourRanker::new(black_box(candidates), &seed, 3).expect("valid points"))
        });

        let ranker = NeighbourRanker::new(&candidates, &seed, 3).expect("valid points");
        group.bench_with_input(BenchmarkId::new("ranked_16", size), &ranker, |b, ranker| {
            b.iter(|| ranker.ranked(black_box(16)).expect("lookup"))
        });
    }

    group.finish();
}

/// Benchmark the complete playlist path
fn benchmark_playlist(c: &mut Criterion) {
    let mut group = c.benchmark_group("playlist");
    let keys = FeatureKeys::new([FeatureKey::Valence, FeatureKey::Arousal]);
    let query = [0.3, -0.2];

    for size in [500, 5_000].iter() {
        let catalog = MemoryCatalog::new(create_test_records(*size));
        let candidates = catalog.candidates(Genre::None, &keys).expect("in-memory store");

        let params = PlaylistParams::default();
        group.bench_with_input(
            BenchmarkId::new("build_playlist", size),
            &candidates,
            |b, candidates| {
                b.iter(|| algorithm::build_playlist(black_box(candidates), &query, &params))
            },
        );
    }

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("bench.db");
    let mut catalog = Catalog::open(&db_path).expect("Failed to open catalog");
    catalog
        .insert_records(&create_test_records(2_000))
        .expect("Failed to insert records");

    group.bench_function("sqlite_candidates_2000", |b| {
        b.iter(|| catalog.candidates(black_box(Genre::None), &keys).expect("query"))
    });
    group.bench_function("sqlite_candidates_by_genre", |b| {
        b.iter(|| catalog.candidates(black_box(Genre::Jazz), &keys).expect("query"))
    });

    group.finish();
}

/// Benchmark artist deduplication with heavy duplication
fn benchmark_dedupe(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedupe");
    let ranked: Vec<RankedCandidate> = (0..256)
        .map(|i| RankedCandidate {
            id: format!("song-{i}"),
            distance: f64::from(i) * 0.01,
            artist: format!("Artist {}", i % 5),
        })
        .collect();

    for policy in [RestorePolicy::IndexOrder, RestorePolicy::DistanceOrder] {
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter_batched(
                || ranked.clone(),
                |ranked| algorithm::dedupe_artists(ranked, 16, policy),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Benchmark one emotion window update and score
fn benchmark_emotion(c: &mut Criterion) {
    let detector = SlopeDetector::default();
    let weights = EmotionWeights::default();

    c.bench_function("emotion_observe", |b| {
        b.iter_batched(
            || (EmotionWindow::filled(10, 0.5), MeanSnapshot::default()),
            |(mut window, mut old_mean)| {
                let sample = black_box(EmotionSample::new(0.2, -0.4));
                detector.observe(&mut window, &mut old_mean, sample, weights)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_tree,
    benchmark_playlist,
    benchmark_dedupe,
    benchmark_emotion
);

criterion_main!(benches);
