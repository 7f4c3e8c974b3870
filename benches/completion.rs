//! Performance benchmarks for candidate completion and scoring.
//!
//! Run with: `cargo bench --bench completion`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Connected completion | <5ms for 64 blocks | BFS over open variables |
//! | Greedy completion | <20ms for 64 blocks | Per-constraint block scan |
//! | Fingerprint | <50µs | Cold xxh64 over the assignment |
//! | Shared provider | Linear scaling | One candidate per thread |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::thread;

use decomposition_kernel::{
    Candidate, CandidateId, IdAllocator, IdenticalLayoutOracle, RefinementPolicy, ScoreType,
    SparseIncidence,
};

const BLOCK_ROWS: usize = 8;
const BLOCK_COLS: usize = 12;

/// Block-angular pattern: `n_blocks` dense-ish blocks plus one master row
/// touching the first column of every block.
fn make_block_angular(n_blocks: usize) -> SparseIncidence {
    let n_vars = n_blocks * BLOCK_COLS;
    let mut rows = Vec::with_capacity(n_blocks * BLOCK_ROWS + 1);
    for b in 0..n_blocks {
        let first = b * BLOCK_COLS;
        for r in 0..BLOCK_ROWS {
            let row: Vec<usize> = (0..BLOCK_COLS)
                .filter(|c| (c + r) % 3 != 0)
                .map(|c| first + c)
                .collect();
            rows.push(row);
        }
    }
    rows.push((0..n_blocks).map(|b| b * BLOCK_COLS).collect());
    SparseIncidence::from_rows(n_vars, &rows).expect("bench pattern within dimensions")
}

/// Candidate with the coupling row already in the master.
fn make_seeded(inc: &SparseIncidence, id: u64) -> Candidate {
    let mut cand = Candidate::for_problem(CandidateId::new(id), inc);
    cand.set_cons_to_master(cand.n_conss() - 1).expect("open master row");
    cand
}

/// Benchmark each completion strategy on growing problems.
fn bench_completion(c: &mut Criterion) {
    let policy = RefinementPolicy::default();
    let mut group = c.benchmark_group("completion");

    for n_blocks in [4, 16, 64] {
        let inc = make_block_angular(n_blocks);
        group.throughput(Throughput::Elements(inc.n_nonzeros() as u64));

        group.bench_with_input(BenchmarkId::new("connected", n_blocks), &inc, |b, inc| {
            b.iter(|| {
                let mut cand = make_seeded(inc, 1);
                cand.complete_by_connected(black_box(inc), &policy).expect("completion");
                cand
            })
        });

        group.bench_with_input(BenchmarkId::new("conss_adjacency", n_blocks), &inc, |b, inc| {
            b.iter(|| {
                let mut cand = make_seeded(inc, 1);
                cand.complete_by_connected_conss_adjacency(black_box(inc), &policy)
                    .expect("completion");
                cand
            })
        });

        group.bench_with_input(BenchmarkId::new("greedy", n_blocks), &inc, |b, inc| {
            b.iter(|| {
                let mut cand = make_seeded(inc, 1);
                cand.complete_greedily(black_box(inc), &policy).expect("completion");
                cand
            })
        });
    }

    group.finish();
}

/// Benchmark fingerprinting and scoring of a completed candidate.
fn bench_fingerprint_and_scores(c: &mut Criterion) {
    let inc = make_block_angular(64);
    let mut done = make_seeded(&inc, 1);
    done.complete_by_connected(&inc, &RefinementPolicy::default())
        .expect("completion");
    let reversed: Vec<usize> = (0..done.n_blocks()).rev().collect();

    c.bench_function("fingerprint_cold", |b| {
        b.iter(|| {
            // Fork keeps the memo; reordering clears it.
            let mut cand = done.fork(CandidateId::new(2));
            cand.permute_blocks(&reversed).expect("no stairlinking");
            black_box(cand.hash_value())
        })
    });

    let mut group = c.benchmark_group("score");
    for ty in [ScoreType::MaxWhite, ScoreType::Classic, ScoreType::SetPartForeseeingWhiteAgg] {
        group.bench_with_input(BenchmarkId::from_parameter(ty), &ty, |b, &ty| {
            b.iter(|| {
                let mut cand = done.fork(CandidateId::new(3));
                cand.recompute_score(ty, black_box(&inc), &IdenticalLayoutOracle)
                    .expect("complete candidate")
            })
        });
    }
    group.finish();
}

/// Benchmark many candidates refined concurrently against one provider.
fn bench_shared_provider(c: &mut Criterion) {
    let inc = make_block_angular(16);
    let policy = RefinementPolicy::default();
    let mut group = c.benchmark_group("shared_provider");

    for num_threads in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(num_threads as u64));
        group.bench_with_input(BenchmarkId::new("threads", num_threads), &num_threads, |b, &n| {
            b.iter(|| {
                let ids = IdAllocator::new();
                thread::scope(|s| {
                    for _ in 0..n {
                        let (inc, policy, ids) = (&inc, &policy, &ids);
                        s.spawn(move || {
                            let mut cand = make_seeded(inc, ids.next_id().as_u64());
                            cand.complete_by_connected(inc, policy).expect("completion");
                            black_box(cand.hash_value())
                        });
                    }
                });
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_completion,
    bench_fingerprint_and_scores,
    bench_shared_provider,
);
criterion_main!(benches);
