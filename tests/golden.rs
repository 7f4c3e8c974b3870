//! Golden tests for the Decomposition Kernel.
//!
//! These tests pin end-to-end behavior of candidate refinement: completion,
//! stairlinking, fingerprinting and scoring on small hand-checked problems.

use decomposition_kernel::{
    canonical_hash_hex, Candidate, CandidateError, CandidateId, CandidateState, Classifier,
    ConsRole, IdAllocator, IdenticalLayoutOracle, IncidenceProvider, NoEquivalence, RefinementPolicy, ScoreType,
    SparseIncidence, VarRole,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two independent 2x2 blocks:
///
/// ```text
///      v0 v1 v2 v3
/// c0 [ x  x  .  . ]
/// c1 [ x  x  .  . ]
/// c2 [ .  .  x  x ]
/// c3 [ .  .  x  x ]
/// ```
fn build_two_components() -> SparseIncidence {
    SparseIncidence::from_rows(4, &[vec![0, 1], vec![0, 1], vec![2, 3], vec![2, 3]]).unwrap()
}

/// Four one-row blocks chained by variables out of staircase order:
/// v0 joins c0-c2, v1 joins c2-c1, v2 joins c1-c3.
fn build_scrambled_chain() -> (SparseIncidence, Candidate) {
    let inc = SparseIncidence::from_rows(3, &[vec![0], vec![1, 2], vec![0, 1], vec![2]]).unwrap();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    for b in 0..4 {
        cand.add_block();
        cand.set_cons_to_block(b, b).unwrap();
    }
    for v in 0..3 {
        cand.set_var_to_linking(v).unwrap();
    }
    (inc, cand)
}

/// Three one-row blocks whose variables form a cycle.
fn build_triangle() -> (SparseIncidence, Candidate) {
    let inc = SparseIncidence::from_rows(3, &[vec![0, 2], vec![0, 1], vec![1, 2]]).unwrap();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    for b in 0..3 {
        cand.add_block();
        cand.set_cons_to_block(b, b).unwrap();
    }
    for v in 0..3 {
        cand.set_var_to_linking(v).unwrap();
    }
    (inc, cand)
}

fn make_complete(inc: &SparseIncidence, id: u64) -> Candidate {
    let mut cand = Candidate::for_problem(CandidateId::new(id), inc);
    cand.complete_by_connected(inc, &RefinementPolicy::default()).unwrap();
    cand
}

// ─────────────────────────────────────────────────────────────────────────────
// COMPLETION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_two_components_become_two_blocks() {
    init_tracing();
    let inc = build_two_components();
    let cand = make_complete(&inc, 1);

    assert_eq!(cand.state(), CandidateState::Complete);
    assert_eq!(cand.n_blocks(), 2);
    assert_eq!(cand.conss_for_block(0), &[0, 1]);
    assert_eq!(cand.vars_for_block(0), &[0, 1]);
    assert_eq!(cand.conss_for_block(1), &[2, 3]);
    assert_eq!(cand.vars_for_block(1), &[2, 3]);
    assert!(cand.master_conss().is_empty());
    assert!(cand.linking_vars().is_empty());
    cand.check_consistency(&inc).unwrap();
}

#[test]
fn test_completion_strategies_agree_without_border() {
    let inc = build_two_components();
    let policy = RefinementPolicy::default();

    let by_vars = make_complete(&inc, 1);
    let mut by_adjacency = Candidate::for_problem(CandidateId::new(2), &inc);
    by_adjacency.complete_by_connected_conss_adjacency(&inc, &policy).unwrap();

    assert!(by_vars.is_equal(&by_adjacency));
    assert_eq!(by_vars.hash_value(), by_adjacency.hash_value());
}

#[test]
fn test_greedy_completion_is_total() {
    let inc = build_two_components();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    cand.complete_greedily(&inc, &RefinementPolicy::default()).unwrap();

    assert!(cand.is_complete());
    cand.check_consistency(&inc).unwrap();
    assert!(cand.n_blocks() >= 1);
}

#[test]
fn test_completion_keeps_master_decisions() {
    // c4 spans both components; sending it to the master first leaves
    // the two blocks intact and v4 ends up in the border.
    let inc = SparseIncidence::from_rows(
        5,
        &[vec![0, 1, 4], vec![0, 1], vec![2, 3], vec![2, 3, 4], vec![0, 2]],
    )
    .unwrap();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    cand.set_cons_to_master(4).unwrap();
    cand.set_var_to_linking(4).unwrap();
    cand.complete_by_connected(&inc, &RefinementPolicy::default()).unwrap();

    assert_eq!(cand.cons_role(4), ConsRole::Master);
    assert_eq!(cand.var_role(4), VarRole::Linking);
    assert_eq!(cand.n_blocks(), 2);
    cand.check_consistency(&inc).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// BOOKING TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_first_booking_wins_in_flush_order() {
    let inc = build_two_components();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    cand.add_block();
    cand.book_var_to_block(0, 0).unwrap();
    cand.book_var_to_linking(0).unwrap();
    cand.book_cons_to_block(0, 0).unwrap();
    cand.book_cons_to_master(0).unwrap();
    cand.book_var_to_block(1, 0).unwrap();
    assert!(cand.has_pending_bookings());

    cand.flush().unwrap();

    assert!(!cand.has_pending_bookings());
    assert_eq!(cand.cons_role(0), ConsRole::Master);
    assert_eq!(cand.var_role(0), VarRole::Linking);
    assert_eq!(cand.var_role(1), VarRole::Block(0));
    cand.check_consistency(&inc).unwrap();
}

#[test]
fn test_invalid_stairlinking_booking_is_rejected() {
    let inc = build_two_components();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    cand.add_block();
    // Block 0 has no successor.
    assert!(cand.book_var_to_stairlinking(0, 0).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// IMPLICIT REFINEMENT TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_consider_implicits_is_idempotent() {
    init_tracing();
    let inc = SparseIncidence::from_rows(3, &[vec![0, 1], vec![2]]).unwrap();
    let policy = RefinementPolicy::default();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    cand.add_block();
    cand.set_cons_to_block(0, 0).unwrap();

    let first = cand.consider_implicits(&inc, &policy).unwrap();
    assert!(first >= 2);
    assert_eq!(cand.var_role(0), VarRole::Block(0));
    assert_eq!(cand.var_role(1), VarRole::Block(0));

    let hash = cand.hash_value();
    let second = cand.consider_implicits(&inc, &policy).unwrap();
    assert_eq!(second, 0);
    assert_eq!(cand.hash_value(), hash);
}

#[test]
fn test_classes_to_master_recorded_in_lineage() {
    let inc = build_two_components();
    let classifier = Classifier::constraints(
        "by_row",
        vec!["top".to_string(), "bottom".to_string()],
        vec![0, 0, 1, 1],
    )
    .unwrap();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    let moved = cand
        .assign_classes_to_master(&inc, &classifier, &[1], &[], &RefinementPolicy::default())
        .unwrap();

    assert_eq!(moved, 2);
    assert_eq!(cand.master_conss(), &[2, 3]);
    let step = cand.lineage().steps().last().unwrap();
    assert!(step.detector.contains("by_row"));
    assert!(step.classifier.is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// STAIRLINKING TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scrambled_chain_reordered_into_staircase() {
    init_tracing();
    let (inc, mut cand) = build_scrambled_chain();
    let graph = cand.block_graph(&inc);
    assert_eq!(graph.n_edges(), 3);

    let report = cand.find_stairlinking(&inc, &RefinementPolicy::strict()).unwrap();

    assert!(report.perfect);
    assert!(report.reordered());
    assert_eq!(report.order, Some(vec![0, 2, 1, 3]));
    assert_eq!(report.to_stairlinking, 3);
    assert!(cand.linking_vars().is_empty());
    assert_eq!(cand.var_role(0), VarRole::Stairlinking(0));
    assert_eq!(cand.var_role(1), VarRole::Stairlinking(1));
    assert_eq!(cand.var_role(2), VarRole::Stairlinking(2));
    cand.check_consistency(&inc).unwrap();
}

#[test]
fn test_stairlinking_vars_touch_only_their_two_blocks() {
    let (inc, mut cand) = build_scrambled_chain();
    cand.find_stairlinking(&inc, &RefinementPolicy::default()).unwrap();

    for b in 0..cand.n_blocks() {
        for &v in cand.stairlinking_vars(b) {
            for &c in inc.conss_of(v) {
                let role = cand.cons_role(c);
                assert!(
                    role == ConsRole::Block(b) || role == ConsRole::Block(b + 1),
                    "var {} in block {} hits {:?}",
                    v,
                    b,
                    role
                );
            }
        }
    }
}

#[test]
fn test_cycle_abandoned_under_strict_policy() {
    let (inc, mut cand) = build_triangle();
    let before = cand.hash_value();

    let report = cand.find_stairlinking(&inc, &RefinementPolicy::strict()).unwrap();

    assert!(report.is_abandoned());
    assert_eq!(cand.hash_value(), before);
    assert_eq!(cand.linking_vars().len(), 3);
}

#[test]
fn test_cycle_resolved_by_heuristic() {
    let (inc, mut cand) = build_triangle();
    let report = cand.find_stairlinking(&inc, &RefinementPolicy::default()).unwrap();

    assert!(!report.perfect);
    assert_eq!(report.to_stairlinking + cand.linking_vars().len(), 3);
    cand.check_consistency(&inc).unwrap();
}

#[test]
fn test_stairlinking_blocks_reordering() {
    let (inc, mut cand) = build_scrambled_chain();
    cand.find_stairlinking(&inc, &RefinementPolicy::default()).unwrap();

    let err = cand.permute_blocks(&[3, 2, 1, 0]).unwrap_err();
    assert!(!err.is_corrupt());
    cand.permute_blocks(&[0, 1, 2, 3]).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// FINGERPRINT TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_hash_stable_across_100_runs() {
    let inc = build_two_components();
    let expected = make_complete(&inc, 1).hash_value();
    for i in 0..100 {
        assert_eq!(make_complete(&inc, i).hash_value(), expected, "run {}", i);
    }
}

#[test]
fn test_hash_invariant_under_block_permutation() {
    let inc = build_two_components();
    let cand = make_complete(&inc, 1);
    let mut swapped = cand.fork(CandidateId::new(2));
    swapped.permute_blocks(&[1, 0]).unwrap();

    assert_eq!(swapped.conss_for_block(0), &[2, 3]);
    assert_eq!(cand.hash_value(), swapped.hash_value());
    assert!(cand.is_equal(&swapped));
}

#[test]
fn test_hash_distinguishes_assignments() {
    let inc = build_two_components();
    let cand = make_complete(&inc, 1);
    let mut other = Candidate::for_problem(CandidateId::new(2), &inc);
    other.set_cons_to_master(0).unwrap();
    other.complete_by_connected(&inc, &RefinementPolicy::default()).unwrap();

    assert_ne!(cand.hash_value(), other.hash_value());
    assert!(!cand.is_equal(&other));
}

#[test]
fn test_delete_empty_blocks_round_trip() {
    let inc = build_two_components();
    let mut cand = make_complete(&inc, 1);
    let before = cand.hash_value();

    cand.add_block();
    assert_ne!(cand.hash_value(), before);

    assert_eq!(cand.delete_empty_blocks(true).unwrap(), 1);
    assert_eq!(cand.n_blocks(), 2);
    assert_eq!(cand.hash_value(), before);
    cand.check_consistency(&inc).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// SCORE TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_golden_scores_two_components() {
    let inc = build_two_components();
    let mut cand = make_complete(&inc, 1);
    let oracle = IdenticalLayoutOracle;

    let expect = [
        (ScoreType::BorderArea, 1.0),
        (ScoreType::BlockArea, 0.5),
        (ScoreType::MaxWhite, 0.5),
        (ScoreType::BlockAreaAgg, 0.75),
        (ScoreType::MaxForeseeingWhite, 0.5),
        (ScoreType::SetPartForeseeingWhite, 0.75),
    ];
    for (ty, value) in expect {
        let got = cand.score(ty, &inc, &oracle).unwrap();
        assert!((got - value).abs() < 1e-12, "{}: expected {}, got {}", ty, value, got);
    }
}

#[test]
fn test_upper_bound_monotone_during_refinement() {
    let inc = build_two_components();
    let policy = RefinementPolicy::default();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    let mut bounds = vec![cand.max_white_upper_bound()];

    cand.add_block();
    cand.set_cons_to_block(0, 0).unwrap();
    bounds.push(cand.max_white_upper_bound());

    cand.consider_implicits(&inc, &policy).unwrap();
    bounds.push(cand.max_white_upper_bound());

    cand.complete_by_connected(&inc, &policy).unwrap();
    bounds.push(cand.max_white_upper_bound());

    for pair in bounds.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "bound increased: {:?}", bounds);
    }
    let white = cand.score(ScoreType::MaxWhite, &inc, &NoEquivalence).unwrap();
    assert!(bounds[bounds.len() - 1] >= white - 1e-12);
}

#[test]
fn test_scoring_open_candidate_fails() {
    let inc = build_two_components();
    let mut cand = Candidate::for_problem(CandidateId::new(1), &inc);
    let err = cand.score(ScoreType::Classic, &inc, &NoEquivalence).unwrap_err();
    assert!(matches!(err, CandidateError::Incomplete { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// LINEAGE / POLICY TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_lineage_json_round_trip() {
    let inc = build_two_components();
    let ids = IdAllocator::starting_at(10);
    let parent = make_complete(&inc, ids.next_id().as_u64());
    let child = parent.fork(ids.next_id());

    assert_eq!(child.id(), CandidateId::new(11));
    assert_eq!(child.lineage().ancestors(), &[CandidateId::new(10)]);

    let json = parent.lineage_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let steps = value["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["detector"], "connected_components");
}

#[test]
fn test_policy_params_hash_golden() {
    let a = RefinementPolicy::default().params_hash().unwrap();
    let b = RefinementPolicy::default().params_hash().unwrap();
    let strict = RefinementPolicy::strict().params_hash().unwrap();

    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
    assert_ne!(a, strict);
    assert_eq!(canonical_hash_hex(&RefinementPolicy::default()).unwrap(), a);
}
