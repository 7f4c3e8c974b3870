//! # decomposition-kernel
//!
//! Stateful Dantzig-Wolfe decomposition candidates.
//!
//! A candidate assigns every constraint and variable of a problem to the
//! master, to one of several independent blocks, or to the variable border
//! (linking and stairlinking variables). Detectors build candidates
//! incrementally; this crate owns the representation and everything done
//! to it:
//!
//! > Given a partial assignment, complete it, check it, fingerprint it and
//! > score it.
//!
//! ## Core Contract
//!
//! 1. Mutations go through booking + flush or validated setters
//! 2. Every refinement leaves the candidate structurally consistent
//! 3. Equal assignments (up to block order) produce equal fingerprints
//! 4. Scores are deterministic functions of the assignment
//!
//! ## Architecture
//!
//! ```text
//! IncidenceProvider ──→ Candidate ──→ refinements ──→ complete Candidate
//!                          │                               │
//!                     BlockGraph                  fingerprint + scores
//!                  (stairlinking order)       (BlockEquivalenceOracle)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same provider + same refinement sequence + same policy → same assignment
//! - Block lists and border lists are always sorted
//! - Fingerprints use a fixed xxh64 seed and canonical block order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod incidence;
pub mod policy;
pub mod canonical;
pub mod candidate;
pub mod block_graph;
pub mod score;

// Re-exports
pub use types::{
    AssignmentCounts, CandidateId, Classifier, ClassifierError, ClassifierKind, ClassifierStats,
    ConsRole, IdAllocator, Lineage, RefinementStep, VarRole,
};
pub use incidence::{ConsKind, IncidenceError, IncidenceProvider, SparseIncidence, DEFAULT_EQUIVALENCE_SIZE_LIMIT};
pub use policy::RefinementPolicy;
pub use candidate::{
    Candidate, CandidateError, CandidateState, ConsistencyRule, ConsistencyViolation, Dimension,
    StairlinkingReport,
};
pub use block_graph::BlockGraph;
pub use score::{
    AggregationInfo, BlockEquivalenceOracle, IdenticalLayoutOracle, NoEquivalence, ScoreSet, ScoreType,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Schema version for serialized lineage and policy types.
/// Increment on breaking changes to any schema type.
pub const DECOMPOSITION_KERNEL_SCHEMA_VERSION: &str = "1.0.0";

/// Default policy version identifier.
pub const DEFAULT_POLICY_VERSION: &str = "refinement_policy_v1";
