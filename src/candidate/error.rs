//! Error types for candidate operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{CandidateId, ConsRole, VarRole};

/// Which consistency rule a candidate violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsistencyRule {
    /// Block count differs from the size of a per-block array.
    BlockCount,
    /// Candidate dimensions differ from the incidence provider.
    Dimensions,
    /// A block has neither constraints nor variables.
    EmptyBlock,
    /// An index lies outside the problem dimensions.
    IndexRange,
    /// A list is not strictly increasing.
    Unsorted,
    /// A constraint is assigned more than once.
    DuplicateCons,
    /// A variable is assigned more than once.
    DuplicateVar,
    /// Open flags or open lists disagree with the assignment.
    OpenMismatch,
    /// Stairlinking variables attached to a block without successor.
    StairlinkingWithoutSuccessor,
    /// A block constraint contains a variable of an unrelated block or the master.
    ForeignVariable,
}

impl ConsistencyRule {
    /// Stable rule name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BlockCount => "block_count",
            Self::Dimensions => "dimensions",
            Self::EmptyBlock => "empty_block",
            Self::IndexRange => "index_range",
            Self::Unsorted => "unsorted",
            Self::DuplicateCons => "duplicate_cons",
            Self::DuplicateVar => "duplicate_var",
            Self::OpenMismatch => "open_mismatch",
            Self::StairlinkingWithoutSuccessor => "stairlinking_without_successor",
            Self::ForeignVariable => "foreign_variable",
        }
    }
}

impl fmt::Display for ConsistencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed structural invariant.
///
/// A violation signals a bug in a refinement algorithm or detector, never
/// bad input. It must not be swallowed: a corrupted candidate reaching the
/// repository poisons deduplication and scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    /// Candidate that failed.
    pub candidate: CandidateId,
    /// Rule that failed.
    pub rule: ConsistencyRule,
    /// Offending constraint or variable index, if any.
    pub index: Option<usize>,
    /// Offending block, if any.
    pub block: Option<usize>,
    /// Human-readable detail.
    pub detail: String,
}

impl ConsistencyViolation {
    pub(crate) fn new(candidate: CandidateId, rule: ConsistencyRule, detail: impl Into<String>) -> Self {
        Self {
            candidate,
            rule,
            index: None,
            block: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn in_block(mut self, block: usize) -> Self {
        self.block = Some(block);
        self
    }

    /// Log this violation as a structured event.
    pub fn log(&self) {
        tracing::error!(
            candidate = %self.candidate,
            rule = %self.rule,
            index = ?self.index,
            block = ?self.block,
            "CANDIDATE_CORRUPT: {}",
            self.detail
        );
    }
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "candidate {} violates {}", self.candidate, self.rule)?;
        if let Some(index) = self.index {
            write!(f, " at index {}", index)?;
        }
        if let Some(block) = self.block {
            write!(f, " in block {}", block)?;
        }
        write!(f, ": {}", self.detail)
    }
}

impl std::error::Error for ConsistencyViolation {}

/// Dimension of an index in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    /// Constraint index.
    Cons,
    /// Variable index.
    Var,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cons => write!(f, "constraint"),
            Self::Var => write!(f, "variable"),
        }
    }
}

/// Error type for candidate operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandidateError {
    /// Index outside the problem dimensions.
    #[error("{dimension} index {index} out of range ({len})")]
    IndexOutOfRange {
        /// Constraint or variable.
        dimension: Dimension,
        /// Offending index.
        index: usize,
        /// Dimension size.
        len: usize,
    },
    /// Block index outside the current block count.
    #[error("Block {block} out of range ({n_blocks} blocks)")]
    BlockOutOfRange {
        /// Offending block.
        block: usize,
        /// Current block count.
        n_blocks: usize,
    },
    /// Stairlinking requested for a block without successor.
    #[error("Block {block} has no successor to share stairlinking variables with")]
    NoSuccessorBlock {
        /// Offending block.
        block: usize,
    },
    /// Constraint reassigned although it is no longer open.
    #[error("Constraint {index} is already assigned ({role})")]
    ConsAlreadyAssigned {
        /// Offending constraint.
        index: usize,
        /// Its current role.
        role: ConsRole,
    },
    /// Variable reassigned although it is no longer open.
    #[error("Variable {index} is already assigned ({role})")]
    VarAlreadyAssigned {
        /// Offending variable.
        index: usize,
        /// Its current role.
        role: VarRole,
    },
    /// Stairlinking detection rerun while stairlinking variables exist.
    #[error("Stairlinking variables already assigned ({count})")]
    StairlinkingAlreadyPresent {
        /// Number of assigned stairlinking variables.
        count: usize,
    },
    /// Block order is not a bijection on the current blocks.
    #[error("Invalid block permutation: {0}")]
    InvalidPermutation(String),
    /// Operation requires a complete candidate.
    #[error("Candidate {candidate} is incomplete ({open_conss} open constraints, {open_vars} open variables)")]
    Incomplete {
        /// Candidate id.
        candidate: CandidateId,
        /// Open constraint count.
        open_conss: usize,
        /// Open variable count.
        open_vars: usize,
    },
    /// Candidate and incidence provider disagree on dimensions.
    #[error("Dimension mismatch: candidate {candidate_conss}x{candidate_vars}, provider {provider_conss}x{provider_vars}")]
    DimensionMismatch {
        /// Candidate constraint count.
        candidate_conss: usize,
        /// Candidate variable count.
        candidate_vars: usize,
        /// Provider constraint count.
        provider_conss: usize,
        /// Provider variable count.
        provider_vars: usize,
    },
    /// Classifier dimension does not match the operation.
    #[error("Classifier '{0}' does not cover this candidate")]
    ClassifierMismatch(String),
    /// Structural invariant broken (internal bug, never recoverable).
    #[error("Corrupt candidate: {0}")]
    Corrupt(#[from] ConsistencyViolation),
}

impl CandidateError {
    /// Whether this error indicates a corrupted candidate.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}
