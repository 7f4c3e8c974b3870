//! Incidence providers.
//!
//! The provider is the arena every candidate indexes into: constraints and
//! variables are plain `usize` indices, and all structural questions about
//! the problem are answered here. Candidates never own constraint or
//! variable data.

pub mod sparse;

use serde::{Deserialize, Serialize};

/// Block size (constraints or variables) above which block equivalence
/// checks are skipped as too expensive.
pub const DEFAULT_EQUIVALENCE_SIZE_LIMIT: usize = 200;

/// Structural class of a constraint, as far as scoring cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConsKind {
    /// `sum x = 1` over binaries.
    SetPartitioning,
    /// `sum x <= 1` over binaries.
    SetPacking,
    /// `sum x >= 1` over binaries.
    SetCovering,
    /// `sum x = k` (or `<= k`) over binaries.
    Cardinality,
    /// Anything else.
    #[default]
    General,
}

impl ConsKind {
    /// Whether the constraint is set partitioning, packing, covering or cardinality.
    pub fn is_setppc_or_cardinality(&self) -> bool {
        !matches!(self, Self::General)
    }
}

/// Read-only view of the constraint/variable incidence of a problem.
///
/// Implementations must return index slices sorted ascending and free of
/// duplicates. Providers are shared between detectors, so they must be
/// `Sync`.
pub trait IncidenceProvider: Sync {
    /// Number of constraints.
    fn n_conss(&self) -> usize;

    /// Number of variables.
    fn n_vars(&self) -> usize;

    /// Variables with a (structural) entry in the given constraint.
    fn vars_of(&self, cons: usize) -> &[usize];

    /// Constraints with a (structural) entry for the given variable.
    fn conss_of(&self, var: usize) -> &[usize];

    /// Coefficient of `var` in `cons`; zero if absent.
    fn value_at(&self, cons: usize, var: usize) -> f64;

    /// Constraints sharing at least one variable with `cons`, excluding itself.
    fn conss_adjacent_to(&self, cons: usize) -> &[usize];

    /// Structural class of a constraint.
    fn cons_kind(&self, cons: usize) -> ConsKind;

    /// Size cutoff for block equivalence checks.
    fn equivalence_size_limit(&self) -> usize {
        DEFAULT_EQUIVALENCE_SIZE_LIMIT
    }
}

pub use sparse::{IncidenceError, SparseIncidence};
