//! In-memory incidence provider.

use std::collections::{BTreeMap, BTreeSet};

use super::{ConsKind, IncidenceProvider, DEFAULT_EQUIVALENCE_SIZE_LIMIT};

/// Error building a sparse incidence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IncidenceError {
    /// Entry refers to a constraint outside the declared dimensions.
    #[error("Constraint index {index} out of range (n_conss = {n_conss})")]
    ConsOutOfRange {
        /// Offending index.
        index: usize,
        /// Declared constraint count.
        n_conss: usize,
    },
    /// Entry refers to a variable outside the declared dimensions.
    #[error("Variable index {index} out of range (n_vars = {n_vars})")]
    VarOutOfRange {
        /// Offending index.
        index: usize,
        /// Declared variable count.
        n_vars: usize,
    },
}

/// Sparse incidence matrix held in memory.
///
/// Rows, columns and constraint adjacency are precomputed at construction
/// and kept sorted, so every query is a slice borrow or a binary search.
#[derive(Debug, Clone)]
pub struct SparseIncidence {
    /// Per constraint: sorted (variable, coefficient) entries.
    rows: Vec<Vec<(usize, f64)>>,
    /// Per constraint: sorted variable indices (mirrors `rows`).
    row_vars: Vec<Vec<usize>>,
    /// Per variable: sorted constraint indices.
    cols: Vec<Vec<usize>>,
    /// Per constraint: sorted adjacent constraints.
    adjacency: Vec<Vec<usize>>,
    kinds: Vec<ConsKind>,
    equivalence_size_limit: usize,
}

impl SparseIncidence {
    /// Build from `(constraint, variable, coefficient)` triplets.
    ///
    /// Duplicate entries keep the last coefficient. Explicit zeros are kept
    /// as structural entries.
    pub fn from_entries(
        n_conss: usize,
        n_vars: usize,
        entries: &[(usize, usize, f64)],
    ) -> Result<Self, IncidenceError> {
        let mut rows: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n_conss];
        let mut cols: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n_vars];

        for &(cons, var, value) in entries {
            if cons >= n_conss {
                return Err(IncidenceError::ConsOutOfRange { index: cons, n_conss });
            }
            if var >= n_vars {
                return Err(IncidenceError::VarOutOfRange { index: var, n_vars });
            }
            rows[cons].insert(var, value);
            cols[var].insert(cons);
        }

        let rows: Vec<Vec<(usize, f64)>> = rows
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();
        let row_vars: Vec<Vec<usize>> = rows
            .iter()
            .map(|row| row.iter().map(|(v, _)| *v).collect())
            .collect();
        let cols: Vec<Vec<usize>> = cols.into_iter().map(|c| c.into_iter().collect()).collect();

        let adjacency = (0..n_conss)
            .map(|cons| {
                let mut neighbors = BTreeSet::new();
                for &var in &row_vars[cons] {
                    neighbors.extend(cols[var].iter().copied().filter(|&c| c != cons));
                }
                neighbors.into_iter().collect()
            })
            .collect();

        Ok(Self {
            rows,
            row_vars,
            cols,
            adjacency,
            kinds: vec![ConsKind::General; n_conss],
            equivalence_size_limit: DEFAULT_EQUIVALENCE_SIZE_LIMIT,
        })
    }

    /// Build a 0/1 pattern from per-constraint variable lists.
    pub fn from_rows(n_vars: usize, rows: &[Vec<usize>]) -> Result<Self, IncidenceError> {
        let entries: Vec<(usize, usize, f64)> = rows
            .iter()
            .enumerate()
            .flat_map(|(c, vars)| vars.iter().map(move |&v| (c, v, 1.0)))
            .collect();
        Self::from_entries(rows.len(), n_vars, &entries)
    }

    /// Set the kind of a constraint. Out-of-range indices are ignored.
    pub fn set_cons_kind(&mut self, cons: usize, kind: ConsKind) {
        if let Some(slot) = self.kinds.get_mut(cons) {
            *slot = kind;
        }
    }

    /// Set the same kind for all constraints.
    pub fn with_all_kinds(mut self, kind: ConsKind) -> Self {
        self.kinds.iter_mut().for_each(|k| *k = kind);
        self
    }

    /// Override the equivalence size cutoff.
    pub fn with_equivalence_size_limit(mut self, limit: usize) -> Self {
        self.equivalence_size_limit = limit;
        self
    }

    /// Number of structural nonzeros.
    pub fn n_nonzeros(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

impl IncidenceProvider for SparseIncidence {
    fn n_conss(&self) -> usize {
        self.rows.len()
    }

    fn n_vars(&self) -> usize {
        self.cols.len()
    }

    fn vars_of(&self, cons: usize) -> &[usize] {
        self.row_vars.get(cons).map(Vec::as_slice).unwrap_or(&[])
    }

    fn conss_of(&self, var: usize) -> &[usize] {
        self.cols.get(var).map(Vec::as_slice).unwrap_or(&[])
    }

    fn value_at(&self, cons: usize, var: usize) -> f64 {
        self.rows
            .get(cons)
            .and_then(|row| {
                row.binary_search_by_key(&var, |(v, _)| *v)
                    .ok()
                    .map(|i| row[i].1)
            })
            .unwrap_or(0.0)
    }

    fn conss_adjacent_to(&self, cons: usize) -> &[usize] {
        self.adjacency.get(cons).map(Vec::as_slice).unwrap_or(&[])
    }

    fn cons_kind(&self, cons: usize) -> ConsKind {
        self.kinds.get(cons).copied().unwrap_or_default()
    }

    fn equivalence_size_limit(&self) -> usize {
        self.equivalence_size_limit
    }
}
