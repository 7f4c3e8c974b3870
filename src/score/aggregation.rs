//! Aggregation of structurally identical blocks.
//!
//! Identical blocks can share one pricing problem, so aggregated scores
//! count one block per equivalence class. Whether two blocks are identical
//! is decided by a [`BlockEquivalenceOracle`]; the full answer needs graph
//! automorphism and lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::incidence::IncidenceProvider;
use crate::policy::RefinementPolicy;

/// Decides whether two blocks of a candidate are structurally identical.
///
/// Only called for blocks with equal constraint and variable counts within
/// the equivalence size limit.
pub trait BlockEquivalenceOracle {
    /// Whether blocks `a` and `b` are identical up to renaming.
    fn are_identical<P: IncidenceProvider + ?Sized>(&self, provider: &P, cand: &Candidate, a: usize, b: usize) -> bool;
}

/// Oracle that never identifies blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEquivalence;

impl BlockEquivalenceOracle for NoEquivalence {
    fn are_identical<P: IncidenceProvider + ?Sized>(&self, _: &P, _: &Candidate, _: usize, _: usize) -> bool {
        false
    }
}

/// Conservative oracle: blocks are identical if their constraints, paired in
/// index order, have the same kind, the same coefficients on block variables
/// paired in index order, and the same multiset of coefficients outside the
/// block. Columns must agree on how many constraints they reach.
///
/// A layout heuristic, not an isomorphism test: outside entries are compared
/// by value only, so blocks coupled to different border variables with equal
/// coefficients are identified. Identical blocks whose items are permuted
/// are missed.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdenticalLayoutOracle;

/// Row of a constraint split into in-block (relative column, value) entries
/// and the sorted values of entries outside the block.
type SplitRow = (Vec<(usize, f64)>, Vec<f64>);

impl IdenticalLayoutOracle {
    fn block_row<P: IncidenceProvider + ?Sized>(provider: &P, block_vars: &[usize], cons: usize) -> SplitRow {
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for &v in provider.vars_of(cons) {
            let value = provider.value_at(cons, v);
            match block_vars.binary_search(&v) {
                Ok(pos) => inside.push((pos, value)),
                Err(_) => outside.push(value),
            }
        }
        outside.sort_by(f64::total_cmp);
        (inside, outside)
    }
}

impl BlockEquivalenceOracle for IdenticalLayoutOracle {
    fn are_identical<P: IncidenceProvider + ?Sized>(&self, provider: &P, cand: &Candidate, a: usize, b: usize) -> bool {
        let (conss_a, conss_b) = (cand.conss_for_block(a), cand.conss_for_block(b));
        let (vars_a, vars_b) = (cand.vars_for_block(a), cand.vars_for_block(b));
        if conss_a.len() != conss_b.len() || vars_a.len() != vars_b.len() {
            return false;
        }

        let rows_match = conss_a.iter().zip(conss_b).all(|(&ca, &cb)| {
            provider.cons_kind(ca) == provider.cons_kind(cb)
                && Self::block_row(provider, vars_a, ca) == Self::block_row(provider, vars_b, cb)
        });
        if !rows_match {
            return false;
        }

        // Columns must also agree on how often they reach outside the block.
        vars_a
            .iter()
            .zip(vars_b)
            .all(|(&va, &vb)| provider.conss_of(va).len() == provider.conss_of(vb).len())
    }
}

/// Partition of blocks into equivalence classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationInfo {
    /// Blocks per class, each sorted; classes ordered by first block.
    classes: Vec<Vec<usize>>,
    /// Pairs not compared because a block exceeded the size limit.
    skipped_checks: usize,
}

impl AggregationInfo {
    /// One class per block.
    pub fn singletons(n_blocks: usize) -> Self {
        Self {
            classes: (0..n_blocks).map(|b| vec![b]).collect(),
            skipped_checks: 0,
        }
    }

    /// Equivalence classes.
    pub fn classes(&self) -> &[Vec<usize>] {
        &self.classes
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// First block of every class.
    pub fn representatives(&self) -> Vec<usize> {
        self.classes.iter().filter_map(|c| c.first().copied()).collect()
    }

    /// Class index of a block.
    pub fn class_of_block(&self, block: usize) -> Option<usize> {
        self.classes.iter().position(|c| c.contains(&block))
    }

    /// Number of comparisons skipped for exceeding the size limit.
    pub fn skipped_checks(&self) -> usize {
        self.skipped_checks
    }
}

impl Candidate {
    /// Group blocks into equivalence classes and memoize the result.
    ///
    /// Blocks are compared only with a class representative of equal size;
    /// blocks larger than the equivalence size limit are never compared.
    /// With stairlinking variables every block is its own class. The memo
    /// is cleared by any mutation.
    pub fn calc_aggregation_information<P, O>(
        &mut self,
        provider: &P,
        oracle: &O,
        policy: &RefinementPolicy,
    ) -> &AggregationInfo
    where
        P: IncidenceProvider + ?Sized,
        O: BlockEquivalenceOracle,
    {
        let info = if self.n_total_stairlinking_vars() > 0 {
            AggregationInfo::singletons(self.n_blocks())
        } else {
            self.compute_aggregation(provider, oracle, policy.effective_size_limit(provider.equivalence_size_limit()))
        };

        if info.skipped_checks > 0 {
            tracing::warn!(
                candidate = %self.id(),
                skipped = info.skipped_checks,
                "block equivalence checks skipped, blocks exceed the size limit"
            );
        }
        tracing::debug!(
            candidate = %self.id(),
            n_blocks = self.n_blocks(),
            n_classes = info.n_classes(),
            "aggregation information computed"
        );
        self.store_aggregation(info)
    }

    fn compute_aggregation<P, O>(&self, provider: &P, oracle: &O, limit: usize) -> AggregationInfo
    where
        P: IncidenceProvider + ?Sized,
        O: BlockEquivalenceOracle,
    {
        let mut info = AggregationInfo::default();
        for b in 0..self.n_blocks() {
            let size = (self.conss_for_block(b).len(), self.vars_for_block(b).len());
            let mut joined = false;
            for class in info.classes.iter_mut() {
                let rep = class[0];
                if (self.conss_for_block(rep).len(), self.vars_for_block(rep).len()) != size {
                    continue;
                }
                if size.0 > limit || size.1 > limit {
                    info.skipped_checks += 1;
                    continue;
                }
                if oracle.are_identical(provider, self, rep, b) {
                    class.push(b);
                    joined = true;
                    break;
                }
            }
            if !joined {
                info.classes.push(vec![b]);
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidence::SparseIncidence;
    use crate::types::CandidateId;

    /// Three blocks: two identical 1x2 blocks and one with a different coefficient.
    fn three_blocks() -> (SparseIncidence, Candidate) {
        let inc = SparseIncidence::from_entries(
            3,
            6,
            &[(0, 0, 1.0), (0, 1, 2.0), (1, 2, 1.0), (1, 3, 2.0), (2, 4, 1.0), (2, 5, 3.0)],
        )
        .unwrap();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        for b in 0..3 {
            c.add_block();
            c.set_cons_to_block(b, b).unwrap();
            c.set_var_to_block(2 * b, b).unwrap();
            c.set_var_to_block(2 * b + 1, b).unwrap();
        }
        (inc, c)
    }

    #[test]
    fn test_identical_layout_classes() {
        let (inc, mut c) = three_blocks();
        let info = c
            .calc_aggregation_information(&inc, &IdenticalLayoutOracle, &RefinementPolicy::default())
            .clone();
        assert_eq!(info.classes(), &[vec![0, 1], vec![2]]);
        assert_eq!(info.representatives(), vec![0, 2]);
        assert_eq!(info.class_of_block(1), Some(0));
        assert_eq!(info.skipped_checks(), 0);
    }

    /// Two 1x1 blocks coupled through linking variable 2.
    fn coupled_pair(second_coupling: f64) -> (SparseIncidence, Candidate) {
        let inc = SparseIncidence::from_entries(
            2,
            3,
            &[(0, 0, 1.0), (0, 2, 1.0), (1, 1, 1.0), (1, 2, second_coupling)],
        )
        .unwrap();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        for b in 0..2 {
            c.add_block();
            c.set_cons_to_block(b, b).unwrap();
            c.set_var_to_block(b, b).unwrap();
        }
        c.set_var_to_linking(2).unwrap();
        (inc, c)
    }

    #[test]
    fn test_outside_coefficients_separate_blocks() {
        let (inc, c) = coupled_pair(5.0);
        assert!(!IdenticalLayoutOracle.are_identical(&inc, &c, 0, 1));

        let (inc, c) = coupled_pair(1.0);
        assert!(IdenticalLayoutOracle.are_identical(&inc, &c, 0, 1));
    }

    #[test]
    fn test_no_equivalence_gives_singletons() {
        let (inc, mut c) = three_blocks();
        let n = c
            .calc_aggregation_information(&inc, &NoEquivalence, &RefinementPolicy::default())
            .n_classes();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_size_limit_skips_checks() {
        let (inc, mut c) = three_blocks();
        let policy = RefinementPolicy::new(true, Some(1));
        let info = c
            .calc_aggregation_information(&inc, &IdenticalLayoutOracle, &policy)
            .clone();
        assert_eq!(info.n_classes(), 3);
        assert_eq!(info.skipped_checks(), 3);
    }

    #[test]
    fn test_memo_cleared_by_mutation() {
        let (inc, mut c) = three_blocks();
        c.calc_aggregation_information(&inc, &NoEquivalence, &RefinementPolicy::default());
        assert!(c.aggregation_info().is_some());
        c.permute_blocks(&[2, 1, 0]).unwrap();
        assert!(c.aggregation_info().is_none());
    }
}
