//! Structural consistency checker.
//!
//! Read-only. A violation means a refinement or a detector produced an
//! inconsistent candidate; it is reported, never repaired.

use crate::incidence::IncidenceProvider;

use super::{Candidate, ConsistencyRule, ConsistencyViolation};

impl Candidate {
    /// Verify every structural invariant of the candidate.
    ///
    /// Rules are checked in a fixed order and the first violation is
    /// returned. Pending bookings are not part of the partition and are
    /// ignored.
    pub fn check_consistency<P: IncidenceProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<(), ConsistencyViolation> {
        let fail = |rule: ConsistencyRule, detail: String| ConsistencyViolation::new(self.id, rule, detail);

        if provider.n_conss() != self.n_conss || provider.n_vars() != self.n_vars {
            return Err(fail(
                ConsistencyRule::Dimensions,
                format!(
                    "candidate is {}x{}, provider is {}x{}",
                    self.n_conss,
                    self.n_vars,
                    provider.n_conss(),
                    provider.n_vars()
                ),
            ));
        }
        if self.is_cons_open.len() != self.n_conss || self.is_var_open.len() != self.n_vars {
            return Err(fail(ConsistencyRule::Dimensions, "open flag arrays have wrong length".into()));
        }

        for (name, len) in [
            ("conss_for_blocks", self.conss_for_blocks.len()),
            ("vars_for_blocks", self.vars_for_blocks.len()),
            ("stairlinking_vars", self.stairlinking_vars.len()),
        ] {
            if len != self.n_blocks {
                return Err(fail(
                    ConsistencyRule::BlockCount,
                    format!("{} has {} entries for {} blocks", name, len, self.n_blocks),
                ));
            }
        }

        for b in 0..self.n_blocks {
            if self.conss_for_blocks[b].is_empty() && self.vars_for_blocks[b].is_empty() {
                return Err(fail(ConsistencyRule::EmptyBlock, "block has no constraints and no variables".into())
                    .in_block(b));
            }
        }

        // Every list sorted, duplicate-free and in range.
        let cons_lists = std::iter::once(("master_conss", None, &self.master_conss))
            .chain(std::iter::once(("open_conss", None, &self.open_conss)))
            .chain(self.conss_for_blocks.iter().enumerate().map(|(b, l)| ("block conss", Some(b), l)));
        for (name, block, list) in cons_lists {
            self.check_list(name, block, list, self.n_conss)?;
        }
        let var_lists = [
            ("master_vars", None, &self.master_vars),
            ("linking_vars", None, &self.linking_vars),
            ("open_vars", None, &self.open_vars),
        ]
        .into_iter()
        .chain(self.vars_for_blocks.iter().enumerate().map(|(b, l)| ("block vars", Some(b), l)))
        .chain(self.stairlinking_vars.iter().enumerate().map(|(b, l)| ("stairlinking vars", Some(b), l)));
        for (name, block, list) in var_lists {
            self.check_list(name, block, list, self.n_vars)?;
        }

        // Each index assigned at most once.
        let mut cons_assigned = vec![false; self.n_conss];
        for &c in self.master_conss.iter().chain(self.conss_for_blocks.iter().flatten()) {
            if std::mem::replace(&mut cons_assigned[c], true) {
                return Err(fail(ConsistencyRule::DuplicateCons, "constraint assigned twice".into()).at_index(c));
            }
        }
        let mut var_assigned = vec![false; self.n_vars];
        for &v in self
            .master_vars
            .iter()
            .chain(self.linking_vars.iter())
            .chain(self.vars_for_blocks.iter().flatten())
            .chain(self.stairlinking_vars.iter().flatten())
        {
            if std::mem::replace(&mut var_assigned[v], true) {
                return Err(fail(ConsistencyRule::DuplicateVar, "variable assigned twice".into()).at_index(v));
            }
        }

        // Open flags are the complement of the assignment and match the open lists.
        for c in 0..self.n_conss {
            if self.is_cons_open[c] == cons_assigned[c] {
                return Err(fail(
                    ConsistencyRule::OpenMismatch,
                    format!("constraint open flag is {}", self.is_cons_open[c]),
                )
                .at_index(c));
            }
        }
        for v in 0..self.n_vars {
            if self.is_var_open[v] == var_assigned[v] {
                return Err(fail(
                    ConsistencyRule::OpenMismatch,
                    format!("variable open flag is {}", self.is_var_open[v]),
                )
                .at_index(v));
            }
        }
        let n_open_conss = self.is_cons_open.iter().filter(|&&o| o).count();
        if n_open_conss != self.open_conss.len() || self.open_conss.iter().any(|&c| !self.is_cons_open[c]) {
            return Err(fail(ConsistencyRule::OpenMismatch, "open constraint list disagrees with flags".into()));
        }
        let n_open_vars = self.is_var_open.iter().filter(|&&o| o).count();
        if n_open_vars != self.open_vars.len() || self.open_vars.iter().any(|&v| !self.is_var_open[v]) {
            return Err(fail(ConsistencyRule::OpenMismatch, "open variable list disagrees with flags".into()));
        }

        if let Some(last) = self.stairlinking_vars.last() {
            if !last.is_empty() {
                return Err(fail(
                    ConsistencyRule::StairlinkingWithoutSuccessor,
                    format!("{} stairlinking variables on the last block", last.len()),
                )
                .in_block(self.n_blocks - 1));
            }
        }

        // Block constraints only see variables their block may use.
        let roles = self.var_roles();
        for (b, conss) in self.conss_for_blocks.iter().enumerate() {
            for &c in conss {
                if let Some(&v) = provider.vars_of(c).iter().find(|&&v| !roles[v].admits_block(b)) {
                    return Err(fail(
                        ConsistencyRule::ForeignVariable,
                        format!("constraint {} contains variable {} ({})", c, v, roles[v]),
                    )
                    .at_index(c)
                    .in_block(b));
                }
            }
        }

        Ok(())
    }

    fn check_list(
        &self,
        name: &str,
        block: Option<usize>,
        list: &[usize],
        len: usize,
    ) -> Result<(), ConsistencyViolation> {
        let with_block = |v: ConsistencyViolation| match block {
            Some(b) => v.in_block(b),
            None => v,
        };
        if let Some(&bad) = list.iter().find(|&&i| i >= len) {
            return Err(with_block(
                ConsistencyViolation::new(
                    self.id,
                    ConsistencyRule::IndexRange,
                    format!("{} contains {} (dimension {})", name, bad, len),
                )
                .at_index(bad),
            ));
        }
        if let Some(pair) = list.windows(2).find(|w| w[0] >= w[1]) {
            return Err(with_block(
                ConsistencyViolation::new(
                    self.id,
                    ConsistencyRule::Unsorted,
                    format!("{} not strictly increasing at {} >= {}", name, pair[0], pair[1]),
                )
                .at_index(pair[1]),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::candidate::{Candidate, ConsistencyRule};
    use crate::incidence::SparseIncidence;
    use crate::types::CandidateId;

    /// Two constraints sharing variable 1: c0 = {0, 1}, c1 = {1, 2}.
    fn chain() -> SparseIncidence {
        SparseIncidence::from_rows(3, &[vec![0, 1], vec![1, 2]]).unwrap()
    }

    #[test]
    fn test_fresh_candidate_is_consistent() {
        let inc = chain();
        let c = Candidate::for_problem(CandidateId::new(1), &inc);
        assert!(c.check_consistency(&inc).is_ok());
    }

    #[test]
    fn test_dimension_mismatch() {
        let inc = chain();
        let c = Candidate::new(CandidateId::new(1), 5, 3);
        assert_eq!(c.check_consistency(&inc).unwrap_err().rule, ConsistencyRule::Dimensions);
    }

    #[test]
    fn test_empty_block_detected() {
        let inc = chain();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.add_block();
        let v = c.check_consistency(&inc).unwrap_err();
        assert_eq!(v.rule, ConsistencyRule::EmptyBlock);
        assert_eq!(v.block, Some(0));
    }

    #[test]
    fn test_foreign_variable_detected() {
        let inc = chain();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.add_block();
        c.add_block();
        c.set_cons_to_block(0, 0).unwrap();
        c.set_var_to_block(1, 1).unwrap();
        let v = c.check_consistency(&inc).unwrap_err();
        assert_eq!(v.rule, ConsistencyRule::ForeignVariable);
        assert_eq!(v.index, Some(0));
        assert_eq!(v.block, Some(0));
    }

    #[test]
    fn test_stairlinking_var_admitted_by_both_blocks() {
        let inc = chain();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.add_block();
        c.add_block();
        c.set_cons_to_block(0, 0).unwrap();
        c.set_cons_to_block(1, 1).unwrap();
        c.set_var_to_block(0, 0).unwrap();
        c.set_var_to_block(2, 1).unwrap();
        c.set_var_to_stairlinking(1, 0).unwrap();
        assert!(c.check_consistency(&inc).is_ok());
        assert!(c.is_complete());
    }

    #[test]
    fn test_master_var_in_block_cons_detected() {
        let inc = chain();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.add_block();
        c.set_cons_to_block(0, 0).unwrap();
        c.set_var_to_master(0).unwrap();
        assert_eq!(c.check_consistency(&inc).unwrap_err().rule, ConsistencyRule::ForeignVariable);
    }

    #[test]
    fn test_corrupted_lists_detected() {
        let inc = chain();
        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.set_cons_to_master(0).unwrap();
        c.master_conss.push(0);
        assert_eq!(c.check_consistency(&inc).unwrap_err().rule, ConsistencyRule::Unsorted);

        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.add_block();
        c.set_cons_to_master(1).unwrap();
        c.conss_for_blocks[0].push(1);
        assert_eq!(c.check_consistency(&inc).unwrap_err().rule, ConsistencyRule::DuplicateCons);

        let mut c = Candidate::for_problem(CandidateId::new(1), &inc);
        c.is_var_open[2] = false;
        assert_eq!(c.check_consistency(&inc).unwrap_err().rule, ConsistencyRule::OpenMismatch);
    }
}
