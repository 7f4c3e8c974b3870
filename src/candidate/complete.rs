//! Completion algorithms.
//!
//! Each algorithm takes a partial candidate to a complete one and verifies
//! the result: it either returns with nothing open and every structural
//! invariant holding, or with [`CandidateError::Corrupt`].

use std::collections::VecDeque;

use crate::incidence::IncidenceProvider;
use crate::policy::RefinementPolicy;
use crate::types::VarRole;

use super::refine::{scan_cons, scan_var};
use super::{Candidate, CandidateError, ConsistencyRule, ConsistencyViolation};

/// How open constraints are grouped into new blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connectivity {
    /// Constraints sharing an open variable.
    SharedOpenVars,
    /// The provider's precomputed constraint adjacency.
    ConsAdjacency,
}

impl Candidate {
    /// Complete the candidate by turning connected components of the open
    /// constraint/variable graph into new blocks.
    ///
    /// 1. Open variables already in block constraints are resolved: one
    ///    block and no open constraint joins it, two consecutive blocks and
    ///    no open constraint become stairlinking, anything else is linking.
    /// 2. Open constraints restricted by assigned variables join their only
    ///    compatible block if they have no open variable, else the master.
    /// 3. The remaining open constraints are grouped by shared open
    ///    variables; linking variables never merge components. Each component
    ///    becomes a new block, ordered by smallest constraint.
    /// 4. Leftover open variables go to block 0, or the master if there are
    ///    no blocks.
    pub fn complete_by_connected<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<(), CandidateError> {
        self.complete_by_components(provider, policy, Connectivity::SharedOpenVars, "connected_components")
    }

    /// Like [`Candidate::complete_by_connected`], but groups constraints via
    /// the provider's constraint adjacency.
    ///
    /// Adjacency ignores variable roles, so it is only valid without linking
    /// variables; if any exist (before or after resolving variables), this
    /// falls back to [`Candidate::complete_by_connected`].
    pub fn complete_by_connected_conss_adjacency<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<(), CandidateError> {
        if !self.linking_vars.is_empty() {
            tracing::debug!(
                candidate = %self.id,
                linking = self.linking_vars.len(),
                "linking variables present, falling back to connected components"
            );
            return self.complete_by_connected(provider, policy);
        }
        self.complete_by_components(provider, policy, Connectivity::ConsAdjacency, "connected_conss_adjacency")
    }

    fn complete_by_components<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        _policy: &RefinementPolicy,
        connectivity: Connectivity,
        detector: &str,
    ) -> Result<(), CandidateError> {
        self.check_dimensions(provider)?;
        self.flush()?;
        if self.is_complete() {
            return Ok(());
        }
        let n_before = self.n_blocks;
        self.with_step(detector, |cand| {
            cand.resolve_vars_against_blocks(provider)?;

            let connectivity = if connectivity == Connectivity::ConsAdjacency && !cand.linking_vars.is_empty() {
                tracing::debug!(candidate = %cand.id, "linking variables appeared, using shared variables");
                Connectivity::SharedOpenVars
            } else {
                connectivity
            };

            cand.resolve_restricted_conss(provider)?;
            cand.open_components_to_blocks(provider, connectivity)?;

            let fallback = if cand.n_blocks > 0 { Some(0) } else { None };
            for var in cand.open_vars.clone() {
                match fallback {
                    Some(b) => cand.book_var_to_block(var, b)?,
                    None => cand.book_var_to_master(var)?,
                }
            }
            cand.flush()
        })?;

        tracing::debug!(
            candidate = %self.id,
            new_blocks = self.n_blocks - n_before,
            n_blocks = self.n_blocks,
            detector,
            "completed"
        );
        self.ensure_complete_and_consistent(provider)
    }

    /// Step 1: open variables seen by block constraints leave the open set.
    fn resolve_vars_against_blocks<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> Result<usize, CandidateError> {
        let cons_roles = self.cons_roles();
        for var in self.open_vars.clone() {
            let scan = scan_var(provider, &cons_roles, var);
            if scan.blocks.is_empty() {
                continue;
            }
            let pair = scan.consecutive_pair();
            match (scan.single_block(), pair, scan.has_open) {
                (Some(b), _, false) => self.book_var_to_block(var, b)?,
                (_, Some(b), false) => self.book_var_to_stairlinking(var, b)?,
                _ => self.book_var_to_linking(var)?,
            }
        }
        self.flush()
    }

    /// Step 2: open constraints restricted by assigned variables leave the open set.
    fn resolve_restricted_conss<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> Result<usize, CandidateError> {
        let var_roles = self.var_roles();
        for cons in self.open_conss.clone() {
            let scan = scan_cons(provider, &var_roles, cons);
            if !scan.has_restricting {
                continue;
            }
            match (scan.placement.single_block(), scan.has_open) {
                (Some(b), false) => self.book_cons_to_block(cons, b)?,
                _ => self.book_cons_to_master(cons)?,
            }
        }
        self.flush()
    }

    /// Step 3: every connected component of open constraints becomes a block.
    fn open_components_to_blocks<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        connectivity: Connectivity,
    ) -> Result<usize, CandidateError> {
        let mut cons_seen = vec![false; self.n_conss];
        let mut var_seen = vec![false; self.n_vars];
        let mut next_block = self.n_blocks;
        let mut queue = VecDeque::new();

        for start in self.open_conss.clone() {
            if cons_seen[start] {
                continue;
            }
            cons_seen[start] = true;
            queue.push_back(start);

            while let Some(cons) = queue.pop_front() {
                self.book_cons_to_block(cons, next_block)?;
                for &var in provider.vars_of(cons) {
                    if self.is_var_open[var] && !var_seen[var] {
                        var_seen[var] = true;
                        self.book_var_to_block(var, next_block)?;
                    }
                }

                let neighbors: Vec<usize> = match connectivity {
                    Connectivity::ConsAdjacency => provider.conss_adjacent_to(cons).to_vec(),
                    Connectivity::SharedOpenVars => provider
                        .vars_of(cons)
                        .iter()
                        .filter(|&&v| self.is_var_open[v])
                        .flat_map(|&v| provider.conss_of(v).iter().copied())
                        .collect(),
                };
                for next in neighbors {
                    if self.is_cons_open[next] && !cons_seen[next] {
                        cons_seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            next_block += 1;
        }
        self.flush()
    }

    /// Complete the candidate greedily.
    ///
    /// Without blocks, the first open constraint free of master variables
    /// seeds block 0 together with its open variables. Then:
    ///
    /// 1. Open variables in block constraints of one block join it; of two
    ///    consecutive blocks become stairlinking; of more blocks become
    ///    linking. Variables seen only by master constraints go to the master.
    /// 2. Open constraints, in increasing index order, join the first block
    ///    that admits all their variables (their open variables join too),
    ///    else the master.
    /// 3. Remaining open variables go to the master.
    pub fn complete_greedily<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        _policy: &RefinementPolicy,
    ) -> Result<(), CandidateError> {
        self.check_dimensions(provider)?;
        self.flush()?;
        if self.is_complete() {
            return Ok(());
        }
        self.with_step("greedy", |cand| {
            if cand.n_blocks == 0 {
                cand.seed_first_block(provider)?;
            }

            let cons_roles = cand.cons_roles();
            for var in cand.open_vars.clone() {
                let scan = scan_var(provider, &cons_roles, var);
                if let Some(b) = scan.single_block() {
                    cand.set_var_to_block(var, b)?;
                } else if let Some(b) = scan.consecutive_pair() {
                    cand.set_var_to_stairlinking(var, b)?;
                } else if scan.blocks.len() >= 2 {
                    cand.set_var_to_linking(var)?;
                } else if scan.has_master && !scan.has_open {
                    cand.set_var_to_master(var)?;
                }
            }

            for cons in cand.open_conss.clone() {
                let target = (0..cand.n_blocks).find(|&b| {
                    provider
                        .vars_of(cons)
                        .iter()
                        .all(|&v| cand.var_role(v).admits_block(b))
                });
                match target {
                    Some(b) => {
                        cand.set_cons_to_block(cons, b)?;
                        for &v in provider.vars_of(cons) {
                            if cand.is_var_open(v) {
                                cand.set_var_to_block(v, b)?;
                            }
                        }
                    }
                    None => cand.set_cons_to_master(cons)?,
                }
            }

            for var in cand.open_vars.clone() {
                cand.set_var_to_master(var)?;
            }
            Ok(())
        })?;

        tracing::debug!(candidate = %self.id, n_blocks = self.n_blocks, "completed greedily");
        self.ensure_complete_and_consistent(provider)
    }

    fn seed_first_block<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> Result<(), CandidateError> {
        let seed = self.open_conss.iter().copied().find(|&c| {
            provider
                .vars_of(c)
                .iter()
                .all(|&v| self.var_role(v) != VarRole::Master)
        });
        if let Some(cons) = seed {
            let block = self.add_block();
            self.set_cons_to_block(cons, block)?;
            for &v in provider.vars_of(cons) {
                if self.is_var_open(v) {
                    self.set_var_to_block(v, block)?;
                }
            }
        }
        Ok(())
    }

    fn ensure_complete_and_consistent<P: IncidenceProvider + ?Sized>(&self, provider: &P) -> Result<(), CandidateError> {
        if !self.is_complete() {
            let violation = ConsistencyViolation::new(
                self.id,
                ConsistencyRule::OpenMismatch,
                format!(
                    "completion left {} constraints and {} variables open",
                    self.open_conss.len(),
                    self.open_vars.len()
                ),
            );
            violation.log();
            return Err(CandidateError::Corrupt(violation));
        }
        self.ensure_consistent(provider)
    }
}
