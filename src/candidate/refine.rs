//! Refinement passes that assign open items without creating blocks.
//!
//! | Pass | Assigns |
//! |------|---------|
//! | `consider_implicits` | items whose place follows from their assigned neighbors |
//! | `assign_partial_hitting_to_master` | items touching one block and open items |
//! | `find_vars_linking_to_master` | linking variables seen only by the master |
//! | `assign_classes_to_master` | open items of selected classifier classes |
//!
//! Structural edits (`delete_empty_blocks`, `permute_blocks`) live here too.
//! Every pass flushes pending bookings first and is a no-op on a complete
//! candidate, except the structural edits which apply to any state.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::incidence::IncidenceProvider;
use crate::policy::RefinementPolicy;
use crate::types::{Classifier, ClassifierKind, ClassifierStats, ConsRole, RefinementStep, VarRole};

use super::{Candidate, CandidateError};

/// Blocks a constraint may still join, given its assigned variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// No assigned variable restricts the constraint.
    Free,
    /// Blocks `lo..=hi` remain.
    Span(usize, usize),
    /// A master-only variable or incompatible blocks: only the master fits.
    Master,
}

impl Placement {
    fn narrow(self, lo: usize, hi: usize) -> Self {
        match self {
            Self::Free => Self::Span(lo, hi),
            Self::Span(a, b) => {
                let (lo, hi) = (a.max(lo), b.min(hi));
                if lo <= hi {
                    Self::Span(lo, hi)
                } else {
                    Self::Master
                }
            }
            Self::Master => Self::Master,
        }
    }

    /// The single block left, if exactly one remains.
    pub(crate) fn single_block(&self) -> Option<usize> {
        match *self {
            Self::Span(lo, hi) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

/// What an open constraint sees through its variables.
#[derive(Debug, Clone)]
pub(crate) struct ConsScan {
    pub(crate) placement: Placement,
    pub(crate) has_open: bool,
    /// Blocks touched by block or stairlinking variables.
    pub(crate) touched: BTreeSet<usize>,
    /// Whether any variable is a block, stairlinking or master variable.
    pub(crate) has_restricting: bool,
}

pub(crate) fn scan_cons<P: IncidenceProvider + ?Sized>(provider: &P, var_roles: &[VarRole], cons: usize) -> ConsScan {
    let mut scan = ConsScan {
        placement: Placement::Free,
        has_open: false,
        touched: BTreeSet::new(),
        has_restricting: false,
    };
    for &v in provider.vars_of(cons) {
        match var_roles[v] {
            VarRole::Open => scan.has_open = true,
            VarRole::Linking => {}
            VarRole::Master => {
                scan.placement = Placement::Master;
                scan.has_restricting = true;
            }
            VarRole::Block(b) => {
                scan.placement = scan.placement.narrow(b, b);
                scan.touched.insert(b);
                scan.has_restricting = true;
            }
            VarRole::Stairlinking(b) => {
                scan.placement = scan.placement.narrow(b, b + 1);
                scan.touched.insert(b);
                scan.touched.insert(b + 1);
                scan.has_restricting = true;
            }
        }
    }
    scan
}

/// What an open variable sees through its constraints.
#[derive(Debug, Clone)]
pub(crate) struct VarScan {
    /// Blocks of the block constraints containing the variable.
    pub(crate) blocks: BTreeSet<usize>,
    pub(crate) has_open: bool,
    pub(crate) has_master: bool,
}

impl VarScan {
    /// Lower block of two consecutive blocks, if the variable hits exactly those.
    pub(crate) fn consecutive_pair(&self) -> Option<usize> {
        if self.blocks.len() != 2 {
            return None;
        }
        let lo = *self.blocks.iter().next()?;
        let hi = *self.blocks.iter().next_back()?;
        (lo + 1 == hi).then_some(lo)
    }

    pub(crate) fn single_block(&self) -> Option<usize> {
        if self.blocks.len() == 1 {
            self.blocks.iter().next().copied()
        } else {
            None
        }
    }
}

pub(crate) fn scan_var<P: IncidenceProvider + ?Sized>(provider: &P, cons_roles: &[ConsRole], var: usize) -> VarScan {
    let mut scan = VarScan {
        blocks: BTreeSet::new(),
        has_open: false,
        has_master: false,
    };
    for &c in provider.conss_of(var) {
        match cons_roles[c] {
            ConsRole::Open => scan.has_open = true,
            ConsRole::Master => scan.has_master = true,
            ConsRole::Block(b) => {
                scan.blocks.insert(b);
            }
        }
    }
    scan
}

impl Candidate {
    /// Assign every open item whose place follows from its assigned neighbors.
    ///
    /// Constraints: a master-only variable, or variables from blocks that
    /// cannot share a block, send the constraint to the master. If all
    /// assigned variables fit exactly one block and no variable is open,
    /// the constraint joins that block.
    ///
    /// Variables (looking at block constraints only): one block and no open
    /// constraint joins that block; two consecutive blocks and no open
    /// constraint becomes stairlinking; otherwise two or more blocks become
    /// linking; only master constraints and no open constraint goes to the
    /// master.
    ///
    /// Each phase books against one snapshot and flushes; phases repeat
    /// until nothing changes, so a second call is a no-op.
    pub fn consider_implicits<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<usize, CandidateError> {
        self.check_dimensions(provider)?;
        self.flush()?;
        if self.is_complete() {
            return Ok(0);
        }

        let assigned = self.with_step("consider_implicits", |cand| {
            let mut total = 0;
            loop {
                let round = cand.implicit_conss(provider)? + cand.implicit_vars(provider)?;
                if round == 0 {
                    break;
                }
                total += round;
            }
            Ok(total)
        })?;

        tracing::debug!(candidate = %self.id, assigned, "consider_implicits");
        self.verify_if(policy.verify_after_refinement, provider)?;
        Ok(assigned)
    }

    fn implicit_conss<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> Result<usize, CandidateError> {
        let var_roles = self.var_roles();
        let open = self.open_conss.clone();
        for cons in open {
            let scan = scan_cons(provider, &var_roles, cons);
            match scan.placement {
                Placement::Master => self.book_cons_to_master(cons)?,
                placement => {
                    if let (Some(b), false) = (placement.single_block(), scan.has_open) {
                        self.book_cons_to_block(cons, b)?;
                    }
                }
            }
        }
        self.flush()
    }

    fn implicit_vars<P: IncidenceProvider + ?Sized>(&mut self, provider: &P) -> Result<usize, CandidateError> {
        let cons_roles = self.cons_roles();
        let open = self.open_vars.clone();
        for var in open {
            let scan = scan_var(provider, &cons_roles, var);
            if !scan.has_open {
                if let Some(b) = scan.single_block() {
                    self.book_var_to_block(var, b)?;
                    continue;
                }
                if let Some(b) = scan.consecutive_pair() {
                    self.book_var_to_stairlinking(var, b)?;
                    continue;
                }
            }
            if scan.blocks.len() >= 2 {
                self.book_var_to_linking(var)?;
            } else if scan.blocks.is_empty() && scan.has_master && !scan.has_open {
                self.book_var_to_master(var)?;
            }
        }
        self.flush()
    }

    /// Send items that touch one block and still have open neighbors to the border.
    ///
    /// Open constraints touching exactly one block's variables plus at least
    /// one open variable go to the master. Open variables in constraints of
    /// exactly one block plus at least one open constraint become linking
    /// (a master-only variable may not appear in a block constraint).
    pub fn assign_partial_hitting_to_master<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<usize, CandidateError> {
        self.check_dimensions(provider)?;
        self.flush()?;
        if self.is_complete() {
            return Ok(0);
        }

        let assigned = self.with_step("partial_hitting_to_master", |cand| {
            let var_roles = cand.var_roles();
            let cons_roles = cand.cons_roles();
            for cons in cand.open_conss.clone() {
                let scan = scan_cons(provider, &var_roles, cons);
                if scan.touched.len() == 1 && scan.has_open {
                    cand.book_cons_to_master(cons)?;
                }
            }
            for var in cand.open_vars.clone() {
                let scan = scan_var(provider, &cons_roles, var);
                if scan.blocks.len() == 1 && scan.has_open {
                    cand.book_var_to_linking(var)?;
                }
            }
            cand.flush()
        })?;

        tracing::debug!(candidate = %self.id, assigned, "assign_partial_hitting_to_master");
        self.verify_if(policy.verify_after_refinement, provider)?;
        Ok(assigned)
    }

    /// Turn linking variables that only appear in master constraints into master variables.
    pub fn find_vars_linking_to_master<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        policy: &RefinementPolicy,
    ) -> Result<usize, CandidateError> {
        self.check_dimensions(provider)?;
        let cons_roles = self.cons_roles();
        let (to_master, keep): (Vec<usize>, Vec<usize>) = self
            .linking_vars
            .iter()
            .partition(|&&v| provider.conss_of(v).iter().all(|&c| cons_roles[c] == ConsRole::Master));

        if to_master.is_empty() {
            return Ok(0);
        }
        let moved = to_master.len();
        self.linking_vars = keep;
        self.master_vars.extend(to_master);
        self.master_vars.sort_unstable();
        self.touch();

        tracing::debug!(candidate = %self.id, moved, "find_vars_linking_to_master");
        self.verify_if(policy.verify_after_refinement, provider)?;
        Ok(moved)
    }

    /// Remove blocks without constraints (and, if `require_no_vars`, without
    /// variables). Their variables, and stairlinking variables touching them,
    /// return to open. Later blocks are renumbered. Returns the number of
    /// removed blocks.
    pub fn delete_empty_blocks(&mut self, require_no_vars: bool) -> Result<usize, CandidateError> {
        self.flush()?;
        let mut removed = 0;
        for b in (0..self.n_blocks).rev() {
            let empty = self.conss_for_blocks[b].is_empty()
                && (!require_no_vars || self.vars_for_blocks[b].is_empty());
            if empty {
                self.remove_block(b);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(candidate = %self.id, removed, "delete_empty_blocks");
        }
        Ok(removed)
    }

    fn remove_block(&mut self, block: usize) {
        let mut freed = self.vars_for_blocks.remove(block);
        freed.extend(self.stairlinking_vars.remove(block));
        if block > 0 {
            freed.append(&mut self.stairlinking_vars[block - 1]);
        }
        self.conss_for_blocks.remove(block);
        self.n_blocks -= 1;
        for var in freed {
            self.reopen_var(var);
        }
        self.touch();
    }

    /// Reorder blocks: block `order[i]` becomes block `i`.
    ///
    /// Fails unless `order` is a bijection on the current blocks. Blocks
    /// joined by stairlinking variables cannot be reordered.
    pub fn permute_blocks(&mut self, order: &[usize]) -> Result<(), CandidateError> {
        // Bookings refer to old block indices.
        self.flush()?;
        if order.len() != self.n_blocks {
            return Err(CandidateError::InvalidPermutation(format!(
                "{} entries for {} blocks",
                order.len(),
                self.n_blocks
            )));
        }
        let mut seen = vec![false; self.n_blocks];
        for &b in order {
            if b >= self.n_blocks || std::mem::replace(&mut seen[b], true) {
                return Err(CandidateError::InvalidPermutation(format!("block {} repeated or out of range", b)));
            }
        }
        let identity = order.iter().enumerate().all(|(i, &b)| i == b);
        if identity {
            return Ok(());
        }
        if self.n_total_stairlinking_vars() > 0 {
            return Err(CandidateError::InvalidPermutation(
                "stairlinking variables pin the block order".to_string(),
            ));
        }

        let mut conss: Vec<Option<Vec<usize>>> = std::mem::take(&mut self.conss_for_blocks).into_iter().map(Some).collect();
        let mut vars: Vec<Option<Vec<usize>>> = std::mem::take(&mut self.vars_for_blocks).into_iter().map(Some).collect();
        self.conss_for_blocks = order.iter().map(|&b| conss[b].take().unwrap_or_default()).collect();
        self.vars_for_blocks = order.iter().map(|&b| vars[b].take().unwrap_or_default()).collect();
        self.touch();
        Ok(())
    }

    /// Send open items of the selected classes to the border.
    ///
    /// With a constraint classifier, open constraints of `to_master` classes
    /// go to the master; `to_linking` must be empty. With a variable
    /// classifier, open variables of `to_master` classes go to the master
    /// and those of `to_linking` classes become linking. A master-class
    /// variable that already appears in a block constraint becomes linking
    /// instead. The classes used are recorded in the lineage.
    pub fn assign_classes_to_master<P: IncidenceProvider + ?Sized>(
        &mut self,
        provider: &P,
        classifier: &Classifier,
        to_master: &[usize],
        to_linking: &[usize],
        policy: &RefinementPolicy,
    ) -> Result<usize, CandidateError> {
        self.check_dimensions(provider)?;
        let n_items = match classifier.kind() {
            ClassifierKind::Constraint => self.n_conss,
            ClassifierKind::Variable => self.n_vars,
        };
        if classifier.n_items() != n_items {
            return Err(CandidateError::ClassifierMismatch(classifier.name().to_string()));
        }
        if classifier.kind() == ClassifierKind::Constraint && !to_linking.is_empty() {
            return Err(CandidateError::ClassifierMismatch(format!(
                "{} classifies constraints, which cannot be linking",
                classifier.name()
            )));
        }
        self.flush()?;

        let mut selected = vec![0u8; classifier.n_classes()];
        for &c in to_master {
            if let Some(s) = selected.get_mut(c) {
                *s = 1;
            }
        }
        for &c in to_linking {
            if let Some(s) = selected.get_mut(c) {
                *s = 2;
            }
        }
        let selection = |item: usize| classifier.class_of(item).and_then(|c| selected.get(c).copied()).unwrap_or(0);

        let before = self.assignment_counts();
        let start = Instant::now();
        match classifier.kind() {
            ClassifierKind::Constraint => {
                for cons in self.open_conss.clone() {
                    if selection(cons) == 1 {
                        self.book_cons_to_master(cons)?;
                    }
                }
            }
            ClassifierKind::Variable => {
                let cons_roles = self.cons_roles();
                for var in self.open_vars.clone() {
                    match selection(var) {
                        1 if scan_var(provider, &cons_roles, var).blocks.is_empty() => self.book_var_to_master(var)?,
                        1 | 2 => self.book_var_to_linking(var)?,
                        _ => {}
                    }
                }
            }
        }
        let assigned = self.flush()?;

        let stats = ClassifierStats::record(classifier, to_master, to_linking);
        let step = RefinementStep::between(
            format!("classes_to_master:{}", classifier.name()),
            start.elapsed(),
            before,
            self.assignment_counts(),
            self.n_conss,
            self.n_vars,
        )
        .with_classifier(stats);
        self.lineage.push_step(step);

        tracing::debug!(
            candidate = %self.id,
            classifier = classifier.name(),
            kind = %classifier.kind(),
            assigned,
            "assign_classes_to_master"
        );
        self.verify_if(policy.verify_after_refinement, provider)?;
        Ok(assigned)
    }
}
