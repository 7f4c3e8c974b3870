//! Decomposition candidates.
//!
//! A [`Candidate`] is a partial or complete assignment of every constraint
//! and variable of a problem into the master, a block, or the variable
//! border (linking and stairlinking variables).
//!
//! ## Partition Invariant
//!
//! - Every constraint is in exactly one of {open, master, block `b`}
//! - Every variable is in exactly one of {open, master, linking,
//!   stairlinking `(b, b+1)`, block `b`}
//! - A block constraint only contains variables of its own block, linking
//!   variables, stairlinking variables touching its block, or open variables
//!
//! ## Mutation
//!
//! Candidates are mutated either through the booking buffer (`book_*` then
//! [`Candidate::flush`]) or through the direct `set_*` setters. Every
//! mutation goes through one private `touch()` that clears the memoized
//! fingerprint and aggregation information. Scores are not cleared: they
//! are only replaced by explicit recomputation.
//!
//! ## Lifecycle
//!
//! ```text
//! Empty (no blocks) → Partial (some open) → Complete (none open)
//! ```
//!
//! Refinements only move forward. A complete candidate is handed to the
//! repository, which owns it from then on.

mod booking;
mod complete;
mod consistency;
pub mod error;
mod fingerprint;
mod refine;
mod stairlinking;

use std::cell::OnceCell;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::incidence::IncidenceProvider;
use crate::score::{AggregationInfo, ScoreSet};
use crate::types::{AssignmentCounts, CandidateId, ConsRole, Lineage, RefinementStep, VarRole};

use booking::BookingBuffer;
pub use error::{CandidateError, ConsistencyRule, ConsistencyViolation, Dimension};
pub use stairlinking::StairlinkingReport;

/// Coarse lifecycle state of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateState {
    /// No blocks yet, items still open.
    Empty,
    /// At least one block, items still open.
    Partial,
    /// Nothing open.
    Complete,
}

/// A partial or complete decomposition of a problem.
#[derive(Debug)]
pub struct Candidate {
    id: CandidateId,
    n_conss: usize,
    n_vars: usize,
    n_blocks: usize,

    master_conss: Vec<usize>,
    master_vars: Vec<usize>,
    linking_vars: Vec<usize>,
    conss_for_blocks: Vec<Vec<usize>>,
    vars_for_blocks: Vec<Vec<usize>>,
    /// Variables linking block `b` and block `b + 1`, stored at `b`.
    stairlinking_vars: Vec<Vec<usize>>,

    open_conss: Vec<usize>,
    open_vars: Vec<usize>,
    is_cons_open: Vec<bool>,
    is_var_open: Vec<bool>,

    booked: BookingBuffer,

    fingerprint: OnceCell<u64>,
    aggregation: Option<AggregationInfo>,
    scores: ScoreSet,
    lineage: Lineage,
}

/// Insert into a sorted list, ignoring duplicates.
fn insert_sorted(list: &mut Vec<usize>, value: usize) {
    if let Err(pos) = list.binary_search(&value) {
        list.insert(pos, value);
    }
}

impl Candidate {
    /// Create an empty candidate: everything open, zero blocks.
    pub fn new(id: CandidateId, n_conss: usize, n_vars: usize) -> Self {
        Self {
            id,
            n_conss,
            n_vars,
            n_blocks: 0,
            master_conss: Vec::new(),
            master_vars: Vec::new(),
            linking_vars: Vec::new(),
            conss_for_blocks: Vec::new(),
            vars_for_blocks: Vec::new(),
            stairlinking_vars: Vec::new(),
            open_conss: (0..n_conss).collect(),
            open_vars: (0..n_vars).collect(),
            is_cons_open: vec![true; n_conss],
            is_var_open: vec![true; n_vars],
            booked: BookingBuffer::default(),
            fingerprint: OnceCell::new(),
            aggregation: None,
            scores: ScoreSet::default(),
            lineage: Lineage::new(),
        }
    }

    /// Create an empty candidate sized for a problem.
    pub fn for_problem<P: IncidenceProvider + ?Sized>(id: CandidateId, provider: &P) -> Self {
        Self::new(id, provider.n_conss(), provider.n_vars())
    }

    /// Deep copy under a fresh identity.
    ///
    /// The copy has empty booking buffers and records `self` as its most
    /// recent ancestor. Scores carry over; they describe the same
    /// assignment until either side is mutated and rescored.
    pub fn fork(&self, id: CandidateId) -> Self {
        let mut lineage = self.lineage.clone();
        lineage.push_ancestor(self.id);

        Self {
            id,
            n_conss: self.n_conss,
            n_vars: self.n_vars,
            n_blocks: self.n_blocks,
            master_conss: self.master_conss.clone(),
            master_vars: self.master_vars.clone(),
            linking_vars: self.linking_vars.clone(),
            conss_for_blocks: self.conss_for_blocks.clone(),
            vars_for_blocks: self.vars_for_blocks.clone(),
            stairlinking_vars: self.stairlinking_vars.clone(),
            open_conss: self.open_conss.clone(),
            open_vars: self.open_vars.clone(),
            is_cons_open: self.is_cons_open.clone(),
            is_var_open: self.is_var_open.clone(),
            booked: BookingBuffer::default(),
            fingerprint: self.fingerprint.clone(),
            aggregation: self.aggregation.clone(),
            scores: self.scores.clone(),
            lineage,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Identity and dimensions
    // ─────────────────────────────────────────────────────────────────────

    /// Candidate id.
    pub fn id(&self) -> CandidateId {
        self.id
    }

    /// Relabel the candidate (used when a copy is handed out for editing).
    pub fn set_id(&mut self, id: CandidateId) {
        self.id = id;
    }

    /// Number of constraints of the problem.
    pub fn n_conss(&self) -> usize {
        self.n_conss
    }

    /// Number of variables of the problem.
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// Number of blocks.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────

    /// Master constraints, sorted.
    pub fn master_conss(&self) -> &[usize] {
        &self.master_conss
    }

    /// Master-only variables, sorted.
    pub fn master_vars(&self) -> &[usize] {
        &self.master_vars
    }

    /// Linking variables, sorted.
    pub fn linking_vars(&self) -> &[usize] {
        &self.linking_vars
    }

    /// Constraints of a block, sorted. Empty for unknown blocks.
    pub fn conss_for_block(&self, block: usize) -> &[usize] {
        self.conss_for_blocks.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Variables of a block, sorted. Empty for unknown blocks.
    pub fn vars_for_block(&self, block: usize) -> &[usize] {
        self.vars_for_blocks.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stairlinking variables shared by `block` and `block + 1`, sorted.
    pub fn stairlinking_vars(&self, block: usize) -> &[usize] {
        self.stairlinking_vars.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of stairlinking variables.
    pub fn n_total_stairlinking_vars(&self) -> usize {
        self.stairlinking_vars.iter().map(Vec::len).sum()
    }

    /// Open constraints, sorted.
    pub fn open_conss(&self) -> &[usize] {
        &self.open_conss
    }

    /// Open variables, sorted.
    pub fn open_vars(&self) -> &[usize] {
        &self.open_vars
    }

    /// Whether a constraint is open.
    pub fn is_cons_open(&self, cons: usize) -> bool {
        self.is_cons_open.get(cons).copied().unwrap_or(false)
    }

    /// Whether a variable is open.
    pub fn is_var_open(&self, var: usize) -> bool {
        self.is_var_open.get(var).copied().unwrap_or(false)
    }

    /// Whether nothing is open.
    pub fn is_complete(&self) -> bool {
        self.open_conss.is_empty() && self.open_vars.is_empty()
    }

    /// Lifecycle state.
    pub fn state(&self) -> CandidateState {
        if self.is_complete() {
            CandidateState::Complete
        } else if self.n_blocks == 0 {
            CandidateState::Empty
        } else {
            CandidateState::Partial
        }
    }

    /// Current role of a constraint.
    pub fn cons_role(&self, cons: usize) -> ConsRole {
        if self.is_cons_open(cons) {
            return ConsRole::Open;
        }
        if self.master_conss.binary_search(&cons).is_ok() {
            return ConsRole::Master;
        }
        self.conss_for_blocks
            .iter()
            .position(|conss| conss.binary_search(&cons).is_ok())
            .map(ConsRole::Block)
            .unwrap_or(ConsRole::Open)
    }

    /// Current role of a variable.
    pub fn var_role(&self, var: usize) -> VarRole {
        if self.is_var_open(var) {
            return VarRole::Open;
        }
        if self.linking_vars.binary_search(&var).is_ok() {
            return VarRole::Linking;
        }
        if self.master_vars.binary_search(&var).is_ok() {
            return VarRole::Master;
        }
        if let Some(b) = self
            .stairlinking_vars
            .iter()
            .position(|vars| vars.binary_search(&var).is_ok())
        {
            return VarRole::Stairlinking(b);
        }
        self.vars_for_blocks
            .iter()
            .position(|vars| vars.binary_search(&var).is_ok())
            .map(VarRole::Block)
            .unwrap_or(VarRole::Open)
    }

    /// Role of every constraint, indexed by constraint.
    pub(crate) fn cons_roles(&self) -> Vec<ConsRole> {
        let mut roles = vec![ConsRole::Open; self.n_conss];
        for &c in &self.master_conss {
            if let Some(r) = roles.get_mut(c) {
                *r = ConsRole::Master;
            }
        }
        for (b, conss) in self.conss_for_blocks.iter().enumerate() {
            for &c in conss {
                if let Some(r) = roles.get_mut(c) {
                    *r = ConsRole::Block(b);
                }
            }
        }
        roles
    }

    /// Role of every variable, indexed by variable.
    pub(crate) fn var_roles(&self) -> Vec<VarRole> {
        let mut roles = vec![VarRole::Open; self.n_vars];
        let mut set = |v: usize, role: VarRole| {
            if let Some(r) = roles.get_mut(v) {
                *r = role;
            }
        };
        for &v in &self.master_vars {
            set(v, VarRole::Master);
        }
        for &v in &self.linking_vars {
            set(v, VarRole::Linking);
        }
        for (b, vars) in self.stairlinking_vars.iter().enumerate() {
            for &v in vars {
                set(v, VarRole::Stairlinking(b));
            }
        }
        for (b, vars) in self.vars_for_blocks.iter().enumerate() {
            for &v in vars {
                set(v, VarRole::Block(b));
            }
        }
        roles
    }

    /// Counts of assigned items, for lineage.
    pub fn assignment_counts(&self) -> AssignmentCounts {
        AssignmentCounts {
            open_conss: self.open_conss.len(),
            open_vars: self.open_vars.len(),
            master_conss: self.master_conss.len(),
            block_conss: self.conss_for_blocks.iter().map(Vec::len).sum(),
            border_vars: self.master_vars.len()
                + self.linking_vars.len()
                + self.n_total_stairlinking_vars(),
            block_vars: self.vars_for_blocks.iter().map(Vec::len).sum(),
            n_blocks: self.n_blocks,
        }
    }

    /// Whether the decomposition carries no useful structure.
    ///
    /// Trivial: a single block holding at least 95% of the constraints,
    /// everything in the master, nothing assigned at all, or every variable
    /// in the master or the linking border.
    pub fn is_trivial(&self) -> bool {
        if self.n_blocks == 1 && self.conss_for_block(0).len() as f64 >= 0.95 * self.n_conss as f64 {
            return true;
        }
        if self.n_conss == self.master_conss.len() {
            return true;
        }
        if self.n_conss == self.open_conss.len() && self.n_vars == self.open_vars.len() {
            return true;
        }
        self.n_vars == self.master_vars.len() + self.linking_vars.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Memos
    // ─────────────────────────────────────────────────────────────────────

    /// Scores computed so far.
    pub fn scores(&self) -> &ScoreSet {
        &self.scores
    }

    pub(crate) fn scores_mut(&mut self) -> &mut ScoreSet {
        &mut self.scores
    }

    /// Aggregation information, if computed since the last mutation.
    pub fn aggregation_info(&self) -> Option<&AggregationInfo> {
        self.aggregation.as_ref()
    }

    pub(crate) fn store_aggregation(&mut self, info: AggregationInfo) -> &AggregationInfo {
        self.aggregation.insert(info)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lineage
    // ─────────────────────────────────────────────────────────────────────

    /// Lineage of this candidate.
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Lineage serialized as JSON.
    pub fn lineage_json(&self) -> Result<String, serde_json::Error> {
        self.lineage.to_json()
    }

    /// Record an ancestor id.
    pub fn add_ancestor(&mut self, id: CandidateId) {
        self.lineage.push_ancestor(id);
    }

    /// Record a refinement step performed by an external detector.
    pub fn record_step(&mut self, step: RefinementStep) {
        self.lineage.push_step(step);
    }

    /// Run `f` and record it as a lineage step named `detector`.
    pub(crate) fn with_step<T>(
        &mut self,
        detector: &str,
        f: impl FnOnce(&mut Self) -> Result<T, CandidateError>,
    ) -> Result<T, CandidateError> {
        let before = self.assignment_counts();
        let start = Instant::now();
        let out = f(self)?;
        let step = RefinementStep::between(
            detector,
            start.elapsed(),
            before,
            self.assignment_counts(),
            self.n_conss,
            self.n_vars,
        );
        self.lineage.push_step(step);
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Direct setters
    // ─────────────────────────────────────────────────────────────────────

    /// Append an empty block and return its index.
    pub fn add_block(&mut self) -> usize {
        self.conss_for_blocks.push(Vec::new());
        self.vars_for_blocks.push(Vec::new());
        self.stairlinking_vars.push(Vec::new());
        self.n_blocks += 1;
        self.touch();
        self.n_blocks - 1
    }

    /// Grow the block list to `n_blocks`. Never shrinks.
    pub fn ensure_blocks(&mut self, n_blocks: usize) {
        while self.n_blocks < n_blocks {
            self.add_block();
        }
    }

    /// Assign an open constraint to the master.
    pub fn set_cons_to_master(&mut self, cons: usize) -> Result<(), CandidateError> {
        self.require_open_cons(cons)?;
        insert_sorted(&mut self.master_conss, cons);
        self.close_cons(cons);
        self.touch();
        Ok(())
    }

    /// Assign an open constraint to a block.
    pub fn set_cons_to_block(&mut self, cons: usize, block: usize) -> Result<(), CandidateError> {
        self.check_block(block)?;
        self.require_open_cons(cons)?;
        insert_sorted(&mut self.conss_for_blocks[block], cons);
        self.close_cons(cons);
        self.touch();
        Ok(())
    }

    /// Assign an open variable to the master.
    pub fn set_var_to_master(&mut self, var: usize) -> Result<(), CandidateError> {
        self.require_open_var(var)?;
        insert_sorted(&mut self.master_vars, var);
        self.close_var(var);
        self.touch();
        Ok(())
    }

    /// Assign an open variable to a block.
    pub fn set_var_to_block(&mut self, var: usize, block: usize) -> Result<(), CandidateError> {
        self.check_block(block)?;
        self.require_open_var(var)?;
        insert_sorted(&mut self.vars_for_blocks[block], var);
        self.close_var(var);
        self.touch();
        Ok(())
    }

    /// Assign an open variable to the linking variables.
    pub fn set_var_to_linking(&mut self, var: usize) -> Result<(), CandidateError> {
        self.require_open_var(var)?;
        insert_sorted(&mut self.linking_vars, var);
        self.close_var(var);
        self.touch();
        Ok(())
    }

    /// Assign an open variable as stairlinking between `block` and `block + 1`.
    pub fn set_var_to_stairlinking(&mut self, var: usize, block: usize) -> Result<(), CandidateError> {
        self.check_block(block)?;
        if block + 1 >= self.n_blocks {
            return Err(CandidateError::NoSuccessorBlock { block });
        }
        self.require_open_var(var)?;
        insert_sorted(&mut self.stairlinking_vars[block], var);
        self.close_var(var);
        self.touch();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────

    /// Clear every memo derived from the assignment.
    pub(crate) fn touch(&mut self) {
        self.fingerprint.take();
        self.aggregation = None;
    }

    pub(crate) fn check_cons(&self, cons: usize) -> Result<(), CandidateError> {
        if cons >= self.n_conss {
            return Err(CandidateError::IndexOutOfRange {
                dimension: Dimension::Cons,
                index: cons,
                len: self.n_conss,
            });
        }
        Ok(())
    }

    pub(crate) fn check_var(&self, var: usize) -> Result<(), CandidateError> {
        if var >= self.n_vars {
            return Err(CandidateError::IndexOutOfRange {
                dimension: Dimension::Var,
                index: var,
                len: self.n_vars,
            });
        }
        Ok(())
    }

    pub(crate) fn check_block(&self, block: usize) -> Result<(), CandidateError> {
        if block >= self.n_blocks {
            return Err(CandidateError::BlockOutOfRange {
                block,
                n_blocks: self.n_blocks,
            });
        }
        Ok(())
    }

    pub(crate) fn check_dimensions<P: IncidenceProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<(), CandidateError> {
        if provider.n_conss() != self.n_conss || provider.n_vars() != self.n_vars {
            return Err(CandidateError::DimensionMismatch {
                candidate_conss: self.n_conss,
                candidate_vars: self.n_vars,
                provider_conss: provider.n_conss(),
                provider_vars: provider.n_vars(),
            });
        }
        Ok(())
    }

    fn require_open_cons(&self, cons: usize) -> Result<(), CandidateError> {
        self.check_cons(cons)?;
        if !self.is_cons_open[cons] {
            return Err(CandidateError::ConsAlreadyAssigned {
                index: cons,
                role: self.cons_role(cons),
            });
        }
        Ok(())
    }

    fn require_open_var(&self, var: usize) -> Result<(), CandidateError> {
        self.check_var(var)?;
        if !self.is_var_open[var] {
            return Err(CandidateError::VarAlreadyAssigned {
                index: var,
                role: self.var_role(var),
            });
        }
        Ok(())
    }

    fn close_cons(&mut self, cons: usize) {
        self.is_cons_open[cons] = false;
        if let Ok(pos) = self.open_conss.binary_search(&cons) {
            self.open_conss.remove(pos);
        }
    }

    fn close_var(&mut self, var: usize) {
        self.is_var_open[var] = false;
        if let Ok(pos) = self.open_vars.binary_search(&var) {
            self.open_vars.remove(pos);
        }
    }

    /// Return a variable to the open set (used when blocks are deleted).
    fn reopen_var(&mut self, var: usize) {
        if let Some(flag) = self.is_var_open.get_mut(var) {
            *flag = true;
            insert_sorted(&mut self.open_vars, var);
        }
    }

    /// Run the consistency checker if the policy asks for it, logging violations.
    pub(crate) fn verify_if<P: IncidenceProvider + ?Sized>(
        &self,
        enabled: bool,
        provider: &P,
    ) -> Result<(), CandidateError> {
        if enabled {
            self.ensure_consistent(provider)?;
        }
        Ok(())
    }

    /// Check consistency, logging and converting a violation into `Corrupt`.
    pub(crate) fn ensure_consistent<P: IncidenceProvider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<(), CandidateError> {
        self.check_consistency(provider).map_err(|violation| {
            violation.log();
            CandidateError::Corrupt(violation)
        })
    }
}
