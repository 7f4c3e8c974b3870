//! Booking buffer and flush.
//!
//! Algorithms that scan the candidate while deciding reassignments book
//! them first and commit them in one `flush`, so every decision in a batch
//! is taken against the same snapshot.
//!
//! ## Commit Order
//!
//! | Step | Queue |
//! |------|-------|
//! | 1 | master constraints |
//! | 2 | block constraints |
//! | 3 | linking variables |
//! | 4 | master variables |
//! | 5 | block variables |
//! | 6 | stairlinking variables |
//!
//! An item that is no longer open when its turn comes is skipped, so the
//! first decision wins: a variable booked both linking and block becomes
//! linking.

use super::{Candidate, CandidateError};

/// Pending reassignments.
#[derive(Debug, Clone, Default)]
pub(crate) struct BookingBuffer {
    master_conss: Vec<usize>,
    block_conss: Vec<(usize, usize)>,
    linking_vars: Vec<usize>,
    master_vars: Vec<usize>,
    block_vars: Vec<(usize, usize)>,
    stairlinking_vars: Vec<(usize, usize)>,
}

impl BookingBuffer {
    fn len(&self) -> usize {
        self.master_conss.len()
            + self.block_conss.len()
            + self.linking_vars.len()
            + self.master_vars.len()
            + self.block_vars.len()
            + self.stairlinking_vars.len()
    }

    /// Block count needed to host every booked block item.
    fn required_blocks(&self) -> usize {
        self.block_conss
            .iter()
            .chain(self.block_vars.iter())
            .map(|&(_, b)| b + 1)
            .max()
            .unwrap_or(0)
    }

    /// First block in `n_blocks..n_after` that would receive no item.
    ///
    /// Replays the commit order against copies of the open flags, so
    /// bookings skipped by an earlier decision do not count.
    fn first_unfilled_block(&self, cand: &Candidate, n_after: usize) -> Option<usize> {
        let first_new = cand.n_blocks;
        if n_after <= first_new {
            return None;
        }
        let mut filled = vec![false; n_after - first_new];
        let mut cons_open = cand.is_cons_open.clone();
        let mut var_open = cand.is_var_open.clone();

        for &cons in &self.master_conss {
            cons_open[cons] = false;
        }
        for &(cons, block) in &self.block_conss {
            if std::mem::replace(&mut cons_open[cons], false) && block >= first_new {
                filled[block - first_new] = true;
            }
        }
        for &var in self.linking_vars.iter().chain(&self.master_vars) {
            var_open[var] = false;
        }
        for &(var, block) in &self.block_vars {
            if std::mem::replace(&mut var_open[var], false) && block >= first_new {
                filled[block - first_new] = true;
            }
        }

        filled.iter().position(|&f| !f).map(|i| first_new + i)
    }
}

impl Candidate {
    /// Book an open constraint for the master.
    pub fn book_cons_to_master(&mut self, cons: usize) -> Result<(), CandidateError> {
        self.check_cons(cons)?;
        self.booked.master_conss.push(cons);
        Ok(())
    }

    /// Book a constraint for a block. The block may not exist yet, but
    /// [`Candidate::flush`] rejects new blocks left empty.
    pub fn book_cons_to_block(&mut self, cons: usize, block: usize) -> Result<(), CandidateError> {
        self.check_cons(cons)?;
        self.booked.block_conss.push((cons, block));
        Ok(())
    }

    /// Book a variable for the linking border.
    pub fn book_var_to_linking(&mut self, var: usize) -> Result<(), CandidateError> {
        self.check_var(var)?;
        self.booked.linking_vars.push(var);
        Ok(())
    }

    /// Book a variable for the master.
    pub fn book_var_to_master(&mut self, var: usize) -> Result<(), CandidateError> {
        self.check_var(var)?;
        self.booked.master_vars.push(var);
        Ok(())
    }

    /// Book a variable for a block. The block may not exist yet, but
    /// [`Candidate::flush`] rejects new blocks left empty.
    pub fn book_var_to_block(&mut self, var: usize, block: usize) -> Result<(), CandidateError> {
        self.check_var(var)?;
        self.booked.block_vars.push((var, block));
        Ok(())
    }

    /// Book a variable as stairlinking between `block` and `block + 1`.
    pub fn book_var_to_stairlinking(&mut self, var: usize, block: usize) -> Result<(), CandidateError> {
        self.check_var(var)?;
        if block + 1 >= self.n_blocks {
            return Err(CandidateError::NoSuccessorBlock { block });
        }
        self.booked.stairlinking_vars.push((var, block));
        Ok(())
    }

    /// Whether any reassignment is pending.
    pub fn has_pending_bookings(&self) -> bool {
        self.booked.len() > 0
    }

    /// Number of pending reassignments.
    pub fn n_pending_bookings(&self) -> usize {
        self.booked.len()
    }

    /// Drop all pending reassignments.
    pub fn clear_bookings(&mut self) {
        self.booked = BookingBuffer::default();
    }

    /// Commit all pending reassignments.
    ///
    /// Returns the number of items actually moved out of open. Blocks are
    /// created as needed, but every new block must receive at least one
    /// constraint or variable. On error nothing is committed and the
    /// bookings stay pending.
    pub fn flush(&mut self) -> Result<usize, CandidateError> {
        let n_after = self.n_blocks.max(self.booked.required_blocks());
        if let Some(block) = self.booked.first_unfilled_block(self, n_after) {
            return Err(CandidateError::BlockOutOfRange {
                block,
                n_blocks: self.n_blocks,
            });
        }
        if let Some(&(_, block)) = self
            .booked
            .stairlinking_vars
            .iter()
            .find(|&&(_, b)| b + 1 >= n_after)
        {
            return Err(CandidateError::NoSuccessorBlock { block });
        }

        let booked = std::mem::take(&mut self.booked);
        if booked.len() == 0 {
            return Ok(0);
        }
        self.ensure_blocks(n_after);

        let mut committed = 0;

        for &cons in &booked.master_conss {
            if self.is_cons_open[cons] {
                self.is_cons_open[cons] = false;
                self.master_conss.push(cons);
                committed += 1;
            }
        }
        for &(cons, block) in &booked.block_conss {
            if self.is_cons_open[cons] {
                self.is_cons_open[cons] = false;
                self.conss_for_blocks[block].push(cons);
                committed += 1;
            }
        }
        for &var in &booked.linking_vars {
            if self.is_var_open[var] {
                self.is_var_open[var] = false;
                self.linking_vars.push(var);
                committed += 1;
            }
        }
        for &var in &booked.master_vars {
            if self.is_var_open[var] {
                self.is_var_open[var] = false;
                self.master_vars.push(var);
                committed += 1;
            }
        }
        for &(var, block) in &booked.block_vars {
            if self.is_var_open[var] {
                self.is_var_open[var] = false;
                self.vars_for_blocks[block].push(var);
                committed += 1;
            }
        }
        for &(var, block) in &booked.stairlinking_vars {
            if self.is_var_open[var] {
                self.is_var_open[var] = false;
                self.stairlinking_vars[block].push(var);
                committed += 1;
            }
        }

        self.master_conss.sort_unstable();
        self.linking_vars.sort_unstable();
        self.master_vars.sort_unstable();
        for list in self
            .conss_for_blocks
            .iter_mut()
            .chain(self.vars_for_blocks.iter_mut())
            .chain(self.stairlinking_vars.iter_mut())
        {
            list.sort_unstable();
        }

        let is_cons_open = &self.is_cons_open;
        self.open_conss.retain(|&c| is_cons_open[c]);
        let is_var_open = &self.is_var_open;
        self.open_vars.retain(|&v| is_var_open[v]);

        self.touch();
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use crate::candidate::{Candidate, CandidateError};
    use crate::types::{CandidateId, ConsRole, VarRole};

    fn cand(n_conss: usize, n_vars: usize) -> Candidate {
        Candidate::new(CandidateId::new(7), n_conss, n_vars)
    }

    #[test]
    fn test_booking_does_not_touch_partition() {
        let mut c = cand(2, 2);
        c.book_cons_to_master(0).unwrap();
        c.book_var_to_block(1, 0).unwrap();
        assert_eq!(c.open_conss(), &[0, 1]);
        assert_eq!(c.n_blocks(), 0);
        assert_eq!(c.n_pending_bookings(), 2);
    }

    #[test]
    fn test_flush_grows_blocks() {
        let mut c = cand(3, 3);
        c.book_cons_to_block(2, 2).unwrap();
        c.book_cons_to_block(0, 0).unwrap();
        c.book_var_to_block(0, 1).unwrap();
        assert_eq!(c.flush().unwrap(), 3);
        assert_eq!(c.n_blocks(), 3);
        assert_eq!(c.cons_role(2), ConsRole::Block(2));
        assert_eq!(c.var_role(0), VarRole::Block(1));
        assert_eq!(c.open_conss(), &[1]);
        assert!(!c.has_pending_bookings());
    }

    #[test]
    fn test_clear_bookings_discards_pending() {
        let mut c = cand(2, 1);
        c.book_cons_to_master(1).unwrap();
        c.book_var_to_linking(0).unwrap();
        let hash = c.hash_value();
        c.clear_bookings();
        assert!(!c.has_pending_bookings());
        assert_eq!(c.flush().unwrap(), 0);
        assert_eq!(c.open_conss(), &[0, 1]);
        assert_eq!(c.hash_value(), hash);
    }

    #[test]
    fn test_linking_wins_over_block() {
        let mut c = cand(0, 1);
        c.add_block();
        c.book_var_to_block(0, 0).unwrap();
        c.book_var_to_linking(0).unwrap();
        assert_eq!(c.flush().unwrap(), 1);
        assert_eq!(c.var_role(0), VarRole::Linking);
        assert!(c.vars_for_block(0).is_empty());
    }

    #[test]
    fn test_first_decision_wins_within_a_queue() {
        let mut c = cand(1, 0);
        c.ensure_blocks(2);
        c.book_cons_to_block(0, 1).unwrap();
        c.book_cons_to_block(0, 0).unwrap();
        c.flush().unwrap();
        assert_eq!(c.cons_role(0), ConsRole::Block(1));
    }

    #[test]
    fn test_assigned_items_are_skipped() {
        let mut c = cand(1, 0);
        c.add_block();
        c.set_cons_to_master(0).unwrap();
        c.book_cons_to_block(0, 0).unwrap();
        assert_eq!(c.flush().unwrap(), 0);
        assert_eq!(c.cons_role(0), ConsRole::Master);
    }

    #[test]
    fn test_stairlinking_on_last_block_is_rejected() {
        let mut c = cand(0, 1);
        c.add_block();
        assert_eq!(
            c.book_var_to_stairlinking(0, 0).unwrap_err(),
            CandidateError::NoSuccessorBlock { block: 0 }
        );
        c.add_block();
        c.book_var_to_stairlinking(0, 0).unwrap();
        c.flush().unwrap();
        assert_eq!(c.stairlinking_vars(0), &[0]);
    }

    #[test]
    fn test_flush_rejects_gap_blocks() {
        let mut c = cand(1, 1);
        c.book_cons_to_block(0, 2).unwrap();
        c.book_var_to_block(0, 2).unwrap();
        assert_eq!(
            c.flush().unwrap_err(),
            CandidateError::BlockOutOfRange { block: 0, n_blocks: 0 }
        );
        assert_eq!(c.n_blocks(), 0);
        assert_eq!(c.n_pending_bookings(), 2);
    }

    #[test]
    fn test_flush_rejects_block_emptied_by_earlier_decision() {
        let mut c = cand(0, 1);
        c.book_var_to_linking(0).unwrap();
        c.book_var_to_block(0, 0).unwrap();
        assert!(matches!(
            c.flush().unwrap_err(),
            CandidateError::BlockOutOfRange { block: 0, .. }
        ));
        c.clear_bookings();
        c.book_var_to_linking(0).unwrap();
        assert_eq!(c.flush().unwrap(), 1);
        assert_eq!(c.n_blocks(), 0);
    }

    #[test]
    fn test_out_of_range_booking() {
        let mut c = cand(1, 1);
        assert!(c.book_cons_to_master(1).is_err());
        assert!(c.book_var_to_linking(3).is_err());
        assert!(!c.has_pending_bookings());
    }

    #[test]
    fn test_flush_keeps_lists_sorted() {
        let mut c = cand(4, 0);
        for cons in [3, 1, 2, 0] {
            c.book_cons_to_master(cons).unwrap();
        }
        c.flush().unwrap();
        assert_eq!(c.master_conss(), &[0, 1, 2, 3]);
    }
}
