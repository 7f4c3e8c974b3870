//! Deduplication fingerprint.
//!
//! The fingerprint is an xxh64 digest of the canonical assignment. Blocks
//! are canonically ordered by their smallest constraint (blocks without
//! constraints by smallest variable, after all blocks with constraints),
//! so two candidates that differ only by block order hash equal.
//! Stairlinking variables are hashed per block pair, keyed by the canonical
//! rank of both blocks.
//!
//! The digest is memoized and the memo is cleared by every mutation.

use xxhash_rust::xxh64::Xxh64;

use crate::canonical::HASH_SEED;

use super::Candidate;

fn write_usize(hasher: &mut Xxh64, value: usize) {
    hasher.update(&(value as u64).to_le_bytes());
}

fn write_list(hasher: &mut Xxh64, list: &[usize]) {
    write_usize(hasher, list.len());
    for &x in list {
        write_usize(hasher, x);
    }
}

impl Candidate {
    fn block_key(&self, block: usize) -> (u8, usize) {
        if let Some(&c) = self.conss_for_blocks[block].first() {
            (0, c)
        } else if let Some(&v) = self.vars_for_blocks[block].first() {
            (1, v)
        } else {
            (2, block)
        }
    }

    /// Block indices in canonical order.
    pub fn canonical_block_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.n_blocks).collect();
        order.sort_by_key(|&b| self.block_key(b));
        order
    }

    /// Per-block stairlinking lists in canonical order, each paired with
    /// the canonical rank of the successor block it links to.
    fn canonical_stairlinking<'a>(&'a self, order: &[usize]) -> Vec<(&'a [usize], Option<usize>)> {
        let mut rank = vec![0; self.n_blocks];
        for (r, &b) in order.iter().enumerate() {
            rank[b] = r;
        }
        order
            .iter()
            .map(|&b| {
                let list = self.stairlinking_vars[b].as_slice();
                let successor = if list.is_empty() { None } else { rank.get(b + 1).copied() };
                (list, successor)
            })
            .collect()
    }

    /// Fingerprint of the current assignment.
    pub fn hash_value(&self) -> u64 {
        *self.fingerprint.get_or_init(|| self.compute_fingerprint())
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(HASH_SEED);
        write_usize(&mut hasher, self.n_conss);
        write_usize(&mut hasher, self.n_vars);
        write_usize(&mut hasher, self.n_blocks);
        let order = self.canonical_block_order();
        for &b in &order {
            write_list(&mut hasher, &self.conss_for_blocks[b]);
            write_list(&mut hasher, &self.vars_for_blocks[b]);
        }
        write_list(&mut hasher, &self.master_conss);
        write_list(&mut hasher, &self.master_vars);
        write_list(&mut hasher, &self.linking_vars);
        for (list, successor) in self.canonical_stairlinking(&order) {
            write_list(&mut hasher, list);
            if let Some(rank) = successor {
                write_usize(&mut hasher, rank);
            }
        }
        hasher.digest()
    }

    /// Whether two candidates describe the same assignment up to block order.
    pub fn is_equal(&self, other: &Candidate) -> bool {
        if self.n_conss != other.n_conss
            || self.n_vars != other.n_vars
            || self.n_blocks != other.n_blocks
            || self.hash_value() != other.hash_value()
        {
            return false;
        }
        if self.master_conss != other.master_conss
            || self.master_vars != other.master_vars
            || self.linking_vars != other.linking_vars
        {
            return false;
        }
        let (mine, theirs) = (self.canonical_block_order(), other.canonical_block_order());
        let same_blocks = mine.iter().zip(&theirs).all(|(&a, &b)| {
            self.conss_for_blocks[a] == other.conss_for_blocks[b]
                && self.vars_for_blocks[a] == other.vars_for_blocks[b]
        });
        same_blocks && self.canonical_stairlinking(&mine) == other.canonical_stairlinking(&theirs)
    }
}
