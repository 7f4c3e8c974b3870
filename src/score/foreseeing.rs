//! Foreseeing white area scores.
//!
//! The foreseeing view materializes the reformulation: every border
//! variable is copied into each block it hits, and every copy adds a
//! linking row to the master. The score is the white area of that larger
//! matrix. Stairlinking variables hit exactly their two blocks.

use crate::candidate::Candidate;
use crate::incidence::IncidenceProvider;

/// Border variables hitting each block, and the total number of (variable, block) hits.
fn linking_hits<P: IncidenceProvider + ?Sized>(cand: &Candidate, provider: &P) -> (Vec<usize>, usize) {
    let n_blocks = cand.n_blocks();
    let mut per_block = vec![0usize; n_blocks];
    let mut total = 0usize;

    let mut block_of_cons = vec![None; cand.n_conss()];
    for b in 0..n_blocks {
        for &c in cand.conss_for_block(b) {
            block_of_cons[c] = Some(b);
        }
    }

    for &v in cand.linking_vars() {
        let mut hit = vec![false; n_blocks];
        for &c in provider.conss_of(v) {
            if let Some(b) = block_of_cons[c] {
                if provider.value_at(c, v) != 0.0 {
                    hit[b] = true;
                }
            }
        }
        for (b, _) in hit.iter().enumerate().filter(|(_, &h)| h) {
            per_block[b] += 1;
            total += 1;
        }
    }

    for b in 0..n_blocks {
        let n = cand.stairlinking_vars(b).len();
        per_block[b] += n;
        if b + 1 < n_blocks {
            per_block[b + 1] += n;
        }
        total += 2 * n;
    }

    (per_block, total)
}

/// Max foreseeing white score, over all blocks or one block per class in `reps`.
pub(crate) fn max_foreseeing_white<P: IncidenceProvider + ?Sized>(
    cand: &Candidate,
    provider: &P,
    reps: Option<&[usize]>,
) -> f64 {
    let (per_block, total_hits) = linking_hits(cand, provider);

    let new_height = (cand.n_conss() + total_hits) as f64;
    let new_width = (cand.n_vars() + total_hits) as f64;
    if new_height == 0.0 || new_width == 0.0 {
        return 1.0;
    }

    let new_master = (cand.master_conss().len() + total_hits) as f64 * new_width;
    let block_term = |b: usize| {
        cand.conss_for_block(b).len() as f64 * (cand.vars_for_block(b).len() + per_block[b]) as f64
    };
    let new_blocks: f64 = match reps {
        Some(reps) => reps.iter().map(|&b| block_term(b)).sum(),
        None => (0..cand.n_blocks()).map(block_term).sum(),
    };

    (1.0 - (new_blocks + new_master) / new_width / new_height).clamp(0.0, 1.0)
}

/// `0.5 x + 0.5` for a set partitioning master on a non-trivial multi-block
/// candidate, `0.5 x` otherwise.
pub(crate) fn set_partitioning_reward<P: IncidenceProvider + ?Sized>(cand: &Candidate, provider: &P, white: f64) -> f64 {
    if cand.has_setppc_cardinality_master(provider) && !cand.is_trivial() && cand.n_blocks() > 1 {
        0.5 * white + 0.5
    } else {
        0.5 * white
    }
}
