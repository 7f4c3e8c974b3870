//! Area-based scores.

use crate::candidate::Candidate;
use crate::incidence::IncidenceProvider;

/// Weight of the border fraction in the classic score.
const CLASSIC_BORDER_WEIGHT: f64 = 0.6;
/// Weight of the linking concentration in the classic score.
const CLASSIC_LINKING_WEIGHT: f64 = 0.2;
/// Weight of the block sparsity in the classic score.
const CLASSIC_DENSITY_WEIGHT: f64 = 0.2;

pub(crate) fn matrix_area(cand: &Candidate) -> f64 {
    cand.n_conss() as f64 * cand.n_vars() as f64
}

fn n_border_vars(cand: &Candidate) -> usize {
    cand.linking_vars().len() + cand.n_total_stairlinking_vars()
}

/// Sum of `conss * vars` over all blocks, or over `reps` only.
pub(crate) fn raw_block_area(cand: &Candidate, reps: Option<&[usize]>) -> f64 {
    let area = |b: usize| cand.conss_for_block(b).len() as f64 * cand.vars_for_block(b).len() as f64;
    match reps {
        Some(reps) => reps.iter().map(|&b| area(b)).sum(),
        None => (0..cand.n_blocks()).map(area).sum(),
    }
}

fn raw_border_area(cand: &Candidate) -> f64 {
    let border_vars = n_border_vars(cand);
    let n_master = cand.master_conss().len();
    border_vars as f64 * cand.n_conss() as f64
        + n_master as f64 * cand.n_vars().saturating_sub(border_vars) as f64
}

pub(crate) fn border_area(cand: &Candidate) -> f64 {
    let matrix = matrix_area(cand);
    if matrix == 0.0 {
        return 1.0;
    }
    1.0 - raw_border_area(cand) / matrix
}

pub(crate) fn block_area(cand: &Candidate, reps: Option<&[usize]>) -> f64 {
    let matrix = matrix_area(cand);
    if matrix == 0.0 {
        return 1.0;
    }
    1.0 - raw_block_area(cand, reps) / matrix
}

pub(crate) fn max_white(cand: &Candidate) -> f64 {
    (block_area(cand, None) + border_area(cand) - 1.0).max(0.0)
}

/// Blocks hit by each border variable, and border variables hitting each block.
struct BorderHits {
    blocks_per_var: Vec<usize>,
    vars_per_block: Vec<usize>,
}

fn border_hits<P: IncidenceProvider + ?Sized>(cand: &Candidate, provider: &P) -> BorderHits {
    let n_blocks = cand.n_blocks();
    let mut hits = BorderHits {
        blocks_per_var: Vec::with_capacity(n_border_vars(cand)),
        vars_per_block: vec![0; n_blocks],
    };

    let mut block_of_cons = vec![None; cand.n_conss()];
    for b in 0..n_blocks {
        for &c in cand.conss_for_block(b) {
            block_of_cons[c] = Some(b);
        }
    }

    for &v in cand.linking_vars() {
        let mut seen = vec![false; n_blocks];
        for &c in provider.conss_of(v) {
            if let Some(b) = block_of_cons[c] {
                seen[b] = true;
            }
        }
        let mut count = 0;
        for (b, _) in seen.iter().enumerate().filter(|(_, &s)| s) {
            hits.vars_per_block[b] += 1;
            count += 1;
        }
        hits.blocks_per_var.push(count);
    }
    for b in 0..n_blocks {
        for _ in cand.stairlinking_vars(b) {
            hits.vars_per_block[b] += 1;
            if b + 1 < n_blocks {
                hits.vars_per_block[b + 1] += 1;
            }
            hits.blocks_per_var.push(2);
        }
    }
    hits
}

/// `1 - (0.6 border + 0.2 linking concentration + 0.2 (1 - min block density))`.
///
/// Linking concentration is the mean fraction of blocks each border
/// variable hits. Block density counts nonzeros over the block's rows and
/// its own plus border columns; blocks with zero area are skipped.
pub(crate) fn classic<P: IncidenceProvider + ?Sized>(cand: &Candidate, provider: &P) -> f64 {
    let matrix = matrix_area(cand);
    let border_fraction = if matrix == 0.0 { 0.0 } else { raw_border_area(cand) / matrix };

    let hits = border_hits(cand, provider);
    let n_blocks = cand.n_blocks();
    let concentration = if hits.blocks_per_var.is_empty() || n_blocks == 0 {
        0.0
    } else {
        hits.blocks_per_var
            .iter()
            .map(|&k| k as f64 / n_blocks as f64)
            .sum::<f64>()
            / hits.blocks_per_var.len() as f64
    };

    let min_density = (0..n_blocks)
        .filter_map(|b| {
            let rows = cand.conss_for_block(b);
            let cols = cand.vars_for_block(b).len() + hits.vars_per_block[b];
            let area = rows.len() * cols;
            if area == 0 {
                return None;
            }
            let nonzeros: usize = rows.iter().map(|&c| provider.vars_of(c).len()).sum();
            Some(nonzeros as f64 / area as f64)
        })
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.min(d))))
        .unwrap_or(0.0);

    let penalty = CLASSIC_BORDER_WEIGHT * border_fraction
        + CLASSIC_LINKING_WEIGHT * concentration
        + CLASSIC_DENSITY_WEIGHT * (1.0 - min_density);
    (1.0 - penalty).clamp(0.0, 1.0)
}
