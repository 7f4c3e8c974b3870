//! Decomposition scores.
//!
//! Every score lies in `[0, 1]`, higher is better. Scores are memoized per
//! candidate in a [`ScoreSet`] and only replaced by explicit recomputation;
//! a mutation after scoring leaves stale values in place until the caller
//! rescores.
//!
//! | Score | Measures |
//! |-------|----------|
//! | `BorderArea` | area outside master rows and border columns |
//! | `BlockArea` / `BlockAreaAgg` | area outside blocks (one term per aggregation class) |
//! | `MaxWhite` | area neither block nor border |
//! | `Classic` | weighted border size, linking concentration and block density |
//! | `MaxForeseeingWhite` / `Agg` | white area after copying border variables into each block |
//! | `SetPartForeseeingWhite` / `Agg` | foreseeing white rewarded for a set partitioning master |
//!
//! All scores require a complete candidate. [`Candidate::max_white_upper_bound`]
//! is available at any stage.

pub mod aggregation;
mod area;
mod foreseeing;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, CandidateError};
use crate::incidence::IncidenceProvider;
use crate::policy::RefinementPolicy;

pub use aggregation::{AggregationInfo, BlockEquivalenceOracle, IdenticalLayoutOracle, NoEquivalence};

/// Which score to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScoreType {
    /// Area that is neither block nor border.
    MaxWhite,
    /// Area outside the master rows and border columns.
    BorderArea,
    /// Weighted border size, linking concentration and block density.
    Classic,
    /// White area after copying border variables into the blocks they hit.
    MaxForeseeingWhite,
    /// `MaxForeseeingWhite` counting one block per aggregation class.
    MaxForeseeingWhiteAgg,
    /// `MaxForeseeingWhite` rewarded for a set partitioning master.
    SetPartForeseeingWhite,
    /// `SetPartForeseeingWhite` counting one block per aggregation class.
    SetPartForeseeingWhiteAgg,
    /// Area outside the blocks.
    BlockArea,
    /// `BlockArea` counting one block per aggregation class.
    BlockAreaAgg,
}

impl ScoreType {
    /// All score types.
    pub const ALL: [ScoreType; 9] = [
        Self::MaxWhite,
        Self::BorderArea,
        Self::Classic,
        Self::MaxForeseeingWhite,
        Self::MaxForeseeingWhiteAgg,
        Self::SetPartForeseeingWhite,
        Self::SetPartForeseeingWhiteAgg,
        Self::BlockArea,
        Self::BlockAreaAgg,
    ];

    /// Short stable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxWhite => "maxwhite",
            Self::BorderArea => "border",
            Self::Classic => "classic",
            Self::MaxForeseeingWhite => "forswh",
            Self::MaxForeseeingWhiteAgg => "fawh",
            Self::SetPartForeseeingWhite => "spfwh",
            Self::SetPartForeseeingWhiteAgg => "spfawh",
            Self::BlockArea => "blockarea",
            Self::BlockAreaAgg => "blockareaagg",
        }
    }

    /// Whether the score depends on aggregation information.
    pub fn uses_aggregation(&self) -> bool {
        matches!(
            self,
            Self::MaxForeseeingWhiteAgg | Self::SetPartForeseeingWhiteAgg | Self::BlockAreaAgg
        )
    }
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memoized scores of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    values: BTreeMap<ScoreType, f64>,
}

impl ScoreSet {
    /// Cached value, if computed.
    pub fn get(&self, ty: ScoreType) -> Option<f64> {
        self.values.get(&ty).copied()
    }

    pub(crate) fn insert(&mut self, ty: ScoreType, value: f64) {
        self.values.insert(ty, value);
    }

    /// Computed scores in type order.
    pub fn iter(&self) -> impl Iterator<Item = (ScoreType, f64)> + '_ {
        self.values.iter().map(|(&t, &v)| (t, v))
    }

    /// Number of computed scores.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no score was computed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Candidate {
    /// Score of the given type, computed on first request.
    pub fn score<P, O>(&mut self, ty: ScoreType, provider: &P, oracle: &O) -> Result<f64, CandidateError>
    where
        P: IncidenceProvider + ?Sized,
        O: BlockEquivalenceOracle,
    {
        if let Some(value) = self.scores().get(ty) {
            return Ok(value);
        }
        self.recompute_score(ty, provider, oracle)
    }

    /// Compute a score and replace any memoized value.
    pub fn recompute_score<P, O>(&mut self, ty: ScoreType, provider: &P, oracle: &O) -> Result<f64, CandidateError>
    where
        P: IncidenceProvider + ?Sized,
        O: BlockEquivalenceOracle,
    {
        self.check_dimensions(provider)?;
        if !self.is_complete() {
            return Err(CandidateError::Incomplete {
                candidate: self.id(),
                open_conss: self.open_conss().len(),
                open_vars: self.open_vars().len(),
            });
        }

        if ty.uses_aggregation() && self.aggregation_info().is_none() {
            self.calc_aggregation_information(provider, oracle, &RefinementPolicy::default());
        }
        let reps = self.aggregation_info().map(AggregationInfo::representatives);

        let value = match ty {
            ScoreType::BorderArea => area::border_area(self),
            ScoreType::BlockArea => area::block_area(self, None),
            ScoreType::BlockAreaAgg => area::block_area(self, reps.as_deref()),
            ScoreType::MaxWhite => area::max_white(self),
            ScoreType::Classic => area::classic(self, provider),
            ScoreType::MaxForeseeingWhite => foreseeing::max_foreseeing_white(self, provider, None),
            ScoreType::MaxForeseeingWhiteAgg => foreseeing::max_foreseeing_white(self, provider, reps.as_deref()),
            ScoreType::SetPartForeseeingWhite => {
                let white = foreseeing::max_foreseeing_white(self, provider, None);
                foreseeing::set_partitioning_reward(self, provider, white)
            }
            ScoreType::SetPartForeseeingWhiteAgg => {
                let white = foreseeing::max_foreseeing_white(self, provider, reps.as_deref());
                foreseeing::set_partitioning_reward(self, provider, white)
            }
        };

        tracing::debug!(candidate = %self.id(), score = %ty, value, "score computed");
        self.scores_mut().insert(ty, value);
        Ok(value)
    }

    /// Memoized score, without computing.
    pub fn cached_score(&self, ty: ScoreType) -> Option<f64> {
        self.scores().get(ty)
    }

    /// Upper bound on the max-white score of any completion of this candidate.
    ///
    /// Completions only grow blocks and the master, and every master
    /// constraint spans the full row, so
    /// `1 - (current block area + master rows * n_vars) / area` bounds the
    /// final max-white score from above. The bound never increases while
    /// the candidate is refined.
    pub fn max_white_upper_bound(&self) -> f64 {
        let matrix = area::matrix_area(self);
        if matrix == 0.0 {
            return 1.0;
        }
        let master = self.master_conss().len() as f64 * self.n_vars() as f64;
        (1.0 - (area::raw_block_area(self, None) + master) / matrix).max(0.0)
    }

    /// Whether every master constraint is set partitioning, packing,
    /// covering or cardinality.
    pub fn has_setppc_cardinality_master<P: IncidenceProvider + ?Sized>(&self, provider: &P) -> bool {
        self.master_conss()
            .iter()
            .all(|&c| provider.cons_kind(c).is_setppc_or_cardinality())
    }
}
