//! Lineage of a candidate: ancestors and per-step provenance.
//!
//! ## Purpose
//!
//! Every refinement step a detector applies to a candidate is recorded with
//! how much of the problem it fixed and where the fixed items went. The
//! repository serializes lineage for reporting; the core only appends.
//!
//! | Field | What It Captures |
//! |-------|------------------|
//! | `pct_*_from_open` | Fraction of all constraints/variables the step assigned |
//! | `pct_*_to_block` | Fraction the step placed inside blocks |
//! | `pct_*_to_border` | Fraction the step placed in master/linking |
//! | `new_blocks` | Blocks created by the step |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::classifier::ClassifierStats;
use super::ids::CandidateId;

/// Counts of assigned items, captured before and after a refinement step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentCounts {
    /// Open constraints.
    pub open_conss: usize,
    /// Open variables.
    pub open_vars: usize,
    /// Master constraints.
    pub master_conss: usize,
    /// Constraints in blocks.
    pub block_conss: usize,
    /// Master, linking and stairlinking variables.
    pub border_vars: usize,
    /// Variables in blocks.
    pub block_vars: usize,
    /// Number of blocks.
    pub n_blocks: usize,
}

/// Provenance of a single refinement step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementStep {
    /// Name of the detector or pass that performed the step.
    pub detector: String,
    /// Wall-clock time the step took, in seconds.
    pub elapsed_secs: f64,
    /// When the step was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Fraction of constraints newly assigned.
    pub pct_conss_from_open: f64,
    /// Fraction of variables newly assigned.
    pub pct_vars_from_open: f64,
    /// Fraction of constraints newly placed in blocks.
    pub pct_conss_to_block: f64,
    /// Fraction of constraints newly placed in the master.
    pub pct_conss_to_border: f64,
    /// Fraction of variables newly placed in blocks.
    pub pct_vars_to_block: f64,
    /// Fraction of variables newly placed in master/linking/stairlinking.
    pub pct_vars_to_border: f64,
    /// Number of blocks created.
    pub new_blocks: usize,
    /// Classifier used by the step, if any.
    pub classifier: Option<ClassifierStats>,
}

fn fraction(delta: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        delta as f64 / total as f64
    }
}

impl RefinementStep {
    /// Derive a step record from counts before and after it ran.
    pub fn between(
        detector: impl Into<String>,
        elapsed: Duration,
        before: AssignmentCounts,
        after: AssignmentCounts,
        n_conss: usize,
        n_vars: usize,
    ) -> Self {
        Self {
            detector: detector.into(),
            elapsed_secs: elapsed.as_secs_f64(),
            recorded_at: Utc::now(),
            pct_conss_from_open: fraction(before.open_conss.saturating_sub(after.open_conss), n_conss),
            pct_vars_from_open: fraction(before.open_vars.saturating_sub(after.open_vars), n_vars),
            pct_conss_to_block: fraction(after.block_conss.saturating_sub(before.block_conss), n_conss),
            pct_conss_to_border: fraction(after.master_conss.saturating_sub(before.master_conss), n_conss),
            pct_vars_to_block: fraction(after.block_vars.saturating_sub(before.block_vars), n_vars),
            pct_vars_to_border: fraction(after.border_vars.saturating_sub(before.border_vars), n_vars),
            new_blocks: after.n_blocks.saturating_sub(before.n_blocks),
            classifier: None,
        }
    }

    /// Attach classifier statistics.
    pub fn with_classifier(mut self, stats: ClassifierStats) -> Self {
        self.classifier = Some(stats);
        self
    }
}

/// Append-only ancestry and step history of a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    ancestors: Vec<CandidateId>,
    steps: Vec<RefinementStep>,
}

impl Lineage {
    /// Empty lineage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ancestor.
    pub fn push_ancestor(&mut self, id: CandidateId) {
        self.ancestors.push(id);
    }

    /// Record a refinement step.
    pub fn push_step(&mut self, step: RefinementStep) {
        self.steps.push(step);
    }

    /// Ancestor ids, oldest first.
    pub fn ancestors(&self) -> &[CandidateId] {
        &self.ancestors
    }

    /// Recorded steps, oldest first.
    pub fn steps(&self) -> &[RefinementStep] {
        &self.steps
    }

    /// Total time spent in recorded steps, in seconds.
    pub fn total_elapsed_secs(&self) -> f64 {
        self.steps.iter().map(|s| s.elapsed_secs).sum()
    }

    /// Serialize to JSON for the repository.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_fractions() {
        let before = AssignmentCounts {
            open_conss: 10,
            open_vars: 20,
            ..Default::default()
        };
        let after = AssignmentCounts {
            open_conss: 4,
            open_vars: 10,
            master_conss: 2,
            block_conss: 4,
            border_vars: 5,
            block_vars: 5,
            n_blocks: 2,
        };

        let step = RefinementStep::between("connected", Duration::from_millis(250), before, after, 10, 20);

        assert!((step.pct_conss_from_open - 0.6).abs() < 1e-12);
        assert!((step.pct_vars_from_open - 0.5).abs() < 1e-12);
        assert!((step.pct_conss_to_block - 0.4).abs() < 1e-12);
        assert!((step.pct_conss_to_border - 0.2).abs() < 1e-12);
        assert!((step.pct_vars_to_border - 0.25).abs() < 1e-12);
        assert_eq!(step.new_blocks, 2);
        assert!((step.elapsed_secs - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_problem_fractions_are_zero() {
        let step = RefinementStep::between(
            "noop",
            Duration::ZERO,
            AssignmentCounts::default(),
            AssignmentCounts::default(),
            0,
            0,
        );
        assert_eq!(step.pct_conss_from_open, 0.0);
        assert_eq!(step.pct_vars_to_block, 0.0);
    }

    #[test]
    fn test_lineage_json() {
        let mut lineage = Lineage::new();
        lineage.push_ancestor(CandidateId::new(3));
        let json = lineage.to_json().unwrap();
        assert!(json.contains("\"ancestors\":[3]"));
    }
}
