//! RefinementPolicy: explicit switches for refinement and scoring passes.
//!
//! Detectors pass a policy into every refinement call instead of reading
//! global parameters. The policy is plain data; loading it from files or
//! the environment is the embedder's job.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_POLICY_VERSION;

/// Policy for refinement passes.
///
/// ## Parameters
///
/// - `stairlinking_heuristic`: reorder blocks greedily when no perfect
///   staircase order exists (otherwise stairlinking detection is abandoned)
/// - `equivalence_size_limit`: blocks larger than this are never compared
///   for aggregation; `None` defers to the incidence provider's cutoff
/// - `verify_after_refinement`: run the consistency checker at the end of
///   every refinement pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementPolicy {
    /// Policy version identifier.
    pub version: String,
    /// Use the greedy reordering heuristic for stairlinking detection.
    pub stairlinking_heuristic: bool,
    /// Block size cutoff for equivalence checks.
    pub equivalence_size_limit: Option<usize>,
    /// Check consistency after each refinement pass.
    pub verify_after_refinement: bool,
}

impl RefinementPolicy {
    /// Create a policy with custom switches.
    pub fn new(stairlinking_heuristic: bool, equivalence_size_limit: Option<usize>) -> Self {
        Self {
            stairlinking_heuristic,
            equivalence_size_limit,
            ..Self::default()
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Effective equivalence cutoff given the provider's default.
    pub fn effective_size_limit(&self, provider_limit: usize) -> usize {
        self.equivalence_size_limit.unwrap_or(provider_limit)
    }

    /// Compute a hash of the policy parameters.
    pub fn params_hash(&self) -> Result<String, serde_json::Error> {
        canonical_hash_hex(self)
    }

    /// Policy without the stairlinking heuristic.
    pub fn strict() -> Self {
        Self {
            stairlinking_heuristic: false,
            ..Self::default()
        }
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            stairlinking_heuristic: true,
            equivalence_size_limit: None,
            verify_after_refinement: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidence::DEFAULT_EQUIVALENCE_SIZE_LIMIT;

    #[test]
    fn test_policy_params_hash_determinism() {
        assert_eq!(
            RefinementPolicy::default().params_hash().unwrap(),
            RefinementPolicy::default().params_hash().unwrap()
        );
    }

    #[test]
    fn test_policy_params_hash_changes() {
        let policy1 = RefinementPolicy::default();
        let policy2 = RefinementPolicy::strict();
        assert_ne!(policy1.params_hash().unwrap(), policy2.params_hash().unwrap());
    }

    #[test]
    fn test_effective_size_limit() {
        let policy = RefinementPolicy::default();
        assert_eq!(policy.effective_size_limit(50), 50);
        let policy = RefinementPolicy::new(true, Some(10));
        assert_eq!(policy.effective_size_limit(50), 10);
        assert_eq!(policy.effective_size_limit(DEFAULT_EQUIVALENCE_SIZE_LIMIT), 10);
    }

    #[test]
    fn test_policy_roundtrips_through_json() {
        let policy = RefinementPolicy::new(false, Some(64));
        let json = serde_json::to_string(&policy).unwrap();
        let back: RefinementPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
