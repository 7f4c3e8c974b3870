//! Refinement policy definitions.

pub mod refinement;

pub use refinement::RefinementPolicy;
