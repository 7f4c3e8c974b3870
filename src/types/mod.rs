//! Core types for decomposition candidates.

pub mod ids;
pub mod role;
pub mod classifier;
pub mod lineage;

pub use ids::{CandidateId, IdAllocator};
pub use role::{ConsRole, VarRole};
pub use classifier::{Classifier, ClassifierError, ClassifierKind, ClassifierStats};
pub use lineage::{AssignmentCounts, Lineage, RefinementStep};
