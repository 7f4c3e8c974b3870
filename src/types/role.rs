//! Partition roles for constraints and variables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a constraint currently lives in a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsRole {
    /// Not yet assigned.
    Open,
    /// Part of the master problem.
    Master,
    /// Constraint of the given block.
    Block(usize),
}

impl ConsRole {
    /// Whether the constraint is still unassigned.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Block index, if the constraint belongs to a block.
    pub fn block(&self) -> Option<usize> {
        match self {
            Self::Block(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Master => write!(f, "master"),
            Self::Block(b) => write!(f, "block {}", b),
        }
    }
}

/// Where a variable currently lives in a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarRole {
    /// Not yet assigned.
    Open,
    /// Appears only in master constraints.
    Master,
    /// Links arbitrary blocks (part of the variable border).
    Linking,
    /// Links block `b` and block `b + 1`.
    Stairlinking(usize),
    /// Variable of the given block.
    Block(usize),
}

impl VarRole {
    /// Whether the variable is still unassigned.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the variable belongs to the border (linking or stairlinking).
    pub fn is_border(&self) -> bool {
        matches!(self, Self::Linking | Self::Stairlinking(_))
    }

    /// Whether a constraint of `block` may contain a variable with this role.
    pub fn admits_block(&self, block: usize) -> bool {
        match self {
            Self::Open | Self::Linking => true,
            Self::Master => false,
            Self::Block(b) => *b == block,
            Self::Stairlinking(b) => *b == block || *b + 1 == block,
        }
    }
}

impl fmt::Display for VarRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Master => write!(f, "master"),
            Self::Linking => write!(f, "linking"),
            Self::Stairlinking(b) => write!(f, "stairlinking {}-{}", b, b + 1),
            Self::Block(b) => write!(f, "block {}", b),
        }
    }
}
