//! Proposal kernels for the Markov chain.
//!
//! A kernel looks at the current configuration and proposes a change to it: removed
//! ids, added marks, and the forward and backward proposal densities needed by the
//! acceptance test. Kernels never mutate the configuration.

use crate::core::models::ids::MarkId;
use crate::core::models::mark::MarkKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod birth_death;
pub mod compound;
pub mod moves;
pub mod prior;
pub mod proposal;
pub mod proposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelKind {
    Birth,
    Death,
    Move,
    Exchange,
    Split,
    Merge,
}

impl KernelKind {
    pub const ALL: [KernelKind; 6] = [
        KernelKind::Birth,
        KernelKind::Death,
        KernelKind::Move,
        KernelKind::Exchange,
        KernelKind::Split,
        KernelKind::Merge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::Birth => "birth",
            KernelKind::Death => "death",
            KernelKind::Move => "move",
            KernelKind::Exchange => "exchange",
            KernelKind::Split => "split",
            KernelKind::Merge => "merge",
        }
    }

    /// The kernel that undoes a proposal of this kind.
    pub fn reverse(&self) -> KernelKind {
        match self {
            KernelKind::Birth => KernelKind::Death,
            KernelKind::Death => KernelKind::Birth,
            KernelKind::Move => KernelKind::Move,
            KernelKind::Exchange => KernelKind::Exchange,
            KernelKind::Split => KernelKind::Merge,
            KernelKind::Merge => KernelKind::Split,
        }
    }

    /// Split and merge rely on a principal axis that boxes do not scale along consistently.
    pub fn is_compatible_with(&self, kind: MarkKind) -> bool {
        match self {
            KernelKind::Split | KernelKind::Merge => kind != MarkKind::RotatableBox,
            _ => true,
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("Kernel {kernel} reported an invalid {which} density: {density}")]
    InvalidDensity {
        kernel: KernelKind,
        which: &'static str,
        density: f64,
    },
    #[error("Kernel {kernel} referenced mark {id}, which is not in the configuration")]
    UnknownMark { kernel: KernelKind, id: MarkId },
    #[error("Kernel {kernel} assigned id {id} to a new mark, expected {expected}")]
    UnexpectedId {
        kernel: KernelKind,
        id: MarkId,
        expected: MarkId,
    },
    #[error("Sampling failed in kernel {kernel}: {reason}")]
    Sampling { kernel: KernelKind, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_is_an_involution() {
        for kind in KernelKind::ALL {
            assert_eq!(kind.reverse().reverse(), kind);
        }
        assert_eq!(KernelKind::Split.reverse(), KernelKind::Merge);
    }

    #[test]
    fn split_and_merge_reject_rotatable_boxes() {
        assert!(!KernelKind::Split.is_compatible_with(MarkKind::RotatableBox));
        assert!(!KernelKind::Merge.is_compatible_with(MarkKind::RotatableBox));
        assert!(KernelKind::Split.is_compatible_with(MarkKind::Ellipsoid));
        assert!(KernelKind::Move.is_compatible_with(MarkKind::RotatableBox));
    }
}
