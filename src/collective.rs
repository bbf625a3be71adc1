//! The collective execution context.
//!
//! Datasets are created and opened by a team of cooperating tasks.
//! Every dataset operation is a collective call: each member of the team must issue the same calls, in the same order, with consistent arguments.
//! This crate does not detect divergence between members; that is the responsibility of whoever provides the team.

use thiserror::Error;

/// A team of tasks that issue collective calls together.
pub trait Collective: Send + Sync {
    /// Returns the number of members of the team.
    fn size(&self) -> usize;

    /// Returns the 0-based rank of this member within the team.
    fn rank(&self) -> usize;

    /// Returns true if this member has rank zero.
    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// A team with a single member.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleTask;

impl Collective for SingleTask {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }
}

/// An invalid team error.
#[derive(Debug, Error)]
pub enum InvalidTeamError {
    /// The team has no members.
    #[error("a team must have at least one member")]
    Empty,
    /// The rank is not a member of the team.
    #[error("rank {rank} is not within a team of size {size}")]
    RankOutOfRange {
        /// The rank.
        rank: usize,
        /// The team size.
        size: usize,
    },
}

/// A team whose size and rank were established by an external launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticTeam {
    size: usize,
    rank: usize,
}

impl StaticTeam {
    /// Create a new team handle for the member `rank` of a team of `size` members.
    ///
    /// # Errors
    /// Returns [`InvalidTeamError`] if `size` is zero or `rank` is not less than `size`.
    pub fn new(size: usize, rank: usize) -> Result<Self, InvalidTeamError> {
        if size == 0 {
            Err(InvalidTeamError::Empty)
        } else if rank >= size {
            Err(InvalidTeamError::RankOutOfRange { rank, size })
        } else {
            Ok(Self { size, rank })
        }
    }
}

impl Collective for StaticTeam {
    fn size(&self) -> usize {
        self.size
    }

    fn rank(&self) -> usize {
        self.rank
    }
}
