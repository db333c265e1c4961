//! # ballot
//!
//! why: totally order proposals from independent proposers without coordination
//! relations: carried by every acceptor.rs message, minted by proposer.rs
//! what: Ballot

use std::fmt;

use serde::{Deserialize, Serialize};

/// Proposal number. Ordered by `round`, ties broken by `proposer_id`.
///
/// Field order matters: the derived `Ord` is lexicographic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ballot {
    pub round: u64,
    pub proposer_id: u64,
}

impl Ballot {
    pub fn new(round: u64, proposer_id: u64) -> Self {
        Self { round, proposer_id }
    }

    /// Smallest ballot of `proposer_id` greater than `self`
    pub fn successor(self, proposer_id: u64) -> Self {
        Self::new(self.round + 1, proposer_id)
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.proposer_id)
    }
}
