//! # quorum
//!
//! why: keep the majority arithmetic in one place
//! relations: used by node.rs for elections and replication.rs for commit advancement
//! what: majority(), VoteTally

use std::collections::BTreeSet;

use crate::NodeId;

/// Strict majority of `n` participants: `floor(n/2) + 1`
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}

/// Votes collected by a candidate during one election.
///
/// Every voter is counted at most once; a peer that never answers is
/// eventually recorded as denied by the runtime.
#[derive(Debug, Clone)]
pub struct VoteTally {
    term: u64,
    cluster_size: usize,
    granted: BTreeSet<NodeId>,
    denied: BTreeSet<NodeId>,
}

impl VoteTally {
    /// New tally holding the candidate's own vote
    pub fn new(term: u64, cluster_size: usize, candidate: NodeId) -> Self {
        let mut granted = BTreeSet::new();
        granted.insert(candidate);
        Self {
            term,
            cluster_size,
            granted,
            denied: BTreeSet::new(),
        }
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn votes(&self) -> usize {
        self.granted.len()
    }

    pub fn needed(&self) -> usize {
        majority(self.cluster_size)
    }

    /// Record one voter's answer. Returns false if that voter was already counted.
    pub fn record(&mut self, voter: NodeId, granted: bool) -> bool {
        if self.granted.contains(&voter) || self.denied.contains(&voter) {
            return false;
        }
        if granted {
            self.granted.insert(voter)
        } else {
            self.denied.insert(voter)
        }
    }

    pub fn has_quorum(&self) -> bool {
        self.votes() >= self.needed()
    }

    /// True once the outstanding voters can no longer produce a majority
    pub fn is_lost(&self) -> bool {
        let answered = self.granted.len() + self.denied.len();
        let outstanding = self.cluster_size.saturating_sub(answered);
        self.votes() + outstanding < self.needed()
    }
}
