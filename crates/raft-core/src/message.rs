//! # message
//!
//! why: define the raft rpc payloads exchanged between nodes
//! relations: produced and consumed by node.rs and replication.rs, carried by raft-cluster peers
//! what: RequestVote, VoteResponse, AppendEntries, AppendEntriesResponse

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::NodeId;

/// Request a vote during leader election
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: u64,
    pub candidate_id: NodeId,
    /// `None` when the candidate's log is empty
    pub last_log_index: Option<u64>,
    pub last_log_term: u64,
}

/// Response to a vote request, carrying the voter's term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: NodeId,
    /// `None` when the entries start at index 0
    pub prev_log_index: Option<u64>,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: Option<u64>,
}

impl AppendEntries {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest index a successful response confirms on the follower
    pub fn last_covered_index(&self) -> Option<u64> {
        match self.entries.len() as u64 {
            0 => self.prev_log_index,
            n => Some(self.prev_log_index.map_or(0, |i| i + 1) + n - 1),
        }
    }
}

/// Response to AppendEntries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
}
