//! # node
//!
//! why: define the raft node state machine and state transitions
//! relations: uses message.rs for rpc types, log.rs for entries, replication.rs while leading
//! what: Role, RaftNode, election tally handling, rpc handlers, commit/apply bookkeeping
//!
//! The node performs no I/O. Every handler returns what must be sent and
//! whether the election timer must be restarted; the runtime owns timers
//! and transport.

use serde::{Deserialize, Serialize};

use crate::error::{RaftError, Result};
use crate::log::{Command, LogEntry, LogStore};
use crate::message::{AppendEntries, AppendEntriesResponse, RequestVote, VoteResponse};
use crate::quorum::{majority, VoteTally};
use crate::replication::ReplicationManager;
use crate::NodeId;

/// The three possible roles a Raft node can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    /// Passive: listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Soliciting votes to become leader
    Candidate,
    /// Replicates the log and sends heartbeats
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// Result of feeding one vote response into a running election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Not decided yet
    Pending,
    /// Majority reached, the node is now leader
    Won,
    /// Majority can no longer be reached, the node reverted to follower
    Lost { votes: usize, needed: usize },
    /// A higher term was observed, the node is now a follower of that term
    SteppedDown { term: u64 },
    /// Response belongs to another election or the node is not a candidate
    Ignored,
}

/// Point-in-time view of a node, cheap to clone and ship around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub role: Role,
    pub term: u64,
    pub leader_id: Option<NodeId>,
    pub voted_for: Option<NodeId>,
    pub commit_index: Option<u64>,
    pub last_applied: Option<u64>,
    pub last_log_index: Option<u64>,
}

/// A single Raft node in the cluster
#[derive(Debug)]
pub struct RaftNode {
    /// Unique identifier for this node
    pub id: NodeId,
    /// Every member of the cluster, this node included
    pub cluster: Vec<NodeId>,
    pub role: Role,
    pub current_term: u64,
    /// Candidate that received our vote in `current_term`
    pub voted_for: Option<NodeId>,
    pub log: LogStore,
    pub commit_index: Option<u64>,
    pub last_applied: Option<u64>,
    /// Leader of `current_term`, once known
    pub leader_id: Option<NodeId>,
    election: Option<VoteTally>,
    replication: Option<ReplicationManager>,
}

impl RaftNode {
    /// Create a new node in Follower state.
    ///
    /// `cluster` lists every member; `id` is added if missing.
    pub fn new(id: NodeId, mut cluster: Vec<NodeId>) -> Self {
        if !cluster.contains(&id) {
            cluster.push(id);
        }
        cluster.sort_unstable();
        cluster.dedup();
        Self {
            id,
            cluster,
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            log: LogStore::new(),
            commit_index: None,
            last_applied: None,
            leader_id: None,
            election: None,
            replication: None,
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        let id = self.id;
        self.cluster.iter().copied().filter(move |&p| p != id)
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster.len()
    }

    pub fn quorum_size(&self) -> usize {
        majority(self.cluster_size())
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn election(&self) -> Option<&VoteTally> {
        self.election.as_ref()
    }

    pub fn replication(&self) -> Option<&ReplicationManager> {
        self.replication.as_ref()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            role: self.role,
            term: self.current_term,
            leader_id: self.leader_id,
            voted_for: self.voted_for,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            last_log_index: self.log.last_index(),
        }
    }

    // -- role transitions --

    /// Begin an election for `current_term + 1` and return the request to
    /// broadcast. A single-node cluster wins on its own vote.
    pub fn start_election(&mut self) -> RequestVote {
        self.current_term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.replication = None;
        self.election = Some(VoteTally::new(
            self.current_term,
            self.cluster_size(),
            self.id,
        ));

        tracing::info!(node_id = self.id, term = self.current_term, "starting election");

        let request = RequestVote {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };

        if self.election.as_ref().is_some_and(VoteTally::has_quorum) {
            self.become_leader();
        }
        request
    }

    /// Feed one peer's answer to the election started in `request_term`.
    ///
    /// `None` means the peer did not answer in time and counts as a denial.
    pub fn handle_vote_response(
        &mut self,
        from: NodeId,
        request_term: u64,
        response: Option<VoteResponse>,
    ) -> ElectionOutcome {
        if let Some(resp) = response {
            if resp.term > self.current_term {
                self.become_follower(resp.term);
                return ElectionOutcome::SteppedDown { term: resp.term };
            }
        }
        if self.role != Role::Candidate || request_term != self.current_term {
            return ElectionOutcome::Ignored;
        }
        let Some(tally) = self.election.as_mut() else {
            return ElectionOutcome::Ignored;
        };

        let granted = response.is_some_and(|r| r.vote_granted && r.term == request_term);
        if !tally.record(from, granted) {
            return ElectionOutcome::Pending;
        }
        tracing::debug!(
            node_id = self.id,
            term = request_term,
            voter = from,
            granted,
            votes = tally.votes(),
            "vote recorded"
        );

        if tally.has_quorum() {
            self.become_leader();
            ElectionOutcome::Won
        } else if tally.is_lost() {
            let (votes, needed) = (tally.votes(), tally.needed());
            tracing::debug!(node_id = self.id, term = request_term, votes, needed, "election lost");
            self.role = Role::Follower;
            self.election = None;
            ElectionOutcome::Lost { votes, needed }
        } else {
            ElectionOutcome::Pending
        }
    }

    /// Take leadership of `current_term`
    pub fn become_leader(&mut self) {
        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        self.election = None;
        let peers: Vec<NodeId> = self.peers().collect();
        self.replication = Some(ReplicationManager::new(peers, self.log.len()));
        tracing::info!(node_id = self.id, term = self.current_term, "became leader");
    }

    /// Revert to follower, adopting `term` if it is newer.
    ///
    /// The term never decreases; `voted_for` is cleared only when it advances.
    pub fn become_follower(&mut self, term: u64) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        if self.role != Role::Follower {
            tracing::info!(
                node_id = self.id,
                term = self.current_term,
                from = %self.role,
                "stepping down to follower"
            );
        }
        self.role = Role::Follower;
        self.election = None;
        self.replication = None;
    }

    // -- inbound rpcs --

    /// Is a candidate with this last entry at least as up-to-date as us?
    pub fn is_log_up_to_date(&self, last_log_index: Option<u64>, last_log_term: u64) -> bool {
        let our_term = self.log.last_term();
        last_log_term > our_term
            || (last_log_term == our_term && last_log_index >= self.log.last_index())
    }

    /// Handle RequestVote. Returns the response and whether the election
    /// timer must be restarted (only when the vote is granted).
    pub fn handle_request_vote(&mut self, req: &RequestVote) -> (VoteResponse, bool) {
        if req.term > self.current_term {
            self.become_follower(req.term);
        }

        let vote_granted = if req.term < self.current_term {
            false
        } else if self.voted_for.is_some_and(|v| v != req.candidate_id) {
            false
        } else {
            self.is_log_up_to_date(req.last_log_index, req.last_log_term)
        };

        if vote_granted {
            self.voted_for = Some(req.candidate_id);
        }

        tracing::debug!(
            node_id = self.id,
            candidate = req.candidate_id,
            term = req.term,
            granted = vote_granted,
            "RequestVote handled"
        );

        (
            VoteResponse {
                term: self.current_term,
                vote_granted,
            },
            vote_granted,
        )
    }

    fn check_append_entries(&self, req: &AppendEntries) -> Result<()> {
        if req.term < self.current_term {
            return Err(RaftError::StaleTerm {
                received: req.term,
                current: self.current_term,
            });
        }
        if !self.log.matches(req.prev_log_index, req.prev_log_term) {
            return Err(RaftError::LogMismatch {
                prev_log_index: req.prev_log_index,
                prev_log_term: req.prev_log_term,
            });
        }
        Ok(())
    }

    /// Handle AppendEntries. Returns the response and whether the election
    /// timer must be restarted (any request from a current leader).
    pub fn handle_append_entries(&mut self, req: AppendEntries) -> (AppendEntriesResponse, bool) {
        if req.term >= self.current_term {
            // a valid leader exists for req.term: adopt it
            self.become_follower(req.term);
            self.leader_id = Some(req.leader_id);
        }

        if let Err(err) = self.check_append_entries(&req) {
            tracing::debug!(node_id = self.id, leader = req.leader_id, error = %err, "AppendEntries rejected");
            let reset = !matches!(err, RaftError::StaleTerm { .. });
            return (
                AppendEntriesResponse {
                    term: self.current_term,
                    success: false,
                },
                reset,
            );
        }

        let appended = req.entries.len();
        let covered = self.log.merge_from(req.prev_log_index, req.entries);
        if appended > 0 {
            tracing::debug!(
                node_id = self.id,
                appended,
                last_index = ?self.log.last_index(),
                "entries appended"
            );
        }

        if req.leader_commit > self.commit_index {
            let new_commit = req.leader_commit.min(covered);
            if new_commit > self.commit_index {
                self.commit_index = new_commit;
            }
        }

        (
            AppendEntriesResponse {
                term: self.current_term,
                success: true,
            },
            true,
        )
    }

    // -- leader side --

    /// Append a client command to the leader's log
    pub fn propose_entry(&mut self, command: Command) -> Result<LogEntry> {
        if self.role != Role::Leader {
            return Err(RaftError::NotLeader {
                leader_hint: self.leader_id,
            });
        }
        let entry = self.log.append(self.current_term, command).clone();
        tracing::debug!(node_id = self.id, index = entry.index, term = entry.term, "entry proposed");
        self.update_commit_index();
        Ok(entry)
    }

    /// AppendEntries for one peer, `None` unless leader
    pub fn append_entries_for(&self, peer: NodeId) -> Option<AppendEntries> {
        if self.role != Role::Leader {
            return None;
        }
        self.replication.as_ref()?.build_request(
            peer,
            &self.log,
            self.current_term,
            self.id,
            self.commit_index,
        )
    }

    /// One replication round: a request for every peer
    pub fn replication_requests(&self) -> Vec<(NodeId, AppendEntries)> {
        self.peers()
            .filter_map(|peer| self.append_entries_for(peer).map(|req| (peer, req)))
            .collect()
    }

    /// Process a peer's answer to an AppendEntries sent in `request_term`
    /// covering up to `covered`. Returns true if the commit index advanced.
    pub fn handle_append_entries_response(
        &mut self,
        peer: NodeId,
        request_term: u64,
        covered: Option<u64>,
        response: Option<AppendEntriesResponse>,
    ) -> bool {
        let Some(resp) = response else {
            return false;
        };
        if resp.term > self.current_term {
            self.become_follower(resp.term);
            return false;
        }
        if self.role != Role::Leader || request_term != self.current_term {
            return false;
        }
        let Some(progress) = self.replication.as_mut() else {
            return false;
        };

        if resp.success {
            progress.record_success(peer, covered);
            self.update_commit_index()
        } else {
            progress.record_failure(peer);
            tracing::debug!(
                node_id = self.id,
                peer,
                next_index = ?progress.next_index(peer),
                "log mismatch, backing off"
            );
            false
        }
    }

    /// Advance `commit_index` to the highest current-term entry held by a majority
    pub fn update_commit_index(&mut self) -> bool {
        let candidate = match &self.replication {
            Some(progress) if self.role == Role::Leader => {
                progress.commit_candidate(&self.log, self.commit_index, self.current_term)
            }
            _ => None,
        };
        match candidate {
            Some(index) if Some(index) > self.commit_index => {
                self.commit_index = Some(index);
                tracing::debug!(node_id = self.id, commit_index = index, "commit index advanced");
                true
            }
            _ => false,
        }
    }

    // -- state machine side --

    /// Entries `0..=commit_index`
    pub fn committed_entries(&self) -> &[LogEntry] {
        self.log.prefix_through(self.commit_index)
    }

    /// Committed entries not yet applied, advancing `last_applied`
    pub fn take_entries_to_apply(&mut self) -> Vec<LogEntry> {
        let Some(commit) = self.commit_index else {
            return Vec::new();
        };
        let start = self.last_applied.map_or(0, |a| a + 1);
        if start > commit {
            return Vec::new();
        }
        let entries = self.log.range(start..commit + 1).to_vec();
        if let Some(last) = entries.last() {
            self.last_applied = Some(last.index);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_as_follower() {
        let node = RaftNode::new(1, vec![1, 2, 3]);
        assert_eq!(node.role, Role::Follower);
        assert_eq!(node.current_term, 0);
        assert_eq!(node.voted_for, None);
        assert_eq!(node.commit_index, None);
    }

    #[test]
    fn cluster_always_contains_self() {
        let node = RaftNode::new(4, vec![1, 2, 3]);
        assert_eq!(node.cluster, vec![1, 2, 3, 4]);
        assert_eq!(node.peers().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn single_node_wins_on_own_vote() {
        let mut node = RaftNode::new(1, vec![1]);
        node.start_election();
        assert_eq!(node.role, Role::Leader);
    }
}
