//! # replication
//!
//! why: track what each follower holds so the leader knows what to send and when to commit
//! relations: owned by node.rs while the node is leader, dropped on step-down
//! what: ReplicationManager (next_index / match_index, request building, commit scan)

use std::collections::BTreeMap;

use crate::log::LogStore;
use crate::message::AppendEntries;
use crate::quorum::majority;
use crate::NodeId;

/// Leader-only per-peer progress
#[derive(Debug, Clone)]
pub struct ReplicationManager {
    next_index: BTreeMap<NodeId, u64>,
    match_index: BTreeMap<NodeId, Option<u64>>,
}

impl ReplicationManager {
    /// Fresh progress after winning an election: every peer is assumed to be
    /// caught up (`next = len(log)`) with nothing confirmed.
    pub fn new(peers: impl IntoIterator<Item = NodeId>, log_len: u64) -> Self {
        let mut next_index = BTreeMap::new();
        let mut match_index = BTreeMap::new();
        for peer in peers {
            next_index.insert(peer, log_len);
            match_index.insert(peer, None);
        }
        Self {
            next_index,
            match_index,
        }
    }

    pub fn next_index(&self, peer: NodeId) -> Option<u64> {
        self.next_index.get(&peer).copied()
    }

    pub fn match_index(&self, peer: NodeId) -> Option<u64> {
        self.match_index.get(&peer).copied().flatten()
    }

    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.next_index.keys().copied()
    }

    /// AppendEntries carrying `log[next_index[peer]..]`
    pub fn build_request(
        &self,
        peer: NodeId,
        log: &LogStore,
        term: u64,
        leader_id: NodeId,
        leader_commit: Option<u64>,
    ) -> Option<AppendEntries> {
        let next = self.next_index(peer)?;
        let prev_log_index = next.checked_sub(1);
        let prev_log_term = prev_log_index
            .and_then(|i| log.term_at(i))
            .unwrap_or(0);

        Some(AppendEntries {
            term,
            leader_id,
            prev_log_index,
            prev_log_term,
            entries: log.entries_from(next),
            leader_commit,
        })
    }

    /// Follower confirmed its log matches ours through `covered`
    pub fn record_success(&mut self, peer: NodeId, covered: Option<u64>) {
        let Some(index) = covered else {
            return;
        };
        if let Some(matched) = self.match_index.get_mut(&peer) {
            *matched = (*matched).max(Some(index));
        }
        if let Some(next) = self.next_index.get_mut(&peer) {
            *next = (*next).max(index + 1);
        }
    }

    /// Follower rejected on log mismatch: step one entry back
    pub fn record_failure(&mut self, peer: NodeId) {
        if let Some(next) = self.next_index.get_mut(&peer) {
            *next = next.saturating_sub(1);
        }
    }

    /// Number of nodes (leader included) holding `index`
    pub fn replica_count(&self, index: u64) -> usize {
        1 + self
            .match_index
            .values()
            .filter(|m| **m >= Some(index))
            .count()
    }

    /// Highest index above `commit_index` that may be committed.
    ///
    /// Only entries of `current_term` are committed by counting replicas;
    /// earlier entries become committed as a prefix of such an entry.
    pub fn commit_candidate(
        &self,
        log: &LogStore,
        commit_index: Option<u64>,
        current_term: u64,
    ) -> Option<u64> {
        let cluster_size = self.next_index.len() + 1;
        let needed = majority(cluster_size);
        let first = commit_index.map_or(0, |c| c + 1);
        let last = log.last_index()?;

        let mut candidate = None;
        for index in first..=last {
            if self.replica_count(index) >= needed && log.term_at(index) == Some(current_term) {
                candidate = Some(index);
            }
        }
        candidate
    }
}
