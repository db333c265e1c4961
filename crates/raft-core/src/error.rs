//! # error
//!
//! why: give every protocol-level failure a typed, non-fatal result
//! relations: returned by node.rs and config.rs, wrapped by raft-cluster's ClusterError
//! what: RaftError

use thiserror::Error;

use crate::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaftError {
    #[error("stale term {received}, current term is {current}")]
    StaleTerm { received: u64, current: u64 },

    #[error("log mismatch at prev_log_index {prev_log_index:?} (expected term {prev_log_term})")]
    LogMismatch {
        prev_log_index: Option<u64>,
        prev_log_term: u64,
    },

    #[error("no majority in term {term}: {votes} votes, {needed} needed")]
    NoMajority { term: u64, votes: usize, needed: usize },

    #[error("not the leader, current leader is node {leader_hint:?}")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RaftError>;
