//! # raft-core
//!
//! why: implement the core raft consensus algorithm as a pure, portable state machine
//! relations: driven by raft-cluster, which owns timers, fan-out and transport
//! what: log store, node state machine, replication progress, quorum math, config, rpc types

pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod node;
pub mod quorum;
pub mod replication;

/// Opaque cluster member identifier
pub type NodeId = u64;

pub use config::RaftConfig;
pub use error::RaftError;
pub use log::{Command, LogEntry, LogStore};
pub use message::{AppendEntries, AppendEntriesResponse, RequestVote, VoteResponse};
pub use node::{ElectionOutcome, NodeStatus, RaftNode, Role};
pub use quorum::{majority, VoteTally};
pub use replication::ReplicationManager;
