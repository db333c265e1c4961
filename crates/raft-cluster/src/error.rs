//! # error
//!
//! why: separate "the peer did not answer" from "the protocol said no"
//! relations: TransportError flows out of PeerHandle, ClusterError out of NodeHandle and LocalCluster
//! what: TransportError, ClusterError

use std::time::Duration;

use raft_core::{NodeId, RaftError};
use thiserror::Error;

/// Failure to reach a peer. Counted as a "no" by elections and replication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(NodeId),

    #[error("rpc to peer {peer} timed out after {after:?}")]
    Timeout { peer: NodeId, after: Duration },

    #[error("node {0} has stopped")]
    NodeStopped(NodeId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error(transparent)]
    Raft(#[from] RaftError),

    #[error("node {0} has stopped")]
    NodeStopped(NodeId),

    #[error("no node with id {0}")]
    UnknownNode(NodeId),

    #[error("no leader elected within {waited:?}")]
    NoLeader { waited: Duration },
}

pub type Result<T> = std::result::Result<T, ClusterError>;
