//! # raft-cluster
//!
//! why: turn the pure raft-core state machine into running nodes
//! relations: drives raft-core, reaches peers only through the PeerHandle trait
//! what: node actor, election timer, heartbeat ticker, NodeHandle, in-process LocalCluster

mod actor;
pub mod error;
pub mod handle;
pub mod local;
pub mod membership;
pub mod peer;
pub mod timer;

pub use error::{ClusterError, TransportError};
pub use handle::NodeHandle;
pub use local::{LocalCluster, LocalPeer, Network};
pub use membership::Membership;
pub use peer::PeerHandle;
pub use timer::{ElectionTimer, HeartbeatTicker};
