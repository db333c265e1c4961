//! # membership
//!
//! why: give each node a fixed view of who else is in the cluster
//! relations: built by local.rs or by callers wiring their own transport, read by actor.rs
//! what: Membership (static, read-only peer set)

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use raft_core::NodeId;

use crate::peer::PeerHandle;

/// Static set of peers, excluding the local node
#[derive(Clone, Default)]
pub struct Membership {
    peers: BTreeMap<NodeId, Arc<dyn PeerHandle>>,
}

impl Membership {
    pub fn new(peers: impl IntoIterator<Item = Arc<dyn PeerHandle>>) -> Self {
        Self {
            peers: peers.into_iter().map(|p| (p.id(), p)).collect(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Arc<dyn PeerHandle>> {
        self.peers.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PeerHandle>> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Every member id, `local` included, ascending
    pub fn cluster_with(&self, local: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.ids().filter(|&id| id != local).collect();
        ids.push(local);
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membership")
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish()
    }
}
