//! # local
//!
//! why: run a whole cluster inside one process, with partitions under test control
//! relations: implements peer.rs over handle.rs, the in-process stand-in for a network
//! what: Network, LocalPeer, LocalCluster

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raft_core::{
    AppendEntries, AppendEntriesResponse, NodeId, NodeStatus, RaftConfig, RequestVote, Role,
    VoteResponse,
};
use tokio::sync::RwLock;

use crate::error::{ClusterError, Result, TransportError};
use crate::handle::NodeHandle;
use crate::membership::Membership;
use crate::peer::PeerHandle;

const LEADER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Registry of running nodes plus the set of nodes cut off from everyone
#[derive(Debug, Default)]
pub struct Network {
    nodes: RwLock<BTreeMap<NodeId, NodeHandle>>,
    isolated: RwLock<BTreeSet<NodeId>>,
}

impl Network {
    pub async fn register(&self, handle: NodeHandle) {
        self.nodes.write().await.insert(handle.id(), handle);
    }

    pub async fn isolate(&self, id: NodeId) {
        self.isolated.write().await.insert(id);
    }

    pub async fn heal(&self, id: NodeId) {
        self.isolated.write().await.remove(&id);
    }

    pub async fn is_isolated(&self, id: NodeId) -> bool {
        self.isolated.read().await.contains(&id)
    }

    /// Resolve the handle for `to`, if `from` can currently reach it
    async fn route(&self, from: NodeId, to: NodeId) -> std::result::Result<NodeHandle, TransportError> {
        {
            let isolated = self.isolated.read().await;
            if isolated.contains(&from) || isolated.contains(&to) {
                return Err(TransportError::Unreachable(to));
            }
        }
        self.nodes
            .read()
            .await
            .get(&to)
            .cloned()
            .ok_or(TransportError::Unreachable(to))
    }
}

/// `from`'s view of `to` over the in-process network
#[derive(Debug, Clone)]
pub struct LocalPeer {
    from: NodeId,
    to: NodeId,
    network: Arc<Network>,
}

impl LocalPeer {
    pub fn new(from: NodeId, to: NodeId, network: Arc<Network>) -> Self {
        Self { from, to, network }
    }
}

#[async_trait]
impl PeerHandle for LocalPeer {
    fn id(&self) -> NodeId {
        self.to
    }

    async fn request_vote(&self, req: RequestVote) -> std::result::Result<VoteResponse, TransportError> {
        let target = self.network.route(self.from, self.to).await?;
        target.request_vote(req).await
    }

    async fn append_entries(
        &self,
        req: AppendEntries,
    ) -> std::result::Result<AppendEntriesResponse, TransportError> {
        let target = self.network.route(self.from, self.to).await?;
        target.append_entries(req).await
    }
}

/// N nodes, ids `0..n`, fully connected through one Network
#[derive(Debug)]
pub struct LocalCluster {
    network: Arc<Network>,
    nodes: BTreeMap<NodeId, NodeHandle>,
}

impl LocalCluster {
    /// Validate `config` and spawn `n` nodes on the current runtime
    pub async fn start(n: usize, config: RaftConfig) -> Result<Self> {
        config.validate()?;
        let network = Arc::new(Network::default());
        let ids: Vec<NodeId> = (0..n as NodeId).collect();

        let mut nodes = BTreeMap::new();
        for &id in &ids {
            let peers = ids.iter().filter(|&&p| p != id).map(|&p| {
                Arc::new(LocalPeer::new(id, p, Arc::clone(&network))) as Arc<dyn PeerHandle>
            });
            let handle = NodeHandle::spawn(id, Membership::new(peers), config.clone())?;
            network.register(handle.clone()).await;
            nodes.insert(id, handle);
        }

        tracing::info!(nodes = n, "local cluster started");
        Ok(Self { network, nodes })
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeHandle> {
        self.nodes.get(&id).ok_or(ClusterError::UnknownNode(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Status of every running node
    pub async fn statuses(&self) -> Vec<NodeStatus> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for handle in self.nodes.values() {
            if let Ok(status) = handle.status().await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Highest-term leader among the nodes that are not isolated
    pub async fn leader(&self) -> Option<NodeStatus> {
        let mut best: Option<NodeStatus> = None;
        for status in self.statuses().await {
            if status.role != Role::Leader || self.network.is_isolated(status.id).await {
                continue;
            }
            if best.as_ref().map_or(true, |b| status.term > b.term) {
                best = Some(status);
            }
        }
        best
    }

    /// Poll until `leader()` finds one, or fail after `timeout`
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<NodeStatus> {
        let poll = async {
            loop {
                if let Some(leader) = self.leader().await {
                    return leader;
                }
                tokio::time::sleep(LEADER_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ClusterError::NoLeader { waited: timeout })
    }

    /// Cut `id` off from every other node
    pub async fn isolate(&self, id: NodeId) -> Result<()> {
        self.node(id)?;
        tracing::info!(node_id = id, "isolating node");
        self.network.isolate(id).await;
        Ok(())
    }

    pub async fn heal(&self, id: NodeId) -> Result<()> {
        self.node(id)?;
        tracing::info!(node_id = id, "healing node");
        self.network.heal(id).await;
        Ok(())
    }

    pub async fn shutdown(self) {
        for handle in self.nodes.values() {
            handle.shutdown().await;
        }
        tracing::info!("local cluster stopped");
    }
}
