//! # handle
//!
//! why: give callers and transports a cheap, cloneable way to talk to a running node
//! relations: spawns actor.rs, used by local.rs and by anything serving inbound rpcs
//! what: NodeHandle

use raft_core::{
    AppendEntries, AppendEntriesResponse, Command, LogEntry, NodeId, NodeStatus, RaftConfig,
    RequestVote, VoteResponse,
};
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Event, NodeActor};
use crate::error::{ClusterError, Result, TransportError};
use crate::membership::Membership;

const MAILBOX_CAPACITY: usize = 256;

/// Client side of a node's mailbox
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    mailbox: mpsc::Sender<Event>,
}

impl NodeHandle {
    /// Validate `config` and spawn a node task on the current runtime
    pub fn spawn(id: NodeId, membership: Membership, config: RaftConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::spawn_inner(id, membership, config, None))
    }

    /// Like [`NodeHandle::spawn`], but committed entries are also streamed, in
    /// log order, to the returned receiver
    pub fn spawn_with_apply(
        id: NodeId,
        membership: Membership,
        config: RaftConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LogEntry>)> {
        config.validate()?;
        let (apply_tx, apply_rx) = mpsc::unbounded_channel();
        Ok((Self::spawn_inner(id, membership, config, Some(apply_tx)), apply_rx))
    }

    fn spawn_inner(
        id: NodeId,
        membership: Membership,
        config: RaftConfig,
        apply_tx: Option<mpsc::UnboundedSender<LogEntry>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let actor = NodeActor::new(id, membership, config, tx.downgrade(), apply_tx);
        tokio::spawn(actor.run(rx));
        Self { id, mailbox: tx }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    async fn call<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> Event) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.mailbox.send(event(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Append a command to the log. Fails with `NotLeader` on followers.
    pub async fn propose(&self, command: Command) -> Result<LogEntry> {
        let result = self
            .call(|reply| Event::Propose { command, reply })
            .await
            .ok_or(ClusterError::NodeStopped(self.id))?;
        Ok(result?)
    }

    /// Entries `0..=commit_index` as this node currently sees them
    pub async fn committed_entries(&self) -> Result<Vec<LogEntry>> {
        self.call(|reply| Event::Committed { reply })
            .await
            .ok_or(ClusterError::NodeStopped(self.id))
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.call(|reply| Event::Status { reply })
            .await
            .ok_or(ClusterError::NodeStopped(self.id))
    }

    /// Force an election now. Resolves with the won term, or with why it was not won.
    /// A node that already leads keeps its term and resolves with it immediately.
    pub async fn campaign(&self) -> Result<u64> {
        let result = self
            .call(|reply| Event::Campaign { reply })
            .await
            .ok_or(ClusterError::NodeStopped(self.id))?;
        Ok(result?)
    }

    /// Inbound RequestVote, for transports delivering to this node
    pub async fn request_vote(
        &self,
        req: RequestVote,
    ) -> std::result::Result<VoteResponse, TransportError> {
        self.call(|reply| Event::RequestVote { req, reply })
            .await
            .ok_or(TransportError::NodeStopped(self.id))
    }

    /// Inbound AppendEntries, for transports delivering to this node
    pub async fn append_entries(
        &self,
        req: AppendEntries,
    ) -> std::result::Result<AppendEntriesResponse, TransportError> {
        self.call(|reply| Event::AppendEntries { req, reply })
            .await
            .ok_or(TransportError::NodeStopped(self.id))
    }

    /// Stop the node and wait for its loop to exit. No-op if already stopped.
    pub async fn shutdown(&self) {
        let _ = self.call(|reply| Event::Shutdown { reply }).await;
    }

    pub fn is_stopped(&self) -> bool {
        self.mailbox.is_closed()
    }
}
