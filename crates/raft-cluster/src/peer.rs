//! # peer
//!
//! why: the only seam between a node and the network
//! relations: implemented by local.rs (in-process) and by test fakes, called from actor.rs
//! what: PeerHandle trait, call_with_timeout

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use raft_core::{AppendEntries, AppendEntriesResponse, NodeId, RequestVote, VoteResponse};

use crate::error::TransportError;

/// Outbound RPC endpoint for one remote node
#[async_trait]
pub trait PeerHandle: Send + Sync {
    fn id(&self) -> NodeId;

    async fn request_vote(&self, req: RequestVote) -> Result<VoteResponse, TransportError>;

    async fn append_entries(
        &self,
        req: AppendEntries,
    ) -> Result<AppendEntriesResponse, TransportError>;
}

/// Run one RPC, turning an elapsed deadline into `TransportError::Timeout`
pub async fn call_with_timeout<T, F>(peer: NodeId, after: Duration, rpc: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(after, rpc).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout { peer, after }),
    }
}
