//! # transport
//!
//! why: let proposers reach acceptors without knowing where they live
//! relations: consumed by proposer.rs, LocalAcceptor serves acceptor.rs in-process
//! what: AcceptorHandle trait, LocalAcceptor

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::acceptor::{AcceptResponse, Acceptor, PrepareResponse};
use crate::ballot::Ballot;
use crate::error::AcceptorUnavailable;

/// Remote end of one acceptor
#[async_trait]
pub trait AcceptorHandle<V>: Send + Sync {
    fn id(&self) -> u64;

    async fn prepare(&self, ballot: Ballot) -> Result<PrepareResponse<V>, AcceptorUnavailable>;

    async fn accept(&self, ballot: Ballot, value: V) -> Result<AcceptResponse, AcceptorUnavailable>;
}

/// In-process acceptor. Clones share the same state.
#[derive(Debug, Clone)]
pub struct LocalAcceptor<V> {
    id: u64,
    state: Arc<Mutex<Acceptor<V>>>,
    online: Arc<AtomicBool>,
}

impl<V: Clone> LocalAcceptor<V> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(Acceptor::new(id))),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Take the acceptor down or bring it back; state survives either way
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Copy of the current acceptor state
    pub async fn snapshot(&self) -> Acceptor<V> {
        self.state.lock().await.clone()
    }

    fn check_online(&self) -> Result<(), AcceptorUnavailable> {
        if self.is_online() {
            Ok(())
        } else {
            Err(AcceptorUnavailable::Unreachable(self.id))
        }
    }
}

#[async_trait]
impl<V> AcceptorHandle<V> for LocalAcceptor<V>
where
    V: Clone + Send + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    async fn prepare(&self, ballot: Ballot) -> Result<PrepareResponse<V>, AcceptorUnavailable> {
        self.check_online()?;
        Ok(self.state.lock().await.prepare(ballot))
    }

    async fn accept(&self, ballot: Ballot, value: V) -> Result<AcceptResponse, AcceptorUnavailable> {
        self.check_online()?;
        Ok(self.state.lock().await.accept(ballot, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let acceptor: LocalAcceptor<&'static str> = LocalAcceptor::new(3);
        let other = acceptor.clone();

        acceptor.prepare(Ballot::new(1, 1)).await.unwrap();

        assert_eq!(other.snapshot().await.promised(), Some(Ballot::new(1, 1)));
        assert_eq!(other.id(), 3);
    }

    #[tokio::test]
    async fn offline_acceptor_is_unreachable_but_keeps_state() {
        let acceptor: LocalAcceptor<&'static str> = LocalAcceptor::new(1);
        acceptor.prepare(Ballot::new(1, 1)).await.unwrap();
        acceptor.accept(Ballot::new(1, 1), "kept").await.unwrap();

        acceptor.set_online(false);
        assert_eq!(
            acceptor.prepare(Ballot::new(2, 1)).await,
            Err(AcceptorUnavailable::Unreachable(1))
        );

        acceptor.set_online(true);
        assert_eq!(acceptor.snapshot().await.accepted().map(|a| a.value), Some("kept"));
    }
}
