//! # proposer
//!
//! why: drive prepare and accept rounds until a single value is chosen
//! relations: talks to acceptors only through transport.rs handles
//! what: Proposer, Prepared, Chosen, majority
//!
//! Each phase fans out to every acceptor at once and returns as soon as the
//! outcome is known: a majority agreed, or too many refused for one to be
//! possible. Timeouts and unreachable acceptors count as refusals.
//!
//! Prepare calls still pending at that point are dropped. Accept calls run as
//! spawned tasks and finish in the background, so every reachable acceptor
//! ends up holding the chosen value, not only the first majority.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;

use crate::acceptor::{AcceptResponse, Accepted, PrepareResponse};
use crate::ballot::Ballot;
use crate::error::{AcceptorUnavailable, PaxosError, Result};
use crate::transport::AcceptorHandle;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(100);

const BACKOFF_MIN_MS: u64 = 10;
const BACKOFF_MAX_MS: u64 = 50;

/// Strict majority of `n`
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}

/// Outcome of a successful phase 1: the ballot and the value it must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared<V> {
    pub ballot: Ballot,
    pub value: V,
}

/// A value accepted by a majority under `ballot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chosen<V> {
    pub ballot: Ballot,
    pub value: V,
}

pub struct Proposer<V> {
    id: u64,
    round: u64,
    acceptors: Vec<Arc<dyn AcceptorHandle<V>>>,
    rpc_timeout: Duration,
}

impl<V> fmt::Debug for Proposer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proposer")
            .field("id", &self.id)
            .field("round", &self.round)
            .field("acceptors", &self.acceptors.len())
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}

async fn call_with_timeout<T, F>(
    acceptor: u64,
    after: Duration,
    rpc: F,
) -> std::result::Result<T, AcceptorUnavailable>
where
    F: std::future::Future<Output = std::result::Result<T, AcceptorUnavailable>>,
{
    match tokio::time::timeout(after, rpc).await {
        Ok(result) => result,
        Err(_) => Err(AcceptorUnavailable::Timeout { acceptor, after }),
    }
}

impl<V> Proposer<V>
where
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// `id` must be unique among proposers sharing these acceptors
    pub fn new(id: u64, acceptors: Vec<Arc<dyn AcceptorHandle<V>>>) -> Self {
        Self {
            id,
            round: 0,
            acceptors,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Make the next ballot use `round` (or the round after the last one seen, if higher)
    pub fn with_first_round(mut self, round: u64) -> Self {
        self.round = self.round.max(round.saturating_sub(1));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn quorum(&self) -> usize {
        majority(self.acceptors.len())
    }

    /// Fresh ballot, strictly greater than every ballot this proposer has used or seen
    pub fn next_ballot(&mut self) -> Ballot {
        self.round += 1;
        Ballot::new(self.round, self.id)
    }

    /// Remember a ballot some acceptor reported, so the next one beats it
    pub fn observe(&mut self, seen: Ballot) {
        self.round = self.round.max(seen.round);
    }

    /// Phase 1 under a fresh ballot.
    ///
    /// The returned value is the one accepted under the highest ballot among
    /// the promises, or `value` if no promising acceptor accepted anything.
    pub async fn prepare(&mut self, value: V) -> Result<Prepared<V>> {
        if self.acceptors.is_empty() {
            return Err(PaxosError::NoAcceptors);
        }
        let ballot = self.next_ballot();
        let needed = self.quorum();
        let total = self.acceptors.len();

        let mut calls: FuturesUnordered<_> = self
            .acceptors
            .iter()
            .map(|acceptor| {
                let acceptor = Arc::clone(acceptor);
                let after = self.rpc_timeout;
                async move {
                    let id = acceptor.id();
                    (id, call_with_timeout(id, after, acceptor.prepare(ballot)).await)
                }
            })
            .collect();

        let mut promises = 0;
        let mut refusals = 0;
        let mut highest: Option<Accepted<V>> = None;
        let mut seen = ballot;

        while let Some((acceptor, result)) = calls.next().await {
            match result {
                Ok(PrepareResponse::Promised { accepted }) => {
                    promises += 1;
                    if let Some(accepted) = accepted {
                        if highest.as_ref().map_or(true, |h| accepted.ballot > h.ballot) {
                            highest = Some(accepted);
                        }
                    }
                }
                Ok(PrepareResponse::Rejected { promised }) => {
                    refusals += 1;
                    seen = seen.max(promised);
                }
                Err(err) => {
                    refusals += 1;
                    tracing::debug!(proposer = self.id, acceptor, %ballot, error = %err, "prepare failed");
                }
            }
            if promises >= needed || total - refusals < needed {
                break;
            }
        }
        drop(calls);
        self.observe(seen);

        if promises < needed {
            tracing::debug!(proposer = self.id, %ballot, promises, needed, "no majority of promises");
            return Err(PaxosError::NoMajorityPromise {
                ballot,
                promises,
                needed,
            });
        }

        let value = match highest {
            Some(accepted) => {
                tracing::debug!(
                    proposer = self.id,
                    %ballot,
                    adopted_from = %accepted.ballot,
                    "adopting previously accepted value"
                );
                accepted.value
            }
            None => value,
        };
        Ok(Prepared { ballot, value })
    }

    /// Phase 2 for a prepared ballot
    pub async fn accept(&mut self, prepared: Prepared<V>) -> Result<Chosen<V>> {
        if self.acceptors.is_empty() {
            return Err(PaxosError::NoAcceptors);
        }
        let Prepared { ballot, value } = prepared;
        let needed = self.quorum();
        let total = self.acceptors.len();

        let mut calls: FuturesUnordered<_> = self
            .acceptors
            .iter()
            .map(|acceptor| {
                let acceptor = Arc::clone(acceptor);
                let after = self.rpc_timeout;
                let value = value.clone();
                tokio::spawn(async move {
                    let id = acceptor.id();
                    (id, call_with_timeout(id, after, acceptor.accept(ballot, value)).await)
                })
            })
            .collect();

        let mut accepts = 0;
        let mut refusals = 0;
        let mut seen = ballot;

        while let Some(joined) = calls.next().await {
            match joined {
                Ok((_, Ok(AcceptResponse::Accepted))) => accepts += 1,
                Ok((_, Ok(AcceptResponse::Rejected { promised }))) => {
                    refusals += 1;
                    seen = seen.max(promised);
                }
                Ok((acceptor, Err(err))) => {
                    refusals += 1;
                    tracing::debug!(proposer = self.id, acceptor, %ballot, error = %err, "accept failed");
                }
                Err(err) => {
                    refusals += 1;
                    tracing::debug!(proposer = self.id, %ballot, error = %err, "accept task failed");
                }
            }
            if accepts >= needed || total - refusals < needed {
                break;
            }
        }
        // dropping the join handles detaches the remaining accepts
        drop(calls);
        self.observe(seen);

        if accepts < needed {
            tracing::debug!(proposer = self.id, %ballot, accepts, needed, "no majority of accepts");
            return Err(PaxosError::NoMajorityAccept {
                ballot,
                accepts,
                needed,
            });
        }

        tracing::info!(proposer = self.id, %ballot, ?value, "value chosen");
        Ok(Chosen { ballot, value })
    }

    /// One full round: prepare, then accept whatever value prepare settled on
    pub async fn propose(&mut self, value: V) -> Result<Chosen<V>> {
        let prepared = self.prepare(value).await?;
        self.accept(prepared).await
    }

    /// Run rounds until one succeeds or `attempts` rounds have failed.
    ///
    /// Each retry sleeps a random, growing back-off and uses a ballot higher
    /// than any rejection seen so far.
    pub async fn propose_with_retry(&mut self, value: V, attempts: usize) -> Result<Chosen<V>> {
        let attempts = attempts.max(1);
        let mut last = PaxosError::NoAcceptors;

        for attempt in 1..=attempts {
            match self.propose(value.clone()).await {
                Ok(chosen) => return Ok(chosen),
                Err(PaxosError::NoAcceptors) => return Err(PaxosError::NoAcceptors),
                Err(err) => {
                    tracing::debug!(proposer = self.id, attempt, error = %err, "round failed");
                    last = err;
                }
            }
            if attempt < attempts {
                let backoff_ms = rand::thread_rng().gen_range(BACKOFF_MIN_MS..=BACKOFF_MAX_MS);
                tokio::time::sleep(Duration::from_millis(backoff_ms * attempt as u64)).await;
            }
        }

        Err(PaxosError::AttemptsExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalAcceptor;

    fn acceptors(n: u64) -> Vec<Arc<dyn AcceptorHandle<String>>> {
        (0..n)
            .map(|id| Arc::new(LocalAcceptor::<String>::new(id)) as Arc<dyn AcceptorHandle<String>>)
            .collect()
    }

    #[test]
    fn majority_is_strict() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(2), 2);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(4), 3);
        assert_eq!(majority(5), 3);
    }

    #[test]
    fn ballots_strictly_increase() {
        let mut proposer = Proposer::new(2, acceptors(3));
        let first = proposer.next_ballot();
        proposer.observe(Ballot::new(9, 1));
        let second = proposer.next_ballot();
        assert!(second > first);
        assert_eq!(second, Ballot::new(10, 2));
    }

    #[test]
    fn observing_older_ballot_changes_nothing() {
        let mut proposer = Proposer::new(1, acceptors(3)).with_first_round(5);
        proposer.observe(Ballot::new(2, 9));
        assert_eq!(proposer.next_ballot(), Ballot::new(5, 1));
    }

    #[tokio::test]
    async fn no_acceptors_is_an_error() {
        let mut proposer: Proposer<String> = Proposer::new(1, Vec::new());
        assert_eq!(
            proposer.propose("v".to_string()).await,
            Err(PaxosError::NoAcceptors)
        );
        assert_eq!(
            proposer.propose_with_retry("v".to_string(), 3).await,
            Err(PaxosError::NoAcceptors)
        );
    }
}
