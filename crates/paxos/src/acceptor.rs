//! # acceptor
//!
//! why: remember promises and accepted proposals so a chosen value can never be replaced
//! relations: wrapped by transport.rs, queried by proposer.rs
//! what: Acceptor, Accepted, PrepareResponse, AcceptResponse

use serde::{Deserialize, Serialize};

use crate::ballot::Ballot;

/// A proposal an acceptor has accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted<V> {
    pub ballot: Ballot,
    pub value: V,
}

/// Answer to phase 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareResponse<V> {
    /// Promise to ignore lower ballots, with the last accepted proposal if any
    Promised { accepted: Option<Accepted<V>> },
    /// Already promised an equal or higher ballot
    Rejected { promised: Ballot },
}

/// Answer to phase 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptResponse {
    Accepted,
    Rejected { promised: Ballot },
}

#[derive(Debug, Clone)]
pub struct Acceptor<V> {
    id: u64,
    promised: Option<Ballot>,
    accepted: Option<Accepted<V>>,
}

impl<V: Clone> Acceptor<V> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            promised: None,
            accepted: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Highest ballot promised so far
    pub fn promised(&self) -> Option<Ballot> {
        self.promised
    }

    pub fn accepted(&self) -> Option<&Accepted<V>> {
        self.accepted.as_ref()
    }

    /// Phase 1: promise `ballot` if it is higher than every earlier promise
    pub fn prepare(&mut self, ballot: Ballot) -> PrepareResponse<V> {
        match self.promised {
            Some(promised) if ballot <= promised => {
                tracing::debug!(acceptor = self.id, %ballot, %promised, "prepare rejected");
                PrepareResponse::Rejected { promised }
            }
            _ => {
                self.promised = Some(ballot);
                tracing::debug!(acceptor = self.id, %ballot, "promised");
                PrepareResponse::Promised {
                    accepted: self.accepted.clone(),
                }
            }
        }
    }

    /// Phase 2: accept unless a higher ballot has been promised
    pub fn accept(&mut self, ballot: Ballot, value: V) -> AcceptResponse {
        match self.promised {
            Some(promised) if ballot < promised => {
                tracing::debug!(acceptor = self.id, %ballot, %promised, "accept rejected");
                AcceptResponse::Rejected { promised }
            }
            _ => {
                self.promised = Some(ballot);
                self.accepted = Some(Accepted { ballot, value });
                tracing::debug!(acceptor = self.id, %ballot, "accepted");
                AcceptResponse::Accepted
            }
        }
    }
}
