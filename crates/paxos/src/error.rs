//! # error
//!
//! why: report why a round did not choose a value, with enough detail to retry
//! relations: returned by proposer.rs, AcceptorUnavailable by transport.rs handles
//! what: PaxosError, AcceptorUnavailable

use std::time::Duration;

use thiserror::Error;

use crate::ballot::Ballot;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaxosError {
    #[error("ballot {ballot}: {promises} promises, {needed} needed")]
    NoMajorityPromise {
        ballot: Ballot,
        promises: usize,
        needed: usize,
    },

    #[error("ballot {ballot}: {accepts} accepts, {needed} needed")]
    NoMajorityAccept {
        ballot: Ballot,
        accepts: usize,
        needed: usize,
    },

    #[error("proposer has no acceptors")]
    NoAcceptors,

    #[error("no value chosen after {attempts} attempts: {last}")]
    AttemptsExhausted {
        attempts: usize,
        last: Box<PaxosError>,
    },
}

/// An acceptor did not answer. Counted as a rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcceptorUnavailable {
    #[error("acceptor {0} is unreachable")]
    Unreachable(u64),

    #[error("acceptor {acceptor} timed out after {after:?}")]
    Timeout { acceptor: u64, after: Duration },
}

pub type Result<T> = std::result::Result<T, PaxosError>;
