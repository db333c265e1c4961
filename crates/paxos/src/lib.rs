//! # paxos
//!
//! why: agree on exactly one value among proposers that may race and acceptors that may fail
//! relations: standalone, shares no code with the raft crates
//! what: Ballot, Acceptor, Proposer, AcceptorHandle transport seam, PaxosError

pub mod acceptor;
pub mod ballot;
pub mod error;
pub mod proposer;
pub mod transport;

pub use acceptor::{AcceptResponse, Accepted, Acceptor, PrepareResponse};
pub use ballot::Ballot;
pub use error::{AcceptorUnavailable, PaxosError};
pub use proposer::{majority, Chosen, Prepared, Proposer, DEFAULT_RPC_TIMEOUT};
pub use transport::{AcceptorHandle, LocalAcceptor};
