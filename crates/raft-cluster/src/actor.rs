//! # actor
//!
//! why: serialize every mutation of a node through one task so no locks guard raft state
//! relations: owns a raft_core::RaftNode, talks to peers through membership.rs, driven by handle.rs
//! what: Event (mailbox protocol), NodeActor (event loop, timers, rpc fan-out, apply stream)
//!
//! Inbound RPCs, client calls, timer expiries and outbound RPC results all
//! arrive as events and are handled one at a time. Outbound RPCs run in
//! their own tasks and report back through the mailbox, so the loop never
//! waits on a peer.

use std::sync::Arc;

use raft_core::{
    AppendEntries, AppendEntriesResponse, Command, ElectionOutcome, LogEntry, NodeId, NodeStatus,
    RaftConfig, RaftError, RaftNode, RequestVote, Role, VoteResponse,
};
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::membership::Membership;
use crate::peer::{call_with_timeout, PeerHandle};
use crate::timer::{sleep_until_deadline, ElectionTimer, HeartbeatTicker};

/// Everything a node reacts to
#[derive(Debug)]
pub(crate) enum Event {
    RequestVote {
        req: RequestVote,
        reply: oneshot::Sender<VoteResponse>,
    },
    AppendEntries {
        req: AppendEntries,
        reply: oneshot::Sender<AppendEntriesResponse>,
    },
    Propose {
        command: Command,
        reply: oneshot::Sender<Result<LogEntry, RaftError>>,
    },
    /// Start an election now; answered once it is decided
    Campaign {
        reply: oneshot::Sender<Result<u64, RaftError>>,
    },
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
    Committed {
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    VoteResult {
        peer: NodeId,
        term: u64,
        result: Result<VoteResponse, TransportError>,
    },
    AppendResult {
        peer: NodeId,
        term: u64,
        covered: Option<u64>,
        result: Result<AppendEntriesResponse, TransportError>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A campaign() caller waiting on the election of `term`
struct PendingCampaign {
    term: u64,
    reply: oneshot::Sender<Result<u64, RaftError>>,
}

pub(crate) struct NodeActor {
    node: RaftNode,
    config: RaftConfig,
    membership: Membership,
    election_timer: ElectionTimer,
    heartbeat: HeartbeatTicker,
    mailbox: mpsc::WeakSender<Event>,
    apply_tx: Option<mpsc::UnboundedSender<LogEntry>>,
    campaign: Option<PendingCampaign>,
}

impl NodeActor {
    pub(crate) fn new(
        id: NodeId,
        membership: Membership,
        config: RaftConfig,
        mailbox: mpsc::WeakSender<Event>,
        apply_tx: Option<mpsc::UnboundedSender<LogEntry>>,
    ) -> Self {
        let node = RaftNode::new(id, membership.cluster_with(id));
        Self {
            node,
            election_timer: ElectionTimer::new(&config),
            heartbeat: HeartbeatTicker::new(config.heartbeat()),
            config,
            membership,
            mailbox,
            apply_tx,
            campaign: None,
        }
    }

    /// Run the node main loop until shutdown or until every handle is gone
    pub(crate) async fn run(mut self, mut mailbox: mpsc::Receiver<Event>) {
        let id = self.node.id;
        tracing::info!(node_id = id, peers = self.membership.len(), "node started");
        self.election_timer.reset();

        let stopped = loop {
            let election_deadline = self.election_timer.deadline();
            let heartbeat_deadline = self.heartbeat.deadline();

            tokio::select! {
                event = mailbox.recv() => match event {
                    Some(Event::Shutdown { reply }) => break Some(reply),
                    Some(event) => self.handle_event(event),
                    None => break None,
                },
                _ = sleep_until_deadline(election_deadline) => self.on_election_timeout(),
                _ = sleep_until_deadline(heartbeat_deadline) => self.on_heartbeat(),
            }

            self.sync_timers();
            self.apply_committed();
        };

        // queued events are dropped with the receiver, their callers see NodeStopped
        drop(mailbox);
        self.heartbeat.stop();
        self.election_timer.cancel();
        tracing::info!(node_id = id, term = self.node.current_term, "node stopped");
        if let Some(reply) = stopped {
            let _ = reply.send(());
        }
    }

    fn handle_event(&mut self, event: Event) {
        let term_before = self.node.current_term;

        match event {
            Event::RequestVote { req, reply } => {
                let (response, reset) = self.node.handle_request_vote(&req);
                if reset {
                    self.election_timer.reset();
                }
                let _ = reply.send(response);
            }
            Event::AppendEntries { req, reply } => {
                let (response, reset) = self.node.handle_append_entries(req);
                if reset {
                    self.election_timer.reset();
                }
                let _ = reply.send(response);
            }
            Event::Propose { command, reply } => {
                let result = self.node.propose_entry(command);
                if result.is_ok() {
                    self.broadcast_append_entries();
                }
                let _ = reply.send(result);
            }
            Event::Campaign { reply } => {
                if self.node.is_leader() {
                    let _ = reply.send(Ok(self.node.current_term));
                    return;
                }
                self.start_election();
                self.campaign = Some(PendingCampaign {
                    term: self.node.current_term,
                    reply,
                });
            }
            Event::Status { reply } => {
                let _ = reply.send(self.node.status());
            }
            Event::Committed { reply } => {
                let _ = reply.send(self.node.committed_entries().to_vec());
            }
            Event::VoteResult { peer, term, result } => {
                let response = self.rpc_outcome(peer, "RequestVote", result);
                let outcome = self.node.handle_vote_response(peer, term, response);
                if let ElectionOutcome::Lost { votes, needed } = outcome {
                    self.resolve_campaign(term, Err(RaftError::NoMajority { term, votes, needed }));
                }
            }
            Event::AppendResult {
                peer,
                term,
                covered,
                result,
            } => {
                // a mismatch only backs off next_index; the next heartbeat retries
                let response = self.rpc_outcome(peer, "AppendEntries", result);
                self.node
                    .handle_append_entries_response(peer, term, covered, response);
            }
            Event::Shutdown { .. } => {}
        }

        if self.node.current_term > term_before && !self.node.is_leader() {
            self.election_timer.reset();
        }
        self.settle_campaign();
    }

    fn rpc_outcome<T>(
        &self,
        peer: NodeId,
        rpc: &'static str,
        result: Result<T, TransportError>,
    ) -> Option<T> {
        match result {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::debug!(node_id = self.node.id, peer, rpc, error = %err, "rpc failed");
                None
            }
        }
    }

    fn on_election_timeout(&mut self) {
        if self.node.is_leader() {
            self.election_timer.cancel();
            return;
        }
        tracing::debug!(node_id = self.node.id, term = self.node.current_term, "election timeout");
        self.start_election();
    }

    fn on_heartbeat(&mut self) {
        self.heartbeat.advance();
        self.broadcast_append_entries();
    }

    fn start_election(&mut self) {
        if let Some(pending) = self.campaign.take() {
            let votes = self.node.election().map_or(0, |t| t.votes());
            let needed = self.node.quorum_size();
            let _ = pending.reply.send(Err(RaftError::NoMajority {
                term: pending.term,
                votes,
                needed,
            }));
        }

        let req = self.node.start_election();
        self.election_timer.reset();
        let peers: Vec<Arc<dyn PeerHandle>> = self.membership.iter().cloned().collect();
        for peer in peers {
            self.spawn_request_vote(peer, req.clone());
        }
    }

    fn broadcast_append_entries(&self) {
        for (peer, req) in self.node.replication_requests() {
            self.spawn_append_entries(peer, req);
        }
    }

    fn spawn_request_vote(&self, peer: Arc<dyn PeerHandle>, req: RequestVote) {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return;
        };
        let after = self.config.rpc_deadline();
        tokio::spawn(async move {
            let peer_id = peer.id();
            let term = req.term;
            let result = call_with_timeout(peer_id, after, peer.request_vote(req)).await;
            let _ = mailbox
                .send(Event::VoteResult {
                    peer: peer_id,
                    term,
                    result,
                })
                .await;
        });
    }

    fn spawn_append_entries(&self, peer_id: NodeId, req: AppendEntries) {
        let Some(peer) = self.membership.get(peer_id).cloned() else {
            return;
        };
        let Some(mailbox) = self.mailbox.upgrade() else {
            return;
        };
        let after = self.config.rpc_deadline();
        tokio::spawn(async move {
            let term = req.term;
            let covered = req.last_covered_index();
            let result = call_with_timeout(peer_id, after, peer.append_entries(req)).await;
            let _ = mailbox
                .send(Event::AppendResult {
                    peer: peer_id,
                    term,
                    covered,
                    result,
                })
                .await;
        });
    }

    /// Align timers with the current role: leaders tick, everyone else waits to campaign
    fn sync_timers(&mut self) {
        if self.node.role == Role::Leader {
            self.election_timer.cancel();
            self.heartbeat.start();
        } else {
            if self.heartbeat.stop() {
                self.election_timer.reset();
            }
            if !self.election_timer.is_armed() {
                self.election_timer.reset();
            }
        }
    }

    /// Answer a waiting campaign() once its election can no longer change
    fn settle_campaign(&mut self) {
        let Some(term) = self.campaign.as_ref().map(|c| c.term) else {
            return;
        };
        let current = self.node.current_term;
        let result = if current > term {
            Err(RaftError::StaleTerm {
                received: term,
                current,
            })
        } else if self.node.is_leader() {
            Ok(term)
        } else if self.node.role == Role::Follower {
            Err(RaftError::NotLeader {
                leader_hint: self.node.leader_id,
            })
        } else {
            return;
        };
        self.resolve_campaign(term, result);
    }

    fn resolve_campaign(&mut self, term: u64, result: Result<u64, RaftError>) {
        if self.campaign.as_ref().is_some_and(|c| c.term == term) {
            if let Some(pending) = self.campaign.take() {
                let _ = pending.reply.send(result);
            }
        }
    }

    fn apply_committed(&mut self) {
        let entries = self.node.take_entries_to_apply();
        if entries.is_empty() {
            return;
        }
        tracing::debug!(
            node_id = self.node.id,
            count = entries.len(),
            last_applied = ?self.node.last_applied,
            "applying committed entries"
        );
        if let Some(tx) = &self.apply_tx {
            for entry in entries {
                let _ = tx.send(entry);
            }
        }
    }
}
