//! # comprehensive cluster tests
//!
//! why: verify running nodes elect, replicate and recover under partitions and dead peers
//! relations: drives raft-cluster through LocalCluster and hand-built memberships with fake peers
//! what: leader scenario, election safety sampling, fault injection, client api, apply stream
//!
//! Every async test runs on paused time, so timeouts elapse instantly and deterministically.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raft_cluster::{
    ClusterError, LocalCluster, Membership, NodeHandle, PeerHandle, TransportError,
};
use raft_core::{
    AppendEntries, AppendEntriesResponse, NodeId, NodeStatus, RaftConfig, RaftError, RequestVote,
    Role, VoteResponse,
};
use serde_json::json;
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(5);

/// Poll `handle` until its commit index reaches `index`
async fn wait_for_commit(handle: &NodeHandle, index: u64) -> NodeStatus {
    let poll = async {
        loop {
            let status = handle.status().await.unwrap();
            if status.commit_index >= Some(index) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .expect("commit index never reached")
}

// -- fake peers --

/// Never answers
struct Silent(NodeId);

#[async_trait]
impl PeerHandle for Silent {
    fn id(&self) -> NodeId {
        self.0
    }

    async fn request_vote(&self, _req: RequestVote) -> Result<VoteResponse, TransportError> {
        std::future::pending().await
    }

    async fn append_entries(
        &self,
        _req: AppendEntries,
    ) -> Result<AppendEntriesResponse, TransportError> {
        std::future::pending().await
    }
}

/// Fails every call immediately
struct Down(NodeId);

#[async_trait]
impl PeerHandle for Down {
    fn id(&self) -> NodeId {
        self.0
    }

    async fn request_vote(&self, _req: RequestVote) -> Result<VoteResponse, TransportError> {
        Err(TransportError::Unreachable(self.0))
    }

    async fn append_entries(
        &self,
        _req: AppendEntries,
    ) -> Result<AppendEntriesResponse, TransportError> {
        Err(TransportError::Unreachable(self.0))
    }
}

/// Agrees with everything in the caller's term
struct Agreeable(NodeId);

#[async_trait]
impl PeerHandle for Agreeable {
    fn id(&self) -> NodeId {
        self.0
    }

    async fn request_vote(&self, req: RequestVote) -> Result<VoteResponse, TransportError> {
        Ok(VoteResponse {
            term: req.term,
            vote_granted: true,
        })
    }

    async fn append_entries(
        &self,
        req: AppendEntries,
    ) -> Result<AppendEntriesResponse, TransportError> {
        Ok(AppendEntriesResponse {
            term: req.term,
            success: true,
        })
    }
}

fn membership(peers: Vec<Arc<dyn PeerHandle>>) -> Membership {
    Membership::new(peers)
}

// =============================================================================
// SECTION 1: LEADER SCENARIO
// =============================================================================

mod scenario {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn five_nodes_elect_commit_and_fail_over() {
        let cluster = LocalCluster::start(5, RaftConfig::default()).await.unwrap();

        let term = cluster.node(0).unwrap().campaign().await.unwrap();
        assert_eq!(term, 1);
        let leader = cluster.leader().await.unwrap();
        assert_eq!(leader.id, 0);
        assert_eq!(leader.term, 1);

        let command = json!({"type": "SET", "key": "x", "value": 1});
        let entry = cluster.node(0).unwrap().propose(command.clone()).await.unwrap();
        assert_eq!(entry.index, 0);
        assert_eq!(entry.term, 1);

        let status = wait_for_commit(cluster.node(0).unwrap(), 0).await;
        assert_eq!(status.role, Role::Leader);
        let committed = cluster.node(0).unwrap().committed_entries().await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].command, command);

        // followers learn the commit from the next heartbeat
        for id in 1..5 {
            wait_for_commit(cluster.node(id).unwrap(), 0).await;
        }

        cluster.isolate(0).await.unwrap();
        let new_leader = cluster.wait_for_leader(WAIT).await.unwrap();
        assert_ne!(new_leader.id, 0);
        assert!(new_leader.term >= 2);

        // the committed entry survives the leader change
        let committed = cluster
            .node(new_leader.id)
            .unwrap()
            .committed_entries()
            .await
            .unwrap();
        assert_eq!(committed.first().map(|e| &e.command), Some(&command));

        cluster.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cluster_elects_leader_without_help() {
        let cluster = LocalCluster::start(3, RaftConfig::default()).await.unwrap();

        let leader = cluster.wait_for_leader(WAIT).await.unwrap();

        assert!(leader.term >= 1);
        cluster.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn healed_leader_steps_down_and_catches_up() {
        let cluster = LocalCluster::start(3, RaftConfig::default()).await.unwrap();
        cluster.node(0).unwrap().campaign().await.unwrap();
        cluster.isolate(0).await.unwrap();

        let leader = cluster.wait_for_leader(WAIT).await.unwrap();
        let handle = cluster.node(leader.id).unwrap();
        let entry = handle.propose(json!("after-failover")).await.unwrap();
        wait_for_commit(handle, entry.index).await;

        cluster.heal(0).await.unwrap();
        let old = wait_for_commit(cluster.node(0).unwrap(), entry.index).await;

        assert_eq!(old.role, Role::Follower);
        assert!(old.term >= leader.term);
        let entries = cluster.node(0).unwrap().committed_entries().await.unwrap();
        assert_eq!(entries.last().map(|e| e.command.clone()), Some(json!("after-failover")));
        cluster.shutdown().await;
    }
}

// =============================================================================
// SECTION 2: ELECTION SAFETY UNDER PARTITIONS
// =============================================================================

mod election_safety {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[tokio::test(start_paused = true)]
    async fn at_most_one_leader_per_term() {
        let mut rng = StdRng::seed_from_u64(7);
        let cluster = LocalCluster::start(5, RaftConfig::default()).await.unwrap();
        let mut leaders: BTreeMap<u64, NodeId> = BTreeMap::new();

        for _ in 0..60 {
            match rng.gen_range(0..3) {
                0 => {
                    let id = rng.gen_range(0..5);
                    cluster.isolate(id).await.unwrap();
                }
                1 => {
                    for id in 0..5 {
                        cluster.heal(id).await.unwrap();
                    }
                }
                _ => {}
            }
            tokio::time::sleep(Duration::from_millis(rng.gen_range(20..400))).await;

            for status in cluster.statuses().await {
                if status.role == Role::Leader {
                    let first = *leaders.entry(status.term).or_insert(status.id);
                    assert_eq!(first, status.id, "two leaders in term {}", status.term);
                }
            }
        }

        for id in 0..5 {
            cluster.heal(id).await.unwrap();
        }
        assert!(cluster.wait_for_leader(WAIT).await.is_ok());
        assert!(!leaders.is_empty());
        cluster.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn committed_entries_agree_after_churn() {
        let mut rng = StdRng::seed_from_u64(11);
        let cluster = LocalCluster::start(5, RaftConfig::default()).await.unwrap();

        for round in 0..20 {
            if let Ok(leader) = cluster.wait_for_leader(WAIT).await {
                let _ = cluster.node(leader.id).unwrap().propose(json!(round)).await;
            }
            if rng.gen_bool(0.3) {
                cluster.isolate(rng.gen_range(0..5)).await.unwrap();
            } else {
                for id in 0..5 {
                    cluster.heal(id).await.unwrap();
                }
            }
            tokio::time::sleep(Duration::from_millis(rng.gen_range(50..300))).await;
        }
        for id in 0..5 {
            cluster.heal(id).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let mut logs = Vec::new();
        for id in 0..5 {
            logs.push(cluster.node(id).unwrap().committed_entries().await.unwrap());
        }
        for log in &logs {
            let shared = log.len().min(logs[0].len());
            assert_eq!(log[..shared], logs[0][..shared]);
        }
        cluster.shutdown().await;
    }
}

// =============================================================================
// SECTION 3: UNREACHABLE AND SILENT PEERS
// =============================================================================

mod fault_injection {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn silent_minority_does_not_stall_election() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![Arc::new(Agreeable(2)), Arc::new(Silent(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        let start = Instant::now();

        let term = node.campaign().await.unwrap();

        assert_eq!(term, 1);
        assert!(start.elapsed() < RaftConfig::default().rpc_deadline());
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_majority_loses_after_rpc_timeout() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![Arc::new(Silent(2)), Arc::new(Silent(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        let start = Instant::now();

        let err = node.campaign().await.unwrap_err();

        assert_eq!(
            err,
            ClusterError::Raft(RaftError::NoMajority {
                term: 1,
                votes: 1,
                needed: 2
            })
        );
        assert!(start.elapsed() >= RaftConfig::default().rpc_deadline());
        assert_eq!(node.status().await.unwrap().role, Role::Follower);
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_peers_fail_fast() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![Arc::new(Down(2)), Arc::new(Down(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        let start = Instant::now();

        let err = node.campaign().await.unwrap_err();

        assert!(matches!(err, ClusterError::Raft(RaftError::NoMajority { .. })));
        assert!(start.elapsed() < RaftConfig::default().rpc_deadline());
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn replication_commits_past_silent_peer() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![Arc::new(Agreeable(2)), Arc::new(Silent(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        node.campaign().await.unwrap();

        let entry = node.propose(json!({"op": "inc"})).await.unwrap();
        let status = wait_for_commit(&node, entry.index).await;

        assert_eq!(status.commit_index, Some(0));
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lost_election_leaves_node_unable_to_propose() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![
                Arc::new(Agreeable(2)),
                Arc::new(Down(3)),
                Arc::new(Down(4)),
                Arc::new(Silent(5)),
            ]),
            RaftConfig::default(),
        )
        .unwrap();

        let err = node.campaign().await.unwrap_err();
        assert_eq!(
            err,
            ClusterError::Raft(RaftError::NoMajority {
                term: 1,
                votes: 2,
                needed: 3
            })
        );

        let err = node.propose(json!(1)).await.unwrap_err();
        assert!(matches!(err, ClusterError::Raft(RaftError::NotLeader { .. })));
        node.shutdown().await;
    }
}

// =============================================================================
// SECTION 4: CLIENT API
// =============================================================================

mod client_api {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follower_rejects_proposals_with_leader_hint() {
        let cluster = LocalCluster::start(3, RaftConfig::default()).await.unwrap();

        let err = cluster.node(1).unwrap().propose(json!("early")).await.unwrap_err();
        assert_eq!(
            err,
            ClusterError::Raft(RaftError::NotLeader { leader_hint: None })
        );

        cluster.node(0).unwrap().campaign().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = cluster.node(1).unwrap().propose(json!("late")).await.unwrap_err();
        assert_eq!(
            err,
            ClusterError::Raft(RaftError::NotLeader {
                leader_hint: Some(0)
            })
        );
        cluster.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn single_node_cluster_commits_alone() {
        let (node, mut applied) =
            NodeHandle::spawn_with_apply(1, Membership::default(), RaftConfig::default()).unwrap();

        assert_eq!(node.campaign().await.unwrap(), 1);
        for i in 0..3 {
            node.propose(json!(i)).await.unwrap();
        }

        for i in 0..3u64 {
            let entry = applied.recv().await.unwrap();
            assert_eq!(entry.index, i);
            assert_eq!(entry.command, json!(i));
        }
        assert_eq!(node.committed_entries().await.unwrap().len(), 3);
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn apply_stream_follows_commit_order() {
        let (node, mut applied) = NodeHandle::spawn_with_apply(
            1,
            membership(vec![Arc::new(Agreeable(2)), Arc::new(Agreeable(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        node.campaign().await.unwrap();
        node.propose(json!("a")).await.unwrap();
        node.propose(json!("b")).await.unwrap();

        let first = applied.recv().await.unwrap();
        let second = applied.recv().await.unwrap();

        assert_eq!((first.index, second.index), (0, 1));
        assert_eq!(node.status().await.unwrap().last_applied, Some(1));
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_node_reports_node_stopped() {
        let node = NodeHandle::spawn(1, Membership::default(), RaftConfig::default()).unwrap();
        node.shutdown().await;

        assert!(node.is_stopped());
        assert_eq!(node.status().await.unwrap_err(), ClusterError::NodeStopped(1));
        let req = RequestVote {
            term: 1,
            candidate_id: 2,
            last_log_index: None,
            last_log_term: 0,
        };
        assert_eq!(
            node.request_vote(req).await.unwrap_err(),
            TransportError::NodeStopped(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_node_is_an_error() {
        let cluster = LocalCluster::start(3, RaftConfig::default()).await.unwrap();
        assert!(matches!(cluster.node(9), Err(ClusterError::UnknownNode(9))));
        assert_eq!(cluster.isolate(9).await, Err(ClusterError::UnknownNode(9)));
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_start() {
        let config = RaftConfig {
            election_timeout_min: 300,
            election_timeout_max: 150,
            ..Default::default()
        };

        let err = LocalCluster::start(3, config).await.unwrap_err();

        assert!(matches!(err, ClusterError::Raft(RaftError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_spawn() {
        let inverted = RaftConfig {
            election_timeout_min: 400,
            election_timeout_max: 300,
            ..Default::default()
        };
        let idle_heartbeat = RaftConfig {
            heartbeat_interval: 0,
            ..Default::default()
        };

        let err = NodeHandle::spawn(1, Membership::default(), inverted).unwrap_err();
        assert!(matches!(err, ClusterError::Raft(RaftError::InvalidConfig(_))));

        let err = NodeHandle::spawn_with_apply(1, Membership::default(), idle_heartbeat).unwrap_err();
        assert!(matches!(err, ClusterError::Raft(RaftError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn campaign_on_leader_keeps_its_term() {
        let node = NodeHandle::spawn(
            1,
            membership(vec![Arc::new(Agreeable(2)), Arc::new(Agreeable(3))]),
            RaftConfig::default(),
        )
        .unwrap();
        assert_eq!(node.campaign().await.unwrap(), 1);

        assert_eq!(node.campaign().await.unwrap(), 1);

        let status = node.status().await.unwrap();
        assert_eq!(status.role, Role::Leader);
        assert_eq!(status.term, 1);
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_leader_times_out_without_quorum() {
        let cluster = LocalCluster::start(3, RaftConfig::default()).await.unwrap();
        for id in 0..3 {
            cluster.isolate(id).await.unwrap();
        }

        let err = cluster.wait_for_leader(Duration::from_secs(1)).await.unwrap_err();

        assert_eq!(
            err,
            ClusterError::NoLeader {
                waited: Duration::from_secs(1)
            }
        );
        cluster.shutdown().await;
    }
}
