//! # timer
//!
//! why: drive elections and heartbeats from deadlines the event loop can select on
//! relations: owned by actor.rs, one of each per node
//! what: ElectionTimer (randomized, restartable, cancellable), HeartbeatTicker, sleep helper
//!
//! Both timers are plain deadlines, never background tasks: restarting one
//! means replacing its deadline, cancelling means clearing it.

use rand::Rng;
use tokio::time::{Duration, Instant};

use raft_core::RaftConfig;

/// Generates a random election timeout within the configured range
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    deadline: Option<Instant>,
}

impl ElectionTimer {
    /// Disarmed timer using the config's timeout range
    pub fn new(config: &RaftConfig) -> Self {
        Self {
            min_ms: config.election_timeout_min,
            max_ms: config.election_timeout_max,
            deadline: None,
        }
    }

    /// (Re)arm with a freshly drawn timeout, replacing any previous deadline
    pub fn reset(&mut self) -> Duration {
        let timeout = random_election_timeout(self.min_ms, self.max_ms);
        self.deadline = Some(Instant::now() + timeout);
        timeout
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Periodic leader tick. Exists only while the node leads.
#[derive(Debug, Clone)]
pub struct HeartbeatTicker {
    period: Duration,
    next: Option<Instant>,
}

impl HeartbeatTicker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Start ticking, first tick due immediately. False if already running.
    pub fn start(&mut self) -> bool {
        if self.next.is_some() {
            return false;
        }
        self.next = Some(Instant::now());
        true
    }

    /// Stop ticking. True only for the call that actually stopped it.
    pub fn stop(&mut self) -> bool {
        self.next.take().is_some()
    }

    /// Schedule the tick after the one that just fired
    pub fn advance(&mut self) {
        if self.next.is_some() {
            self.next = Some(Instant::now() + self.period);
        }
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }
}

/// Sleep until `deadline`, or forever when there is none
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
