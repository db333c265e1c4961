//! # config
//!
//! why: centralize the timing knobs that keep elections rare and heartbeats frequent
//! relations: read by raft-cluster's timers and peer fan-out
//! what: RaftConfig with defaults, json loading, validation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RaftError, Result};

/// Raft timing configuration, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Lower bound of the randomized election timeout
    pub election_timeout_min: u64,
    /// Upper bound of the randomized election timeout
    pub election_timeout_max: u64,
    /// Leader heartbeat / replication period
    pub heartbeat_interval: u64,
    /// How long a single RPC may take before it counts as "no"
    pub rpc_timeout: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            rpc_timeout: 100,
        }
    }
}

impl RaftConfig {
    /// Parse a (possibly partial) json config; missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| RaftError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.election_timeout_min == 0 {
            return Err(RaftError::InvalidConfig(
                "election_timeout_min must be positive".to_string(),
            ));
        }
        if self.election_timeout_min > self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election_timeout_min ({}) exceeds election_timeout_max ({})",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval == 0
            || self.heartbeat_interval.saturating_mul(3) > self.election_timeout_min
        {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat_interval ({}) must be at most a third of election_timeout_min ({})",
                self.heartbeat_interval, self.election_timeout_min
            )));
        }
        if self.rpc_timeout == 0 {
            return Err(RaftError::InvalidConfig(
                "rpc_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn rpc_deadline(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout)
    }
}
