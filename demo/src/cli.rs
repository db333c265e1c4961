use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a local Raft cluster, elect a leader and commit one command.
    Raft(RaftArgs),
    /// Run one Paxos round against local acceptors.
    Paxos(PaxosArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RaftArgs {
    /// Number of nodes in the cluster.
    #[arg(long, default_value_t = 5)]
    pub nodes: usize,

    /// JSON command to propose once a leader exists.
    #[arg(long, default_value = r#"{"type":"SET","key":"x","value":1}"#)]
    pub command: String,

    /// JSON file with timing overrides; missing fields keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for a leader and for the commit.
    #[arg(long, default_value_t = 5)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PaxosArgs {
    /// Number of acceptors.
    #[arg(long, default_value_t = 5)]
    pub acceptors: u64,

    /// Value to propose.
    #[arg(long, default_value = "value1")]
    pub value: String,

    /// Rounds to try before giving up.
    #[arg(long, default_value_t = 5)]
    pub attempts: usize,
}
