use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use paxos::{AcceptorHandle, LocalAcceptor, Proposer};
use raft_cluster::LocalCluster;
use raft_core::{Command as RaftCommand, RaftConfig};

mod cli;

use cli::{Cli, Command, PaxosArgs, RaftArgs};

const COMMIT_POLL: Duration = Duration::from_millis(10);

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn load_config(args: &RaftArgs) -> Result<RaftConfig> {
    let Some(path) = &args.config else {
        return Ok(RaftConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    RaftConfig::from_json(&raw).with_context(|| format!("loading {}", path.display()))
}

async fn run_raft(args: RaftArgs) -> Result<()> {
    let command: RaftCommand =
        serde_json::from_str(&args.command).context("--command is not valid JSON")?;
    let config = load_config(&args).await?;
    let timeout = Duration::from_secs(args.timeout_secs);

    let cluster = LocalCluster::start(args.nodes, config).await?;
    let leader = cluster.wait_for_leader(timeout).await?;
    info!(leader = leader.id, term = leader.term, "leader elected");

    let handle = cluster.node(leader.id)?;
    let entry = handle.propose(command).await?;
    info!(index = entry.index, term = entry.term, command = %entry.command, "entry proposed");

    let committed = tokio::time::timeout(timeout, async {
        loop {
            match handle.status().await {
                Ok(status) if status.commit_index >= Some(entry.index) => return Ok(status),
                Ok(_) => tokio::time::sleep(COMMIT_POLL).await,
                Err(err) => return Err(err),
            }
        }
    })
    .await;
    let status = match committed {
        Ok(status) => status?,
        Err(_) => bail!("entry {} not committed within {:?}", entry.index, timeout),
    };
    info!(index = entry.index, commit_index = ?status.commit_index, "entry committed");

    for status in cluster.statuses().await {
        println!("{}", serde_json::to_string(&status)?);
    }
    cluster.shutdown().await;
    Ok(())
}

async fn run_paxos(args: PaxosArgs) -> Result<()> {
    let acceptors: Vec<Arc<dyn AcceptorHandle<String>>> = (0..args.acceptors)
        .map(|id| Arc::new(LocalAcceptor::<String>::new(id)) as Arc<dyn AcceptorHandle<String>>)
        .collect();
    let mut proposer = Proposer::new(1, acceptors);

    let chosen = proposer.propose_with_retry(args.value, args.attempts).await?;
    println!("chosen {:?} with ballot {}", chosen.value, chosen.ballot);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Raft(args) => run_raft(args).await?,
        Command::Paxos(args) => run_paxos(args).await?,
    }

    Ok(())
}
