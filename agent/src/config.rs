//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cache::StoredState;
use crate::error::{AgentError, AgentResult};
use crate::sync::SyncIntervals;

#[derive(Parser, Debug)]
#[command(name = "navguard-agent")]
#[command(version, about = "Enforces navguard URL policy on this device", long_about = None)]
pub struct Cli {
    /// Where the server address, token and last-known patterns are kept
    #[arg(long, env = "NAVGUARD_STATE_FILE", default_value = "navguard-agent.json", global = true)]
    pub state_file: PathBuf,

    /// Server base URL; overrides the state file
    #[arg(long, env = "NAVGUARD_SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// Device bearer token; overrides the state file
    #[arg(long, env = "NAVGUARD_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync with the server and serve local policy decisions
    Run(RunArgs),
    /// Store --server-url and --token in the state file
    Configure,
    /// Evaluate a URL against the cached policy
    Check { url: String },
    /// File an access request for a URL
    Request {
        url: String,
        /// Pattern to request instead of the one derived from the host
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Report that the agent is being removed from this device
    Uninstall,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Address of the local decision endpoint and blocked page
    #[arg(long, env = "NAVGUARD_LISTEN", default_value = "127.0.0.1:7878")]
    pub listen: SocketAddr,

    /// Seconds between reconnect attempts while the live channel is down
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconnect_secs: u64,

    /// Seconds between pattern polls while the live channel is down
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_secs: u64,

    /// Seconds between heartbeats while the live channel is down
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_secs: u64,
}

impl RunArgs {
    pub fn intervals(&self) -> SyncIntervals {
        SyncIntervals {
            reconnect: Duration::from_secs(self.reconnect_secs),
            poll: Duration::from_secs(self.poll_secs),
            heartbeat: Duration::from_secs(self.heartbeat_secs),
        }
    }
}

impl Cli {
    /// Command line values win over the stored ones, field by field.
    pub fn credentials(&self, stored: &StoredState) -> AgentResult<(String, String)> {
        let server_url = self
            .server_url
            .clone()
            .or_else(|| stored.server_url.clone())
            .filter(|url| !url.trim().is_empty());
        let token = self
            .token
            .clone()
            .or_else(|| stored.token.clone())
            .filter(|token| !token.trim().is_empty());
        match (server_url, token) {
            (Some(server_url), Some(token)) => Ok((server_url, token)),
            _ => Err(AgentError::NotConfigured),
        }
    }
}
