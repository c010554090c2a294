//! Command-line configuration for the peer and client binaries.

use bstar_core::{ClientConfig, FailoverConfig, PeerState};
use clap::{ArgGroup, Args, Parser};

/// Run one peer of a Binary Star pair.
#[derive(Parser, Debug)]
#[command(name = "bstar-peer")]
#[command(about = "Binary Star failover peer")]
#[command(group(ArgGroup::new("role").required(true).args(["primary", "backup"])))]
pub struct PeerArgs {
    /// Start as the primary peer
    #[arg(short, long)]
    pub primary: bool,

    /// Start as the backup peer
    #[arg(short, long)]
    pub backup: bool,

    /// Address to publish our state on (default: 0.0.0.0:5003 primary, 0.0.0.0:5004 backup)
    #[arg(long, env = "BSTAR_LOCAL")]
    pub local: Option<String>,

    /// Peer state publisher to subscribe to (default: ws://127.0.0.1:5004 primary, ws://127.0.0.1:5003 backup)
    #[arg(long, env = "BSTAR_REMOTE")]
    pub remote: Option<String>,

    /// Address to serve clients on (default: 0.0.0.0:5001 primary, 0.0.0.0:5002 backup)
    #[arg(long, env = "BSTAR_FRONTEND")]
    pub frontend: Option<String>,

    /// Heartbeat interval in milliseconds
    #[arg(
        long,
        default_value_t = 1000,
        env = "BSTAR_HEARTBEAT_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub heartbeat_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

impl PeerArgs {
    pub fn role(&self) -> PeerState {
        if self.backup {
            PeerState::Backup
        } else {
            PeerState::Primary
        }
    }

    /// Role defaults with any explicit overrides applied.
    pub fn endpoints(&self) -> PeerEndpoints {
        let defaults = PeerEndpoints::defaults_for(self.role());
        PeerEndpoints {
            local: self.local.clone().unwrap_or(defaults.local),
            remote: self.remote.clone().unwrap_or(defaults.remote),
            frontend: self.frontend.clone().unwrap_or(defaults.frontend),
        }
    }

    pub fn failover_config(&self) -> FailoverConfig {
        FailoverConfig {
            heartbeat_ms: self.heartbeat_ms,
        }
    }
}

/// Where a peer listens and what it subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoints {
    /// Bind address of our state publisher
    pub local: String,
    /// URL of the other peer's state publisher
    pub remote: String,
    /// Bind address of the client frontend
    pub frontend: String,
}

impl PeerEndpoints {
    pub fn defaults_for(role: PeerState) -> Self {
        match role {
            PeerState::Backup => Self {
                local: "0.0.0.0:5004".into(),
                remote: "ws://127.0.0.1:5003".into(),
                frontend: "0.0.0.0:5002".into(),
            },
            _ => Self {
                local: "0.0.0.0:5003".into(),
                remote: "ws://127.0.0.1:5004".into(),
                frontend: "0.0.0.0:5001".into(),
            },
        }
    }
}

/// Send a counter to a Binary Star pair until it stops answering.
#[derive(Parser, Debug)]
#[command(name = "lazy-pirate")]
#[command(about = "Reliable request/reply client with failover")]
pub struct ClientArgs {
    /// Server endpoint, tried in order (repeat for failover)
    #[arg(
        short,
        long = "endpoint",
        default_values_t = [String::from("ws://127.0.0.1:5001"), String::from("ws://127.0.0.1:5002")]
    )]
    pub endpoints: Vec<String>,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Pause between successful requests in milliseconds
    #[arg(long, default_value_t = 1000, env = "LAZY_PIRATE_INTERVAL_MS")]
    pub interval_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Send attempts per request
    #[arg(long, default_value_t = 3, env = "LAZY_PIRATE_RETRIES")]
    pub retries: u32,

    /// Reply timeout per attempt in milliseconds
    #[arg(long, default_value_t = 1000, env = "LAZY_PIRATE_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Pause before reconnecting in milliseconds
    #[arg(long, default_value_t = 2000, env = "LAZY_PIRATE_SETTLE_DELAY_MS")]
    pub settle_delay_ms: u64,
}

impl From<RetryArgs> for ClientConfig {
    fn from(args: RetryArgs) -> Self {
        Self {
            retries: args.retries,
            timeout_ms: args.timeout_ms,
            settle_delay_ms: args.settle_delay_ms,
        }
    }
}
