//! bstar-peer: one peer of a Binary Star failover pair.
//!
//! Start one instance with `--primary` and one with `--backup`. The active
//! peer echoes client requests back on its frontend.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use bstar_core::PeerState;
use bstar_daemon::logging::init_tracing;
use bstar_daemon::{PeerArgs, PeerNode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = PeerArgs::parse();
    init_tracing(args.verbose);

    let role = args.role();
    let endpoints = args.endpoints();

    match role {
        PeerState::Backup => info!("Backup, waiting for primary"),
        _ => info!("Primary, waiting for backup"),
    }
    info!("State publisher: {}", endpoints.local);
    info!("Peer publisher: {}", endpoints.remote);
    info!("Client frontend: {}", endpoints.frontend);

    let mut node = PeerNode::bind(role, &endpoints, &args.failover_config()).await?;

    let bstar = node.bstar_mut();
    bstar.on_active(|| info!("Now serving clients (active)"));
    bstar.on_passive(|| info!("Standing by (passive)"));
    bstar.on_vote(|| info!("Client request while not active, counted as a vote"));
    node.echo_requests();

    info!("Peer running. Press Ctrl+C to stop.");

    node.run(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
