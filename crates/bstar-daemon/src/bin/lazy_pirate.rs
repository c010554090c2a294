//! lazy-pirate: reliable request/reply client.
//!
//! Sends an increasing sequence number and expects it echoed back. When a
//! server stops answering the client rotates to the next endpoint; it exits
//! once every retry for a request has failed.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

use bstar_core::{ClientConfig, ClientError, Message, ReliableClient};
use bstar_daemon::logging::init_tracing;
use bstar_daemon::{ClientArgs, WsConnector};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientArgs::parse();
    init_tracing(args.verbose);

    let config = ClientConfig::from(args.retry);
    info!(
        "Connecting to {} (retries: {}, timeout: {:?}, settle delay: {:?})",
        args.endpoints.join(", "),
        config.retries,
        config.timeout(),
        config.settle_delay()
    );

    let mut client = ReliableClient::new(WsConnector, args.endpoints, config).await?;
    let interval = Duration::from_millis(args.interval_ms);

    for sequence in 1u64.. {
        let body = sequence.to_string();
        let request = Message::from_frames([body.as_str()]);

        let result = tokio::select! {
            result = client.send(&request, |reply| reply.frame_str(0) == Some(body.as_str())) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        match result {
            Ok(_) => info!("Server replied OK ({})", sequence),
            Err(ClientError::NoValidReply { attempts }) => {
                error!("Server seems to be offline after {} attempts, abandoning", attempts);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        tokio::time::sleep(interval).await;
    }

    Ok(())
}
