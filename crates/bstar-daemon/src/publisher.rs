//! State publisher socket.
//!
//! Accepts subscribers on the state endpoint and broadcasts every queued
//! announcement to all of them. Subscribers that connect late simply miss
//! earlier announcements; the next heartbeat catches them up.

use crate::connection::ConnectionEvent;
use crate::server::WebSocketServer;
use bstar_core::{ChannelOutbox, Message};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawn a publisher on `listener`.
///
/// Messages sent through the returned outbox are broadcast to every
/// connected subscriber. The task ends once the outbox is dropped.
pub fn spawn_publisher(listener: TcpListener) -> (ChannelOutbox, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_publisher(listener, rx));
    (ChannelOutbox::new(tx), task)
}

async fn run_publisher(listener: TcpListener, mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut server = WebSocketServer::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => server.accept_connection(stream, addr).await,
                    Err(e) => error!("Failed to accept subscriber: {}", e),
                }
            }

            Some(event) = server.poll_event() => {
                match event {
                    ConnectionEvent::Message(msg) => {
                        debug!("Ignoring message from subscriber {}", msg.conn_id);
                    }
                    ConnectionEvent::Closed { conn_id } => {
                        info!("Subscriber disconnected: {}", conn_id);
                    }
                }
            }

            message = rx.recv() => {
                match message {
                    Some(message) => server.broadcast(&message).await,
                    None => break,
                }
            }
        }
    }

    server.close_all().await;
    debug!("Publisher stopped");
}
