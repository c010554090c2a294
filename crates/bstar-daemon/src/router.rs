//! Client-facing router socket.
//!
//! Every request is delivered with the client's connection ID prepended as
//! frame 0. A reply must carry the same ID in frame 0; the router strips it
//! and sends the remaining frames back to that client.

use crate::connection::ConnectionEvent;
use crate::server::WebSocketServer;
use bstar_core::{ChannelInbox, ChannelOutbox, Message, Outbox, channel};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawn a router on `listener`.
///
/// Returns the inbox of routed requests, the outbox for replies and the
/// task handle. The task ends once both the request inbox and the reply
/// outbox are dropped.
pub fn spawn_router(listener: TcpListener) -> (ChannelInbox, ChannelOutbox, JoinHandle<()>) {
    let (requests_tx, requests_rx) = channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_router(listener, requests_tx, reply_rx));
    (requests_rx, ChannelOutbox::new(reply_tx), task)
}

async fn run_router(
    listener: TcpListener,
    requests: ChannelOutbox,
    mut replies: mpsc::UnboundedReceiver<Message>,
) {
    let mut server = WebSocketServer::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => server.accept_connection(stream, addr).await,
                    Err(e) => error!("Failed to accept client: {}", e),
                }
            }

            Some(event) = server.poll_event() => {
                match event {
                    ConnectionEvent::Message(incoming) => {
                        let mut request = incoming.message;
                        request.push_front(incoming.conn_id);
                        if requests.send(request).is_err() {
                            debug!("Request inbox dropped");
                            break;
                        }
                    }
                    ConnectionEvent::Closed { conn_id } => {
                        info!("Client disconnected: {}", conn_id);
                    }
                }
            }

            reply = replies.recv() => {
                match reply {
                    Some(reply) => route_reply(&server, reply).await,
                    None => break,
                }
            }
        }
    }

    server.close_all().await;
    debug!("Router stopped");
}

async fn route_reply(server: &WebSocketServer, mut reply: Message) {
    let Some(identity) = reply.pop_front() else {
        warn!("Dropping reply without a routing frame");
        return;
    };
    let conn_id = String::from_utf8_lossy(&identity);

    if let Err(e) = server.send(&conn_id, &reply).await {
        // The client may have given up and reconnected elsewhere
        warn!("Failed to route reply to {}: {}", conn_id, e);
    }
}
