//! WebSocket server accepting publisher subscribers and frontend clients.
//!
//! Tracks accepted connections by connection ID and surfaces their traffic
//! through `poll_event()`.

use crate::connection::{ConnectionEvent, PeerConnection};
use anyhow::Result;
use bstar_core::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

/// WebSocket server managing accepted connections.
pub struct WebSocketServer {
    /// Open connections indexed by conn_id
    connections: HashMap<String, PeerConnection>,
    /// Counter for generating connection IDs
    next_conn_id: u64,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            connections: HashMap::new(),
            next_conn_id: 1,
            event_tx,
            event_rx,
        }
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("WebSocket server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Upgrade a new TCP connection to WebSocket and start reading from it.
    pub async fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                // Port probes connect and close without finishing the upgrade
                let err_str = e.to_string();
                if err_str.contains("Handshake not finished")
                    || err_str.contains("Connection reset")
                    || err_str.contains("unexpected EOF")
                {
                    debug!("Connection closed before upgrade from {}", addr);
                } else {
                    error!("WebSocket upgrade failed for {}: {}", addr, e);
                }
                return;
            }
        };

        let conn_id = format!("conn-{}", self.next_conn_id);
        self.next_conn_id += 1;

        info!("New connection from {} (conn_id: {})", addr, conn_id);

        let conn = PeerConnection::new(conn_id.clone(), ws_stream, self.event_tx.clone());
        self.connections.insert(conn_id, conn);
    }

    /// Wait for the next connection event.
    ///
    /// Closed connections are removed before their `Closed` event is returned.
    pub async fn poll_event(&mut self) -> Option<ConnectionEvent> {
        let event = self.event_rx.recv().await?;

        if let ConnectionEvent::Closed { conn_id } = &event {
            if self.connections.remove(conn_id).is_some() {
                debug!("Connection {} removed", conn_id);
            }
        }

        Some(event)
    }

    /// Send a message to one connection.
    pub async fn send(&self, conn_id: &str, message: &Message) -> Result<()> {
        let conn = self
            .connections
            .get(conn_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown connection: {}", conn_id))?;

        conn.send(message).await
    }

    /// Send a message to every open connection.
    pub async fn broadcast(&self, message: &Message) {
        for (conn_id, conn) in &self.connections {
            if let Err(e) = conn.send(message).await {
                warn!("Failed to broadcast to {}: {}", conn_id, e);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close every open connection.
    pub async fn close_all(&mut self) {
        for (_, mut conn) in self.connections.drain() {
            conn.close().await;
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}
