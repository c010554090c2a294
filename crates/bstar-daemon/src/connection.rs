//! Accepted WebSocket connections and the message frame codec.
//!
//! Every [`Message`] travels as one binary WebSocket frame holding its
//! bincode encoding. Each accepted connection wraps a WebSocket stream split
//! into a shared write half and a spawned read task.

use anyhow::{Result, anyhow};
use bstar_core::{Message, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, warn};

/// Maximum encoded message size (1MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Message received on an accepted connection.
#[derive(Debug)]
pub struct IncomingMessage {
    /// Connection ID assigned by the server (e.g., "conn-1")
    pub conn_id: String,
    pub message: Message,
}

/// Event emitted by a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    Message(IncomingMessage),
    Closed { conn_id: String },
}

/// What a WebSocket frame carried.
#[derive(Debug)]
pub enum Frame {
    Data(Message),
    /// Control frame or undecodable payload
    Skip,
    Close,
}

/// Encode a message as a binary WebSocket frame.
pub fn encode_frame(message: &Message) -> Result<WsMessage, TransportError> {
    let data = message.encode()?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::SendFailed(format!(
            "message exceeds max size ({} > {})",
            data.len(),
            MAX_MESSAGE_SIZE
        )));
    }
    Ok(WsMessage::Binary(data))
}

/// Decode a WebSocket frame received from `source`.
///
/// Oversized or undecodable payloads are logged and skipped.
pub fn decode_frame(source: &str, frame: WsMessage) -> Frame {
    let data = match frame {
        WsMessage::Binary(data) => data,
        WsMessage::Text(text) => text.into_bytes(),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => return Frame::Skip,
        WsMessage::Close(_) => {
            debug!("Received close frame from {}", source);
            return Frame::Close;
        }
    };

    if data.len() > MAX_MESSAGE_SIZE {
        warn!(
            "Message from {} exceeds max size ({} > {}), dropping",
            source,
            data.len(),
            MAX_MESSAGE_SIZE
        );
        return Frame::Skip;
    }

    match Message::decode(&data) {
        Ok(message) => Frame::Data(message),
        Err(e) => {
            warn!("Dropping undecodable message from {}: {}", source, e);
            Frame::Skip
        }
    }
}

/// Log a WebSocket read error at the right level.
pub(crate) fn log_read_error(source: &str, e: &WsError) {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            debug!("Connection {} closed", source);
        }
        _ => {
            error!("WebSocket error on {}: {}", source, e);
        }
    }
}

type WsWrite = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// A single accepted WebSocket connection.
pub struct PeerConnection {
    pub conn_id: String,
    /// Write half of the WebSocket (wrapped for sharing across tasks)
    write: Arc<Mutex<WsWrite>>,
    read_task: Option<JoinHandle<()>>,
}

impl PeerConnection {
    /// Wrap an upgraded stream and spawn its read task, which forwards
    /// decoded messages to `event_tx`.
    pub fn new(
        conn_id: String,
        ws_stream: WebSocketStream<TcpStream>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (write, read) = ws_stream.split();
        let write = Arc::new(Mutex::new(write));

        let read_conn_id = conn_id.clone();
        let read_task = tokio::spawn(async move {
            Self::read_loop(read_conn_id, read, event_tx).await;
        });

        Self {
            conn_id,
            write,
            read_task: Some(read_task),
        }
    }

    async fn read_loop(
        conn_id: String,
        mut read: SplitStream<WebSocketStream<TcpStream>>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(frame)) => match decode_frame(&conn_id, frame) {
                    Frame::Data(message) => {
                        let _ = event_tx.send(ConnectionEvent::Message(IncomingMessage {
                            conn_id: conn_id.clone(),
                            message,
                        }));
                    }
                    Frame::Skip => continue,
                    Frame::Close => break,
                },
                Some(Err(e)) => {
                    log_read_error(&conn_id, &e);
                    break;
                }
                None => {
                    debug!("Connection {} stream ended", conn_id);
                    break;
                }
            }
        }

        let _ = event_tx.send(ConnectionEvent::Closed { conn_id });
    }

    /// Send a message to the remote end.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        let mut write = self.write.lock().await;
        write
            .send(frame)
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))
    }

    /// Close the connection gracefully.
    pub async fn close(&mut self) {
        let mut write = self.write.lock().await;
        if let Err(e) = write.send(WsMessage::Close(None)).await {
            debug!("error sending close frame: {}", e);
        }
        drop(write);

        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let msg = Message::from_frames(["BSTAR", "active"]);
        let frame = encode_frame(&msg).unwrap();

        match decode_frame("test", frame) {
            Frame::Data(decoded) => assert_eq!(decoded, msg),
            other => panic!("Expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let msg = Message::from_frames([vec![0u8; MAX_MESSAGE_SIZE + 1]]);
        assert!(matches!(encode_frame(&msg), Err(TransportError::SendFailed(_))));
    }

    #[test]
    fn test_decode_skips_control_and_garbage() {
        assert!(matches!(decode_frame("test", WsMessage::Ping(vec![])), Frame::Skip));
        assert!(matches!(decode_frame("test", WsMessage::Binary(vec![0xff; 3])), Frame::Skip));
        assert!(matches!(
            decode_frame("test", WsMessage::Binary(vec![0; MAX_MESSAGE_SIZE + 1])),
            Frame::Skip
        ));
    }

    #[test]
    fn test_decode_close() {
        assert!(matches!(decode_frame("test", WsMessage::Close(None)), Frame::Close));
    }
}
