//! WebSocket request/reply connections for the reliable client.

use crate::connection::{Frame, decode_frame, encode_frame, log_read_error};
use async_trait::async_trait;
use bstar_core::{Connector, Message, ReplyConnection, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WsConnection`]s to `ws://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, endpoint: &str) -> Result<WsConnection, TransportError> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", endpoint, e)))?;
        let (write, read) = ws_stream.split();
        debug!("Connected to {}", endpoint);

        Ok(WsConnection {
            endpoint: endpoint.to_string(),
            write,
            read,
        })
    }
}

/// One WebSocket connection to a router frontend.
pub struct WsConnection {
    endpoint: String,
    write: SplitSink<WsStream, WsMessage>,
    read: SplitStream<WsStream>,
}

#[async_trait]
impl ReplyConnection for WsConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = encode_frame(message)?;
        self.write
            .send(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Cancel safe: a frame is only consumed once it is returned.
    async fn recv(&mut self) -> Result<Message, TransportError> {
        loop {
            match self.read.next().await {
                Some(Ok(frame)) => match decode_frame(&self.endpoint, frame) {
                    Frame::Data(message) => return Ok(message),
                    Frame::Skip => continue,
                    Frame::Close => return Err(TransportError::Closed),
                },
                Some(Err(e)) => {
                    log_read_error(&self.endpoint, &e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .send(WsMessage::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing listens on port 1
        let result = WsConnector.connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let result = WsConnector.connect("not a url").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
