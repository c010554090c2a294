//! Socket abstractions the failover core and the reliable client run on.
//!
//! The core never touches sockets directly. It needs:
//! - [`Inbox`]: wait for readability, then drain pending messages without blocking
//! - [`Outbox`]: queue a message for sending without blocking
//! - [`Connector`] / [`ReplyConnection`]: open, use and close request/reply connections
//!
//! Implementations:
//! - In-process: [`channel`] (tokio mpsc), used by tests and as the glue for
//!   socket tasks
//! - WebSocket: see the `bstar-daemon` crate

use crate::message::Message;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Malformed message: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Receiving side of a socket that can be watched for readability.
#[async_trait]
pub trait Inbox: Send {
    /// Wait until at least one message is pending.
    ///
    /// Must be cancel safe: it is raced against timers in a `select!` loop.
    async fn readable(&mut self) -> Result<()>;

    /// Take the next pending message without waiting.
    ///
    /// Returns `Ok(None)` once nothing is pending.
    fn try_recv(&mut self) -> Result<Option<Message>>;
}

/// Sending side of a socket. Sending never blocks the caller.
pub trait Outbox: Send {
    fn send(&self, message: Message) -> Result<()>;
}

/// A request/reply connection to one server endpoint.
#[async_trait]
pub trait ReplyConnection: Send {
    /// The endpoint this connection was opened to.
    fn endpoint(&self) -> &str;

    /// Send a request.
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Receive the next reply (waits until one is available).
    async fn recv(&mut self) -> Result<Message>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`ReplyConnection`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: ReplyConnection;

    async fn connect(&self, endpoint: &str) -> Result<Self::Connection>;
}

/// Create an in-process message channel.
pub fn channel() -> (ChannelOutbox, ChannelInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelOutbox::new(tx), ChannelInbox::new(rx))
}

/// [`Outbox`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelOutbox {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl Outbox for ChannelOutbox {
    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// [`Inbox`] backed by an unbounded tokio channel.
///
/// `readable()` parks the first message it sees so that the following
/// `try_recv()` drain starts with it.
#[derive(Debug)]
pub struct ChannelInbox {
    rx: mpsc::UnboundedReceiver<Message>,
    peeked: Option<Message>,
}

impl ChannelInbox {
    pub fn new(rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { rx, peeked: None }
    }
}

#[async_trait]
impl Inbox for ChannelInbox {
    async fn readable(&mut self) -> Result<()> {
        if self.peeked.is_some() {
            return Ok(());
        }
        match self.rx.recv().await {
            Some(message) => {
                self.peeked = Some(message);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn try_recv(&mut self) -> Result<Option<Message>> {
        if let Some(message) = self.peeked.take() {
            return Ok(Some(message));
        }
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            // A closed channel surfaces through the next readable()
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readable_then_drain_in_order() {
        let (outbox, mut inbox) = channel();
        outbox.send(Message::from_frames(["1"])).unwrap();
        outbox.send(Message::from_frames(["2"])).unwrap();

        inbox.readable().await.unwrap();

        assert_eq!(inbox.try_recv().unwrap(), Some(Message::from_frames(["1"])));
        assert_eq!(inbox.try_recv().unwrap(), Some(Message::from_frames(["2"])));
        assert_eq!(inbox.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_readable_is_idempotent_while_unread() {
        let (outbox, mut inbox) = channel();
        outbox.send(Message::from_frames(["only"])).unwrap();

        inbox.readable().await.unwrap();
        inbox.readable().await.unwrap();

        assert_eq!(inbox.try_recv().unwrap(), Some(Message::from_frames(["only"])));
        assert_eq!(inbox.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_readable_reports_closed() {
        let (outbox, mut inbox) = channel();
        drop(outbox);

        assert!(matches!(inbox.readable().await, Err(TransportError::Closed)));
        assert_eq!(inbox.try_recv().unwrap(), None);
    }

    #[test]
    fn test_send_to_dropped_inbox_fails() {
        let (outbox, inbox) = channel();
        drop(inbox);

        let err = outbox.send(Message::new()).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
