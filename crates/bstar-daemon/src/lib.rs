//! bstar-daemon library: WebSocket sockets for the Binary Star peer and the
//! Lazy Pirate client.
//!
//! The binaries are thin layers over these modules; integration tests use
//! them directly.

pub mod client;
pub mod config;
pub mod connection;
pub mod logging;
pub mod node;
pub mod outgoing;
pub mod publisher;
pub mod router;
pub mod server;

// Re-export key types for convenience
pub use client::{WsConnection, WsConnector};
pub use config::{ClientArgs, PeerArgs, PeerEndpoints};
pub use connection::{ConnectionEvent, IncomingMessage, MAX_MESSAGE_SIZE, PeerConnection};
pub use node::PeerNode;
pub use outgoing::{ReconnectConfig, StateSubscriber};
pub use server::WebSocketServer;
