//! bstar-core: Binary Star failover for a primary/backup server pair, plus a
//! reliable request/reply client that retries across both servers.
//!
//! This crate provides:
//! - The failover state machine and its peer liveness rule
//! - The state announcement format exchanged between peers
//! - A single-task reactor ([`BStar`]) driving the state machine from sockets
//! - A Lazy Pirate client ([`ReliableClient`]) with endpoint rotation
//! - Transport traits so the core runs on any message socket implementation

pub mod client;
pub mod fsm;
pub mod gate;
pub mod liveness;
pub mod message;
pub mod monitor;
pub mod peer;
pub mod peer_state;
pub mod rotator;
pub mod transport;

pub use client::{ClientConfig, ClientError, ReliableClient};
pub use fsm::{Callback, FailoverError, FailoverStateMachine};
pub use gate::{FrontendGate, GateOutcome, RequestHandler};
pub use liveness::PeerLiveness;
pub use message::Message;
pub use monitor::{StateAnnouncer, StateMonitor};
pub use peer::{BStar, FailoverConfig};
pub use peer_state::{Announcement, AnnouncementError, Event, PeerState, PeerStateError, STATE_MARKER};
pub use rotator::EndpointRotator;
pub use transport::{
    ChannelInbox, ChannelOutbox, Connector, Inbox, Outbox, ReplyConnection, TransportError, channel,
};
