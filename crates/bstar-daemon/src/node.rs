//! A Binary Star peer wired to WebSocket sockets.
//!
//! A node owns three socket tasks and the [`BStar`] reactor that uses them:
//! - state publisher on the local endpoint
//! - subscriber to the other peer's publisher
//! - client-facing router on the frontend endpoint

use crate::config::PeerEndpoints;
use crate::outgoing::{ReconnectConfig, StateSubscriber};
use crate::publisher::spawn_publisher;
use crate::router::spawn_router;
use crate::server::WebSocketServer;
use anyhow::Result;
use bstar_core::{
    BStar, ChannelOutbox, FailoverConfig, FailoverError, FrontendGate, Message, Outbox, PeerState,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct PeerNode {
    bstar: BStar,
    /// Outbox for replies to routed client requests
    replies: ChannelOutbox,
    local_addr: SocketAddr,
    frontend_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerNode {
    /// Bind the publisher and frontend and start subscribing to the peer.
    pub async fn bind(
        role: PeerState,
        endpoints: &PeerEndpoints,
        config: &FailoverConfig,
    ) -> Result<Self> {
        let state_listener = WebSocketServer::bind(&endpoints.local).await?;
        let frontend_listener = WebSocketServer::bind(&endpoints.frontend).await?;
        Self::from_listeners(
            role,
            state_listener,
            &endpoints.remote,
            frontend_listener,
            config,
            ReconnectConfig::default(),
        )
    }

    /// Build a node on already-bound listeners.
    pub fn from_listeners(
        role: PeerState,
        state_listener: TcpListener,
        remote: &str,
        frontend_listener: TcpListener,
        config: &FailoverConfig,
        reconnect: ReconnectConfig,
    ) -> Result<Self> {
        let local_addr = state_listener.local_addr()?;
        let frontend_addr = frontend_listener.local_addr()?;

        let (publisher, publisher_task) = spawn_publisher(state_listener);
        let (subscriber, subscriber_task) = StateSubscriber::spawn(remote, reconnect);
        let (requests, replies, router_task) = spawn_router(frontend_listener);

        let mut bstar = BStar::new(role, publisher, subscriber, config)?;
        bstar.set_frontend(FrontendGate::new(requests));

        Ok(Self {
            bstar,
            replies,
            local_addr,
            frontend_addr,
            tasks: vec![publisher_task, subscriber_task, router_task],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn frontend_addr(&self) -> SocketAddr {
        self.frontend_addr
    }

    pub fn state(&self) -> PeerState {
        self.bstar.state()
    }

    pub fn bstar_mut(&mut self) -> &mut BStar {
        &mut self.bstar
    }

    /// Outbox for replies. Frame 0 of a reply must be the request's frame 0.
    pub fn replies(&self) -> ChannelOutbox {
        self.replies.clone()
    }

    /// Register the handler for admitted client requests.
    ///
    /// Requests arrive with the client's connection ID as frame 0.
    pub fn on_request(&mut self, handler: impl FnMut(Message) + Send + 'static) {
        if let Some(gate) = self.bstar.frontend_mut() {
            gate.on_request(handler);
        }
    }

    /// Answer every admitted request with the request itself.
    pub fn echo_requests(&mut self) {
        let replies = self.replies();
        self.on_request(move |request| {
            debug!(%request, "echoing request");
            if let Err(e) = replies.send(request) {
                warn!("Failed to queue reply: {}", e);
            }
        });
    }

    /// Run the peer until `shutdown` resolves or a fatal error occurs.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), FailoverError> {
        self.bstar.run(shutdown).await
    }
}

impl Drop for PeerNode {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
