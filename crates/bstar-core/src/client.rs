//! Reliable request/reply client (Lazy Pirate).
//!
//! Sends a request and waits a bounded time for a reply the caller accepts.
//! On timeout the connection is dropped, the client pauses for the settle
//! delay and reconnects to the next endpoint in rotation, then resends.
//! With two Binary Star frontends as endpoints, a retry lands on the peer
//! that has taken over.

use crate::message::Message;
use crate::rotator::EndpointRotator;
use crate::transport::{Connector, ReplyConnection, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No valid reply after {attempts} attempts")]
    NoValidReply { attempts: u32 },

    #[error("No server endpoints configured")]
    NoEndpoints,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Retry configuration for [`ReliableClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Send attempts per request
    pub retries: u32,
    /// How long to wait for each reply (ms)
    pub timeout_ms: u64,
    /// Pause between closing a connection and opening the next one (ms)
    pub settle_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_ms: 1000,
            settle_delay_ms: 2000,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

pub struct ReliableClient<C: Connector> {
    connector: C,
    rotator: EndpointRotator,
    connection: Option<C::Connection>,
    config: ClientConfig,
}

impl<C: Connector> ReliableClient<C> {
    /// Create a client and connect to the first endpoint.
    ///
    /// A failed first connect is not an error: the first `send` fails its
    /// attempt and moves on to the next endpoint.
    pub async fn new<I, S>(connector: C, endpoints: I, config: ClientConfig) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rotator = EndpointRotator::new(endpoints)?;
        let mut client = Self {
            connector,
            rotator,
            connection: None,
            config,
        };
        client.connect_next().await;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Endpoint of the open connection, if any.
    pub fn current_endpoint(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.endpoint())
    }

    /// Send `request` until a reply passes `is_valid`, or give up.
    ///
    /// Invalid replies are skipped without resending; each wait for the
    /// next reply gets the full timeout again.
    pub async fn send<F>(&mut self, request: &Message, mut is_valid: F) -> Result<Message, ClientError>
    where
        F: FnMut(&Message) -> bool,
    {
        let retries = self.config.retries;

        for attempt in 1..=retries {
            debug!(attempt, %request, "sending request");

            if let Err(e) = self.send_request(request).await {
                warn!(attempt, "send failed: {}", e);
                self.reconnect().await;
                continue;
            }

            if let Some(reply) = self.await_valid_reply(&mut is_valid).await {
                return Ok(reply);
            }

            warn!(attempt, "no response from server, retrying");
            self.reconnect().await;
        }

        error!("server seems to be offline, abandoning");
        Err(ClientError::NoValidReply { attempts: retries })
    }

    async fn send_request(&mut self, request: &Message) -> Result<(), TransportError> {
        let connection = self.connection.as_mut().ok_or(TransportError::Closed)?;
        connection.send(request).await
    }

    /// Wait for a valid reply. `None` means time to reconnect.
    async fn await_valid_reply<F>(&mut self, is_valid: &mut F) -> Option<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        let timeout = self.config.timeout();
        let connection = self.connection.as_mut()?;

        loop {
            match tokio::time::timeout(timeout, connection.recv()).await {
                Ok(Ok(reply)) => {
                    if is_valid(&reply) {
                        debug!(%reply, "server replied OK");
                        return Some(reply);
                    }
                    warn!(%reply, "malformed reply from server");
                }
                Ok(Err(e)) => {
                    warn!("receive failed: {}", e);
                    return None;
                }
                Err(_) => return None,
            }
        }
    }

    /// Close the current connection, settle, then open the next endpoint.
    async fn reconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!(endpoint = %connection.endpoint(), "closing connection");
            if let Err(e) = connection.close().await {
                debug!("error closing connection: {}", e);
            }
        }

        tokio::time::sleep(self.config.settle_delay()).await;
        self.connect_next().await;
    }

    async fn connect_next(&mut self) {
        let endpoint = self.rotator.next_endpoint().to_string();
        info!(%endpoint, "connecting to server");

        match self.connector.connect(&endpoint).await {
            Ok(connection) => self.connection = Some(connection),
            Err(e) => {
                warn!(%endpoint, "connect failed: {}", e);
                self.connection = None;
            }
        }
    }
}
