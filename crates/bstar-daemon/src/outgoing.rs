//! Outgoing subscription to the other peer's state publisher.
//!
//! Manages the connection we initiate to the remote publisher, including:
//! - Connection establishment
//! - Automatic reconnection with exponential backoff
//! - Forwarding decoded announcements to the local state inbox

use crate::connection::{Frame, decode_frame, log_read_error};
use anyhow::Result;
use bstar_core::{ChannelInbox, ChannelOutbox, Outbox, channel};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum number of attempts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        // Stay well under the 2-heartbeat liveness window once the peer is back
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

/// Calculates the next reconnection delay using exponential backoff.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let delay_secs = config.initial_delay.as_secs_f64()
        * config.backoff_factor.powi(attempt.saturating_sub(1) as i32);

    Duration::from_secs_f64(delay_secs.min(config.max_delay.as_secs_f64()))
}

/// Reconnection bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    /// Consecutive failed or dropped connections
    pub attempts: u32,
    /// Current backoff delay
    pub current_delay: Duration,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an attempt and return how long to wait before the next one.
    pub fn schedule_reconnect(&mut self, config: &ReconnectConfig) -> Duration {
        self.attempts += 1;
        self.current_delay = calculate_backoff(self.attempts, config);
        self.current_delay
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = Duration::ZERO;
    }

    pub fn exceeded_max_attempts(&self, config: &ReconnectConfig) -> bool {
        config
            .max_attempts
            .map(|max| self.attempts >= max)
            .unwrap_or(false)
    }
}

/// Subscription to a remote state publisher.
pub struct StateSubscriber {
    /// Remote publisher URL (e.g., "ws://127.0.0.1:5004")
    endpoint: String,
    reconnect: ReconnectState,
    config: ReconnectConfig,
    /// Where decoded announcements go
    tx: ChannelOutbox,
}

impl StateSubscriber {
    pub fn new(endpoint: String, config: ReconnectConfig, tx: ChannelOutbox) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectState::new(),
            config,
            tx,
        }
    }

    /// Spawn a subscription task for `endpoint`.
    ///
    /// Returns the inbox announcements arrive on. The task runs until the
    /// inbox is dropped or `max_attempts` is exhausted.
    pub fn spawn(endpoint: impl Into<String>, config: ReconnectConfig) -> (ChannelInbox, JoinHandle<()>) {
        let (tx, rx) = channel();
        let subscriber = Self::new(endpoint.into(), config, tx);
        let task = tokio::spawn(subscriber.run());
        (rx, task)
    }

    /// Connect, forward, and reconnect until the receiving side goes away.
    pub async fn run(mut self) {
        loop {
            match self.connect_and_forward().await {
                Ok(Forwarding::InboxDropped) => {
                    debug!("State inbox dropped, stopping subscriber for {}", self.endpoint);
                    return;
                }
                Ok(Forwarding::Disconnected) => {
                    info!("Disconnected from peer publisher {}", self.endpoint);
                }
                Err(e) => {
                    debug!("Failed to connect to peer publisher {}: {}", self.endpoint, e);
                }
            }

            if self.reconnect.exceeded_max_attempts(&self.config) {
                warn!(
                    "Giving up on peer publisher {} after {} attempts",
                    self.endpoint, self.reconnect.attempts
                );
                return;
            }

            let delay = self.reconnect.schedule_reconnect(&self.config);
            debug!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.endpoint, delay, self.reconnect.attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_forward(&mut self) -> Result<Forwarding> {
        let (ws_stream, _) = connect_async(&self.endpoint).await?;
        let (_write, mut read) = ws_stream.split();

        info!("Subscribed to peer publisher {}", self.endpoint);
        self.reconnect.reset();

        loop {
            match read.next().await {
                Some(Ok(frame)) => match decode_frame(&self.endpoint, frame) {
                    Frame::Data(message) => {
                        if self.tx.send(message).is_err() {
                            return Ok(Forwarding::InboxDropped);
                        }
                    }
                    Frame::Skip => continue,
                    Frame::Close => return Ok(Forwarding::Disconnected),
                },
                Some(Err(e)) => {
                    log_read_error(&self.endpoint, &e);
                    return Ok(Forwarding::Disconnected);
                }
                None => return Ok(Forwarding::Disconnected),
            }
        }
    }
}

enum Forwarding {
    Disconnected,
    InboxDropped,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Backoff calculation ====================

    #[test]
    fn test_calculate_backoff_default() {
        let config = ReconnectConfig::default();

        // 100ms, 200ms, 400ms, 500ms (capped)
        assert_eq!(calculate_backoff(1, &config), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &config), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, &config), Duration::from_millis(400));
        assert_eq!(calculate_backoff(4, &config), Duration::from_millis(500));
        assert_eq!(calculate_backoff(10, &config), Duration::from_millis(500));
    }

    #[test]
    fn test_calculate_backoff_custom_config() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 3.0,
            max_attempts: None,
        };

        // 1s, 3s, 9s, 10s (capped)
        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(3));
        assert_eq!(calculate_backoff(3, &config), Duration::from_secs(9));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(10));
    }

    // ==================== ReconnectState ====================

    #[test]
    fn test_schedule_reconnect_increments() {
        let mut state = ReconnectState::new();
        let config = ReconnectConfig::default();

        assert_eq!(state.schedule_reconnect(&config), Duration::from_millis(100));
        assert_eq!(state.schedule_reconnect(&config), Duration::from_millis(200));
        assert_eq!(state.attempts, 2);

        state.reset();
        assert_eq!(state.attempts, 0);
        assert_eq!(state.current_delay, Duration::ZERO);
    }

    #[test]
    fn test_exceeded_max_attempts() {
        let state = ReconnectState {
            attempts: 5,
            current_delay: Duration::from_millis(500),
        };

        assert!(!state.exceeded_max_attempts(&ReconnectConfig::default()));

        let limited = ReconnectConfig {
            max_attempts: Some(5),
            ..Default::default()
        };
        assert!(state.exceeded_max_attempts(&limited));
    }

    // ==================== Subscriber ====================

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Nothing listens on port 1
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_attempts: Some(2),
        };
        let (tx, _rx) = channel();
        let subscriber = StateSubscriber::new("ws://127.0.0.1:1".into(), config, tx);

        tokio::time::timeout(Duration::from_secs(5), subscriber.run())
            .await
            .expect("subscriber should give up");
    }

    #[test]
    fn test_new_subscriber() {
        let (tx, _rx) = channel();
        let subscriber =
            StateSubscriber::new("ws://127.0.0.1:5004".into(), ReconnectConfig::default(), tx);

        assert_eq!(subscriber.endpoint, "ws://127.0.0.1:5004");
        assert_eq!(subscriber.reconnect.attempts, 0);
    }
}
