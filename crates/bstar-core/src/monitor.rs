//! State channel between the two peers.
//!
//! [`StateAnnouncer`] publishes this peer's state once per heartbeat.
//! [`StateMonitor`] drains the other peer's announcements into the state machine.

use crate::fsm::{FailoverError, FailoverStateMachine};
use crate::message::Message;
use crate::peer_state::{Announcement, Event, PeerState};
use crate::transport::{Inbox, Outbox};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Publishes this peer's state.
pub struct StateAnnouncer {
    publisher: Box<dyn Outbox>,
}

impl StateAnnouncer {
    pub fn new(publisher: impl Outbox + 'static) -> Self {
        Self {
            publisher: Box::new(publisher),
        }
    }

    /// Send `["BSTAR", state]`.
    ///
    /// A failed send is logged and dropped; the peer notices through the
    /// missing heartbeats.
    pub fn announce(&self, state: PeerState) {
        trace!(%state, "announcing state");
        if let Err(e) = self.publisher.send(Announcement::new(state).to_message()) {
            warn!(%state, "failed to publish state: {}", e);
        }
    }
}

/// Reads the other peer's announcements.
pub struct StateMonitor {
    subscriber: Box<dyn Inbox>,
}

impl StateMonitor {
    pub fn new(subscriber: impl Inbox + 'static) -> Self {
        Self {
            subscriber: Box::new(subscriber),
        }
    }

    /// Wait until announcements are pending. Cancel safe.
    pub async fn readable(&mut self) -> Result<(), FailoverError> {
        Ok(self.subscriber.readable().await?)
    }

    /// Feed every pending announcement to `fsm`.
    ///
    /// Any message on the state channel refreshes peer liveness, even one that
    /// fails to decode. Malformed announcements are logged and skipped.
    /// Returns the number of announcements applied.
    pub fn drain(
        &mut self,
        fsm: &mut FailoverStateMachine,
        now: Instant,
    ) -> Result<usize, FailoverError> {
        let mut applied = 0;
        while let Some(message) = self.subscriber.try_recv()? {
            fsm.peer_seen(now);
            if self.apply(fsm, &message, now)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn apply(
        &self,
        fsm: &mut FailoverStateMachine,
        message: &Message,
        now: Instant,
    ) -> Result<bool, FailoverError> {
        match Announcement::from_message(message) {
            Ok(announcement) => {
                debug!(peer_state = %announcement.state, "peer announced state");
                fsm.handle(Event::from(announcement.state), now)?;
                Ok(true)
            }
            Err(e) => {
                warn!(%message, "ignoring malformed state announcement: {}", e);
                Ok(false)
            }
        }
    }
}
