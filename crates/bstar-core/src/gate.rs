//! Client-facing frontend.
//!
//! Client requests pass through the failover state machine before they reach
//! the application. A request that this peer may not serve counts as a vote
//! and is discarded; the client's retry (possibly to the other peer) recovers.

use crate::fsm::{FailoverError, FailoverStateMachine};
use crate::message::Message;
use crate::peer_state::Event;
use crate::transport::Inbox;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Application handler for admitted client requests.
pub type RequestHandler = Box<dyn FnMut(Message) + Send>;

/// What happened to a batch of pending client requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// This peer is active; the requests went to the handler.
    Dispatched(usize),
    /// This peer may not serve; the requests were discarded as a vote.
    Voted(usize),
}

pub struct FrontendGate {
    frontend: Box<dyn Inbox>,
    on_request: Option<RequestHandler>,
}

impl FrontendGate {
    pub fn new(frontend: impl Inbox + 'static) -> Self {
        Self {
            frontend: Box::new(frontend),
            on_request: None,
        }
    }

    /// Register the handler that receives admitted requests.
    pub fn on_request(&mut self, handler: impl FnMut(Message) + Send + 'static) {
        self.on_request = Some(Box::new(handler));
    }

    /// Wait until client requests are pending. Cancel safe.
    pub async fn readable(&mut self) -> Result<(), FailoverError> {
        Ok(self.frontend.readable().await?)
    }

    /// Run pending client traffic through `fsm`.
    ///
    /// If the state machine accepts a client request the pending messages are
    /// handed to the request handler. On `NotActive` the vote callback fires
    /// and the pending messages are dropped. Fatal errors propagate.
    pub fn frontend_ready(
        &mut self,
        fsm: &mut FailoverStateMachine,
        now: Instant,
    ) -> Result<GateOutcome, FailoverError> {
        match fsm.handle(Event::ClientRequest, now) {
            Ok(()) => {
                let mut dispatched = 0;
                while let Some(request) = self.frontend.try_recv()? {
                    debug!(%request, "dispatching client request");
                    match self.on_request.as_mut() {
                        Some(handler) => handler(request),
                        None => warn!(%request, "no request handler registered, discarding"),
                    }
                    dispatched += 1;
                }
                Ok(GateOutcome::Dispatched(dispatched))
            }
            Err(FailoverError::NotActive) => {
                info!("Got vote");
                fsm.vote_received();
                let mut discarded = 0;
                while self.frontend.try_recv()?.is_some() {
                    discarded += 1;
                }
                debug!(discarded, state = %fsm.state(), "discarded client requests");
                Ok(GateOutcome::Voted(discarded))
            }
            Err(e) => Err(e),
        }
    }
}
