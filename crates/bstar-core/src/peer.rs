//! Binary Star peer reactor.
//!
//! [`BStar`] wires the state machine to its sockets and drives it from one
//! task: a heartbeat timer publishes the local state, the state subscriber
//! feeds peer announcements in, and the optional frontend gate admits or
//! votes with client requests.
//!
//! Hosts that run their own polling loop can skip [`BStar::run`] and call
//! [`BStar::announce`], [`BStar::read_state`] and [`BStar::frontend_ready`]
//! directly.

use crate::fsm::{FailoverError, FailoverStateMachine};
use crate::gate::{FrontendGate, GateOutcome};
use crate::monitor::{StateAnnouncer, StateMonitor};
use crate::peer_state::PeerState;
use crate::transport::{Inbox, Outbox};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Configuration for a Binary Star peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Interval between state announcements (ms). The peer is considered
    /// dead after two intervals without traffic.
    pub heartbeat_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self { heartbeat_ms: 1000 }
    }
}

impl FailoverConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

pub struct BStar {
    fsm: FailoverStateMachine,
    announcer: StateAnnouncer,
    monitor: StateMonitor,
    gate: Option<FrontendGate>,
}

impl BStar {
    /// Create a peer in its starting role.
    ///
    /// `publisher` carries this peer's announcements, `subscriber` the other
    /// peer's.
    pub fn new(
        initial: PeerState,
        publisher: impl Outbox + 'static,
        subscriber: impl Inbox + 'static,
        config: &FailoverConfig,
    ) -> Result<Self, FailoverError> {
        let fsm = FailoverStateMachine::new(initial, config.heartbeat(), now())?;
        Ok(Self {
            fsm,
            announcer: StateAnnouncer::new(publisher),
            monitor: StateMonitor::new(subscriber),
            gate: None,
        })
    }

    /// Attach the client-facing frontend.
    pub fn set_frontend(&mut self, gate: FrontendGate) {
        self.gate = Some(gate);
    }

    pub fn frontend_mut(&mut self) -> Option<&mut FrontendGate> {
        self.gate.as_mut()
    }

    pub fn state(&self) -> PeerState {
        self.fsm.state()
    }

    pub fn fsm(&self) -> &FailoverStateMachine {
        &self.fsm
    }

    pub fn on_active(&mut self, callback: impl FnMut() + Send + 'static) {
        self.fsm.on_active(callback);
    }

    pub fn on_passive(&mut self, callback: impl FnMut() + Send + 'static) {
        self.fsm.on_passive(callback);
    }

    pub fn on_vote(&mut self, callback: impl FnMut() + Send + 'static) {
        self.fsm.on_vote(callback);
    }

    /// Publish the current state once.
    pub fn announce(&self) {
        self.announcer.announce(self.fsm.state());
    }

    /// Drain pending peer announcements into the state machine.
    pub fn read_state(&mut self, now: Instant) -> Result<usize, FailoverError> {
        self.monitor.drain(&mut self.fsm, now)
    }

    /// Process pending client requests. `None` without a frontend.
    pub fn frontend_ready(&mut self, now: Instant) -> Result<Option<GateOutcome>, FailoverError> {
        match self.gate.as_mut() {
            Some(gate) => gate.frontend_ready(&mut self.fsm, now).map(Some),
            None => Ok(None),
        }
    }

    /// Enter an external client vote.
    pub fn vote(&mut self, now: Instant) -> Result<(), FailoverError> {
        self.fsm.vote(now)
    }

    /// Run the reactor until `shutdown` resolves or a fatal error occurs.
    ///
    /// The first announcement goes out one heartbeat after start. On return
    /// the timer and readability watches are already gone; the sockets are
    /// released when the `BStar` is dropped.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), FailoverError> {
        let heartbeat = self.fsm.heartbeat();
        let start = time::Instant::now();
        self.fsm.peer_seen(start.into_std());

        let mut ticker = time::interval_at(start + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(state = %self.fsm.state(), ?heartbeat, "peer started");

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("shutdown requested");
                    break Ok(());
                }

                _ = ticker.tick() => {
                    self.announce();
                }

                ready = self.monitor.readable() => {
                    if let Err(e) = ready.and_then(|()| self.read_state(now())) {
                        break Err(e);
                    }
                }

                ready = frontend_readable(&mut self.gate) => {
                    if let Err(e) = ready.and_then(|()| self.frontend_ready(now())) {
                        break Err(e);
                    }
                }
            }
        };

        drop(ticker);

        match &result {
            Ok(()) => info!(state = %self.fsm.state(), "peer stopped"),
            Err(e) => error!(state = %self.fsm.state(), "peer aborted: {}", e),
        }
        result
    }
}

/// Current time on the tokio clock, so paused-clock tests stay consistent.
fn now() -> Instant {
    time::Instant::now().into_std()
}

async fn frontend_readable(gate: &mut Option<FrontendGate>) -> Result<(), FailoverError> {
    match gate {
        Some(gate) => gate.readable().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::peer_state::Announcement;
    use crate::transport::{ChannelInbox, ChannelOutbox, channel};
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    struct Harness {
        peer: BStar,
        /// What this peer publishes
        published: ChannelInbox,
        /// Feeds the other peer's announcements in
        peer_tx: ChannelOutbox,
        /// Feeds client requests in
        client_tx: ChannelOutbox,
        requests: Arc<Mutex<Vec<Message>>>,
    }

    fn harness(initial: PeerState) -> Harness {
        let (pub_tx, published) = channel();
        let (peer_tx, sub_rx) = channel();
        let (client_tx, front_rx) = channel();

        let mut peer = BStar::new(initial, pub_tx, sub_rx, &FailoverConfig::default()).unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        let mut gate = FrontendGate::new(front_rx);
        gate.on_request(move |msg| sink.lock().unwrap().push(msg));
        peer.set_frontend(gate);

        Harness {
            peer,
            published,
            peer_tx,
            client_tx,
            requests,
        }
    }

    fn drain(inbox: &mut ChannelInbox) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = inbox.try_recv().unwrap() {
            out.push(msg);
        }
        out
    }

    fn announce(tx: &ChannelOutbox, state: PeerState) {
        tx.send(Announcement::new(state).to_message()).unwrap();
    }

    #[test]
    fn test_default_config() {
        assert_eq!(FailoverConfig::default().heartbeat(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_invalid_initial_state() {
        let (tx, _) = channel();
        let (_, rx) = channel();
        let result = BStar::new(PeerState::Active, tx, rx, &FailoverConfig::default());
        assert!(matches!(result, Err(FailoverError::InvalidInitialState(PeerState::Active))));
    }

    #[test]
    fn test_rejects_zero_heartbeat() {
        let (tx, _) = channel();
        let (_, rx) = channel();
        let config = FailoverConfig { heartbeat_ms: 0 };
        let result = BStar::new(PeerState::Primary, tx, rx, &config);
        assert!(matches!(result, Err(FailoverError::InvalidHeartbeat)));
    }

    // ==================== Reactor ====================

    #[tokio::test(start_paused = true)]
    async fn test_announces_once_per_heartbeat() {
        let mut h = harness(PeerState::Primary);

        h.peer.run(sleep(Duration::from_millis(3500))).await.unwrap();

        let sent = drain(&mut h.published);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| *m == Message::from_frames(["BSTAR", "primary"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_announcement_reflects_transition() {
        let mut h = harness(PeerState::Backup);
        announce(&h.peer_tx, PeerState::Active);

        h.peer.run(sleep(Duration::from_millis(1500))).await.unwrap();

        assert_eq!(h.peer.state(), PeerState::Passive);
        assert_eq!(
            drain(&mut h.published),
            [Message::from_frames(["BSTAR", "passive"])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_takeover_on_client_request() {
        let mut h = harness(PeerState::Primary);
        let activations = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&activations);
        h.peer.on_active(move || *counter.lock().unwrap() += 1);

        let client_tx = h.client_tx.clone();
        let client = async move {
            sleep(Duration::from_millis(1500)).await;
            client_tx.send(Message::from_frames(["conn-1", "early"])).unwrap();
            sleep(Duration::from_millis(1000)).await;
            client_tx.send(Message::from_frames(["conn-1", "late"])).unwrap();
        };

        let (result, ()) = tokio::join!(h.peer.run(sleep(Duration::from_millis(3000))), client);
        result.unwrap();

        assert_eq!(h.peer.state(), PeerState::Active);
        assert_eq!(*activations.lock().unwrap(), 1);
        let requests = h.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].frame_str(1), Some("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_passive_peer_from_taking_over() {
        let mut h = harness(PeerState::Backup);
        let votes = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&votes);
        h.peer.on_vote(move || *counter.lock().unwrap() += 1);

        let peer_tx = h.peer_tx.clone();
        let client_tx = h.client_tx.clone();
        let other = async move {
            for _ in 0..5 {
                announce(&peer_tx, PeerState::Active);
                sleep(Duration::from_millis(1000)).await;
            }
            client_tx.send(Message::from_frames(["conn-1", "hi"])).unwrap();
        };

        let (result, ()) = tokio::join!(h.peer.run(sleep(Duration::from_millis(5500))), other);
        result.unwrap();

        assert_eq!(h.peer.state(), PeerState::Passive);
        assert_eq!(*votes.lock().unwrap(), 1);
        assert!(h.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_brain_aborts_run() {
        let mut h = harness(PeerState::Primary);
        announce(&h.peer_tx, PeerState::Backup);
        announce(&h.peer_tx, PeerState::Active);

        let result = h.peer.run(sleep(Duration::from_secs(10))).await;

        assert!(matches!(result, Err(FailoverError::SplitBrain)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_subscriber_aborts_run() {
        let mut h = harness(PeerState::Primary);
        drop(h.peer_tx);

        let result = h.peer.run(sleep(Duration::from_secs(10))).await;

        assert!(matches!(result, Err(FailoverError::Transport(_))));
    }

    // ==================== Polling host ====================

    #[test]
    fn test_manual_polling() {
        let (pub_tx, mut published) = channel();
        let (peer_tx, sub_rx) = channel();
        let mut peer =
            BStar::new(PeerState::Primary, pub_tx, sub_rx, &FailoverConfig::default()).unwrap();
        let t0 = Instant::now();

        assert_eq!(peer.frontend_ready(t0).unwrap(), None);

        announce(&peer_tx, PeerState::Backup);
        assert_eq!(peer.read_state(t0).unwrap(), 1);
        assert_eq!(peer.state(), PeerState::Active);

        peer.announce();
        assert_eq!(
            drain(&mut published),
            [Message::from_frames(["BSTAR", "active"])]
        );
    }

    #[test]
    fn test_vote_without_frontend() {
        let (pub_tx, _published) = channel();
        let (_peer_tx, sub_rx) = channel();
        let mut peer =
            BStar::new(PeerState::Backup, pub_tx, sub_rx, &FailoverConfig::default()).unwrap();

        peer.vote(Instant::now()).unwrap();
        assert_eq!(peer.state(), PeerState::Backup);
    }
}
