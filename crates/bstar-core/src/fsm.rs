//! Binary Star failover state machine.
//!
//! Decides, for one peer of a PRIMARY/BACKUP pair, whether it is the peer
//! that serves clients. Inputs are the other peer's announced state and local
//! client requests; the only timing input is the peer liveness expiry.
//!
//! ```text
//!            PEER_BACKUP / expired CLIENT_REQUEST
//!  PRIMARY ───────────────────────────────────────> ACTIVE
//!     │                                               ▲
//!     │ PEER_ACTIVE                                   │ PEER_PRIMARY, PEER_BACKUP,
//!     ▼                                               │ expired CLIENT_REQUEST
//!  PASSIVE ───────────────────────────────────────────┘
//!     ▲
//!     │ PEER_ACTIVE
//!  BACKUP
//! ```
//!
//! `ACTIVE` + `PEER_ACTIVE` is split brain, `PASSIVE` + `PEER_PASSIVE` stalls
//! the cluster; both are fatal. Every other (state, event) pair is ignored,
//! including two peers that both start as PRIMARY.

use crate::liveness::PeerLiveness;
use crate::peer_state::{Event, PeerState};
use crate::transport::TransportError;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Role-change or vote notification.
pub type Callback = Box<dyn FnMut() + Send>;

#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("Invalid initial state: {0} (expected primary or backup)")]
    InvalidInitialState(PeerState),

    #[error("Invalid heartbeat: must be greater than zero")]
    InvalidHeartbeat,

    /// Client request rejected: this peer may not serve while the other one looks alive.
    #[error("Not active")]
    NotActive,

    #[error("Split brain: both peers report active")]
    SplitBrain,

    #[error("Dual passives: both peers report passive")]
    DualPassives,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FailoverError {
    /// Everything except `NotActive` should terminate the peer.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FailoverError::NotActive)
    }
}

/// Failover state machine for one peer.
pub struct FailoverStateMachine {
    state: PeerState,
    liveness: PeerLiveness,
    on_active: Option<Callback>,
    on_passive: Option<Callback>,
    on_vote: Option<Callback>,
}

impl FailoverStateMachine {
    /// Create a state machine in its configured starting role.
    ///
    /// The peer is given `2 × heartbeat` from `now` to make itself heard.
    pub fn new(initial: PeerState, heartbeat: Duration, now: Instant) -> Result<Self, FailoverError> {
        if !initial.is_initial() {
            return Err(FailoverError::InvalidInitialState(initial));
        }
        if heartbeat.is_zero() {
            return Err(FailoverError::InvalidHeartbeat);
        }
        Ok(Self {
            state: initial,
            liveness: PeerLiveness::new(heartbeat, now),
            on_active: None,
            on_passive: None,
            on_vote: None,
        })
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn heartbeat(&self) -> Duration {
        self.liveness.heartbeat()
    }

    /// When the other peer will be considered dead.
    pub fn peer_expiry(&self) -> Instant {
        self.liveness.expiry()
    }

    pub fn peer_expired(&self, now: Instant) -> bool {
        self.liveness.is_expired(now)
    }

    /// Refresh peer liveness (any state-channel traffic counts).
    pub fn peer_seen(&mut self, now: Instant) {
        self.liveness.refresh(now);
    }

    /// Called on entering ACTIVE. Signals the role change only; requests go
    /// through the frontend gate.
    pub fn on_active(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_active = Some(Box::new(callback));
    }

    /// Called on entering PASSIVE.
    pub fn on_passive(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_passive = Some(Box::new(callback));
    }

    /// Called when client traffic arrives while this peer may not serve it.
    pub fn on_vote(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_vote = Some(Box::new(callback));
    }

    /// Process one event.
    ///
    /// # Errors
    /// - `NotActive` for a client request this peer may not serve
    /// - `SplitBrain` if both peers are active
    /// - `DualPassives` if both peers are passive
    pub fn handle(&mut self, event: Event, now: Instant) -> Result<(), FailoverError> {
        debug!(state = %self.state, ?event, "processing event");

        match (self.state, event) {
            (PeerState::Primary, Event::PeerBackup) => {
                info!("connected to backup (passive), going active");
                self.go_active();
            }
            (PeerState::Primary, Event::PeerActive) => {
                info!("connected to backup (active), going passive");
                self.go_passive();
            }
            (PeerState::Primary, Event::ClientRequest) => {
                // The backup may be active right now, so only take over once it looks dead
                if !self.peer_expired(now) {
                    return Err(FailoverError::NotActive);
                }
                info!("backup seems dead, going active");
                self.go_active();
            }

            (PeerState::Backup, Event::PeerActive) => {
                info!("connected to primary (active), going passive");
                self.go_passive();
            }
            (PeerState::Backup, Event::ClientRequest) => {
                return Err(FailoverError::NotActive);
            }

            (PeerState::Active, Event::PeerActive) => {
                error!("fatal: dual actives, aborting");
                return Err(FailoverError::SplitBrain);
            }

            (PeerState::Passive, Event::PeerPrimary) => {
                info!("primary (passive) is restarting, going active");
                self.go_active();
            }
            (PeerState::Passive, Event::PeerBackup) => {
                info!("backup (passive) is restarting, going active");
                self.go_active();
            }
            (PeerState::Passive, Event::PeerPassive) => {
                error!("fatal: dual passives, aborting");
                return Err(FailoverError::DualPassives);
            }
            (PeerState::Passive, Event::ClientRequest) => {
                // The client request is what triggers failover
                if !self.peer_expired(now) {
                    return Err(FailoverError::NotActive);
                }
                info!("failover successful, going active");
                self.go_active();
            }

            _ => {}
        }

        Ok(())
    }

    /// Enter an external vote (a client signal that did not come through the
    /// frontend). May fail over if the peer looks dead; `NotActive` is swallowed.
    pub fn vote(&mut self, now: Instant) -> Result<(), FailoverError> {
        match self.handle(Event::ClientRequest, now) {
            Err(FailoverError::NotActive) => Ok(()),
            other => other,
        }
    }

    pub(crate) fn vote_received(&mut self) {
        if let Some(callback) = self.on_vote.as_mut() {
            callback();
        }
    }

    fn go_active(&mut self) {
        self.state = PeerState::Active;
        if let Some(callback) = self.on_active.as_mut() {
            callback();
        }
    }

    fn go_passive(&mut self) {
        self.state = PeerState::Passive;
        if let Some(callback) = self.on_passive.as_mut() {
            callback();
        }
    }
}

impl fmt::Debug for FailoverStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverStateMachine")
            .field("state", &self.state)
            .field("liveness", &self.liveness)
            .field("on_active", &self.on_active.is_some())
            .field("on_passive", &self.on_passive.is_some())
            .field("on_vote", &self.on_vote.is_some())
            .finish()
    }
}
