//! Peer liveness tracking.
//!
//! A single expiry instant: `last_seen + 2 × heartbeat`. Until the first
//! announcement arrives the peer gets the same benefit of the doubt, counted
//! from startup.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PeerLiveness {
    heartbeat: Duration,
    expiry: Instant,
}

impl PeerLiveness {
    pub fn new(heartbeat: Duration, now: Instant) -> Self {
        Self {
            heartbeat,
            expiry: now + heartbeat * 2,
        }
    }

    /// Record that the peer was heard from.
    pub fn refresh(&mut self, now: Instant) {
        self.expiry = now + self.heartbeat * 2;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEARTBEAT: Duration = Duration::from_secs(1);

    #[test]
    fn test_fresh_record_expires_after_two_heartbeats() {
        let t0 = Instant::now();
        let liveness = PeerLiveness::new(HEARTBEAT, t0);

        assert_eq!(liveness.expiry(), t0 + Duration::from_secs(2));
        assert!(!liveness.is_expired(t0 + Duration::from_millis(1999)));
        // Expiry is inclusive
        assert!(liveness.is_expired(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_refresh_pushes_expiry() {
        let t0 = Instant::now();
        let mut liveness = PeerLiveness::new(HEARTBEAT, t0);

        liveness.refresh(t0 + Duration::from_millis(1500));

        assert!(!liveness.is_expired(t0 + Duration::from_millis(3000)));
        assert!(liveness.is_expired(t0 + Duration::from_millis(3500)));
    }
}
