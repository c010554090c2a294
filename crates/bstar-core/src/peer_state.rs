//! Peer states, FSM events and the state announcement format.
//!
//! Every heartbeat a peer publishes a two-frame announcement:
//!
//! ```text
//! frame 0: "BSTAR"      (protocol marker)
//! frame 1: "primary" | "backup" | "active" | "passive"
//! ```

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Marker carried in frame 0 of every state announcement.
pub const STATE_MARKER: &str = "BSTAR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerStateError {
    #[error("Unknown peer state: {0:?}")]
    Unknown(String),
}

/// Role/activity state of a peer.
///
/// `Primary` and `Backup` are only valid as the configured starting role;
/// a running pair settles into one `Active` and one `Passive` peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Primary,
    Backup,
    Active,
    Passive,
}

impl PeerState {
    pub const ALL: [PeerState; 4] = [
        PeerState::Primary,
        PeerState::Backup,
        PeerState::Active,
        PeerState::Passive,
    ];

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Primary => "primary",
            PeerState::Backup => "backup",
            PeerState::Active => "active",
            PeerState::Passive => "passive",
        }
    }

    /// Whether a peer may start in this state.
    pub fn is_initial(&self) -> bool {
        matches!(self, PeerState::Primary | PeerState::Backup)
    }
}

impl Display for PeerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerState {
    type Err = PeerStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(PeerState::Primary),
            "backup" => Ok(PeerState::Backup),
            "active" => Ok(PeerState::Active),
            "passive" => Ok(PeerState::Passive),
            other => Err(PeerStateError::Unknown(other.to_string())),
        }
    }
}

/// Input to the failover state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Peer announced `primary`
    PeerPrimary,
    /// Peer announced `backup`
    PeerBackup,
    /// Peer announced `active`
    PeerActive,
    /// Peer announced `passive`
    PeerPassive,
    /// A client request (or vote) arrived locally
    ClientRequest,
}

impl Event {
    pub const ALL: [Event; 5] = [
        Event::PeerPrimary,
        Event::PeerBackup,
        Event::PeerActive,
        Event::PeerPassive,
        Event::ClientRequest,
    ];
}

impl From<PeerState> for Event {
    /// The event a peer's announced state produces.
    fn from(peer_state: PeerState) -> Self {
        // more likely ones first
        match peer_state {
            PeerState::Passive => Event::PeerPassive,
            PeerState::Active => Event::PeerActive,
            PeerState::Primary => Event::PeerPrimary,
            PeerState::Backup => Event::PeerBackup,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnouncementError {
    #[error("Missing state marker (expected \"BSTAR\")")]
    MissingMarker,
    #[error("Missing state frame")]
    MissingState,
    #[error(transparent)]
    InvalidState(#[from] PeerStateError),
}

/// A decoded state announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub state: PeerState,
}

impl Announcement {
    pub fn new(state: PeerState) -> Self {
        Self { state }
    }

    /// Encode as `[STATE_MARKER, state]`.
    pub fn to_message(&self) -> Message {
        Message::from_frames([STATE_MARKER, self.state.as_str()])
    }

    /// Decode an announcement. Frames after the state are ignored.
    pub fn from_message(message: &Message) -> Result<Self, AnnouncementError> {
        if message.frame(0) != Some(STATE_MARKER.as_bytes()) {
            return Err(AnnouncementError::MissingMarker);
        }
        let raw = message.frame(1).ok_or(AnnouncementError::MissingState)?;
        let state = std::str::from_utf8(raw)
            .map_err(|_| PeerStateError::Unknown(String::from_utf8_lossy(raw).into_owned()))?
            .parse()?;
        Ok(Self { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_wire_names() {
        let names: Vec<String> = PeerState::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["primary", "backup", "active", "passive"]);
    }

    #[test]
    fn test_parse_unknown_state() {
        let err = "ACTIVE".parse::<PeerState>().unwrap_err();
        assert_eq!(err, PeerStateError::Unknown("ACTIVE".into()));
    }

    #[test]
    fn test_only_primary_and_backup_are_initial() {
        assert!(PeerState::Primary.is_initial());
        assert!(PeerState::Backup.is_initial());
        assert!(!PeerState::Active.is_initial());
        assert!(!PeerState::Passive.is_initial());
    }

    #[test]
    fn test_event_for_peer_state() {
        assert_eq!(Event::from(PeerState::Primary), Event::PeerPrimary);
        assert_eq!(Event::from(PeerState::Backup), Event::PeerBackup);
        assert_eq!(Event::from(PeerState::Active), Event::PeerActive);
        assert_eq!(Event::from(PeerState::Passive), Event::PeerPassive);
    }

    #[test]
    fn test_announcement_wire_format() {
        let msg = Announcement::new(PeerState::Passive).to_message();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.frame_str(0), Some("BSTAR"));
        assert_eq!(msg.frame_str(1), Some("passive"));
    }

    #[test]
    fn test_decode_announcement() {
        let msg = Message::from_frames(["BSTAR", "active"]);
        let announcement = Announcement::from_message(&msg).unwrap();
        assert_eq!(announcement.state, PeerState::Active);
    }

    #[test]
    fn test_decode_ignores_trailing_frames() {
        let msg = Message::from_frames(["BSTAR", "backup", "extra"]);
        assert_eq!(
            Announcement::from_message(&msg),
            Ok(Announcement::new(PeerState::Backup))
        );
    }

    #[test]
    fn test_decode_wrong_marker() {
        let msg = Message::from_frames(["HELLO", "active"]);
        assert_eq!(
            Announcement::from_message(&msg),
            Err(AnnouncementError::MissingMarker)
        );
        assert_eq!(
            Announcement::from_message(&Message::new()),
            Err(AnnouncementError::MissingMarker)
        );
    }

    #[test]
    fn test_decode_missing_state() {
        let msg = Message::from_frames(["BSTAR"]);
        assert_eq!(
            Announcement::from_message(&msg),
            Err(AnnouncementError::MissingState)
        );
    }

    #[test]
    fn test_decode_unknown_state() {
        let msg = Message::from_frames(["BSTAR", "zombie"]);
        assert_eq!(
            Announcement::from_message(&msg),
            Err(AnnouncementError::InvalidState(PeerStateError::Unknown(
                "zombie".into()
            )))
        );

        let msg = Message::from_frames([b"BSTAR".to_vec(), vec![0xff]]);
        assert!(matches!(
            Announcement::from_message(&msg),
            Err(AnnouncementError::InvalidState(_))
        ));
    }
}
