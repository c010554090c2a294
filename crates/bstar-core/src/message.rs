//! Multipart messages.
//!
//! A message is an ordered list of binary frames. Frontends that route
//! replies (router sockets) prepend the client's identity as frame 0, so the
//! frame list supports cheap push/pop at the front as well as the back.
//!
//! On the wire a message is a single bincode blob.

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// An ordered list of binary frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    frames: Vec<Vec<u8>>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from anything that yields frames.
    ///
    /// ```
    /// use bstar_core::Message;
    ///
    /// let msg = Message::from_frames(["BSTAR", "active"]);
    /// assert_eq!(msg.frame_str(1), Some("active"));
    /// ```
    pub fn from_frames<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Vec<u8>>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a frame.
    pub fn push(&mut self, frame: impl Into<Vec<u8>>) {
        self.frames.push(frame.into());
    }

    /// Prepend a frame (e.g. a routing identity).
    pub fn push_front(&mut self, frame: impl Into<Vec<u8>>) {
        self.frames.insert(0, frame.into());
    }

    /// Remove and return the first frame.
    pub fn pop_front(&mut self) -> Option<Vec<u8>> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.remove(0))
        }
    }

    /// Get a frame by index.
    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    /// Get a frame as UTF-8 text, if it is valid UTF-8.
    pub fn frame_str(&self, index: usize) -> Option<&str> {
        self.frame(index).and_then(|f| std::str::from_utf8(f).ok())
    }

    /// The last frame, which carries the body for routed messages.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.frames.last().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serialize to bytes for a single binary transport frame.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serialize(self).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Parse bytes produced by [`Message::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        bincode::deserialize(bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

// Lossy text rendering for logs: ["BSTAR", "active"]
impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames.iter().map(|frame| String::from_utf8_lossy(frame)))
            .finish()
    }
}
