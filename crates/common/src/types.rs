//! Common data types for Dark Tower SFU client components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier for one produced audio or video track.
///
/// Opaque to the client. Assigned by the signaling peer, never generated
/// locally, and unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    /// Wrap a server-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a negotiated transport.
///
/// On the wire the signaling peer names these after the role of the local
/// client: `producer` for the outbound transport, `consumer` for inbound ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportDirection {
    /// Outbound transport carrying local producers.
    #[serde(rename = "producer")]
    Send,
    /// Inbound transport carrying consumers for one remote participant.
    #[serde(rename = "consumer")]
    Receive,
}

impl TransportDirection {
    /// Returns the direction as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Receive => "receive",
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_is_transparent_on_the_wire() {
        let id = MediaId::new("a1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a1\"");

        let parsed: MediaId = serde_json::from_str("\"v7\"").unwrap();
        assert_eq!(parsed.as_str(), "v7");
        assert_eq!(parsed.to_string(), "v7");
    }

    #[test]
    fn test_transport_direction_wire_names() {
        assert_eq!(
            serde_json::to_string(&TransportDirection::Send).unwrap(),
            "\"producer\""
        );
        assert_eq!(
            serde_json::to_string(&TransportDirection::Receive).unwrap(),
            "\"consumer\""
        );
        assert_eq!(TransportDirection::Receive.as_str(), "receive");
    }

    #[test]
    fn test_media_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MediaKind::Audio).unwrap(), "\"audio\"");
        let kind: MediaKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MediaKind::Video);
    }
}
