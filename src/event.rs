//! Call-transport event protocol.
//!
//! The transport carries a bidirectional JSON event stream. Inbound:
//! `start`, `media`, `stop`; anything else deserializes to
//! [`InboundEvent::Unknown`] and is ignored upstream. Outbound: `media`
//! (one companded frame) and `clear` (flush far-end playback buffers on
//! barge-in). Media payloads are base64 μ-law.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::audio::EncodedFrame;
use crate::error::SessionError;

// ── Inbound ────────────────────────────────────────────────────────

/// Event received from the call transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Call established; carries the session identifiers.
    Start {
        /// Identifier block.
        start: StartMeta,
    },

    /// One chunk of caller audio.
    Media {
        /// Payload block.
        media: MediaMeta,
    },

    /// Far end ended the stream.
    Stop,

    /// Any event type this crate does not understand.
    #[serde(other)]
    Unknown,
}

/// Identifiers delivered with `start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    /// Media stream identifier (echoed on every outbound event).
    pub stream_sid: String,

    /// Call identifier (keys the generator's conversation history).
    pub call_sid: String,
}

/// Audio payload delivered with `media`.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaMeta {
    /// Base64-encoded companded audio.
    pub payload: String,
}

impl MediaMeta {
    /// Decode the base64 payload to raw μ-law bytes.
    pub fn decode(&self) -> Result<Vec<u8>, SessionError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| SessionError::MalformedEvent(format!("bad media payload: {e}")))
    }
}

/// Parse one inbound JSON text message.
///
/// Unknown event types parse successfully as [`InboundEvent::Unknown`];
/// only structurally invalid JSON is an error.
pub fn parse_inbound(text: &str) -> Result<InboundEvent, SessionError> {
    serde_json::from_str(text).map_err(|e| SessionError::MalformedEvent(e.to_string()))
}

// ── Outbound ───────────────────────────────────────────────────────

/// Event sent to the call transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// One frame of synthesized audio.
    Media {
        /// Stream this frame belongs to.
        #[serde(rename = "streamSid")]
        stream_sid: String,
        /// Payload block.
        media: MediaPayload,
    },

    /// Tell the far end to drop any buffered playback audio.
    Clear {
        /// Stream to clear.
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Outbound audio payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPayload {
    /// Base64-encoded companded audio.
    pub payload: String,
}

impl OutboundEvent {
    /// Build a `media` event carrying one companded frame.
    #[must_use]
    pub fn media(stream_sid: &str, frame: &EncodedFrame) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: MediaPayload {
                payload: BASE64.encode(frame.as_bytes()),
            },
        }
    }

    /// Build a `clear` event.
    #[must_use]
    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_event_parses_identifiers() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA9"}}"#;
        match parse_inbound(json).unwrap() {
            InboundEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA9");
            }
            other => panic!("expected start, got {other:?}"),
        }
    }

    #[test]
    fn media_payload_roundtrips_base64() {
        let json = r#"{"event":"media","media":{"payload":"//8A"}}"#;
        match parse_inbound(json).unwrap() {
            InboundEvent::Media { media } => {
                assert_eq!(media.decode().unwrap(), vec![0xFF, 0xFF, 0x00]);
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_not_an_error() {
        let json = r#"{"event":"mark","mark":{"name":"x"}}"#;
        assert!(matches!(
            parse_inbound(json).unwrap(),
            InboundEvent::Unknown
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_inbound("not json").unwrap_err(),
            SessionError::MalformedEvent(_)
        ));
    }

    #[test]
    fn outbound_clear_serializes_with_stream_sid() {
        let json = serde_json::to_string(&OutboundEvent::clear("MZ1")).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":"MZ1"}"#);
    }

    #[test]
    fn outbound_media_carries_base64_frame() {
        let frame = EncodedFrame::from_ulaw(vec![0xFF, 0x7F]);
        let event = OutboundEvent::media("MZ1", &frame);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"media""#));
        assert!(json.contains(r#""streamSid":"MZ1""#));
        assert!(json.contains(&BASE64.encode([0xFFu8, 0x7F])));
    }
}
