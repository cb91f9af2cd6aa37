//! Collaborator seams — the external models and the call transport.
//!
//! The session controller operates on trait objects so that real engines
//! (a streaming recognizer, an LLM backend, a synthesis service) and test
//! doubles are interchangeable. Collaborator output is modeled as finite,
//! pull-based streams rather than push callbacks, so cancellation composes
//! with ordinary stream consumption.
//!
//! Conversation history belongs to the [`ReplyGenerator`]: the controller
//! passes the session id with every turn and keeps no dialogue state of
//! its own.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::audio::{AudioFrame, EncodedFrame};
use crate::error::SessionError;
use crate::event::OutboundEvent;

// ── Stream aliases ─────────────────────────────────────────────────

/// Finite token sequence for one reply turn.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, SessionError>> + Send>>;

/// Per-session sequence of finalized transcript segments.
pub type TranscriptStream =
    Pin<Box<dyn Stream<Item = Result<TranscriptSegment, SessionError>> + Send>>;

/// Finite lazy sequence of companded frames for one sentence.
pub type EncodedFrameStream =
    Pin<Box<dyn Stream<Item = Result<EncodedFrame, SessionError>> + Send>>;

// ── Transcripts ────────────────────────────────────────────────────

/// One finalized utterance from the recognizer, bounded by silence.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    /// Transcribed text.
    pub text: String,

    /// Probability that the segment contains no speech (0.0–1.0).
    pub no_speech_prob: f32,
}

// ── Collaborator traits ────────────────────────────────────────────

/// Streaming speech recognizer.
///
/// Audio goes in one frame at a time; finalized transcripts come out as a
/// non-restartable stream that the dialogue loop consumes exclusively.
pub trait SpeechRecognizer: Send + Sync {
    /// Feed one PCM frame. Must be bounded — implementations queue
    /// internally and never block the ingress loop.
    fn feed_audio(&self, frame: &AudioFrame) -> Result<(), SessionError>;

    /// Take the transcript sequence. Returns `Some` exactly once; the
    /// sequence cannot be restarted within a session.
    fn take_transcripts(&self) -> Option<TranscriptStream>;

    /// Release cached model state (teardown, or memory-pressure recovery).
    fn release(&self);
}

/// Incremental reply generator.
///
/// Owns and persists per-session conversation history keyed by
/// `session_id`; the history is opaque to this crate.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Start a reply for the given transcript; yields tokens as produced.
    async fn stream_reply(&self, text: &str, session_id: &str)
    -> Result<TokenStream, SessionError>;

    /// Release cached model state (teardown, or memory-pressure recovery).
    fn release(&self);
}

/// Sentence-level speech synthesizer.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one sentence as a lazy sequence of fixed-size companded
    /// frames matching the session's frame format.
    async fn synthesize(&self, text: &str) -> Result<EncodedFrameStream, SessionError>;
}

/// Outbound side of the call transport.
///
/// Connection setup, routing, and the receive side live in the embedding
/// layer; the session only ever sends events, checks liveness, and closes
/// with a code.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Send one outbound event to the far end.
    async fn send(&self, event: OutboundEvent) -> Result<(), SessionError>;

    /// Whether the connection is still up. Polled by the frame pacer at
    /// every frame boundary.
    fn is_connected(&self) -> bool;

    /// Close the connection with a code and reason. Best-effort.
    async fn close(&self, code: u16, reason: &str);
}
