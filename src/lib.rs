//! Real-time telephony voice-session orchestration.
//!
//! For each active call, `callflow` simultaneously ingests caller audio,
//! detects barge-in interruptions, streams an incrementally generated
//! reply through sentence-level synthesis, and paces synthesized audio
//! back to the caller at real-time cadence:
//!
//! ```text
//!   caller audio ─▶ ingress loop ─▶ recognizer ─▶ transcripts
//!                       │                             │
//!                  barge arbiter                dialogue loop
//!                       │                             │
//!                  cancel token ◀── playback ◀── segmenter ◀── generator
//!                                      ▲
//!                                 frame pacer ─▶ caller
//! ```
//!
//! The speech recognizer, reply generator, and speech synthesizer are
//! external collaborators behind the traits in [`backend`]; transport
//! setup and routing live in the embedding layer. Each session is
//! independent — no cross-call state exists in this crate.

pub mod audio;
pub mod backend;
pub mod barge;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
mod ingress;
pub mod pacer;
pub mod segment;
pub mod session;

// Re-export key types for convenience
pub use audio::{AudioFrame, EncodedFrame};
pub use backend::{
    CallTransport, EncodedFrameStream, ReplyGenerator, SpeechRecognizer, SpeechSynthesizer,
    TokenStream, TranscriptSegment, TranscriptStream,
};
pub use barge::{BargeArbiter, BargeState};
pub use config::SessionConfig;
pub use error::SessionError;
pub use event::{InboundEvent, OutboundEvent};
pub use gate::{EnergyDetector, SpeechDetector, VoiceGate};
pub use segment::SentenceSegmenter;
pub use session::{SessionController, SessionState};
