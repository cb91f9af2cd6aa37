//! Session error types.
//!
//! The taxonomy distinguishes expected outcomes (transport going away,
//! a barge-in cancelling playback) from failures that must close the call.
//! Collaborators signal accelerator/memory pressure through the explicit
//! [`SessionError::ResourceExhaustion`] variant rather than panicking, so
//! the dialogue loop can attempt one local recovery before giving up.

/// Close code sent when a collaborator exhausts model resources and
/// recovery failed.
pub const CLOSE_RESOURCE_EXHAUSTED: u16 = 1011;

/// Close code for any other unrecoverable dialogue failure.
pub const CLOSE_GENERIC_FAILURE: u16 = 4000;

/// Errors that can occur while orchestrating a call session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport closed or errored mid-call. Expected; triggers
    /// teardown without being escalated.
    #[error("transport disconnected")]
    TransportDisconnect,

    /// An inbound event could not be parsed. Swallowed by the ingress loop.
    #[error("malformed transport event: {0}")]
    MalformedEvent(String),

    /// A recognition or generation collaborator ran out of accelerator or
    /// host memory.
    #[error("model resources exhausted")]
    ResourceExhaustion,

    /// Playback was cancelled by barge-in or teardown. Expected; never
    /// surfaces past the frame pacer.
    #[error("playback cancelled")]
    PlaybackCancelled,

    /// The speech recognizer failed.
    #[error("speech recognition failed: {0}")]
    Recognition(String),

    /// The reply generator failed.
    #[error("reply generation failed: {0}")]
    Generation(String),

    /// The speech synthesizer failed.
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// The intro asset exists but is not mono 16-bit PCM at the session
    /// sample rate.
    #[error("intro asset unusable: {0}")]
    BadIntroAsset(String),

    /// The recognizer's transcript sequence was already taken. The sequence
    /// is per-session and non-restartable.
    #[error("transcript stream already consumed")]
    TranscriptsUnavailable,

    /// IO error (intro asset, collaborator plumbing).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Transport close code communicated when this error ends the call.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::ResourceExhaustion => CLOSE_RESOURCE_EXHAUSTED,
            _ => CLOSE_GENERIC_FAILURE,
        }
    }
}
