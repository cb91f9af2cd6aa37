//! Per-session configuration.
//!
//! One [`SessionConfig`] is built per call by the embedding layer (env/file
//! loading is out of scope here) and handed to the session controller. All
//! frame geometry is derived from `sample_rate_hz` and `frame_ms` so the
//! ingress chunker, the barge-in arbiter, and the frame pacer can never
//! disagree about what one frame is.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bytes per linear-PCM sample (16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Configuration for one call session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio sample rate in Hz (telephony μ-law native rate is 8000).
    pub sample_rate_hz: u32,

    /// Frame duration in milliseconds. Every ingress/egress unit is one frame.
    pub frame_ms: u32,

    /// Voice-activity detector aggressiveness (0–3).
    ///
    /// Higher values classify more audio as speech, making barge-in easier
    /// to trigger.
    pub vad_aggressiveness: u8,

    /// RMS energy floor (over i16 samples) a frame must reach before it can
    /// count as voiced, regardless of what the detector says.
    pub energy_floor: f32,

    /// Consecutive voiced frames required to trigger barge-in
    /// (8 frames ≈ 160 ms at 20 ms/frame).
    pub min_voiced_frames: u32,

    /// Grace window after playback start during which barge-in evaluation
    /// is suppressed (the caller may still be hearing their own echo of
    /// the playback onset).
    pub grace_ms: u64,

    /// Path to the intro audio asset (mono 16-bit WAV at `sample_rate_hz`).
    /// `None` disables the intro.
    pub intro_path: Option<PathBuf>,

    /// Transcript segments whose no-speech probability exceeds this value
    /// are dropped by the dialogue loop.
    pub no_speech_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 8_000,
            frame_ms: 20,
            vad_aggressiveness: 3,
            energy_floor: 300.0,
            min_voiced_frames: 8,
            grace_ms: 300,
            intro_path: None,
            no_speech_threshold: 0.7,
        }
    }
}

impl SessionConfig {
    /// Samples in one frame.
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        (self.sample_rate_hz / 1000 * self.frame_ms) as usize
    }

    /// Size of one linear-PCM frame in bytes.
    #[must_use]
    pub const fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * BYTES_PER_SAMPLE
    }

    /// Wall-clock duration of one frame.
    #[must_use]
    pub const fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms as u64)
    }

    /// Post-playback-start window during which barge-in is suppressed.
    #[must_use]
    pub const fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
