//! Voice-activity gate — classifies a frame as voiced or unvoiced.
//!
//! A frame counts as voiced only when **both** checks pass: its RMS energy
//! reaches the configured floor, and the voice-activity detector says the
//! frame is speech. The detector is a trait so the energy-only default can
//! be swapped for a model-backed detector (or a test double) without
//! touching the arbiter or the ingress loop.

use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::config::SessionConfig;

/// Frame-level speech/non-speech decision.
pub trait SpeechDetector: Send + Sync {
    /// Whether the frame contains speech.
    fn is_speech(&self, frame: &AudioFrame, sample_rate_hz: u32) -> bool;
}

/// Energy-threshold detector, always available.
///
/// The aggressiveness knob (0–3) maps to an RMS threshold: higher
/// aggressiveness lowers the threshold, so more frames classify as speech
/// and barge-in triggers more readily.
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    threshold: f32,
}

impl EnergyDetector {
    /// Build a detector from the configured aggressiveness (clamped to 0–3).
    #[must_use]
    pub fn from_aggressiveness(aggressiveness: u8) -> Self {
        // Map [0, 3] → [900, 150] RMS over i16 samples.
        let level = f32::from(aggressiveness.min(3));
        Self {
            threshold: 250.0f32.mul_add(-level, 900.0),
        }
    }
}

impl SpeechDetector for EnergyDetector {
    fn is_speech(&self, frame: &AudioFrame, _sample_rate_hz: u32) -> bool {
        frame.rms() >= self.threshold
    }
}

/// Combined energy-floor + detector gate used by the ingress loop.
#[derive(Clone)]
pub struct VoiceGate {
    energy_floor: f32,
    sample_rate_hz: u32,
    detector: Arc<dyn SpeechDetector>,
}

impl VoiceGate {
    /// Build the gate from session config and a detector.
    #[must_use]
    pub fn new(config: &SessionConfig, detector: Arc<dyn SpeechDetector>) -> Self {
        Self {
            energy_floor: config.energy_floor,
            sample_rate_hz: config.sample_rate_hz,
            detector,
        }
    }

    /// Voiced/unvoiced decision for one frame.
    #[must_use]
    pub fn is_voiced(&self, frame: &AudioFrame) -> bool {
        frame.rms() >= self.energy_floor && self.detector.is_speech(frame, self.sample_rate_hz)
    }
}
