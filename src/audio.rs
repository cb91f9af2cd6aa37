//! Frame-level audio handling.
//!
//! Everything the session touches is one fixed-size frame: 20 ms of linear
//! PCM on the ingress side ([`AudioFrame`]) and 20 ms of companded μ-law on
//! the egress side ([`EncodedFrame`]). This module owns the μ-law codec
//! (G.711), the rolling-buffer chunker that slices byte streams into
//! frames, RMS energy measurement, and intro-asset loading.

use std::path::Path;

use crate::config::{BYTES_PER_SAMPLE, SessionConfig};
use crate::error::SessionError;

// ── Frame types ────────────────────────────────────────────────────

/// One frame of linear 16-bit PCM (little-endian), fixed size per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Vec<u8>);

impl AudioFrame {
    /// Raw PCM bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of samples in the frame.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.0.len() / BYTES_PER_SAMPLE
    }

    /// RMS energy over the frame's i16 samples.
    #[must_use]
    pub fn rms(&self) -> f32 {
        rms_i16(&self.0)
    }
}

/// One frame of μ-law companded audio, as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Vec<u8>);

impl EncodedFrame {
    /// Wrap raw μ-law bytes.
    #[must_use]
    pub fn from_ulaw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw μ-law bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// ── μ-law codec (G.711) ────────────────────────────────────────────

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

/// Compand one linear sample to 8-bit μ-law.
#[must_use]
pub fn ulaw_encode_sample(pcm: i16) -> u8 {
    let mut sample = i32::from(pcm);
    let sign: u8 = if sample < 0 {
        sample = -sample;
        0x80
    } else {
        0
    };
    if sample > ULAW_CLIP {
        sample = ULAW_CLIP;
    }
    sample += ULAW_BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && sample & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mantissa = ((sample >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Expand one 8-bit μ-law sample to linear PCM.
#[must_use]
pub fn ulaw_decode_sample(ulaw: u8) -> i16 {
    let u = !ulaw;
    let exponent = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;
    let magnitude = ((i32::from(mantissa) << 3) + ULAW_BIAS) << exponent;
    let sample = magnitude - ULAW_BIAS;

    #[allow(clippy::cast_possible_truncation)]
    if u & 0x80 != 0 { -sample as i16 } else { sample as i16 }
}

/// Decode a μ-law payload to little-endian 16-bit PCM.
#[must_use]
pub fn ulaw_to_pcm(ulaw: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(ulaw.len() * BYTES_PER_SAMPLE);
    for &b in ulaw {
        pcm.extend_from_slice(&ulaw_decode_sample(b).to_le_bytes());
    }
    pcm
}

/// Compand little-endian 16-bit PCM to μ-law. A trailing odd byte (half a
/// sample) is ignored.
#[must_use]
pub fn pcm_to_ulaw(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| ulaw_encode_sample(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// RMS energy of little-endian 16-bit PCM bytes.
#[must_use]
pub fn rms_i16(pcm: &[u8]) -> f32 {
    let samples = pcm.chunks_exact(BYTES_PER_SAMPLE);
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .map(|pair| {
            let s = f64::from(i16::from_le_bytes([pair[0], pair[1]]));
            s * s
        })
        .sum();

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let mean = (sum_squares / n as f64).sqrt() as f32;
    mean
}

// ── Frame chunker ──────────────────────────────────────────────────

/// Rolling byte buffer that slices an incoming PCM stream into fixed-size
/// frames.
///
/// Inbound media messages carry arbitrary byte counts; the chunker holds
/// the remainder between messages. [`flush_padded`](Self::flush_padded)
/// zero-pads the trailing partial frame and is only used for finite assets
/// (the intro), never for live ingress.
#[derive(Debug)]
pub struct FrameChunker {
    buf: Vec<u8>,
    frame_len: usize,
}

impl FrameChunker {
    /// Create a chunker producing frames of `frame_len` bytes.
    #[must_use]
    pub const fn new(frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            frame_len,
        }
    }

    /// Append raw PCM bytes to the rolling buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next full frame, if enough bytes are buffered.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.buf.len() < self.frame_len {
            return None;
        }
        let frame: Vec<u8> = self.buf.drain(..self.frame_len).collect();
        Some(AudioFrame(frame))
    }

    /// Zero-pad and emit whatever partial data remains.
    pub fn flush_padded(&mut self) -> Option<AudioFrame> {
        if self.buf.is_empty() {
            return None;
        }
        let mut frame = std::mem::take(&mut self.buf);
        frame.resize(self.frame_len, 0);
        Some(AudioFrame(frame))
    }

    /// Discard all buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

// ── Intro asset ────────────────────────────────────────────────────

/// Load the intro WAV and compand it into transport-ready μ-law frames.
///
/// The asset must be mono 16-bit PCM at the session sample rate; the
/// trailing partial frame is zero-padded so every emitted frame has the
/// full fixed size.
pub fn load_intro_frames(
    path: &Path,
    config: &SessionConfig,
) -> Result<Vec<EncodedFrame>, SessionError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| SessionError::BadIntroAsset(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
        || spec.sample_rate != config.sample_rate_hz
    {
        return Err(SessionError::BadIntroAsset(format!(
            "expected mono 16-bit PCM at {} Hz, got {} ch / {} bit / {} Hz",
            config.sample_rate_hz, spec.channels, spec.bits_per_sample, spec.sample_rate
        )));
    }

    let mut chunker = FrameChunker::new(config.bytes_per_frame());
    let mut frames = Vec::new();
    for sample in reader.samples::<i16>() {
        let sample = sample.map_err(|e| SessionError::BadIntroAsset(e.to_string()))?;
        chunker.extend(&sample.to_le_bytes());
        if let Some(frame) = chunker.next_frame() {
            frames.push(EncodedFrame(pcm_to_ulaw(frame.as_bytes())));
        }
    }
    if let Some(frame) = chunker.flush_padded() {
        frames.push(EncodedFrame(pcm_to_ulaw(frame.as_bytes())));
    }

    Ok(frames)
}
