//! Shared test doubles for session integration tests.
//!
//! No real models, audio hardware, or network connections are involved —
//! collaborators return canned data instantly, and the transport records
//! everything the session sends.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::stream;
use tokio::sync::mpsc;

use callflow::audio::{AudioFrame, EncodedFrame, ulaw_encode_sample};
use callflow::backend::{
    CallTransport, EncodedFrameStream, ReplyGenerator, SpeechRecognizer, SpeechSynthesizer,
    TokenStream, TranscriptSegment, TranscriptStream,
};
use callflow::error::SessionError;
use callflow::event::OutboundEvent;
use callflow::gate::SpeechDetector;

// ── Transport double ───────────────────────────────────────────────

/// Records every outbound event and close call.
pub struct MockTransport {
    sent: Mutex<Vec<OutboundEvent>>,
    connected: AtomicBool,
    closed: Mutex<Vec<(u16, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn media_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Media { .. }))
            .count()
    }

    pub fn clear_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, OutboundEvent::Clear { .. }))
            .count()
    }

    /// First μ-law byte of every media frame sent, in order. The mock
    /// synthesizer stamps each sentence's frames with the sentence index,
    /// so this exposes playback ordering.
    pub fn media_markers(&self) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Media { media, .. } => {
                    BASE64.decode(&media.payload).ok().and_then(|b| b.first().copied())
                }
                OutboundEvent::Clear { .. } => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> Vec<(u16, String)> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallTransport for MockTransport {
    async fn send(&self, event: OutboundEvent) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::TransportDisconnect);
        }
        self.sent.lock().unwrap().push(event);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self, code: u16, reason: &str) {
        self.closed.lock().unwrap().push((code, reason.to_string()));
        self.connected.store(false, Ordering::SeqCst);
    }
}

// ── Recognizer double ──────────────────────────────────────────────

/// Counts fed frames and hands out a scripted transcript sequence.
pub struct MockRecognizer {
    fed: AtomicUsize,
    transcripts: Mutex<Option<TranscriptStream>>,
    released: AtomicUsize,
}

impl MockRecognizer {
    /// Finite transcript script; the dialogue loop ends when it runs out.
    pub fn with_segments(segments: Vec<Result<TranscriptSegment, SessionError>>) -> Self {
        Self {
            fed: AtomicUsize::new(0),
            transcripts: Mutex::new(Some(Box::pin(stream::iter(segments)))),
            released: AtomicUsize::new(0),
        }
    }

    /// Open-ended transcript sequence driven by the returned sender. Keep
    /// the sender alive to keep the dialogue loop blocked on it.
    pub fn with_channel() -> (
        Self,
        mpsc::UnboundedSender<Result<TranscriptSegment, SessionError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let recognizer = Self {
            fed: AtomicUsize::new(0),
            transcripts: Mutex::new(Some(Box::pin(stream))),
            released: AtomicUsize::new(0),
        };
        (recognizer, tx)
    }

    /// Recognizer whose transcript stream was already consumed.
    pub fn consumed() -> Self {
        Self {
            fed: AtomicUsize::new(0),
            transcripts: Mutex::new(None),
            released: AtomicUsize::new(0),
        }
    }

    pub fn fed_frames(&self) -> usize {
        self.fed.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn feed_audio(&self, _frame: &AudioFrame) -> Result<(), SessionError> {
        self.fed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_transcripts(&self) -> Option<TranscriptStream> {
        self.transcripts.lock().unwrap().take()
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Generator double ───────────────────────────────────────────────

/// Pops one scripted token reply per turn and records prompts.
pub struct MockGenerator {
    replies: Mutex<VecDeque<Vec<String>>>,
    prompts: Mutex<Vec<(String, String)>>,
    released: AtomicUsize,
    exhausted: AtomicBool,
}

impl MockGenerator {
    pub fn with_replies(replies: Vec<Vec<&str>>) -> Self {
        let replies = replies
            .into_iter()
            .map(|tokens| tokens.into_iter().map(str::to_string).collect())
            .collect();
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Generator that always reports resource exhaustion.
    pub fn exhausted() -> Self {
        let generator = Self::with_replies(Vec::new());
        generator.exhausted.store(true, Ordering::SeqCst);
        generator
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn stream_reply(
        &self,
        text: &str,
        session_id: &str,
    ) -> Result<TokenStream, SessionError> {
        self.prompts
            .lock()
            .unwrap()
            .push((text.to_string(), session_id.to_string()));
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(SessionError::ResourceExhaustion);
        }
        let tokens = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(tokens.into_iter().map(Ok))))
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Synthesizer double ─────────────────────────────────────────────

/// Emits `frames_per_sentence` frames per call, each stamped with the
/// sentence index in its first byte.
pub struct MockSynthesizer {
    sentences: Mutex<Vec<String>>,
    frames_per_sentence: usize,
    counter: AtomicU8,
}

impl MockSynthesizer {
    pub fn new(frames_per_sentence: usize) -> Self {
        Self {
            sentences: Mutex::new(Vec::new()),
            frames_per_sentence,
            counter: AtomicU8::new(0),
        }
    }

    pub fn sentences(&self) -> Vec<String> {
        self.sentences.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<EncodedFrameStream, SessionError> {
        self.sentences.lock().unwrap().push(text.to_string());
        let marker = self.counter.fetch_add(1, Ordering::SeqCst);
        let frames: Vec<_> = (0..self.frames_per_sentence)
            .map(|_| {
                let mut bytes = vec![0xFFu8; 160];
                bytes[0] = marker;
                Ok(EncodedFrame::from_ulaw(bytes))
            })
            .collect();
        Ok(Box::pin(stream::iter(frames)))
    }
}

// ── Detector double ────────────────────────────────────────────────

/// Detector that always says speech, so voicedness depends only on the
/// energy floor.
pub struct SpeechAlways;

impl SpeechDetector for SpeechAlways {
    fn is_speech(&self, _frame: &AudioFrame, _sample_rate_hz: u32) -> bool {
        true
    }
}

// ── Event builders ─────────────────────────────────────────────────

pub fn start_json(stream_sid: &str, call_sid: &str) -> String {
    format!(r#"{{"event":"start","start":{{"streamSid":"{stream_sid}","callSid":"{call_sid}"}}}}"#)
}

pub fn stop_json() -> String {
    r#"{"event":"stop"}"#.to_string()
}

pub fn media_json(ulaw: &[u8]) -> String {
    format!(
        r#"{{"event":"media","media":{{"payload":"{}"}}}}"#,
        BASE64.encode(ulaw)
    )
}

/// `n` frames of μ-law audio well above the default energy floor.
pub fn loud_ulaw(n_frames: usize) -> Vec<u8> {
    let byte = ulaw_encode_sample(5000);
    vec![byte; n_frames * 160]
}

/// `n` frames of μ-law silence.
pub fn quiet_ulaw(n_frames: usize) -> Vec<u8> {
    vec![ulaw_encode_sample(0); n_frames * 160]
}

// ── Fixtures / helpers ─────────────────────────────────────────────

/// Write a mono 16-bit 8 kHz intro WAV of `n_frames` frames into `dir`.
pub fn write_intro_wav(dir: &std::path::Path, n_frames: usize) -> PathBuf {
    let path = dir.join("intro.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..n_frames * 160 {
        writer.write_sample(2000i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Poll `pred` under paused time until it holds, or panic.
pub async fn wait_until(pred: impl Fn() -> bool, what: &str) {
    for _ in 0..2_000 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Yield a handful of times without advancing the (paused) clock, so
/// already-runnable tasks get scheduled.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
