//! Ingress loop — decodes caller audio and arbitrates barge-in.
//!
//! One loop per session consumes raw inbound JSON messages: `start` resets
//! session state and launches the intro, `media` is decoded, sliced into
//! fixed frames, and run through the grace window and the barge-in arbiter.
//! Every frame reaches the recognizer regardless of playback state —
//! recognition runs continuously, which is what lets the caller's first
//! words land even while the intro is still playing.
//!
//! Failures are contained: malformed events are dropped, and an error on
//! one frame never stops the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::audio::{self, AudioFrame, FrameChunker};
use crate::backend::{CallTransport, SpeechRecognizer};
use crate::barge::{BargeArbiter, BargeState};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{InboundEvent, OutboundEvent, parse_inbound};
use crate::gate::VoiceGate;
use crate::session::SessionShared;

pub(crate) struct IngressLoop {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    transport: Arc<dyn CallTransport>,
    recognizer: Arc<dyn SpeechRecognizer>,
    gate: VoiceGate,
    arbiter: BargeArbiter,
    chunker: FrameChunker,
    /// Playback generation the arbiter is currently armed against. A new
    /// playback task resets the arbiter to `Idle`.
    armed_generation: u64,
}

impl IngressLoop {
    pub(crate) fn new(
        config: SessionConfig,
        shared: Arc<SessionShared>,
        transport: Arc<dyn CallTransport>,
        recognizer: Arc<dyn SpeechRecognizer>,
        gate: VoiceGate,
    ) -> Self {
        let arbiter = BargeArbiter::new(config.min_voiced_frames);
        let chunker = FrameChunker::new(config.bytes_per_frame());
        Self {
            config,
            shared,
            transport,
            recognizer,
            gate,
            arbiter,
            chunker,
            armed_generation: 0,
        }
    }

    /// Consume inbound messages until `stop` or disconnect.
    pub(crate) async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        while let Some(text) = inbound.recv().await {
            let event = match parse_inbound(&text) {
                Ok(event) => event,
                Err(e) => {
                    debug!(error = %e, "ignoring malformed inbound event");
                    continue;
                }
            };

            match event {
                InboundEvent::Start { start } => {
                    info!(
                        stream_sid = %start.stream_sid,
                        call_sid = %start.call_sid,
                        "stream started"
                    );
                    self.shared.set_ids(&start.stream_sid, &start.call_sid);
                    self.chunker.reset();
                    self.start_intro().await;
                }
                InboundEvent::Media { media } => {
                    let ulaw = match media.decode() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            debug!(error = %e, "ignoring undecodable media payload");
                            continue;
                        }
                    };
                    self.chunker.extend(&audio::ulaw_to_pcm(&ulaw));
                    while let Some(frame) = self.chunker.next_frame() {
                        if let Err(e) = self.process_frame(&frame).await {
                            warn!(error = %e, "frame processing failed; continuing");
                        }
                    }
                }
                InboundEvent::Stop => {
                    info!("stream stopped by far end");
                    return;
                }
                InboundEvent::Unknown => trace!("ignoring unknown inbound event type"),
            }
        }
        info!("transport disconnected");
    }

    /// Launch intro playback as a supervised task; failures are logged,
    /// never fatal to the call.
    async fn start_intro(&self) {
        let Some(path) = self.config.intro_path.clone() else {
            return;
        };
        match audio::load_intro_frames(&path, &self.config) {
            Ok(frames) => {
                debug!(frames = frames.len(), "starting intro playback");
                let stream = futures_util::stream::iter(frames.into_iter().map(Ok));
                self.shared
                    .begin_playback(
                        Box::pin(stream),
                        Arc::clone(&self.transport),
                        self.config.frame_duration(),
                    )
                    .await;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "intro asset unavailable"),
        }
    }

    /// Grace window, arbiter, then recognition — every frame is forwarded.
    async fn process_frame(&mut self, frame: &AudioFrame) -> Result<(), SessionError> {
        if let Some(status) = self.shared.playback_status() {
            if status.generation != self.armed_generation {
                self.arbiter.reset();
                self.armed_generation = status.generation;
            }

            // Inside the grace window the frame bypasses barge-in entirely
            // but still feeds recognition: the caller may already be
            // answering over the playback onset.
            if status.started_at.elapsed() < self.config.grace_window() {
                return self.recognizer.feed_audio(frame);
            }

            if !status.token.is_cancelled() {
                let voiced = self.gate.is_voiced(frame);
                if self.arbiter.observe(voiced) == BargeState::Triggered {
                    status.token.cancel();
                    let stream_sid = self.shared.stream_sid();
                    info!(stream_sid = %stream_sid, "caller barged in; cancelling playback");
                    // The token is already cancelled; a failed clear only
                    // means the far end keeps its buffered audio. The frame
                    // must still reach recognition.
                    if let Err(e) = self
                        .transport
                        .send(OutboundEvent::clear(&stream_sid))
                        .await
                    {
                        warn!(error = %e, "clear event not delivered");
                    }
                }
            }
        }

        self.recognizer.feed_audio(frame)
    }
}
