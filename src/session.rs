//! Session controller — owns one call from `start` to teardown.
//!
//! Two loops run concurrently per session. The ingress loop
//! ([`crate::ingress`]) turns caller audio into recognizer input and
//! barge-in decisions; the dialogue loop (here) blocks on finalized
//! transcripts, streams each reply through the sentence segmenter, and
//! speaks sentence by sentence through the frame pacer.
//!
//! # Playback invariant
//!
//! At most one playback task is active at any instant. All playback starts
//! go through [`SessionShared::begin_playback`], which awaits the previous
//! task (a cancelled pacer exits within one frame duration) before
//! spawning the next with a fresh cancellation token. The arbiter in the
//! ingress loop only ever cancels the token it snapshotted, so a barge-in
//! can never kill a playback that replaced the one it was armed against.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{
    CallTransport, EncodedFrameStream, ReplyGenerator, SpeechRecognizer, SpeechSynthesizer,
    TranscriptStream,
};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::gate::{EnergyDetector, SpeechDetector, VoiceGate};
use crate::ingress::IngressLoop;
use crate::pacer::pace_frames;
use crate::segment::{SentenceSegmenter, is_meaningful};

// ── Session state ──────────────────────────────────────────────────

/// Lifecycle state of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, loops not yet running.
    Connecting,

    /// Ingress and dialogue loops running.
    Active,

    /// Teardown has run; the session is finished.
    Closing,
}

// ── Shared per-call state ──────────────────────────────────────────

#[derive(Default)]
struct CallIds {
    stream_sid: String,
    call_sid: String,
}

/// The currently active playback task, if any.
pub(crate) struct PlaybackTask {
    pub(crate) token: CancellationToken,
    pub(crate) started_at: Instant,
    pub(crate) generation: u64,
    pub(crate) handle: JoinHandle<()>,
}

/// Snapshot of the active playback handed to the ingress loop.
pub(crate) struct PlaybackStatus {
    pub(crate) token: CancellationToken,
    pub(crate) started_at: Instant,
    pub(crate) generation: u64,
}

/// State shared between the two loops.
///
/// Locks are std mutexes held only for field access, never across an
/// `.await` point; the one await in [`begin_playback`](Self::begin_playback)
/// happens on a task already taken out of the slot.
pub(crate) struct SessionShared {
    ids: Mutex<CallIds>,
    playback: Mutex<Option<PlaybackTask>>,
    /// Serialises playback starts: the await-previous/spawn-next sequence
    /// must not interleave between the intro and the first reply sentence.
    start_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    torn_down: AtomicBool,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            ids: Mutex::new(CallIds::default()),
            playback: Mutex::new(None),
            start_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_ids(&self, stream_sid: &str, call_sid: &str) {
        let mut ids = self.ids.lock().unwrap();
        ids.stream_sid = stream_sid.to_string();
        ids.call_sid = call_sid.to_string();
    }

    pub(crate) fn stream_sid(&self) -> String {
        self.ids.lock().unwrap().stream_sid.clone()
    }

    pub(crate) fn call_sid(&self) -> String {
        self.ids.lock().unwrap().call_sid.clone()
    }

    /// Snapshot the active playback, or `None` if there is none or it has
    /// already finished.
    pub(crate) fn playback_status(&self) -> Option<PlaybackStatus> {
        let slot = self.playback.lock().unwrap();
        slot.as_ref()
            .filter(|task| !task.handle.is_finished())
            .map(|task| PlaybackStatus {
                token: task.token.clone(),
                started_at: task.started_at,
                generation: task.generation,
            })
    }

    /// Start a new playback, enforcing the at-most-one invariant.
    ///
    /// Awaits the previous task first — cooperative, so this resolves
    /// within one frame duration when the task was cancelled, and after
    /// the remaining sentence audio otherwise. The fresh token also
    /// clears the session's cancellation signal for the new playback.
    pub(crate) async fn begin_playback(
        &self,
        frames: EncodedFrameStream,
        transport: Arc<dyn CallTransport>,
        frame_duration: Duration,
    ) {
        let _gate = self.start_gate.lock().await;

        let previous = self.playback.lock().unwrap().take();
        if let Some(task) = previous {
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    warn!("previous playback task panicked");
                }
            }
        }

        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }

        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stream_sid = self.stream_sid();
        let handle = tokio::spawn({
            let token = token.clone();
            async move {
                pace_frames(
                    frames,
                    transport.as_ref(),
                    &stream_sid,
                    &token,
                    frame_duration,
                )
                .await;
            }
        });

        *self.playback.lock().unwrap() = Some(PlaybackTask {
            token,
            started_at: Instant::now(),
            generation,
            handle,
        });
    }

    fn take_playback(&self) -> Option<PlaybackTask> {
        self.playback.lock().unwrap().take()
    }

    /// Mark teardown as started; returns `true` only for the first caller.
    fn start_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Orchestrates one call session over injected collaborators.
pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn CallTransport>,
    recognizer: Arc<dyn SpeechRecognizer>,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    detector: Arc<dyn SpeechDetector>,
    shared: Arc<SessionShared>,
    state: Mutex<SessionState>,
}

impl SessionController {
    /// Create a controller for one call. Uses the energy-based voice
    /// activity detector derived from the configured aggressiveness.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn CallTransport>,
        recognizer: Arc<dyn SpeechRecognizer>,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let detector = Arc::new(EnergyDetector::from_aggressiveness(
            config.vad_aggressiveness,
        ));
        Self {
            config,
            transport,
            recognizer,
            generator,
            synthesizer,
            detector,
            shared: Arc::new(SessionShared::new()),
            state: Mutex::new(SessionState::Connecting),
        }
    }

    /// Replace the voice-activity detector (model-backed detector, or a
    /// test double).
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn SpeechDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Run the session until the transport goes away or the dialogue
    /// fails unrecoverably. Teardown runs exactly once on every exit
    /// path; a failing exit closes the transport with the error's code.
    pub async fn run(&self, inbound: mpsc::Receiver<String>) -> Result<(), SessionError> {
        let result = self.run_loops(inbound).await;
        self.teardown().await;

        if let Err(ref e) = result {
            error!(error = %e, code = e.close_code(), "session failed; closing call");
            self.transport.close(e.close_code(), &e.to_string()).await;
        }
        result
    }

    async fn run_loops(&self, inbound: mpsc::Receiver<String>) -> Result<(), SessionError> {
        let transcripts = self
            .recognizer
            .take_transcripts()
            .ok_or(SessionError::TranscriptsUnavailable)?;

        let ingress = IngressLoop::new(
            self.config.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            Arc::clone(&self.recognizer),
            VoiceGate::new(&self.config, Arc::clone(&self.detector)),
        );

        self.set_state(SessionState::Active);

        // Whichever loop exits first ends the session: ingress on
        // stop/disconnect, dialogue on an unrecoverable error or the
        // transcript stream closing.
        tokio::select! {
            () = ingress.run(inbound) => Ok(()),
            result = self.dialogue_loop(transcripts) => result,
        }
    }

    // ── Dialogue loop ──────────────────────────────────────────────

    #[allow(clippy::cast_possible_truncation)]
    async fn dialogue_loop(&self, mut transcripts: TranscriptStream) -> Result<(), SessionError> {
        let mut recovered_once = false;

        while let Some(item) = transcripts.next().await {
            let segment = match item {
                Ok(segment) => segment,
                Err(SessionError::ResourceExhaustion) => {
                    self.recover_resources(&mut recovered_once)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if segment.no_speech_prob > self.config.no_speech_threshold {
                trace!(no_speech_prob = segment.no_speech_prob, "dropping non-speech segment");
                continue;
            }
            let text = segment.text.trim().to_string();
            if !is_meaningful(&text) {
                continue;
            }

            info!(transcript = %text, "caller utterance finalized");
            let turn_started = Instant::now();
            match self.dialogue_turn(&text).await {
                Ok(()) => debug!(
                    elapsed_ms = turn_started.elapsed().as_millis() as u64,
                    "dialogue turn complete"
                ),
                Err(SessionError::ResourceExhaustion) => {
                    self.recover_resources(&mut recovered_once)?;
                }
                Err(e) => return Err(e),
            }
        }

        info!("transcript stream ended");
        Ok(())
    }

    /// Stream one reply, speaking each sentence as soon as it completes.
    /// The trailing partial sentence is flushed and spoken the same way.
    async fn dialogue_turn(&self, text: &str) -> Result<(), SessionError> {
        let session_id = self.shared.call_sid();
        let mut tokens = self.generator.stream_reply(text, &session_id).await?;
        let mut segmenter = SentenceSegmenter::new();

        while let Some(token) = tokens.next().await {
            let token = token?;
            if token.is_empty() {
                continue;
            }
            if let Some(sentence) = segmenter.push(&token) {
                self.speak(&sentence).await?;
            }
        }
        if let Some(rest) = segmenter.flush() {
            self.speak(&rest).await?;
        }
        Ok(())
    }

    async fn speak(&self, sentence: &str) -> Result<(), SessionError> {
        if !is_meaningful(sentence) {
            return Ok(());
        }
        debug!(sentence, "speaking");
        let frames = self.synthesizer.synthesize(sentence).await?;
        self.shared
            .begin_playback(
                frames,
                Arc::clone(&self.transport),
                self.config.frame_duration(),
            )
            .await;
        Ok(())
    }

    /// One local recovery attempt for collaborator memory pressure; a
    /// recurrence closes the session with the distinct exhaustion code.
    fn recover_resources(&self, recovered_once: &mut bool) -> Result<(), SessionError> {
        if *recovered_once {
            return Err(SessionError::ResourceExhaustion);
        }
        warn!("collaborator reported resource exhaustion; releasing cached state");
        self.recognizer.release();
        self.generator.release();
        *recovered_once = true;
        Ok(())
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Idempotent: cancel and drain any outstanding playback, release
    /// collaborator resources, transition to `Closing`.
    async fn teardown(&self) {
        if !self.shared.start_teardown() {
            return;
        }
        self.set_state(SessionState::Closing);

        if let Some(task) = self.shared.take_playback() {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    warn!("playback task panicked during teardown");
                }
            }
        }

        self.recognizer.release();
        self.generator.release();
        info!("session resources released");
    }

    fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.lock().unwrap();
        if *state != new_state {
            debug!(old = ?*state, new = ?new_state, "session state transition");
            *state = new_state;
        }
    }
}
