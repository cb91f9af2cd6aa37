//! Frame pacer — streams synthesized frames to the caller in real time.
//!
//! One pacer task runs per playback. For every frame it first checks the
//! cancellation token and connection liveness, then transmits the frame and
//! sleeps one frame duration, so outbound audio matches the original
//! timing. Cancellation is cooperative and honored within one frame
//! duration even when the synthesis stream itself is blocked: the pull from
//! the stream races the token inside `select!`, and on cancellation the
//! remaining stream output is simply dropped.
//!
//! Nothing propagates out of this module. Cancellation and disconnects are
//! expected, silent outcomes; synthesis-stream errors are logged and end
//! the playback early.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{CallTransport, EncodedFrameStream};
use crate::error::SessionError;
use crate::event::OutboundEvent;

/// Drive one playback to completion, cancellation, or disconnect.
pub async fn pace_frames(
    frames: EncodedFrameStream,
    transport: &dyn CallTransport,
    stream_sid: &str,
    cancel: &CancellationToken,
    frame_duration: Duration,
) {
    match pace_inner(frames, transport, stream_sid, cancel, frame_duration).await {
        Ok(()) => debug!(stream_sid, "playback completed"),
        Err(SessionError::PlaybackCancelled) => {
            debug!(stream_sid, "playback cancelled");
        }
        Err(SessionError::TransportDisconnect) => {
            debug!(stream_sid, "transport gone mid-playback");
        }
        Err(e) => warn!(stream_sid, error = %e, "playback ended early"),
    }
}

async fn pace_inner(
    mut frames: EncodedFrameStream,
    transport: &dyn CallTransport,
    stream_sid: &str,
    cancel: &CancellationToken,
    frame_duration: Duration,
) -> Result<(), SessionError> {
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::PlaybackCancelled);
        }
        if !transport.is_connected() {
            return Err(SessionError::TransportDisconnect);
        }

        // Race the next frame against cancellation so a slow or blocked
        // synthesis stream cannot delay a barge-in.
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::PlaybackCancelled),
            item = frames.next() => match item {
                None => return Ok(()),
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e),
            },
        };

        // A send failure means the connection is gone; whole frames only,
        // so nothing partial ever reaches the wire.
        if transport
            .send(OutboundEvent::media(stream_sid, &frame))
            .await
            .is_err()
        {
            return Err(SessionError::TransportDisconnect);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::PlaybackCancelled),
            () = tokio::time::sleep(frame_duration) => {}
        }
    }
}
