//! Barge-in arbiter — decides when the caller is interrupting playback.
//!
//! A small state machine over consecutive frame decisions:
//!
//! ```text
//!   Idle (streak = 0) → Armed (0 < streak < threshold) → Triggered
//!          ▲                      │
//!          └──── unvoiced frame ──┘
//! ```
//!
//! The arbiter is pure: it only counts. Side effects on `Triggered`
//! (cancelling the playback token, emitting `clear`) belong to the ingress
//! loop, which also resets the arbiter whenever a new playback begins.

/// Arbiter state after observing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeState {
    /// No voiced streak in progress.
    Idle,

    /// Voiced streak building, below the trigger threshold.
    Armed,

    /// Threshold reached — the caller is barging in. Terminal for the
    /// current playback.
    Triggered,
}

/// Consecutive-voiced-frame counter with a trigger threshold.
#[derive(Debug)]
pub struct BargeArbiter {
    streak: u32,
    threshold: u32,
}

impl BargeArbiter {
    /// Create an arbiter that triggers after `threshold` consecutive
    /// voiced frames (≈ `threshold × frame_ms` of sustained speech).
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            streak: 0,
            threshold: if threshold == 0 { 1 } else { threshold },
        }
    }

    /// Observe one frame decision and return the resulting state.
    ///
    /// On `Triggered` the streak resets to zero, so a single arbiter can
    /// arm again for a later playback.
    pub fn observe(&mut self, voiced: bool) -> BargeState {
        if !voiced {
            self.streak = 0;
            return BargeState::Idle;
        }
        self.streak += 1;
        if self.streak >= self.threshold {
            self.streak = 0;
            BargeState::Triggered
        } else {
            BargeState::Armed
        }
    }

    /// Reset to `Idle`. Called when a new playback task begins.
    pub fn reset(&mut self) {
        self.streak = 0;
    }

    /// Current voiced streak length.
    #[must_use]
    pub const fn streak(&self) -> u32 {
        self.streak
    }
}
