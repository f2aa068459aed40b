//! Recorder state machine.
//!
//! ```text
//! Idle ──arm()──▶ Armed ──disarm()──▶ Finalizing ──encoder closed──▶ Idle
//!                                                 ──encoder error───▶ Idle
//! ```
//!
//! Only `Armed` accepts frames.  `Finalizing` rejects frames immediately
//! while the encoder flushes on its own thread.

/// States of the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No encoder allocated.
    Idle,

    /// Encoder allocated; every offered frame is encoded unless the encoder
    /// signals back-pressure.
    Armed,

    /// Disarmed; the encoder is flushing and closing the artifact.
    Finalizing,
}

impl RecorderState {
    /// Returns `true` only while frames are being accepted.
    ///
    /// ```
    /// use throw_coach::recorder::RecorderState;
    ///
    /// assert!(!RecorderState::Idle.accepts_frames());
    /// assert!(RecorderState::Armed.accepts_frames());
    /// assert!(!RecorderState::Finalizing.accepts_frames());
    /// ```
    pub fn accepts_frames(&self) -> bool {
        matches!(self, RecorderState::Armed)
    }

    /// Returns `true` while an encoder is owned (armed or finalizing).
    /// A new recording cannot be armed until this is `false`.
    pub fn is_busy(&self) -> bool {
        !matches!(self, RecorderState::Idle)
    }

    /// A short human-readable label suitable for a status bar.
    pub fn label(&self) -> &'static str {
        match self {
            RecorderState::Idle => "Idle",
            RecorderState::Armed => "Recording",
            RecorderState::Finalizing => "Saving",
        }
    }
}

impl Default for RecorderState {
    fn default() -> Self {
        RecorderState::Idle
    }
}
