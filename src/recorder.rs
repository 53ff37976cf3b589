//! Voice recording state machine.
//!
//! Process-wide singleton state: at most one recording session exists at a
//! time, enforced here and not by callers. Transitions happen under one
//! mutex, so two racing `start` calls cannot both observe `Idle`.
//!
//! The actual audio hardware sits behind [`AudioCapture`]. The engine feeds
//! the captured bytes to transcription and ingestion after `stop` returns;
//! by then the machine is already back in `Idle`, so a slow transcription
//! never blocks the next session.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::error::{EngineError, EngineResult};

/// Audio capture collaborator. `begin` opens a session, `finish` closes it
/// and yields the captured WAV bytes, `abort` discards it.
pub trait AudioCapture: Send + Sync {
    fn begin(&self) -> Result<()>;
    fn finish(&self) -> Result<Vec<u8>>;
    fn abort(&self);
}

/// Capture backend for builds without a recording device. `start_recording`
/// fails immediately instead of accepting sessions that can never finish.
pub struct DisabledCapture;

impl AudioCapture for DisabledCapture {
    fn begin(&self) -> Result<()> {
        anyhow::bail!("no audio capture device is configured")
    }
    fn finish(&self) -> Result<Vec<u8>> {
        anyhow::bail!("no audio capture device is configured")
    }
    fn abort(&self) {}
}

/// In-memory capture fed programmatically. Used by tests and by hosts that
/// record audio themselves.
#[derive(Default)]
pub struct MemoryCapture {
    audio: Mutex<Vec<u8>>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bytes the next `finish` will return.
    pub fn set_audio(&self, bytes: Vec<u8>) {
        *self.audio.lock().unwrap() = bytes;
    }
}

impl AudioCapture for MemoryCapture {
    fn begin(&self) -> Result<()> {
        Ok(())
    }
    fn finish(&self) -> Result<Vec<u8>> {
        Ok(self.audio.lock().unwrap().clone())
    }
    fn abort(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

pub struct Recorder {
    state: Mutex<RecordingState>,
    capture: Arc<dyn AudioCapture>,
}

impl Recorder {
    pub fn new(capture: Arc<dyn AudioCapture>) -> Self {
        Self {
            state: Mutex::new(RecordingState::Idle),
            capture,
        }
    }

    pub fn state(&self) -> RecordingState {
        *self.state.lock().unwrap()
    }

    /// Begin a session. Fails with [`EngineError::AlreadyRecording`] while
    /// one is active; a capture failure leaves the machine in `Idle`.
    pub fn start(&self) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if *state == RecordingState::Recording {
            return Err(EngineError::AlreadyRecording);
        }
        self.capture
            .begin()
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))?;
        *state = RecordingState::Recording;
        Ok(())
    }

    /// End the session and return the captured audio. The machine is back
    /// in `Idle` on return, success or not.
    pub fn stop(&self) -> EngineResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if *state == RecordingState::Idle {
            return Err(EngineError::NotRecording);
        }
        *state = RecordingState::Idle;
        self.capture
            .finish()
            .map_err(|e| EngineError::CaptureFailed(e.to_string()))
    }

    /// Abandon the session, discarding any captured audio.
    pub fn cancel(&self) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if *state == RecordingState::Idle {
            return Err(EngineError::NotRecording);
        }
        *state = RecordingState::Idle;
        self.capture.abort();
        Ok(())
    }
}
