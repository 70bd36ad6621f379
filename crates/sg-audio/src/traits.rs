//! Audio output trait and error types.

use sg_engine::{Frame, FrameClock};
use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no audio device available")]
    NoDevice,
}

/// Trait for audio output backends.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Queue as many of `frames` as fit without blocking; returns how many were taken.
    fn write(&mut self, frames: &[Frame]) -> usize;

    /// Clock counting the frames the device has actually played.
    fn clock(&self) -> FrameClock;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}
