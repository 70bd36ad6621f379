//! The audio clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of "now" in audio-clock seconds.
pub trait AudioClock {
    fn now(&self) -> f64;
}

/// Clock driven by a count of rendered frames.
///
/// The audio callback advances the counter after each block; any other
/// thread may read it.
#[derive(Clone, Debug)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self { frames: Arc::new(AtomicU64::new(0)), sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Record that `n` more frames have been rendered.
    pub fn advance(&self, n: u64) {
        self.frames.fetch_add(n, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}
