//! Audio frame type.

/// A stereo audio frame (32-bit float, nominally within [-1, 1]).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: f32) -> Self {
        Self { left: value, right: value }
    }

    /// Convert to 16-bit PCM, clamping out-of-range values.
    pub fn to_i16(self) -> (i16, i16) {
        let conv = |s: f32| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        (conv(self.left), conv(self.right))
    }

    /// Largest absolute sample value.
    pub fn peak(self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}
