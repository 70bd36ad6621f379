//! Distortion transfer curves and their gain staging.

use std::f32::consts::PI;

use sg_ir::{DistortionModel, DistortionSettings};

/// Points in a distortion curve.
pub const CURVE_LEN: usize = 44_100;

/// Transfer curve for `model` at `depth` (0..1), sampled over x in [-1, 1).
pub fn distortion_curve(depth: f32, model: DistortionModel) -> Vec<f32> {
    (0..CURVE_LEN)
        .map(|i| {
            let x = i as f32 * 2.0 / CURVE_LEN as f32 - 1.0;
            match model {
                DistortionModel::Overdrive => {
                    let k = 1.0 + depth * 30.0;
                    libm::tanhf(k * x) / libm::tanhf(k)
                }
                DistortionModel::Fuzz => {
                    let k = 1.0 + depth * 60.0;
                    (2.0 / PI) * libm::atanf(k * x)
                }
                DistortionModel::Crush => {
                    let bits = 16.0 - depth * 14.0;
                    let steps = libm::powf(2.0, bits);
                    libm::roundf(x * steps) / steps
                }
            }
        })
        .collect()
}

/// Input boost and output attenuation around the shaper.
///
/// The output stage is scaled by the distortion `level`.
pub fn distortion_gains(settings: &DistortionSettings) -> (f32, f32) {
    let d = settings.depth;
    let (boost, atten) = match settings.model {
        DistortionModel::Fuzz => (2.0 + d * 10.0, 0.5 - d * 0.2),
        DistortionModel::Overdrive => (1.0 + d * 5.0, 0.8 - d * 0.2),
        DistortionModel::Crush => (1.0, 1.0),
    };
    (boost, atten * settings.level)
}
