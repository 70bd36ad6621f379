//! Synthetic reverb impulse responses.

use std::f64::consts::TAU;

use rand::Rng;
use sg_ir::{ImpulseResponse, ReverbModel};

use super::FxError;

/// Length of every generated impulse response, in seconds.
pub const IMPULSE_SECS: f64 = 4.0;

/// Generate a noise-based impulse response for `model`.
///
/// `decay` is the decay time in seconds. Samples are clipped to [-1, 1].
pub fn generate<R: Rng + ?Sized>(
    model: ReverbModel,
    decay: f32,
    sample_rate: u32,
    rng: &mut R,
) -> Result<ImpulseResponse, FxError> {
    if !decay.is_finite() || decay <= 0.0 {
        return Err(FxError::BadDecay(decay));
    }
    if sample_rate == 0 {
        return Err(FxError::ZeroSampleRate);
    }

    let decay = decay as f64;
    let sr = sample_rate as f64;
    let len = (IMPULSE_SECS * sr) as usize;
    let mut samples = Vec::with_capacity(len);
    let mut low = 0.0f64;

    for i in 0..len {
        let t = i as f64 / sr;
        let noise = rng.gen::<f64>() * 2.0 - 1.0;
        let value = match model {
            ReverbModel::Block => {
                // square-gated noise; the gate slows from 20 Hz toward 5 Hz
                let lfo = 20.0 * (-t).exp();
                let gate = if (t * lfo * TAU).sin() > 0.0 { 1.0 } else { 0.0 };
                let env = (1.0 - t / IMPULSE_SECS).powi(2);
                noise * gate * env
            }
            ReverbModel::Swarm => {
                let grain = (t * 800.0 + rng.gen::<f64>() * 10.0).sin();
                let env = (-t / decay).exp();
                let spike = if rng.gen::<f64>() > 0.99 { rng.gen::<f64>() * 0.5 } else { 0.0 };
                (noise * grain * 0.8 + spike) * env
            }
            ReverbModel::Abyss => {
                low += 0.05 * (noise - low);
                let attack = (t * 8.0).min(1.0);
                let env = (-t / (decay * 1.2)).exp();
                low * env * attack * 5.0
            }
        };
        samples.push(if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) as f32 });
    }

    Ok(ImpulseResponse { sample_rate, samples })
}
