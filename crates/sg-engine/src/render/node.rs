//! Per-node render state.

use std::f64::consts::TAU;
use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use sg_ir::{NodeKind, Param, ParamTimeline, Waveform, MAX_DELAY_MS};

use super::convolver::Convolver;

/// Room for automation events per parameter before pushes reallocate.
const PARAM_CAPACITY: usize = 64;

fn timeline(value: f32) -> ParamTimeline {
    ParamTimeline::with_capacity(value, PARAM_CAPACITY)
}

/// Render state for one graph node.
pub enum NodeState {
    Destination,
    Oscillator(Oscillator),
    Gain { gain: ParamTimeline },
    Filter(Filter),
    Delay(DelayLine),
    Convolver(Box<Convolver>),
    WaveShaper { curve: Option<Arc<[f32]>> },
}

impl NodeState {
    /// Fresh state for a node of `kind`.
    pub fn new(kind: NodeKind, defaults: &[(Param, f32)], sample_rate: u32) -> Self {
        let default = |param: Param, fallback: f32| {
            defaults.iter().find(|(p, _)| *p == param).map_or(fallback, |(_, v)| *v)
        };
        match kind {
            NodeKind::Destination => NodeState::Destination,
            NodeKind::Oscillator => NodeState::Oscillator(Oscillator {
                wave: Waveform::Sine,
                phase: 0.0,
                freq: timeline(default(Param::Frequency, 440.0)),
            }),
            NodeKind::Gain => NodeState::Gain { gain: timeline(default(Param::Gain, 1.0)) },
            NodeKind::Filter => NodeState::Filter(Filter::new(
                default(Param::Frequency, 350.0),
                default(Param::Q, 1.0),
                sample_rate,
            )),
            NodeKind::Delay => NodeState::Delay(DelayLine::new(default(Param::DelayTime, 0.0), sample_rate)),
            NodeKind::Convolver => NodeState::Convolver(Box::new(Convolver::new(sample_rate))),
            NodeKind::WaveShaper => NodeState::WaveShaper { curve: None },
        }
    }

    /// The node's timeline for `param`, if it has one.
    pub fn param_mut(&mut self, param: Param) -> Option<&mut ParamTimeline> {
        match (self, param) {
            (NodeState::Oscillator(o), Param::Frequency) => Some(&mut o.freq),
            (NodeState::Gain { gain }, Param::Gain) => Some(gain),
            (NodeState::Filter(f), Param::Frequency) => Some(&mut f.freq),
            (NodeState::Filter(f), Param::Q) => Some(&mut f.q),
            (NodeState::Delay(d), Param::DelayTime) => Some(&mut d.time),
            _ => None,
        }
    }

    /// Fold automation that has fully elapsed by `t`.
    pub fn retire(&mut self, t: f64) {
        match self {
            NodeState::Oscillator(o) => o.freq.retire(t),
            NodeState::Gain { gain } => gain.retire(t),
            NodeState::Filter(f) => {
                f.freq.retire(t);
                f.q.retire(t);
            }
            NodeState::Delay(d) => d.time.retire(t),
            _ => {}
        }
    }

    /// Produce one output sample from the summed input at audio time `t`.
    ///
    /// Delay nodes only read here; their input is written by `DelayLine::write`.
    #[inline]
    pub fn process(&mut self, input: f32, t: f64, sample_rate: f64) -> f32 {
        match self {
            NodeState::Destination => input,
            NodeState::Oscillator(o) => o.next(t, sample_rate),
            NodeState::Gain { gain } => input * gain.value_at(t),
            NodeState::Filter(f) => f.run(input, t),
            NodeState::Delay(d) => d.read(t),
            NodeState::Convolver(c) => c.process(input),
            NodeState::WaveShaper { curve } => match curve {
                Some(curve) => shape(curve, input),
                None => input,
            },
        }
    }
}

pub struct Oscillator {
    pub wave: Waveform,
    phase: f64,
    freq: ParamTimeline,
}

impl Oscillator {
    #[inline]
    fn next(&mut self, t: f64, sample_rate: f64) -> f32 {
        let phase = self.phase;
        let out = match self.wave {
            Waveform::Sine => libm::sin(TAU * phase) as f32,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => (2.0 * phase - 1.0) as f32,
            Waveform::Triangle => (4.0 * (phase - 0.5).abs() - 1.0) as f32,
        };
        let freq = self.freq.value_at(t) as f64;
        self.phase = (phase + freq / sample_rate).rem_euclid(1.0);
        out
    }
}

/// Samples between checks of the cutoff and Q automation.
const RETUNE_INTERVAL: u32 = 16;

/// Resonant low-pass with automatable cutoff and Q.
pub struct Filter {
    freq: ParamTimeline,
    q: ParamTimeline,
    biquad: DirectForm2Transposed<f32>,
    /// Cutoff and Q the coefficients were computed for.
    current: (f32, f32),
    /// Samples left until the next automation check.
    countdown: u32,
    sample_rate: f32,
}

impl Filter {
    fn new(freq: f32, q: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let mut filter = Self {
            freq: timeline(freq),
            q: timeline(q),
            biquad: DirectForm2Transposed::<f32>::new(passthrough()),
            current: (f32::NAN, f32::NAN),
            countdown: 0,
            sample_rate,
        };
        filter.retune(freq, q);
        filter
    }

    fn retune(&mut self, freq: f32, q: f32) {
        let nyquist_safe = 0.45 * self.sample_rate;
        let f0 = freq.min(nyquist_safe).max(10.0);
        let q = q.max(0.01);
        if let Ok(coeffs) = Coefficients::<f32>::from_params(Type::LowPass, self.sample_rate.hz(), f0.hz(), q) {
            self.biquad.update_coefficients(coeffs);
            self.current = (freq, q);
        }
    }

    #[inline]
    fn run(&mut self, input: f32, t: f64) -> f32 {
        if self.countdown == 0 {
            self.countdown = RETUNE_INTERVAL;
            let freq = self.freq.value_at(t);
            let q = self.q.value_at(t);
            let (cf, cq) = self.current;
            if (freq - cf).abs() > 0.01 || (q - cq).abs() > 1e-4 {
                self.retune(freq, q);
            }
        }
        self.countdown -= 1;
        self.biquad.run(input)
    }
}

/// Identity coefficients for a freshly built filter.
fn passthrough() -> Coefficients<f32> {
    Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 }
}

/// Delay line with a fractional, automatable delay time (seconds).
pub struct DelayLine {
    time: ParamTimeline,
    buffer: Vec<f32>,
    write: usize,
    sample_rate: f64,
}

impl DelayLine {
    fn new(time: f32, sample_rate: u32) -> Self {
        let len = (MAX_DELAY_MS as f64 / 1000.0 * sample_rate as f64) as usize + 3;
        Self { time: timeline(time), buffer: vec![0.0; len], write: 0, sample_rate: sample_rate as f64 }
    }

    /// Read the delayed sample; never less than one sample of delay.
    #[inline]
    fn read(&self, t: f64) -> f32 {
        let len = self.buffer.len();
        let max = (len - 2) as f64;
        let d = (self.time.value_at(t) as f64 * self.sample_rate).clamp(1.0, max);
        let whole = d.floor();
        let frac = (d - whole) as f32;
        let i0 = (self.write + len - whole as usize) % len;
        let i1 = (i0 + len - 1) % len;
        let a = self.buffer[i0];
        let b = self.buffer[i1];
        a + (b - a) * frac
    }

    /// Store this sample's input and advance.
    #[inline]
    pub fn write(&mut self, input: f32) {
        self.buffer[self.write] = input;
        self.write = (self.write + 1) % self.buffer.len();
    }
}

/// Linear lookup into a transfer curve spanning x in [-1, 1].
#[inline]
pub fn shape(curve: &[f32], x: f32) -> f32 {
    let n = curve.len();
    match n {
        0 => x,
        1 => curve[0],
        _ => {
            let v = (n - 1) as f32 * (x.clamp(-1.0, 1.0) + 1.0) * 0.5;
            let k = (v.floor() as usize).min(n - 2);
            let f = v - k as f32;
            curve[k] + (curve[k + 1] - curve[k]) * f
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_ir::Automation;

    #[test]
    fn shaper_interpolates_and_clamps() {
        let curve = [-1.0, 0.0, 1.0];
        assert_eq!(shape(&curve, -2.0), -1.0);
        assert_eq!(shape(&curve, 0.0), 0.0);
        assert!((shape(&curve, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(shape(&curve, 1.0), 1.0);
    }

    #[test]
    fn delay_reads_back_after_delay_time() {
        let mut d = DelayLine::new(0.01, 1000);
        let mut out = Vec::new();
        for i in 0..30 {
            out.push(d.read(0.0));
            d.write(if i == 0 { 1.0 } else { 0.0 });
        }
        let peak = out.iter().position(|&s| s > 0.99);
        assert_eq!(peak, Some(10));
    }

    #[test]
    fn square_oscillator_alternates() {
        let mut o = Oscillator { wave: Waveform::Square, phase: 0.0, freq: timeline(1.0) };
        let samples: Vec<f32> = (0..4).map(|_| o.next(0.0, 4.0)).collect();
        assert_eq!(samples, vec![1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn gain_follows_automation() {
        let mut node = NodeState::new(NodeKind::Gain, &[(Param::Gain, 0.0)], 100);
        node.param_mut(Param::Gain).unwrap().push(Automation::SetValue { value: 0.5, time: 1.0 });
        assert_eq!(node.process(2.0, 0.5, 100.0), 0.0);
        assert_eq!(node.process(2.0, 1.0, 100.0), 1.0);
        assert!(node.param_mut(Param::Q).is_none());
    }

    #[test]
    fn delay_survives_zero_sample_rate() {
        let mut d = DelayLine::new(0.25, 0);
        assert_eq!(d.read(0.0), 0.0);
        d.write(1.0);
        assert!(d.read(0.1).is_finite());
    }

    #[test]
    fn cutoff_glide_retunes_once_per_interval() {
        let mut f = Filter::new(200.0, 0.707, 1_000);
        f.freq.push(Automation::SetValue { value: 200.0, time: 0.0 });
        f.freq.push(Automation::LinearRamp { value: 400.0, end_time: 1.0 });
        let n = RETUNE_INTERVAL as usize;
        f.run(0.0, 0.0);
        assert_eq!(f.current.0, 200.0);
        for i in 1..n {
            f.run(0.0, i as f64 / 1_000.0);
            assert_eq!(f.current.0, 200.0);
        }
        f.run(0.0, n as f64 / 1_000.0);
        assert!((f.current.0 - 203.2).abs() < 1e-3);
    }

    #[test]
    fn low_pass_attenuates_high_frequencies() {
        let mut f = Filter::new(200.0, 0.707, 44_100);
        let mut peak: f32 = 0.0;
        for i in 0..4410 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = f.run(x, 0.0);
            if i > 1000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "peak {peak}");
    }
}
