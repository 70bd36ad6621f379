//! Voice: one oscillator and its envelope gain.
//!
//! A voice does not render anything itself; it turns note-on/note-off
//! into parameter automation on its two graph nodes. Availability is a
//! pure function of audio time, so nothing has to flip a flag when a
//! release finishes.

use sg_ir::{Adsr, Automation, GraphCommand, NodeId, OscillatorSettings, Param, Pitch, Waveform};

use crate::sink::GraphSink;

/// Extra time after a release before a voice may be reused, in seconds.
pub const DEFAULT_RELEASE_MARGIN: f64 = 0.1;

/// A reusable oscillator + gain pair.
#[derive(Clone, Debug)]
pub struct Voice {
    osc: NodeId,
    gain: NodeId,
    adsr: Adsr,
    wave: Waveform,
    /// Audio time from which the voice may be reallocated.
    busy_until: f64,
    release_margin: f64,
    pitch: Option<Pitch>,
}

impl Voice {
    /// Create an idle voice driving the given nodes.
    pub fn new(osc: NodeId, gain: NodeId, release_margin: f64) -> Self {
        Self {
            osc,
            gain,
            adsr: Adsr::default(),
            wave: Waveform::Sine,
            busy_until: f64::NEG_INFINITY,
            release_margin,
            pitch: None,
        }
    }

    pub fn osc_node(&self) -> NodeId {
        self.osc
    }

    pub fn gain_node(&self) -> NodeId {
        self.gain
    }

    /// Last pitch started on this voice.
    pub fn pitch(&self) -> Option<Pitch> {
        self.pitch
    }

    pub fn busy_until(&self) -> f64 {
        self.busy_until
    }

    /// Whether the voice may start a new note at audio time `t`.
    pub fn is_available(&self, t: f64) -> bool {
        t >= self.busy_until
    }

    /// Take waveform and envelope from the track settings for later notes.
    ///
    /// Does not retrigger anything already sounding.
    pub fn update<G: GraphSink + ?Sized>(&mut self, settings: &OscillatorSettings, graph: &mut G) {
        self.adsr = settings.adsr;
        if settings.wave != self.wave {
            self.wave = settings.wave;
            graph.send(GraphCommand::SetWaveform { node: self.osc, wave: self.wave });
        }
    }

    /// Start `pitch` at `start` with attack and decay toward sustain.
    ///
    /// The voice stays busy until a matching `off` is scheduled.
    pub fn on<G: GraphSink + ?Sized>(
        &mut self,
        pitch: Pitch,
        octave_shift: i32,
        start: f64,
        velocity: f32,
        graph: &mut G,
    ) {
        self.pitch = Some(pitch);
        self.busy_until = f64::INFINITY;

        let freq = pitch.frequency(octave_shift) as f32;
        let attack_end = start + self.adsr.attack as f64;
        let decay_end = attack_end + self.adsr.decay as f64;

        graph.send(GraphCommand::Automate {
            node: self.osc,
            param: Param::Frequency,
            event: Automation::SetValue { value: freq, time: start },
        });
        graph.send(GraphCommand::CancelScheduled { node: self.gain, param: Param::Gain, time: start });
        graph.send(gain_event(self.gain, Automation::SetValue { value: 0.0, time: start }));
        graph.send(gain_event(self.gain, Automation::LinearRamp { value: velocity, end_time: attack_end }));
        graph.send(gain_event(
            self.gain,
            Automation::LinearRamp { value: self.adsr.sustain * velocity, end_time: decay_end },
        ));
    }

    /// Release from whatever level the envelope has reached at `stop`.
    pub fn off<G: GraphSink + ?Sized>(&mut self, stop: f64, graph: &mut G) {
        let release = self.adsr.release as f64;
        graph.send(GraphCommand::CancelAndHold { node: self.gain, param: Param::Gain, time: stop });
        graph.send(gain_event(
            self.gain,
            Automation::SetTarget { target: 0.0, start: stop, time_constant: release / 5.0 },
        ));
        self.busy_until = stop + release + self.release_margin;
    }

    /// Hard stop: drop pending automation, mute at `now`, free immediately.
    pub fn silence<G: GraphSink + ?Sized>(&mut self, now: f64, graph: &mut G) {
        graph.send(GraphCommand::CancelScheduled { node: self.gain, param: Param::Gain, time: now });
        graph.send(gain_event(self.gain, Automation::SetValue { value: 0.0, time: now }));
        self.busy_until = now;
        self.pitch = None;
    }
}

fn gain_event(node: NodeId, event: Automation) -> GraphCommand {
    GraphCommand::Automate { node, param: Param::Gain, event }
}

/// The metronome's dedicated click voice: a fixed 1 kHz blip.
#[derive(Clone, Copy, Debug)]
pub struct ClickVoice {
    gain: NodeId,
}

/// Length of one click, in seconds.
pub const CLICK_LENGTH: f64 = 0.05;

impl ClickVoice {
    pub fn new(gain: NodeId) -> Self {
        Self { gain }
    }

    /// Schedule a click at `time`.
    pub fn click<G: GraphSink + ?Sized>(&self, time: f64, graph: &mut G) {
        let end = time + CLICK_LENGTH;
        graph.send(gain_event(self.gain, Automation::SetValue { value: 1.0, time }));
        graph.send(gain_event(self.gain, Automation::ExponentialRamp { value: 0.001, end_time: end }));
        graph.send(gain_event(self.gain, Automation::SetValue { value: 0.0, time: end }));
    }

    pub fn silence<G: GraphSink + ?Sized>(&self, now: f64, graph: &mut G) {
        graph.send(GraphCommand::CancelScheduled { node: self.gain, param: Param::Gain, time: now });
        graph.send(gain_event(self.gain, Automation::SetValue { value: 0.0, time: now }));
    }
}
