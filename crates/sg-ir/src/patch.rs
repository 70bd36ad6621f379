//! Patch state: the declarative data model read by the scheduler.
//!
//! A `Patch` is owned by the UI layer and handed to the core as an
//! immutable snapshot. Edits go through `Patch::edit`, which clones,
//! mutates and re-sanitizes, so readers never observe a half-applied
//! change.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::pitch::Pitch;

/// Number of oscillator tracks.
pub const NUM_TRACKS: usize = 3;
/// Storage length of every sequencer track.
pub const STEPS_PER_TRACK: usize = 16;
/// Length of the circle-of-fifths shift lane.
pub const SHIFT_LANE_LEN: usize = 16;
/// Maximum notes stored in one step.
pub const MAX_NOTES_PER_STEP: usize = 4;
/// Largest shift-lane magnitude (fifths).
pub const MAX_SHIFT: i8 = 9;
/// Longest hold, in sixteenth notes.
pub const MAX_HOLD: u32 = 64;

pub const BPM_MIN: f32 = 40.0;
pub const BPM_MAX: f32 = 300.0;

/// Clamp that maps NaN to the lower bound.
fn clamp(v: f32, lo: f32, hi: f32) -> f32 {
    if v.is_nan() {
        lo
    } else {
        v.clamp(lo, hi)
    }
}

// --- Notes and steps ---

/// A note stored in a sequencer step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub name: Pitch,
    pub velocity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
}

impl Note {
    pub fn new(name: Pitch, velocity: f32) -> Self {
        Self { name, velocity, duration: None }
    }
}

/// One position of a sequencer track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequencerStep {
    pub notes: ArrayVec<Note, MAX_NOTES_PER_STEP>,
    pub enabled: bool,
    pub probability: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chord_name: Option<String>,
}

impl Default for SequencerStep {
    fn default() -> Self {
        Self { notes: ArrayVec::new(), enabled: true, probability: 1.0, chord_name: None }
    }
}

impl SequencerStep {
    /// An enabled step holding the given notes (extra notes beyond four are dropped).
    pub fn chord(notes: &[Note]) -> Self {
        let mut step = Self::default();
        for n in notes.iter().take(MAX_NOTES_PER_STEP) {
            step.notes.push(*n);
        }
        step
    }

    /// Whether the step can ever sound, ignoring probability.
    pub fn is_armed(&self) -> bool {
        self.enabled && !self.notes.is_empty()
    }
}

pub type SequencerTrack = [SequencerStep; STEPS_PER_TRACK];

fn empty_track() -> SequencerTrack {
    std::array::from_fn(|_| SequencerStep::default())
}

/// The step grid, the shift lane and their cycle lengths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequencerState {
    /// One track per oscillator.
    pub steps: Vec<SequencerTrack>,
    /// Circle-of-fifths transposition per shift position.
    pub shift_steps: [i8; SHIFT_LANE_LEN],
    /// Active cycle length of the main lane.
    pub step_count: usize,
    /// Main-lane ticks per shift-lane position.
    pub shift_duration: u32,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            steps: (0..NUM_TRACKS).map(|_| empty_track()).collect(),
            shift_steps: [0; SHIFT_LANE_LEN],
            step_count: STEPS_PER_TRACK,
            shift_duration: 1,
        }
    }
}

// --- Oscillators ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArpMode {
    #[default]
    Up,
    Down,
    Random,
    Converge,
}

/// Attack / decay / release in seconds, sustain as a ratio of velocity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Adsr {
    fn default() -> Self {
        Self { attack: 0.05, decay: 0.3, sustain: 0.6, release: 0.5 }
    }
}

impl Adsr {
    fn sanitized(self) -> Self {
        Self {
            attack: clamp(self.attack, 0.0, 10.0),
            decay: clamp(self.decay, 0.0, 10.0),
            sustain: clamp(self.sustain, 0.0, 1.0),
            release: clamp(self.release, 0.0, 10.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub freq: f32,
    pub res: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self { freq: 20_000.0, res: 0.0 }
    }
}

impl FilterSettings {
    /// Biquad Q derived from the resonance knob.
    pub fn q(&self) -> f32 {
        self.res * self.res * self.res * 20.0 + 0.1
    }
}

/// Per-track effect send levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sends {
    pub delay: f32,
    pub reverb: f32,
    pub disto: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OscillatorSettings {
    pub id: u32,
    pub wave: Waveform,
    #[serde(rename = "vol")]
    pub volume: f32,
    /// Octave transposition applied on top of each note's own octave.
    pub octave: i32,
    pub adsr: Adsr,
    pub filter: FilterSettings,
    pub sends: Sends,
    pub muted: bool,
    /// Sixteenths a chord sustains, or arp ticks to play when `arp` is set.
    pub hold: u32,
    pub arp: bool,
    pub arp_mode: ArpMode,
}

impl Default for OscillatorSettings {
    fn default() -> Self {
        Self {
            id: 0,
            wave: Waveform::Sine,
            volume: 0.5,
            octave: 0,
            adsr: Adsr::default(),
            filter: FilterSettings::default(),
            sends: Sends::default(),
            muted: false,
            hold: 1,
            arp: false,
            arp_mode: ArpMode::Up,
        }
    }
}

impl OscillatorSettings {
    /// Gain the track should sit at, honoring mute.
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

// --- Transport ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportState {
    pub is_playing: bool,
    pub bpm: f32,
    pub master_volume: f32,
    pub metronome_on: bool,
    /// 50 is straight time.
    pub swing: f32,
    pub midi_clock_out: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: false,
            bpm: 120.0,
            master_volume: 0.8,
            metronome_on: false,
            swing: 50.0,
            midi_clock_out: false,
        }
    }
}

impl TransportState {
    /// Unswung duration of one sixteenth note, in seconds.
    pub fn sixteenth(&self) -> f64 {
        15.0 / self.bpm as f64
    }
}

// --- Effects ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbModel {
    #[default]
    Block,
    Swarm,
    Abyss,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistortionModel {
    Fuzz,
    #[default]
    Overdrive,
    Crush,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbSettings {
    /// Decay time in seconds.
    pub time: f32,
    pub depth: f32,
    pub damper: f32,
    pub model: ReverbModel,
    pub gain: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self { time: 3.0, depth: 0.5, damper: 8000.0, model: ReverbModel::Block, gain: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    /// Delay time in milliseconds.
    pub time: f32,
    pub feedback: f32,
    /// Note-division label shown by the UI ("1/4", "1/8." ...).
    pub division: String,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self { time: 250.0, feedback: 0.0, division: "1/4".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionSettings {
    pub depth: f32,
    pub level: f32,
    pub model: DistortionModel,
}

impl Default for DistortionSettings {
    fn default() -> Self {
        Self { depth: 0.0, level: 0.8, model: DistortionModel::Overdrive }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxState {
    pub reverb: ReverbSettings,
    pub delay: DelaySettings,
    pub distortion: DistortionSettings,
}

/// Longest delay line, in milliseconds.
pub const MAX_DELAY_MS: f32 = 5000.0;

// --- Patch ---

/// The complete synth state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub transport: TransportState,
    pub oscillators: Vec<OscillatorSettings>,
    pub sequencer: SequencerState,
    pub fx: FxState,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            transport: TransportState::default(),
            oscillators: (1..=NUM_TRACKS as u32)
                .map(|id| OscillatorSettings { id, ..Default::default() })
                .collect(),
            sequencer: SequencerState::default(),
            fx: FxState::default(),
        }
    }
}

impl Patch {
    /// Copy-on-write edit: clone, apply `f`, re-sanitize.
    pub fn edit(&self, f: impl FnOnce(&mut Patch)) -> Patch {
        let mut next = self.clone();
        f(&mut next);
        next.sanitized()
    }

    /// Number of tracks that have both oscillator settings and a step lane.
    pub fn track_count(&self) -> usize {
        self.oscillators.len().min(self.sequencer.steps.len())
    }

    /// A copy with every numeric parameter clamped into range.
    pub fn sanitized(&self) -> Patch {
        let mut p = self.clone();

        let t = &mut p.transport;
        t.bpm = clamp(t.bpm, BPM_MIN, BPM_MAX);
        t.master_volume = clamp(t.master_volume, 0.0, 1.0);
        t.swing = clamp(t.swing, 0.0, 100.0);

        for osc in &mut p.oscillators {
            osc.volume = clamp(osc.volume, 0.0, 1.0);
            osc.octave = osc.octave.clamp(-4, 4);
            osc.adsr = osc.adsr.sanitized();
            osc.filter.freq = clamp(osc.filter.freq, 20.0, 20_000.0);
            osc.filter.res = clamp(osc.filter.res, 0.0, 1.0);
            osc.sends.delay = clamp(osc.sends.delay, 0.0, 1.0);
            osc.sends.reverb = clamp(osc.sends.reverb, 0.0, 1.0);
            osc.sends.disto = clamp(osc.sends.disto, 0.0, 1.0);
            osc.hold = osc.hold.clamp(1, MAX_HOLD);
        }

        let seq = &mut p.sequencer;
        seq.step_count = seq.step_count.clamp(1, STEPS_PER_TRACK);
        seq.shift_duration = seq.shift_duration.max(1);
        for shift in &mut seq.shift_steps {
            *shift = (*shift).clamp(-MAX_SHIFT, MAX_SHIFT);
        }
        for track in &mut seq.steps {
            for step in track.iter_mut() {
                step.probability = clamp(step.probability, 0.0, 1.0);
                for note in &mut step.notes {
                    note.velocity = clamp(note.velocity, 0.0, 1.0);
                }
            }
        }

        let fx = &mut p.fx;
        fx.delay.time = clamp(fx.delay.time, 0.0, MAX_DELAY_MS);
        fx.delay.feedback = clamp(fx.delay.feedback, 0.0, 1.0);
        fx.distortion.depth = clamp(fx.distortion.depth, 0.0, 1.0);
        fx.distortion.level = clamp(fx.distortion.level, 0.0, 1.0);
        fx.reverb.time = clamp(fx.reverb.time, 0.1, 20.0);
        fx.reverb.depth = clamp(fx.reverb.depth, 0.0, 1.0);
        fx.reverb.gain = clamp(fx.reverb.gain, 0.0, 2.0);

        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(name: &str) -> Note {
        Note::new(name.parse().unwrap(), 1.0)
    }

    #[test]
    fn default_patch_has_three_sixteen_step_tracks() {
        let p = Patch::default();
        assert_eq!(p.track_count(), NUM_TRACKS);
        assert_eq!(p.sequencer.steps[0].len(), STEPS_PER_TRACK);
        assert!(p.sequencer.steps[0].iter().all(|s| s.enabled && s.notes.is_empty()));
        assert_eq!(p.transport.swing, 50.0);
    }

    #[test]
    fn sixteenth_at_120_bpm() {
        let t = TransportState::default();
        assert!((t.sixteenth() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn sanitize_clamps_instead_of_rejecting() {
        let p = Patch::default().edit(|p| {
            p.transport.bpm = 999.0;
            p.transport.swing = -5.0;
            p.transport.master_volume = f32::NAN;
            p.oscillators[0].hold = 0;
            p.sequencer.shift_steps[3] = 40;
            p.sequencer.step_count = 0;
            p.sequencer.shift_duration = 0;
            p.sequencer.steps[1][2].probability = 1.5;
        });
        assert_eq!(p.transport.bpm, BPM_MAX);
        assert_eq!(p.transport.swing, 0.0);
        assert_eq!(p.transport.master_volume, 0.0);
        assert_eq!(p.oscillators[0].hold, 1);
        assert_eq!(p.sequencer.shift_steps[3], MAX_SHIFT);
        assert_eq!(p.sequencer.step_count, 1);
        assert_eq!(p.sequencer.shift_duration, 1);
        assert_eq!(p.sequencer.steps[1][2].probability, 1.0);
    }

    #[test]
    fn edit_leaves_original_untouched() {
        let original = Patch::default();
        let edited = original.edit(|p| p.transport.bpm = 90.0);
        assert_eq!(original.transport.bpm, 120.0);
        assert_eq!(edited.transport.bpm, 90.0);
    }

    #[test]
    fn chord_truncates_to_four_notes() {
        let step = SequencerStep::chord(&[note("C4"), note("E4"), note("G4"), note("B4"), note("D5")]);
        assert_eq!(step.notes.len(), MAX_NOTES_PER_STEP);
        assert!(step.is_armed());
    }

    #[test]
    fn empty_step_is_never_armed() {
        let step = SequencerStep { enabled: true, ..Default::default() };
        assert!(!step.is_armed());
    }

    #[test]
    fn filter_q_from_resonance() {
        let f = FilterSettings { freq: 1000.0, res: 1.0 };
        assert!((f.q() - 20.1).abs() < 1e-5);
        let f = FilterSettings { freq: 1000.0, res: 0.0 };
        assert!((f.q() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn muted_track_has_zero_volume() {
        let osc = OscillatorSettings { muted: true, volume: 0.7, ..Default::default() };
        assert_eq!(osc.effective_volume(), 0.0);
    }

    #[test]
    fn camel_case_document_fields() {
        let json = serde_json::to_value(Patch::default()).unwrap();
        assert!(json["transport"]["masterVolume"].is_number());
        assert!(json["oscillators"][0]["arpMode"].is_string());
        assert!(json["oscillators"][0]["vol"].is_number());
        assert!(json["sequencer"]["shiftSteps"].is_array());
        assert_eq!(json["fx"]["distortion"]["model"], "overdrive");
    }
}
