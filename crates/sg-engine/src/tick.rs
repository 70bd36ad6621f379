//! Tick engine: turns one sequencer subdivision into scheduled events.
//!
//! The engine is pure with respect to audio: it reads a patch snapshot,
//! advances each track's state machine, and appends `Event`s for the
//! scheduler to execute. Randomness (probability gate, random arp) comes
//! from the injected `Rng`.

use arrayvec::ArrayVec;
use rand::Rng;
use sg_ir::{
    Event, EventPayload, EventTarget, MidiMessage, Note, Patch, StepEvent, MAX_NOTES_PER_STEP,
    SHIFT_LANE_LEN, STEPS_PER_TRACK,
};
use thiserror::Error;
use tracing::trace;

use crate::arp::{arp_index, sorted_notes};

/// Fraction of a sixteenth an arpeggiated note sounds for.
pub const ARP_GATE: f64 = 0.95;

/// MIDI clock pulses per sixteenth (24 PPQN).
pub const MIDI_PULSES_PER_STEP: usize = 6;

/// Errors that abort a single tick.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("patch has {patch} tracks but the synth graph was built for {graph}")]
    TrackMismatch { patch: usize, graph: usize },
}

/// Where and when one tick happens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    /// Scheduled audio time of the subdivision.
    pub time: f64,
    /// Length of this (possibly swung) subdivision.
    pub duration: f64,
    pub main_step: usize,
    pub shift_step: usize,
}

/// Per-track playback state.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TrackMode {
    #[default]
    Idle,
    /// A chord (or the last arp note) is sounding until `until`.
    Sounding { until: f64 },
    /// Arpeggiating `notes` (sorted, untransposed); `next` is the arp tick to emit.
    Arpeggiating { notes: ArrayVec<Note, MAX_NOTES_PER_STEP>, next: usize, remaining: u32 },
}

/// Computes the events of each subdivision.
pub struct TickEngine<R> {
    tracks: Vec<TrackMode>,
    rng: R,
}

impl<R: Rng> TickEngine<R> {
    /// Create an engine for `track_count` voice pools.
    pub fn new(track_count: usize, rng: R) -> Self {
        Self { tracks: vec![TrackMode::Idle; track_count], rng }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn mode(&self, track: usize) -> Option<&TrackMode> {
        self.tracks.get(track)
    }

    /// Return every track to `Idle`.
    pub fn reset(&mut self) {
        self.tracks.iter_mut().for_each(|m| *m = TrackMode::Idle);
    }

    /// Run one subdivision, appending its events to `out`.
    ///
    /// Nothing is appended and no state changes when the patch does not
    /// match the track count the engine was built for.
    pub fn tick(&mut self, patch: &Patch, ctx: &TickContext, out: &mut Vec<Event>) -> Result<StepEvent, TickError> {
        let graph = self.tracks.len();
        if patch.track_count() != graph {
            return Err(TickError::TrackMismatch { patch: patch.track_count(), graph });
        }

        let t = ctx.time;
        let transport = &patch.transport;
        let sixteenth = transport.sixteenth();
        let gate = ARP_GATE * sixteenth;
        let seq = &patch.sequencer;
        let main = ctx.main_step % STEPS_PER_TRACK;
        let shift = seq.shift_steps[ctx.shift_step % SHIFT_LANE_LEN] as i32;

        if transport.metronome_on && main % 4 == 0 {
            out.push(Event::new(t, EventTarget::Metronome, EventPayload::Click));
        }
        if transport.midi_clock_out {
            let pulse = ctx.duration / MIDI_PULSES_PER_STEP as f64;
            for i in 0..MIDI_PULSES_PER_STEP {
                out.push(Event::new(
                    t + i as f64 * pulse,
                    EventTarget::Midi,
                    EventPayload::Midi(MidiMessage::Clock),
                ));
            }
        }

        let mut arp_triggered = Vec::new();
        for (i, mode) in self.tracks.iter_mut().enumerate() {
            let osc = &patch.oscillators[i];
            let step = &seq.steps[i][main];
            let track = i as u8;
            let hit = step.is_armed() && self.rng.gen::<f32>() < step.probability;

            if hit && osc.arp {
                let notes = sorted_notes(&step.notes);
                let idx = arp_index(osc.arp_mode, 0, notes.len(), &mut self.rng);
                let note = notes[idx];
                out.push(Event::note(t, track, note.name.shift_fifths(shift), note.velocity, gate));
                arp_triggered.push(i);
                let remaining = osc.hold.max(1) - 1;
                *mode = if remaining > 0 {
                    TrackMode::Arpeggiating { notes, next: 1, remaining }
                } else {
                    TrackMode::Sounding { until: t + gate }
                };
            } else if hit {
                let length = osc.hold as f64 * sixteenth;
                for note in &step.notes {
                    out.push(Event::note(t, track, note.name.shift_fifths(shift), note.velocity, length));
                }
                *mode = TrackMode::Sounding { until: t + length };
            } else {
                let next_mode = match mode {
                    TrackMode::Arpeggiating { notes, next, remaining } => {
                        let idx = arp_index(osc.arp_mode, *next, notes.len(), &mut self.rng);
                        let note = notes[idx];
                        out.push(Event::note(t, track, note.name.shift_fifths(shift), note.velocity, gate));
                        arp_triggered.push(i);
                        *next += 1;
                        *remaining -= 1;
                        (*remaining == 0).then_some(TrackMode::Sounding { until: t + gate })
                    }
                    TrackMode::Sounding { until } if t >= *until => Some(TrackMode::Idle),
                    _ => None,
                };
                if let Some(m) = next_mode {
                    *mode = m;
                }
            }
        }

        trace!(main, shift_step = ctx.shift_step, time = t, events = out.len(), "tick");
        Ok(StepEvent { main_step: main, shift_step: ctx.shift_step, time: t, arp_triggered_tracks: arp_triggered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sg_ir::{ArpMode, Pitch, SequencerStep};

    fn note(s: &str) -> Note {
        Note::new(s.parse().unwrap(), 1.0)
    }

    fn pitch(s: &str) -> Pitch {
        s.parse().unwrap()
    }

    fn engine(seed: u64) -> TickEngine<StdRng> {
        TickEngine::new(3, StdRng::seed_from_u64(seed))
    }

    fn ctx(k: usize, patch: &Patch) -> TickContext {
        let d = patch.transport.sixteenth();
        TickContext { time: k as f64 * d, duration: d, main_step: k % 16, shift_step: 0 }
    }

    /// Pitches of the note events in `events`.
    fn pitches(events: &[Event]) -> Vec<Pitch> {
        events
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::Note { pitch, .. } => Some(pitch),
                _ => None,
            })
            .collect()
    }

    fn arp_patch(mode: ArpMode, chord: &[&str], hold: u32) -> Patch {
        Patch::default().edit(|p| {
            let notes: Vec<Note> = chord.iter().map(|s| note(s)).collect();
            p.sequencer.steps[0][0] = SequencerStep::chord(&notes);
            p.oscillators[0].arp = true;
            p.oscillators[0].arp_mode = mode;
            p.oscillators[0].hold = hold;
        })
    }

    fn run_arp(patch: &Patch, ticks: usize) -> Vec<Pitch> {
        let mut eng = engine(7);
        let mut out = Vec::new();
        for k in 0..ticks {
            eng.tick(patch, &ctx(k, patch), &mut out).unwrap();
        }
        pitches(&out)
    }

    #[test]
    fn probability_one_always_triggers() {
        let patch = Patch::default().edit(|p| {
            p.sequencer.steps[0][0] = SequencerStep::chord(&[note("C4")]);
        });
        for seed in 0..50 {
            let mut out = Vec::new();
            engine(seed).tick(&patch, &ctx(0, &patch), &mut out).unwrap();
            assert_eq!(pitches(&out).len(), 1, "seed {seed}");
        }
    }

    #[test]
    fn probability_zero_never_triggers() {
        let patch = Patch::default().edit(|p| {
            let mut step = SequencerStep::chord(&[note("C4"), note("E4")]);
            step.probability = 0.0;
            p.sequencer.steps[1][0] = step;
        });
        for seed in 0..50 {
            let mut out = Vec::new();
            engine(seed).tick(&patch, &ctx(0, &patch), &mut out).unwrap();
            assert!(out.is_empty(), "seed {seed}");
        }
    }

    #[test]
    fn disabled_or_empty_steps_are_silent() {
        let patch = Patch::default().edit(|p| {
            let mut step = SequencerStep::chord(&[note("C4")]);
            step.enabled = false;
            p.sequencer.steps[0][0] = step;
        });
        let mut out = Vec::new();
        engine(0).tick(&patch, &ctx(0, &patch), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn chord_sounds_for_hold_sixteenths() {
        let patch = Patch::default().edit(|p| {
            p.sequencer.steps[2][0] = SequencerStep::chord(&[note("C4"), note("E4"), note("G4")]);
            p.oscillators[2].hold = 4;
        });
        let mut out = Vec::new();
        let mut eng = engine(0);
        eng.tick(&patch, &ctx(0, &patch), &mut out).unwrap();
        assert_eq!(out.len(), 3);
        for e in &out {
            assert_eq!(e.target, EventTarget::Track(2));
            match e.payload {
                EventPayload::Note { duration, .. } => assert!((duration - 0.5).abs() < 1e-12),
                _ => panic!("unexpected {e:?}"),
            }
        }
        assert_eq!(eng.mode(2), Some(&TrackMode::Sounding { until: 0.5 }));
    }

    #[test]
    fn arp_up_and_down() {
        let up = run_arp(&arp_patch(ArpMode::Up, &["G4", "C4", "E4"], 6), 6);
        assert_eq!(up, ["C4", "E4", "G4", "C4", "E4", "G4"].map(pitch));
        let down = run_arp(&arp_patch(ArpMode::Down, &["C4", "E4", "G4"], 4), 4);
        assert_eq!(down, ["G4", "E4", "C4", "G4"].map(pitch));
    }

    #[test]
    fn arp_converge_on_four_notes() {
        let notes = run_arp(&arp_patch(ArpMode::Converge, &["C4", "E4", "G4", "C5"], 6), 6);
        assert_eq!(notes, ["C4", "C5", "E4", "G4", "C4", "C5"].map(pitch));
    }

    #[test]
    fn arp_runs_hold_ticks_then_stops() {
        let patch = arp_patch(ArpMode::Up, &["C4", "E4"], 3);
        let notes = run_arp(&patch, 8);
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn arp_gate_is_unswung_sixteenth() {
        let patch = arp_patch(ArpMode::Up, &["C4"], 1).edit(|p| p.transport.swing = 75.0);
        let mut out = Vec::new();
        engine(0).tick(&patch, &ctx(0, &patch), &mut out).unwrap();
        match out[0].payload {
            EventPayload::Note { duration, .. } => assert!((duration - 0.95 * 0.125).abs() < 1e-12),
            _ => panic!(),
        }
    }

    #[test]
    fn new_hit_restarts_arp() {
        let patch = arp_patch(ArpMode::Up, &["C4", "E4", "G4"], 8).edit(|p| {
            p.sequencer.steps[0][2] = SequencerStep::chord(&[note("D4"), note("F4")]);
        });
        let notes = run_arp(&patch, 4);
        assert_eq!(notes, ["C4", "E4", "D4", "F4"].map(pitch));
    }

    #[test]
    fn arp_notes_follow_shift_of_sounding_tick() {
        let patch = arp_patch(ArpMode::Up, &["C4"], 2).edit(|p| p.sequencer.shift_steps[1] = 1);
        let mut eng = engine(0);
        let mut out = Vec::new();
        let c0 = ctx(0, &patch);
        eng.tick(&patch, &c0, &mut out).unwrap();
        let c1 = TickContext { shift_step: 1, ..ctx(1, &patch) };
        eng.tick(&patch, &c1, &mut out).unwrap();
        assert_eq!(pitches(&out), ["C4", "G4"].map(pitch));
    }

    #[test]
    fn shift_transposes_chord_notes() {
        let patch = Patch::default().edit(|p| {
            p.sequencer.steps[0][0] = SequencerStep::chord(&[note("C4"), note("E4")]);
            p.sequencer.shift_steps[3] = -1;
        });
        let mut out = Vec::new();
        let c = TickContext { shift_step: 3, ..ctx(0, &patch) };
        engine(0).tick(&patch, &c, &mut out).unwrap();
        assert_eq!(pitches(&out), ["F4", "A4"].map(pitch));
    }

    #[test]
    fn metronome_on_quarter_notes() {
        let patch = Patch::default().edit(|p| p.transport.metronome_on = true);
        let mut eng = engine(0);
        let clicks: Vec<usize> = (0..16)
            .filter(|&k| {
                let mut out = Vec::new();
                eng.tick(&patch, &ctx(k, &patch), &mut out).unwrap();
                out.iter().any(|e| e.target == EventTarget::Metronome)
            })
            .collect();
        assert_eq!(clicks, vec![0, 4, 8, 12]);
    }

    #[test]
    fn six_midi_clocks_across_the_subdivision() {
        let patch = Patch::default().edit(|p| p.transport.midi_clock_out = true);
        let mut out = Vec::new();
        let c = TickContext { time: 2.0, duration: 0.12, main_step: 0, shift_step: 0 };
        engine(0).tick(&patch, &c, &mut out).unwrap();
        let times: Vec<f64> = out.iter().filter(|e| e.target == EventTarget::Midi).map(|e| e.time).collect();
        assert_eq!(times.len(), 6);
        for (i, t) in times.iter().enumerate() {
            assert!((t - (2.0 + i as f64 * 0.02)).abs() < 1e-12);
        }
    }

    #[test]
    fn arp_triggered_tracks_reported() {
        let patch = arp_patch(ArpMode::Up, &["C4"], 2);
        let mut eng = engine(0);
        let mut out = Vec::new();
        let s0 = eng.tick(&patch, &ctx(0, &patch), &mut out).unwrap();
        let s1 = eng.tick(&patch, &ctx(1, &patch), &mut out).unwrap();
        let s2 = eng.tick(&patch, &ctx(2, &patch), &mut out).unwrap();
        assert_eq!(s0.arp_triggered_tracks, vec![0]);
        assert_eq!(s1.arp_triggered_tracks, vec![0]);
        assert!(s2.arp_triggered_tracks.is_empty());
    }

    #[test]
    fn mismatched_patch_is_an_error() {
        let mut patch = Patch::default();
        patch.oscillators.pop();
        let mut out = Vec::new();
        let err = engine(0).tick(&patch, &ctx(0, &patch), &mut out).unwrap_err();
        assert_eq!(err, TickError::TrackMismatch { patch: 2, graph: 3 });
        assert!(out.is_empty());
    }
}
