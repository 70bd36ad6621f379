//! Destinations for scheduler output.
//!
//! The scheduler never touches audio directly; it emits graph commands,
//! MIDI messages and step events into these sinks. Live playback, offline
//! render and tests each plug in their own implementations.

use sg_ir::{GraphCommand, MidiMessage, StepEvent};

/// Receives audio-graph commands.
pub trait GraphSink {
    fn send(&mut self, cmd: GraphCommand);
}

/// Receives MIDI realtime messages.
pub trait MidiSink {
    /// Emit `msg` after `delay` seconds of host time.
    fn send(&mut self, msg: MidiMessage, delay: f64);
}

/// Receives step positions for the UI.
pub trait StepSink {
    fn push(&mut self, step: StepEvent);
    /// Drop everything pending and signal a reset.
    fn clear(&mut self);
}

/// Records every command; used by tests and the `dump` command.
#[derive(Clone, Debug, Default)]
pub struct RecordingGraph {
    pub commands: Vec<GraphCommand>,
}

impl GraphSink for RecordingGraph {
    fn send(&mut self, cmd: GraphCommand) {
        self.commands.push(cmd);
    }
}

/// Records MIDI messages with their delays.
#[derive(Clone, Debug, Default)]
pub struct RecordingMidi {
    pub messages: Vec<(MidiMessage, f64)>,
}

impl MidiSink for RecordingMidi {
    fn send(&mut self, msg: MidiMessage, delay: f64) {
        self.messages.push((msg, delay));
    }
}

/// Discards MIDI output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMidi;

impl MidiSink for NullMidi {
    fn send(&mut self, _msg: MidiMessage, _delay: f64) {}
}

impl<T: GraphSink + ?Sized> GraphSink for &mut T {
    fn send(&mut self, cmd: GraphCommand) {
        (**self).send(cmd);
    }
}

impl<T: MidiSink + ?Sized> MidiSink for &mut T {
    fn send(&mut self, msg: MidiMessage, delay: f64) {
        (**self).send(msg, delay);
    }
}

impl<T: StepSink + ?Sized> StepSink for &mut T {
    fn push(&mut self, step: StepEvent) {
        (**self).push(step);
    }

    fn clear(&mut self) {
        (**self).clear();
    }
}
