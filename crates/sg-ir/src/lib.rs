//! Core IR types for the synthgrid sequencer.
//!
//! This crate defines the data shared by every other crate: the patch
//! model the UI edits, pitch naming, parameter automation, the audio
//! graph vocabulary and the events the tick engine emits.

mod automation;
mod event;
mod graph;
pub mod patch;
mod pitch;

pub use automation::{Automation, ParamTimeline};
pub use event::{Event, EventPayload, EventTarget, MidiMessage, StepEvent};
pub use graph::{AudioGraph, Connection, GraphCommand, ImpulseResponse, Node, NodeId, NodeKind, Param};
pub use patch::{
    Adsr, ArpMode, DelaySettings, DistortionModel, DistortionSettings, FilterSettings, FxState,
    Note, OscillatorSettings, Patch, ReverbModel, ReverbSettings, Sends, SequencerState,
    SequencerStep, SequencerTrack, TransportState, Waveform, MAX_DELAY_MS, MAX_HOLD,
    MAX_NOTES_PER_STEP, MAX_SHIFT, NUM_TRACKS, SHIFT_LANE_LEN, STEPS_PER_TRACK,
};
pub use pitch::{Pitch, PitchError, PITCH_CLASS_NAMES};
