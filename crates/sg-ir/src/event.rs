//! Events produced by the tick engine.

use crate::pitch::Pitch;

/// A scheduled event. Times are audio-clock seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// When the event should fire
    pub time: f64,
    /// Where the event is routed
    pub target: EventTarget,
    /// What the event does
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event.
    pub fn new(time: f64, target: EventTarget, payload: EventPayload) -> Self {
        Self { time, target, payload }
    }

    /// A note on `track` that releases `duration` seconds after `time`.
    pub fn note(time: f64, track: u8, pitch: Pitch, velocity: f32, duration: f64) -> Self {
        Self::new(time, EventTarget::Track(track), EventPayload::Note { pitch, velocity, duration })
    }
}

/// Where an event is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// Oscillator track (voice pool) index
    Track(u8),
    /// The metronome click voice
    Metronome,
    /// Every connected MIDI output
    Midi,
}

/// What an event does.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// Start a note now and release it `duration` seconds later.
    Note { pitch: Pitch, velocity: f32, duration: f64 },
    /// Short metronome blip.
    Click,
    /// A raw MIDI realtime message.
    Midi(MidiMessage),
}

/// MIDI system realtime messages the sequencer emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    /// Timing clock, 24 per quarter note
    Clock,
    Start,
    Stop,
}

impl MidiMessage {
    /// Raw status byte.
    pub fn status(self) -> u8 {
        match self {
            MidiMessage::Clock => 0xF8,
            MidiMessage::Start => 0xFA,
            MidiMessage::Stop => 0xFC,
        }
    }
}

/// Position update for the UI, stamped with the audio time it becomes current.
#[derive(Clone, Debug, PartialEq)]
pub struct StepEvent {
    pub main_step: usize,
    pub shift_step: usize,
    pub time: f64,
    /// Tracks whose arpeggiator emitted a note on this step.
    pub arp_triggered_tracks: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_status_bytes() {
        assert_eq!(MidiMessage::Clock.status(), 0xF8);
        assert_eq!(MidiMessage::Start.status(), 0xFA);
        assert_eq!(MidiMessage::Stop.status(), 0xFC);
    }

    #[test]
    fn note_helper_routes_to_track() {
        let e = Event::note(1.0, 2, Pitch::new(0, 4), 0.5, 0.125);
        assert_eq!(e.target, EventTarget::Track(2));
        assert!(matches!(e.payload, EventPayload::Note { duration, .. } if duration == 0.125));
    }
}
