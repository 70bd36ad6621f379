//! Playback engine for synthgrid.
//!
//! Turns patch snapshots into timestamped audio-graph commands: the
//! look-ahead scheduler drives the tick engine, voices and the effects
//! controller, and the software renderer plays the resulting graph.

mod arp;
mod clock;
mod frame;
pub mod fx;
pub mod render;
pub mod scheduler;
mod sink;
mod synth_graph;
pub mod tick;
mod visual_queue;
mod voice;
mod voice_pool;

pub use arp::{arp_index, sorted_notes};
pub use clock::{AudioClock, FrameClock};
pub use frame::Frame;
pub use fx::{FxController, FxError, ReverbWorker};
pub use render::{Renderer, Retired};
pub use scheduler::{subdivision_duration, Scheduler, SchedulerConfig, SchedulerState};
pub use sink::{GraphSink, MidiSink, NullMidi, RecordingGraph, RecordingMidi, StepSink};
pub use synth_graph::{ClickNodes, FxNodes, SynthGraph, TrackNodes};
pub use tick::{TickContext, TickEngine, TickError, TrackMode};
pub use visual_queue::VisualQueue;
pub use voice::{ClickVoice, Voice, DEFAULT_RELEASE_MARGIN};
pub use voice_pool::{VoicePool, MAX_VOICES_PER_OSC};
