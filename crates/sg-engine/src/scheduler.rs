//! Look-ahead scheduler.
//!
//! Each `run(now)` schedules every subdivision that starts before
//! `now + look_ahead`, so imprecise wakeups of the calling thread never
//! reach the audio. The scheduler owns its output sinks: graph commands go
//! to `G`, MIDI realtime messages to `M`, and step positions to `S`.

use rand::Rng;
use sg_ir::{Event, EventPayload, EventTarget, MidiMessage, Patch, TransportState, SHIFT_LANE_LEN};
use tracing::{debug, error, info, trace};

use crate::fx::FxController;
use crate::sink::{GraphSink, MidiSink, StepSink};
use crate::synth_graph::SynthGraph;
use crate::tick::{TickContext, TickEngine};
use crate::voice::{ClickVoice, DEFAULT_RELEASE_MARGIN};
use crate::voice_pool::VoicePool;

/// Timing knobs for the scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// How far past `now` subdivisions are scheduled, in seconds.
    pub look_ahead: f64,
    /// Delay between `start` and the first subdivision.
    pub start_offset: f64,
    /// Extra time after a release before a voice is reused.
    pub release_margin: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { look_ahead: 0.1, start_offset: 0.05, release_margin: DEFAULT_RELEASE_MARGIN }
    }
}

/// Mutable transport position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SchedulerState {
    /// Last main step scheduled; `None` before the first tick.
    pub current_step: Option<usize>,
    /// Subdivisions scheduled since `start`.
    pub total_ticks: u64,
    /// Audio time of the next subdivision.
    pub next_step_time: f64,
    pub running: bool,
}

/// Length of subdivision number `tick` (counted from `start`).
///
/// Odd subdivisions are lengthened and even ones shortened by
/// `(swing/100 - 0.5) * sixteenth`; at swing 50 every subdivision is a
/// plain sixteenth.
pub fn subdivision_duration(transport: &TransportState, tick: u64) -> f64 {
    let sixteenth = transport.sixteenth();
    let offset = (transport.swing as f64 / 100.0 - 0.5) * sixteenth;
    if tick % 2 == 1 {
        sixteenth + offset
    } else {
        sixteenth - offset
    }
}

/// Drives the tick engine against the audio clock.
pub struct Scheduler<G, M, S, R> {
    config: SchedulerConfig,
    state: SchedulerState,
    engine: TickEngine<R>,
    pools: Vec<VoicePool>,
    click: ClickVoice,
    fx: FxController,
    /// Scratch buffer reused across ticks.
    events: Vec<Event>,
    /// Copy of every executed event, when enabled.
    log: Option<Vec<Event>>,
    graph: G,
    midi: M,
    steps: S,
}

impl<G, M, S, R> Scheduler<G, M, S, R>
where
    G: GraphSink,
    M: MidiSink,
    S: StepSink,
    R: Rng,
{
    pub fn new(
        synth: &SynthGraph,
        fx: FxController,
        rng: R,
        config: SchedulerConfig,
        graph: G,
        midi: M,
        steps: S,
    ) -> Self {
        Self {
            config,
            state: SchedulerState::default(),
            engine: TickEngine::new(synth.track_count(), rng),
            pools: synth.voice_pools(config.release_margin),
            click: ClickVoice::new(synth.click.gain),
            fx,
            events: Vec::with_capacity(64),
            log: None,
            graph,
            midi,
            steps,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn pools(&self) -> &[VoicePool] {
        &self.pools
    }

    pub fn engine(&self) -> &TickEngine<R> {
        &self.engine
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn midi_mut(&mut self) -> &mut M {
        &mut self.midi
    }

    pub fn steps_mut(&mut self) -> &mut S {
        &mut self.steps
    }

    /// Start or stop keeping a copy of every executed event.
    pub fn record_events(&mut self, enabled: bool) {
        self.log = enabled.then(Vec::new);
    }

    /// Events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Begin playback; the first subdivision lands `start_offset` after `now`.
    pub fn start(&mut self, now: f64, patch: &Patch) {
        if self.state.running {
            return;
        }
        self.state = SchedulerState {
            current_step: None,
            total_ticks: 0,
            next_step_time: now + self.config.start_offset,
            running: true,
        };
        self.engine.reset();
        self.steps.clear();
        if patch.transport.midi_clock_out {
            self.midi.send(MidiMessage::Start, 0.0);
        }
        info!(at = self.state.next_step_time, bpm = patch.transport.bpm, "transport started");
    }

    /// Stop playback and hard-silence every voice at `now`.
    pub fn stop(&mut self, now: f64, patch: &Patch) {
        if !self.state.running {
            return;
        }
        self.state.running = false;
        self.state.current_step = None;
        self.state.total_ticks = 0;
        for pool in &mut self.pools {
            pool.silence_all(now, &mut self.graph);
        }
        self.click.silence(now, &mut self.graph);
        self.engine.reset();
        self.steps.clear();
        if patch.transport.midi_clock_out {
            self.midi.send(MidiMessage::Stop, 0.0);
        }
        info!(at = now, "transport stopped");
    }

    /// Apply parameter changes, then schedule every subdivision due before
    /// `now + look_ahead`. Returns the number of subdivisions scheduled.
    pub fn run(&mut self, now: f64, patch: &Patch) -> usize {
        self.fx.apply(patch, now, &mut self.graph);
        self.fx.poll(&mut self.graph);
        if !self.state.running {
            return 0;
        }

        let horizon = now + self.config.look_ahead;
        let mut scheduled = 0;
        while self.state.next_step_time < horizon {
            let duration = subdivision_duration(&patch.transport, self.state.total_ticks);
            if !(duration.is_finite() && duration > 0.0) {
                error!(duration, "invalid subdivision length, not scheduling");
                break;
            }
            let seq = &patch.sequencer;
            let main_step = self.state.current_step.map_or(0, |s| (s + 1) % seq.step_count.max(1));
            let shift_step =
                ((self.state.total_ticks / seq.shift_duration.max(1) as u64) % SHIFT_LANE_LEN as u64) as usize;
            let ctx = TickContext { time: self.state.next_step_time, duration, main_step, shift_step };
            self.state.current_step = Some(main_step);
            self.state.total_ticks += 1;

            self.events.clear();
            match self.engine.tick(patch, &ctx, &mut self.events) {
                Ok(step) => {
                    if let Some(log) = &mut self.log {
                        log.extend_from_slice(&self.events);
                    }
                    self.execute(patch, now);
                    self.steps.push(step);
                }
                Err(e) => error!(time = ctx.time, "skipping subdivision: {e}"),
            }

            self.state.next_step_time += duration;
            scheduled += 1;
        }
        if scheduled > 0 {
            trace!(scheduled, next = self.state.next_step_time, "scheduler pass");
        }
        scheduled
    }

    /// Turn the current tick's events into graph commands and MIDI.
    fn execute(&mut self, patch: &Patch, now: f64) {
        let events = std::mem::take(&mut self.events);
        for event in &events {
            match (event.target, &event.payload) {
                (EventTarget::Track(track), EventPayload::Note { pitch, velocity, duration }) => {
                    let track = track as usize;
                    let (Some(pool), Some(osc)) = (self.pools.get_mut(track), patch.oscillators.get(track)) else {
                        continue;
                    };
                    let Some(voice) = pool.allocate(event.time) else {
                        trace!(track, %pitch, time = event.time, "no free voice, note dropped");
                        continue;
                    };
                    voice.update(osc, &mut self.graph);
                    voice.on(*pitch, osc.octave, event.time, *velocity, &mut self.graph);
                    voice.off(event.time + duration, &mut self.graph);
                }
                (EventTarget::Metronome, EventPayload::Click) => self.click.click(event.time, &mut self.graph),
                (EventTarget::Midi, EventPayload::Midi(msg)) => self.midi.send(*msg, (event.time - now).max(0.0)),
                (target, payload) => debug!(?target, ?payload, "ignoring mismatched event"),
            }
        }
        self.events = events;
    }
}
