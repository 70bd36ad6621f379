//! Faster-than-realtime rendering.
//!
//! Uses the same scheduler and renderer as live playback, but advances
//! time by rendering blocks instead of waiting for a device.

use rand::rngs::StdRng;
use rand::SeedableRng;
use sg_engine::{Frame, FxController, RecordingMidi, Renderer, Scheduler, SynthGraph, VisualQueue};
use sg_ir::{Event, MidiMessage, Patch, StepEvent};
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};

/// Everything an offline run produced.
#[derive(Clone, Debug, Default)]
pub struct OfflineRender {
    pub sample_rate: u32,
    pub frames: Vec<Frame>,
    /// Step positions that became due during the render.
    pub steps: Vec<StepEvent>,
    /// MIDI messages with their delay from the scheduler pass that sent them.
    pub midi: Vec<(MidiMessage, f64)>,
    /// Executed events, when requested.
    pub events: Vec<Event>,
}

impl OfflineRender {
    pub fn peak(&self) -> f32 {
        self.frames.iter().fold(0.0, |peak, f| peak.max(f.peak()))
    }
}

/// Play `patch` from the top for `seconds` and collect the output.
///
/// Fails only when `config` does not validate.
pub fn render_offline(
    patch: &Patch,
    config: &EngineConfig,
    seconds: f64,
    record_events: bool,
) -> Result<OfflineRender, ConfigError> {
    config.validate()?;
    let patch = patch.sanitized();
    let sample_rate = config.sample_rate;
    let synth = SynthGraph::build(&patch);
    let renderer = Renderer::new(&synth.graph, sample_rate);
    let fx = FxController::new(&synth, sample_rate, None, config.seed);
    let rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut scheduler = Scheduler::new(
        &synth,
        fx,
        rng,
        config.scheduler_config(),
        renderer,
        RecordingMidi::default(),
        VisualQueue::new(),
    );
    scheduler.record_events(record_events);

    let total = (seconds.max(0.0) * sample_rate as f64) as usize;
    let timer_frames = config.timer_frames(sample_rate);
    let mut out = OfflineRender { sample_rate, frames: Vec::with_capacity(total), ..Default::default() };
    let mut block = vec![Frame::silence(); config.block_size];
    let mut since_run = timer_frames;

    scheduler.start(0.0, &patch);
    while out.frames.len() < total {
        let now = scheduler.graph().now();
        if since_run >= timer_frames {
            scheduler.run(now, &patch);
            since_run = 0;
        }
        let n = block.len().min(total - out.frames.len());
        scheduler.graph_mut().render(&mut block[..n]);
        out.frames.extend_from_slice(&block[..n]);
        since_run += n as u64;
        while scheduler.graph_mut().pop_retired().is_some() {}

        let now = scheduler.graph().now();
        scheduler.steps_mut().drain_due(now, |step| {
            if let Some(step) = step {
                out.steps.push(step.clone());
            }
        });
    }

    out.midi = std::mem::take(&mut scheduler.midi_mut().messages);
    out.events = scheduler.take_events();
    debug!(frames = out.frames.len(), steps = out.steps.len(), "offline render finished");
    Ok(out)
}
