//! Headless controller for synthgrid.
//!
//! Provides one API for editing the patch, live playback and offline
//! rendering that a UI and the CLI can share.

mod config;
mod midi;
mod offline;
mod visual;
mod wav;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sg_audio::{AudioError, AudioOutput, CpalOutput};
use sg_engine::{FxController, Renderer, ReverbWorker, Scheduler, SynthGraph};
use tracing::{debug, info, warn};

// Re-export common types so callers don't need sg-ir/sg-engine directly.
pub use config::{ConfigError, EngineConfig};
pub use midi::{MidiError, MidiOut};
pub use offline::{render_offline, OfflineRender};
pub use sg_engine::{Frame, FrameClock};
pub use sg_ir::{Patch, StepEvent};
pub use visual::{step_channel, visual_channel, StepReceiver, StepSender, VisualSync};
pub use wav::{frames_to_wav, save_wav, write_wav};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    Start,
    Stop,
}

/// Headless synth controller: owns the patch and manages playback.
pub struct Controller {
    config: EngineConfig,
    patch: Arc<ArcSwap<Patch>>,
    playback: Option<PlaybackHandle>,
    visual: Option<VisualSync<FrameClock>>,
    playing: bool,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    commands: Sender<Transport>,
    thread: Option<JoinHandle<()>>,
    clock: FrameClock,
}

impl Controller {
    pub fn new(config: EngineConfig, patch: Patch) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            patch: Arc::new(ArcSwap::from_pointee(patch.sanitized())),
            playback: None,
            visual: None,
            playing: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Patch management ---

    /// The current patch snapshot.
    pub fn patch(&self) -> Arc<Patch> {
        self.patch.load_full()
    }

    /// Replace the patch; the scheduler picks it up on its next pass.
    pub fn set_patch(&self, patch: Patch) {
        self.patch.store(Arc::new(patch.sanitized()));
    }

    /// Copy-on-write edit of the current patch.
    pub fn update_patch(&self, f: impl Fn(&mut Patch)) {
        self.patch.rcu(|current| current.edit(&f));
    }

    // --- Real-time playback ---

    /// Open the audio device and start the playback thread. Idempotent.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        if self.playback.is_some() {
            return Ok(());
        }

        let midi = match MidiOut::connect_all("synthgrid") {
            Ok(midi) => midi,
            Err(e) => {
                warn!("MIDI output unavailable: {e}");
                MidiOut::disabled()
            }
        };
        let (steps, receiver) = step_channel();
        let (ready_tx, ready_rx) = bounded(1);
        let (cmd_tx, cmd_rx) = unbounded();
        let stop_signal = Arc::new(AtomicBool::new(false));

        let config = self.config.clone();
        let store = self.patch.clone();
        let stop = stop_signal.clone();
        let thread = std::thread::Builder::new()
            .name("sg-playback".into())
            .spawn(move || playback_thread(config, store, cmd_rx, stop, midi, steps, ready_tx))
            .context("spawning playback thread")?;

        let clock = match ready_rx.recv() {
            Ok(Ok(clock)) => clock,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(anyhow!(e).context("opening audio output"));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("playback thread exited during startup"));
            }
        };

        info!(sample_rate = clock.sample_rate(), "audio initialized");
        self.visual = Some(receiver.with_clock(clock.clone()));
        self.playback = Some(PlaybackHandle { stop_signal, commands: cmd_tx, thread: Some(thread), clock });
        Ok(())
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        self.initialize()?;
        if self.playing {
            return Ok(());
        }
        self.send(Transport::Start)?;
        self.playing = true;
        self.update_patch(|p| p.transport.is_playing = true);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        if let Err(e) = self.send(Transport::Stop) {
            warn!("stop not delivered: {e}");
        }
        self.playing = false;
        self.update_patch(|p| p.transport.is_playing = false);
    }

    fn send(&self, cmd: Transport) -> anyhow::Result<()> {
        let pb = self.playback.as_ref().ok_or_else(|| anyhow!("audio not initialized"))?;
        pb.commands.send(cmd).map_err(|_| anyhow!("playback thread is gone"))
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Audio time heard so far, once initialized.
    pub fn audio_time(&self) -> Option<f64> {
        self.playback.as_ref().map(|pb| pb.clock.frames() as f64 / pb.clock.sample_rate() as f64)
    }

    /// Report step changes that are due by the audio clock.
    ///
    /// Call once per UI frame. `None` signals a transport reset.
    pub fn poll_steps(&mut self, on_change: impl FnMut(Option<&StepEvent>)) -> usize {
        match &mut self.visual {
            Some(visual) => visual.poll(self.playing, on_change),
            None => 0,
        }
    }

    /// Stop playback and release the audio device.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
        self.visual = None;
    }

    // --- Offline rendering ---

    pub fn render_offline(&self, seconds: f64) -> Result<OfflineRender, ConfigError> {
        render_offline(&self.patch(), &self.config, seconds, false)
    }

    pub fn render_to_wav(&self, path: impl AsRef<Path>, seconds: f64) -> anyhow::Result<OfflineRender> {
        let path = path.as_ref();
        let render = self.render_offline(seconds)?;
        save_wav(path, &render.frames, render.sample_rate)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(render)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns the device, renderer and scheduler for one session.
///
/// Rendering is paced by the output ring: the thread renders a block,
/// waits for room, and runs the scheduler every `timer_interval` of audio.
fn playback_thread(
    config: EngineConfig,
    store: Arc<ArcSwap<Patch>>,
    commands: Receiver<Transport>,
    stop_signal: Arc<AtomicBool>,
    mut midi: MidiOut,
    steps: StepSender,
    ready: Sender<Result<FrameClock, AudioError>>,
) {
    let (mut output, consumer) = match CpalOutput::new(config.buffer_ms) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = output.build_stream(consumer).and_then(|()| output.start()) {
        let _ = ready.send(Err(e));
        return;
    }

    let sample_rate = output.sample_rate();
    // the ring stays full in steady state, so rendered time leads played time by its length
    midi.set_latency(Duration::from_millis(config.buffer_ms as u64));
    let patch = store.load_full();
    let synth = SynthGraph::build(&patch);
    let worker = match ReverbWorker::spawn(sample_rate, config.reverb_debounce(), config.seed) {
        Ok(worker) => Some(worker),
        Err(e) => {
            warn!("reverb worker unavailable, generating inline: {e}");
            None
        }
    };
    let fx = FxController::new(&synth, sample_rate, worker, config.seed);
    let rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let renderer = Renderer::new(&synth.graph, sample_rate);
    let mut scheduler = Scheduler::new(&synth, fx, rng, config.scheduler_config(), renderer, midi, steps);

    if ready.send(Ok(output.clock())).is_err() {
        return;
    }

    let timer_frames = config.timer_frames(sample_rate);
    let mut since_run = timer_frames;
    let mut block = vec![Frame::silence(); config.block_size];

    while !stop_signal.load(Ordering::Relaxed) {
        let patch = store.load_full();
        let now = scheduler.graph().now();
        for cmd in commands.try_iter() {
            match cmd {
                Transport::Start => scheduler.start(now, &patch),
                Transport::Stop => scheduler.stop(now, &patch),
            }
            since_run = timer_frames;
        }
        if since_run >= timer_frames {
            scheduler.run(now, &patch);
            since_run = 0;
        }

        scheduler.graph_mut().render(&mut block);
        since_run += block.len() as u64;
        while scheduler.graph_mut().pop_retired().is_some() {}

        let mut written = 0;
        while written < block.len() && !stop_signal.load(Ordering::Relaxed) {
            written += output.write(&block[written..]);
            if written < block.len() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    if let Err(e) = output.stop() {
        warn!("stopping audio output: {e}");
    }
    debug!("playback thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_edits_are_sanitized_snapshots() {
        let c = Controller::new(EngineConfig::default(), Patch::default()).unwrap();
        let before = c.patch();
        c.update_patch(|p| p.transport.bpm = 1_000.0);
        assert_eq!(c.patch().transport.bpm, 300.0);
        assert_eq!(before.transport.bpm, 120.0);

        c.set_patch(Patch::default().edit(|p| p.transport.swing = 70.0));
        assert_eq!(c.patch().transport.swing, 70.0);
    }

    #[test]
    fn uninitialized_controller_is_idle() {
        let mut c = Controller::new(EngineConfig::default(), Patch::default()).unwrap();
        assert!(!c.is_playing());
        assert_eq!(c.audio_time(), None);
        assert_eq!(c.poll_steps(|_| {}), 0);
        c.stop();
    }

    #[test]
    fn wav_export_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let config = EngineConfig { sample_rate: 8_000, seed: Some(3), ..Default::default() };
        let c = Controller::new(config, Patch::default()).unwrap();
        let render = c.render_to_wav(&path, 0.5).unwrap();
        assert_eq!(render.frames.len(), 4_000);
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 4_000);
    }

    #[test]
    fn controller_rejects_unusable_config() {
        let zero_block = EngineConfig { block_size: 0, ..Default::default() };
        assert!(matches!(
            Controller::new(zero_block, Patch::default()),
            Err(ConfigError::NotPositive("block_size"))
        ));
        let zero_rate = EngineConfig { sample_rate: 0, ..Default::default() };
        assert!(matches!(
            Controller::new(zero_rate, Patch::default()),
            Err(ConfigError::NotPositive("sample_rate"))
        ));
    }
}
