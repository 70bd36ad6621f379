//! synthgrid CLI: live playback, WAV export and event dumps.
//!
//! Usage:
//!   sg-cli play --patch song.json
//!   sg-cli render --patch song.json --wav out.wav --seconds 8
//!   sg-cli dump --patch song.json --steps 16

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sg_ir::{EventPayload, EventTarget};
use sg_master::{render_offline, Controller, EngineConfig, Patch};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sg-cli", version, about = "Step sequencer synth")]
struct Cli {
    /// Patch document (JSON). Defaults to an empty patch.
    #[arg(long, global = true)]
    patch: Option<PathBuf>,

    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Apply a sound preset to a track, as TRACK=NAME. Repeatable.
    #[arg(long, global = true, value_name = "TRACK=NAME")]
    preset: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play through the default audio device.
    Play {
        /// Stop after this many seconds; plays until interrupted otherwise.
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Render offline to a WAV file.
    Render {
        #[arg(long)]
        wav: PathBuf,
        #[arg(long, default_value_t = 8.0)]
        seconds: f64,
    },
    /// Print the events scheduled for the first steps.
    Dump {
        #[arg(long, default_value_t = 16)]
        steps: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate().context("invalid engine config")?;

    let mut patch = match &cli.patch {
        Some(path) => sg_patch::load_patch(path).with_context(|| format!("loading {}", path.display()))?,
        None => Patch::default(),
    };
    for arg in &cli.preset {
        let Some((track, name)) = arg.split_once('=') else {
            bail!("preset {arg:?} is not TRACK=NAME");
        };
        let track: usize = track.trim().parse().with_context(|| format!("bad track in {arg:?}"))?;
        patch = sg_patch::apply_preset(&patch, track, name.trim())?;
    }

    match cli.command {
        Command::Play { seconds } => play(config, patch, seconds),
        Command::Render { wav, seconds } => render(config, patch, &wav, seconds),
        Command::Dump { steps } => dump(&config, &patch, steps),
    }
}

fn play(config: EngineConfig, patch: Patch, seconds: Option<f64>) -> anyhow::Result<()> {
    let frame = Duration::from_millis(config.frame_interval_ms.max(1));
    let step_count = patch.sequencer.step_count;
    let mut ctrl = Controller::new(config, patch)?;
    ctrl.start()?;
    info!("playing");

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let mut stdout = std::io::stdout();
    while deadline.map_or(true, |d| Instant::now() < d) {
        ctrl.poll_steps(|step| {
            let line: String = match step {
                Some(step) => (0..step_count)
                    .map(|i| if i == step.main_step { '#' } else { '.' })
                    .collect(),
                None => ".".repeat(step_count),
            };
            let _ = write!(stdout, "\r{line}");
            let _ = stdout.flush();
        });
        std::thread::sleep(frame);
    }

    ctrl.shutdown();
    println!("\rDone.{}", " ".repeat(step_count));
    Ok(())
}

fn render(config: EngineConfig, patch: Patch, wav: &Path, seconds: f64) -> anyhow::Result<()> {
    let ctrl = Controller::new(config, patch)?;
    println!("Rendering {seconds}s to {}...", wav.display());
    let render = ctrl.render_to_wav(wav, seconds)?;
    println!(
        "Wrote {} frames at {} Hz, peak {:.3}, {} steps",
        render.frames.len(),
        render.sample_rate,
        render.peak(),
        render.steps.len()
    );
    Ok(())
}

fn dump(config: &EngineConfig, patch: &Patch, steps: usize) -> anyhow::Result<()> {
    let patch = patch.edit(|p| p.transport.is_playing = true);
    // enough audio for the requested steps plus the start offset and look-ahead
    let seconds =
        steps as f64 * patch.transport.sixteenth() + config.start_offset_secs + config.look_ahead_secs;
    let render = render_offline(&patch, config, seconds, true)?;

    for event in &render.events {
        let target = match event.target {
            EventTarget::Track(t) => format!("track {t}"),
            EventTarget::Metronome => "click".to_string(),
            EventTarget::Midi => "midi".to_string(),
        };
        match &event.payload {
            EventPayload::Note { pitch, velocity, duration } => {
                println!("{:9.4}  {target:<8} {pitch:<4} vel {velocity:.2} dur {duration:.3}", event.time)
            }
            EventPayload::Click => println!("{:9.4}  {target:<8} click", event.time),
            EventPayload::Midi(msg) => println!("{:9.4}  {target:<8} {msg:?}", event.time),
        }
    }
    println!("{} events, {} steps", render.events.len(), render.steps.len());
    Ok(())
}
