//! Built-in oscillator presets.

use sg_ir::{Adsr, FilterSettings, Patch, Waveform};
use tracing::info;

use crate::PatchError;

/// Sound settings a preset replaces; mixer state (mute, sends, arp) is kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub wave: Waveform,
    pub octave: i32,
    pub volume: f32,
    pub adsr: Adsr,
    pub filter: FilterSettings,
}

const fn preset(
    name: &'static str,
    wave: Waveform,
    octave: i32,
    adsr: [f32; 4],
    filter: [f32; 2],
) -> Preset {
    Preset {
        name,
        wave,
        octave,
        volume: 0.5,
        adsr: Adsr { attack: adsr[0], decay: adsr[1], sustain: adsr[2], release: adsr[3] },
        filter: FilterSettings { freq: filter[0], res: filter[1] },
    }
}

pub const PRESETS: [Preset; 12] = [
    preset("Init", Waveform::Sine, 0, [0.01, 0.1, 1.0, 0.1], [20_000.0, 0.1]),
    preset("Sub Bass", Waveform::Sine, -2, [0.01, 0.2, 0.9, 0.2], [150.0, 0.1]),
    preset("Reese", Waveform::Sawtooth, -2, [0.05, 0.3, 0.7, 0.4], [800.0, 0.5]),
    preset("Warm Pad", Waveform::Triangle, 0, [0.8, 0.5, 0.6, 1.2], [1200.0, 0.2]),
    preset("Vapor Lead", Waveform::Square, 1, [0.01, 0.2, 0.6, 0.3], [4000.0, 0.5]),
    preset("Pluck", Waveform::Square, 0, [0.01, 0.2, 0.0, 0.2], [800.0, 0.5]),
    preset("Strings", Waveform::Sawtooth, 0, [0.4, 0.2, 0.8, 0.8], [6000.0, 0.5]),
    preset("Brass", Waveform::Sawtooth, -1, [0.15, 0.2, 0.7, 0.3], [2500.0, 0.5]),
    preset("E-Piano", Waveform::Triangle, 0, [0.01, 0.5, 0.3, 0.4], [3000.0, 0.5]),
    preset("Crystal", Waveform::Sine, 2, [0.01, 0.8, 0.1, 1.5], [8000.0, 0.1]),
    preset("Acid", Waveform::Sawtooth, -1, [0.01, 0.4, 0.1, 0.1], [1500.0, 0.8]),
    preset("Organ", Waveform::Triangle, 1, [0.05, 0.1, 1.0, 0.1], [5000.0, 0.5]),
];

/// Look up a preset by name, ignoring ASCII case.
pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Return a copy of `patch` with preset `name` applied to `track`.
pub fn apply_preset(patch: &Patch, track: usize, name: &str) -> Result<Patch, PatchError> {
    let preset = find_preset(name).ok_or_else(|| PatchError::UnknownPreset(name.to_string()))?;
    let tracks = patch.oscillators.len();
    if track >= tracks {
        return Err(PatchError::NoSuchTrack { track, tracks });
    }
    info!(track, preset = preset.name, "applying preset");
    Ok(patch.edit(|p| {
        let osc = &mut p.oscillators[track];
        osc.wave = preset.wave;
        osc.octave = preset.octave;
        osc.volume = preset.volume;
        osc.adsr = preset.adsr;
        osc.filter = preset.filter;
    }))
}
