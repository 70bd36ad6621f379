//! Patch document I/O and oscillator presets for synthgrid.
//!
//! A patch is stored as one flat JSON document with camelCase keys.
//! Loading is lenient about missing fields (they take their defaults)
//! and clamps every value into range.

mod presets;

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use sg_ir::Patch;
use thiserror::Error;
use tracing::debug;

pub use presets::{apply_preset, find_preset, Preset, PRESETS};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid patch document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("track {track} out of range (patch has {tracks})")]
    NoSuchTrack { track: usize, tracks: usize },
}

/// Parse a patch document, clamping out-of-range values.
pub fn parse_patch(data: &[u8]) -> Result<Patch, PatchError> {
    let patch: Patch = serde_json::from_slice(data)?;
    Ok(patch.sanitized())
}

/// Read a patch document from `r`.
pub fn read_patch(mut r: impl Read) -> Result<Patch, PatchError> {
    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    parse_patch(&data)
}

/// Write `patch` as pretty-printed JSON.
pub fn write_patch(w: impl Write, patch: &Patch) -> Result<(), PatchError> {
    serde_json::to_writer_pretty(w, patch)?;
    Ok(())
}

pub fn load_patch(path: impl AsRef<Path>) -> Result<Patch, PatchError> {
    let path = path.as_ref();
    let patch = parse_patch(&fs::read(path)?)?;
    debug!(path = %path.display(), tracks = patch.track_count(), "loaded patch");
    Ok(patch)
}

pub fn save_patch(path: impl AsRef<Path>, patch: &Patch) -> Result<(), PatchError> {
    let path = path.as_ref();
    let mut file = fs::File::create(path)?;
    write_patch(&mut file, patch)?;
    file.flush()?;
    debug!(path = %path.display(), "saved patch");
    Ok(())
}
