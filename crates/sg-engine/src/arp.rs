//! Arpeggiator note ordering.

use arrayvec::ArrayVec;
use rand::Rng;
use sg_ir::{ArpMode, Note, MAX_NOTES_PER_STEP};

/// Step notes sorted low to high (octave, then pitch class).
pub fn sorted_notes(notes: &[Note]) -> ArrayVec<Note, MAX_NOTES_PER_STEP> {
    let mut sorted: ArrayVec<Note, MAX_NOTES_PER_STEP> = notes.iter().take(MAX_NOTES_PER_STEP).copied().collect();
    sorted.sort_by_key(|n| n.name);
    sorted
}

/// Index into `n` sorted notes for arp tick `k`.
///
/// `n` must be non-zero.
pub fn arp_index<R: Rng + ?Sized>(mode: ArpMode, k: usize, n: usize, rng: &mut R) -> usize {
    let p = k % n;
    match mode {
        ArpMode::Up => p,
        ArpMode::Down => n - 1 - p,
        ArpMode::Random => rng.gen_range(0..n),
        ArpMode::Converge => {
            if p % 2 == 0 {
                p / 2
            } else {
                n - 1 - p / 2
            }
        }
    }
}
