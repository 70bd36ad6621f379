//! Pitch names in scientific notation and circle-of-fifths transposition.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pitch-class names, sharps only, in chromatic order.
pub const PITCH_CLASS_NAMES: [&str; 12] =
    ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Semitones in a perfect fifth.
const FIFTH: i32 = 7;

/// Frequency of C0 (A4 = 440 Hz, 4.75 octaves below).
const C0_HZ: f64 = 16.351_597_831_287_414;

/// Error produced when a note name cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PitchError {
    #[error("empty note name")]
    Empty,
    #[error("unknown pitch class in {0:?}")]
    UnknownClass(String),
    #[error("missing or invalid octave in {0:?}")]
    BadOctave(String),
}

/// A note name: pitch class (0 = C .. 11 = B) plus octave number.
///
/// Field order makes the derived `Ord` sort by octave first, then by
/// pitch class, which is the order the arpeggiator relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pitch {
    octave: i8,
    class: u8,
}

impl Pitch {
    /// Build a pitch from a class index (wrapped mod 12) and an octave.
    pub fn new(class: u8, octave: i8) -> Self {
        Self { octave, class: class % 12 }
    }

    /// Pitch class index, 0 = C.
    pub fn class(self) -> u8 {
        self.class
    }

    pub fn octave(self) -> i8 {
        self.octave
    }

    /// Rotate the pitch class by `steps` positions on the circle of fifths.
    ///
    /// The octave number is kept even when the rotation wraps past B.
    pub fn shift_fifths(self, steps: i32) -> Self {
        if steps == 0 {
            return self;
        }
        let class = (self.class as i32 + steps * FIFTH).rem_euclid(12);
        Self { octave: self.octave, class: class as u8 }
    }

    /// Frequency in Hz, with an extra octave transposition applied.
    pub fn frequency(self, octave_shift: i32) -> f64 {
        let octave = self.octave as f64 + octave_shift as f64;
        C0_HZ * libm::pow(2.0, octave + self.class as f64 / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PITCH_CLASS_NAMES[self.class as usize], self.octave)
    }
}

impl FromStr for Pitch {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.char_indices();
        let (_, letter) = chars.next().ok_or(PitchError::Empty)?;
        let natural = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(PitchError::UnknownClass(s.to_string())),
        };

        let mut rest = &s[letter.len_utf8()..];
        let mut class = natural as i32;
        if let Some(stripped) = rest.strip_prefix('#') {
            class += 1;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('b') {
            class -= 1;
            rest = stripped;
        }

        let digits = rest.strip_prefix('-').unwrap_or(rest);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PitchError::BadOctave(s.to_string()));
        }
        let octave: i8 = rest.parse().map_err(|_| PitchError::BadOctave(s.to_string()))?;

        Ok(Self::new(class.rem_euclid(12) as u8, octave))
    }
}

impl TryFrom<String> for Pitch {
    type Error = PitchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pitch> for String {
    fn from(p: Pitch) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Pitch {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(p("C4"), Pitch::new(0, 4));
        assert_eq!(p("F#3"), Pitch::new(6, 3));
        assert_eq!(p("A#0").to_string(), "A#0");
    }

    #[test]
    fn flats_normalize_to_sharps() {
        assert_eq!(p("Db4"), p("C#4"));
        assert_eq!(p("Bb2").to_string(), "A#2");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Pitch>(), Err(PitchError::Empty));
        assert!(matches!("H4".parse::<Pitch>(), Err(PitchError::UnknownClass(_))));
        assert!(matches!("C".parse::<Pitch>(), Err(PitchError::BadOctave(_))));
        assert!(matches!("C#x".parse::<Pitch>(), Err(PitchError::BadOctave(_))));
    }

    #[test]
    fn one_fifth_up_from_c_is_g() {
        assert_eq!(p("C4").shift_fifths(1), p("G4"));
        assert_eq!(p("G4").shift_fifths(-1), p("C4"));
    }

    #[test]
    fn fifths_round_trip_every_class_and_amount() {
        for class in 0..12 {
            let start = Pitch::new(class, 3);
            for n in -9..=9 {
                assert_eq!(start.shift_fifths(n).shift_fifths(-n), start);
            }
        }
    }

    #[test]
    fn shift_keeps_octave_when_wrapping() {
        // B4 up a fifth is F#, octave number untouched
        assert_eq!(p("B4").shift_fifths(1), p("F#4"));
        assert_eq!(p("C4").shift_fifths(-1), p("F4"));
    }

    #[test]
    fn ordering_is_octave_then_class() {
        let mut notes = vec![p("C5"), p("G4"), p("E4"), p("C4")];
        notes.sort();
        assert_eq!(notes, vec![p("C4"), p("E4"), p("G4"), p("C5")]);
    }

    #[test]
    fn a4_is_440() {
        assert!((p("A4").frequency(0) - 440.0).abs() < 1e-6);
        assert!((p("A3").frequency(1) - 440.0).abs() < 1e-6);
    }

    #[test]
    fn serde_uses_note_name_strings() {
        let json = serde_json::to_string(&p("D#2")).unwrap();
        assert_eq!(json, "\"D#2\"");
        let back: Pitch = serde_json::from_str("\"Eb2\"").unwrap();
        assert_eq!(back, p("D#2"));
    }
}
