//! Chord labels and their pitches

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// MIDI note of the C the chord roots are voiced from (C4)
const ROOT_OCTAVE_BASE: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
    HalfDiminished7,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 4] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Dominant7,
        ChordQuality::HalfDiminished7,
    ];

    fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::HalfDiminished7 => &[0, 3, 6, 10],
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dominant7 => "7",
            ChordQuality::HalfDiminished7 => "ø7",
        }
    }
}

/// A chord label such as `C`, `F#m`, `Bb7` or `Aø7`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    root: u8,
    quality: ChordQuality,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        Self {
            root: root % 12,
            quality,
        }
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn quality(&self) -> ChordQuality {
        self.quality
    }

    /// Every chord the editor offers, grouped by quality
    pub fn all() -> impl Iterator<Item = Chord> {
        ChordQuality::ALL
            .into_iter()
            .flat_map(|quality| (0..12).map(move |root| Chord::new(root, quality)))
    }

    pub fn midi_notes(&self) -> Vec<u8> {
        self.quality
            .intervals()
            .iter()
            .map(|interval| ROOT_OCTAVE_BASE + self.root + interval)
            .collect()
    }

    /// Equal-tempered frequencies of the chord tones
    pub fn frequencies(&self) -> Vec<f32> {
        self.midi_notes()
            .into_iter()
            .map(crate::midi::midi_note_to_frequency)
            .collect()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            PITCH_NAMES[self.root as usize],
            self.quality.suffix()
        )
    }
}

impl FromStr for Chord {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidChord(label.to_string());
        let label = label.trim();

        let mut chars = label.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let mut root: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let mut rest = chars.as_str();
        if let Some(stripped) = rest.strip_prefix('#') {
            root += 1;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('b') {
            root -= 1;
            rest = stripped;
        }

        let quality = match rest {
            "" => ChordQuality::Major,
            "m" => ChordQuality::Minor,
            "7" => ChordQuality::Dominant7,
            "ø7" | "m7b5" => ChordQuality::HalfDiminished7,
            _ => return Err(invalid()),
        };

        Ok(Chord::new(root.rem_euclid(12) as u8, quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let chord: Chord = "F#m".parse().unwrap();
        assert_eq!(chord.root(), 6);
        assert_eq!(chord.quality(), ChordQuality::Minor);

        let chord: Chord = "Bb7".parse().unwrap();
        assert_eq!(chord.to_string(), "A#7");

        let chord: Chord = "Cm7b5".parse().unwrap();
        assert_eq!(chord.to_string(), "Cø7");

        assert!("H".parse::<Chord>().is_err());
        assert!("Cmaj9".parse::<Chord>().is_err());
        assert!("".parse::<Chord>().is_err());
    }

    #[test]
    fn test_chord_pitches() {
        let a_minor: Chord = "Am".parse().unwrap();
        assert_eq!(a_minor.midi_notes(), vec![69, 72, 76]);
        let freqs = a_minor.frequencies();
        assert!((freqs[0] - 440.0).abs() < 0.01);
        assert!((freqs[1] - 523.25).abs() < 0.01);

        let c7: Chord = "C7".parse().unwrap();
        let freqs = c7.frequencies();
        assert_eq!(freqs.len(), 4);
        assert!((freqs[0] - 261.63).abs() < 0.01);
        assert!((freqs[3] - 466.16).abs() < 0.01);
    }

    #[test]
    fn test_all_labels_round_trip() {
        assert_eq!(Chord::all().count(), 48);
        for chord in Chord::all() {
            assert_eq!(chord.to_string().parse::<Chord>().unwrap(), chord);
        }
    }
}
