//! Time base - grid resolution, tempo and the conversions between them

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// MIDI file resolution in ticks per quarter note
pub const TICKS_PER_QUARTER_NOTE: u32 = 480;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 240;

/// Grid resolution: number of steps in one 4/4 bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Subdivision {
    /// 16th notes
    #[default]
    Sixteenth,
    /// 16th-note triplets
    Triplet,
    /// 32nd notes
    ThirtySecond,
}

impl Subdivision {
    pub const ALL: [Subdivision; 3] = [
        Subdivision::Sixteenth,
        Subdivision::ThirtySecond,
        Subdivision::Triplet,
    ];

    pub fn steps_per_bar(self) -> usize {
        match self {
            Subdivision::Sixteenth => 16,
            Subdivision::Triplet => 24,
            Subdivision::ThirtySecond => 32,
        }
    }

    /// Steps in one quarter-note beat, used for beat boundaries
    pub fn steps_per_beat(self) -> usize {
        match self {
            Subdivision::Sixteenth => 4,
            Subdivision::Triplet => 6,
            Subdivision::ThirtySecond => 8,
        }
    }

    pub fn is_beat_boundary(self, step: usize) -> bool {
        step % self.steps_per_beat() == 0
    }

    /// MIDI ticks covered by one step at [`TICKS_PER_QUARTER_NOTE`]
    pub fn ticks_per_step(self) -> u32 {
        TICKS_PER_QUARTER_NOTE / (self.steps_per_bar() as u32 / 4)
    }

    pub fn label(self) -> &'static str {
        match self {
            Subdivision::Sixteenth => "16th Notes",
            Subdivision::Triplet => "Triplets",
            Subdivision::ThirtySecond => "32nd Notes",
        }
    }
}

impl TryFrom<u32> for Subdivision {
    type Error = Error;

    fn try_from(steps: u32) -> Result<Self> {
        match steps {
            16 => Ok(Subdivision::Sixteenth),
            24 => Ok(Subdivision::Triplet),
            32 => Ok(Subdivision::ThirtySecond),
            other => Err(Error::InvalidSubdivision(other)),
        }
    }
}

impl From<Subdivision> for u32 {
    fn from(subdivision: Subdivision) -> u32 {
        subdivision.steps_per_bar() as u32
    }
}

/// Beats per minute, always within [`MIN_BPM`]..=[`MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    pub fn new(bpm: u32) -> Result<Self> {
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(Error::InvalidTempo(bpm as f64))
        }
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Seconds between two consecutive steps at this tempo
    pub fn step_interval(self, subdivision: Subdivision) -> Result<f64> {
        step_interval(self.0 as f64, subdivision)
    }

    pub fn microseconds_per_quarter_note(self) -> u32 {
        (60_000_000.0 / self.0 as f64).round() as u32
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120)
    }
}

impl TryFrom<u32> for Tempo {
    type Error = Error;

    fn try_from(bpm: u32) -> Result<Self> {
        Tempo::new(bpm)
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> u32 {
        tempo.0
    }
}

/// Wall-clock duration of one grid step for an arbitrary bpm value
pub fn step_interval(bpm: f64, subdivision: Subdivision) -> Result<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(Error::InvalidTempo(bpm));
    }
    Ok(60.0 / bpm / subdivision.steps_per_beat() as f64)
}
