//! Grid model - grooves made of fixed-length bars
//!
//! A groove is independent of playback and UI: the scheduler and the MIDI
//! encoder only ever read it, the editor mutates it.

use std::fmt;

use super::chord::Chord;
use super::timing::Subdivision;
use crate::error::{Error, Result};

pub const MIN_NOTE_DURATION: u8 = 1;
pub const MAX_NOTE_DURATION: u8 = 4;

/// A sounding note: pitch in Hz and a length in grid steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub frequency: f32,
    pub duration: u8,
}

impl Note {
    pub fn new(frequency: f32, duration: u8) -> Result<Self> {
        let note = Self {
            frequency,
            duration,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(Error::InvalidFrequency(self.frequency));
        }
        if !(MIN_NOTE_DURATION..=MAX_NOTE_DURATION).contains(&self.duration) {
            return Err(Error::InvalidDuration(self.duration));
        }
        Ok(())
    }
}

/// One cell of a melodic bar
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Step {
    #[default]
    Empty,
    Note(Note),
    /// Percussive dead note without pitch
    Muted,
}

impl Step {
    pub fn is_empty(&self) -> bool {
        matches!(self, Step::Empty)
    }
}

/// Drum instrument channels of a drum bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumChannel {
    Kick,
    Snare,
    HiHat,
    Crash,
    Ride,
    Tom1,
    Tom2,
    Tom3,
}

impl DrumChannel {
    pub const COUNT: usize = 8;

    pub const ALL: [DrumChannel; DrumChannel::COUNT] = [
        DrumChannel::Kick,
        DrumChannel::Snare,
        DrumChannel::HiHat,
        DrumChannel::Crash,
        DrumChannel::Ride,
        DrumChannel::Tom1,
        DrumChannel::Tom2,
        DrumChannel::Tom3,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            DrumChannel::Kick => "Kick",
            DrumChannel::Snare => "Snare",
            DrumChannel::HiHat => "Hi-Hat",
            DrumChannel::Crash => "Crash",
            DrumChannel::Ride => "Ride",
            DrumChannel::Tom1 => "Tom 1",
            DrumChannel::Tom2 => "Tom 2",
            DrumChannel::Tom3 => "Tom 3",
        }
    }

    /// How long a hit on this channel rings, in seconds
    pub fn decay_seconds(self) -> f64 {
        match self {
            DrumChannel::Kick => 0.5,
            DrumChannel::Snare => 0.2,
            DrumChannel::HiHat => 0.05,
            DrumChannel::Crash => 1.0,
            DrumChannel::Ride => 0.1,
            DrumChannel::Tom1 | DrumChannel::Tom2 | DrumChannel::Tom3 => 0.3,
        }
    }
}

/// Storage shared by every kind of bar a groove can hold
pub trait Bar: Clone + fmt::Debug {
    /// A bar of `len` silent steps
    fn empty(len: usize) -> Self;

    fn step_count(&self) -> usize;
}

/// Bar of a bass line: one note lane plus an optional chord
#[derive(Debug, Clone, PartialEq)]
pub struct MelodicBar {
    steps: Vec<Step>,
    chord: Option<Chord>,
}

impl MelodicBar {
    pub fn step(&self, index: usize) -> Step {
        self.steps.get(index).copied().unwrap_or_default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn set_step(&mut self, index: usize, step: Step) -> Result<()> {
        if let Step::Note(note) = step {
            note.validate()?;
        }
        let len = self.steps.len();
        let cell = self
            .steps
            .get_mut(index)
            .ok_or(Error::StepOutOfRange { step: index, len })?;
        *cell = step;
        Ok(())
    }

    pub fn chord(&self) -> Option<Chord> {
        self.chord
    }

    pub fn set_chord(&mut self, chord: Option<Chord>) {
        self.chord = chord;
    }

    /// Index of the earlier sounding note whose duration reaches into `index`.
    /// Notes on covered slots never sound and cover nothing themselves.
    pub fn covered_by(&self, index: usize) -> Option<usize> {
        if index >= self.steps.len() {
            return None;
        }
        let mut start = 0;
        while start < index {
            match self.steps[start] {
                Step::Note(note) => {
                    let end = start + (self.clipped_duration(start, &note) as usize).max(1);
                    if index < end {
                        return Some(start);
                    }
                    start = end;
                }
                _ => start += 1,
            }
        }
        None
    }

    pub fn is_covered(&self, index: usize) -> bool {
        self.covered_by(index).is_some()
    }

    /// Duration of the note at `index`, clipped at the end of the bar
    pub fn clipped_duration(&self, index: usize, note: &Note) -> u8 {
        let remaining = self.steps.len().saturating_sub(index);
        (note.duration as usize).min(remaining) as u8
    }
}

impl Bar for MelodicBar {
    fn empty(len: usize) -> Self {
        Self {
            steps: vec![Step::Empty; len],
            chord: None,
        }
    }

    fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Bar of a drum groove: one hit lane per channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumBar {
    lanes: [Vec<bool>; DrumChannel::COUNT],
}

impl DrumBar {
    pub fn hit(&self, channel: DrumChannel, index: usize) -> bool {
        self.lanes[channel.index()]
            .get(index)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_hit(&mut self, channel: DrumChannel, index: usize, value: bool) -> Result<()> {
        let lane = &mut self.lanes[channel.index()];
        let len = lane.len();
        let cell = lane
            .get_mut(index)
            .ok_or(Error::StepOutOfRange { step: index, len })?;
        *cell = value;
        Ok(())
    }

    pub fn toggle_hit(&mut self, channel: DrumChannel, index: usize) -> Result<()> {
        let current = self.hit(channel, index);
        self.set_hit(channel, index, !current)
    }

    /// Channels hit at `index`, in channel order
    pub fn hits_at(&self, index: usize) -> impl Iterator<Item = DrumChannel> + '_ {
        DrumChannel::ALL
            .into_iter()
            .filter(move |&channel| self.hit(channel, index))
    }
}

impl Bar for DrumBar {
    fn empty(len: usize) -> Self {
        Self {
            lanes: std::array::from_fn(|_| vec![false; len]),
        }
    }

    fn step_count(&self) -> usize {
        self.lanes[0].len()
    }
}

/// A non-empty sequence of bars sharing one subdivision
#[derive(Debug, Clone, PartialEq)]
pub struct Groove<B> {
    subdivision: Subdivision,
    bars: Vec<B>,
}

pub type MelodicGroove = Groove<MelodicBar>;
pub type DrumGroove = Groove<DrumBar>;

impl<B: Bar> Groove<B> {
    pub fn new(subdivision: Subdivision) -> Self {
        Self {
            subdivision,
            bars: vec![B::empty(subdivision.steps_per_bar())],
        }
    }

    pub fn from_bars(subdivision: Subdivision, bars: Vec<B>) -> Result<Self> {
        let groove = Self { subdivision, bars };
        groove.validate()?;
        Ok(groove)
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn bars(&self) -> &[B] {
        &self.bars
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bar(&self, index: usize) -> Option<&B> {
        self.bars.get(index)
    }

    pub fn bar_mut(&mut self, index: usize) -> Result<&mut B> {
        let len = self.bars.len();
        self.bars
            .get_mut(index)
            .ok_or(Error::BarOutOfRange { bar: index, len })
    }

    /// Length of one playback loop in steps
    pub fn total_steps(&self) -> usize {
        self.bars.len() * self.subdivision.steps_per_bar()
    }

    /// Split a loop position into (bar, step within bar)
    pub fn locate(&self, position: usize) -> (usize, usize) {
        let steps = self.subdivision.steps_per_bar();
        (position / steps, position % steps)
    }

    pub fn add_bar(&mut self) {
        self.bars.push(B::empty(self.subdivision.steps_per_bar()));
    }

    /// Remove a bar; removing the only bar is a no-op that returns `false`
    pub fn remove_bar(&mut self, index: usize) -> Result<bool> {
        let len = self.bars.len();
        if index >= len {
            return Err(Error::BarOutOfRange { bar: index, len });
        }
        if len == 1 {
            return Ok(false);
        }
        self.bars.remove(index);
        Ok(true)
    }

    /// Switch resolution; the groove restarts as a single empty bar
    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        self.subdivision = subdivision;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.bars = vec![B::empty(self.subdivision.steps_per_bar())];
    }

    pub fn validate(&self) -> Result<()> {
        if self.bars.is_empty() {
            return Err(Error::Encoding("groove has no bars".to_string()));
        }
        let expected = self.subdivision.steps_per_bar();
        for (index, bar) in self.bars.iter().enumerate() {
            if bar.step_count() != expected {
                return Err(Error::Encoding(format!(
                    "bar {} has {} steps, expected {}",
                    index,
                    bar.step_count(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

impl<B: Bar> Default for Groove<B> {
    fn default() -> Self {
        Self::new(Subdivision::default())
    }
}

impl MelodicGroove {
    pub fn set_step(&mut self, bar: usize, step: usize, value: Step) -> Result<()> {
        self.bar_mut(bar)?.set_step(step, value)
    }

    pub fn set_chord(&mut self, bar: usize, chord: Option<Chord>) -> Result<()> {
        self.bar_mut(bar)?.set_chord(chord);
        Ok(())
    }
}

impl DrumGroove {
    pub fn toggle_hit(&mut self, bar: usize, channel: DrumChannel, step: usize) -> Result<()> {
        self.bar_mut(bar)?.toggle_hit(channel, step)
    }
}
