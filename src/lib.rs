//! groovegrid - a grid-based groove sequencer library
//!
//! This library provides the core components for building groove sequencers:
//! - Bass and drum grooves on a 16th, triplet or 32nd grid
//! - Lookahead playback scheduling against an audio clock
//! - Trigger dispatch to audio and MIDI outputs
//! - Standard MIDI File export

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioClock, AudioOutput};
pub use config::Config;
pub use error::{Error, Result};
pub use midi::{frequency_to_midi_note, midi_note_name, MidiOutputDevice};
pub use sequencer::chord::Chord;
pub use sequencer::dispatch::{Dispatcher, Mix, Trigger, TriggerKind, TriggerSink};
pub use sequencer::groove::{
    DrumBar, DrumChannel, DrumGroove, Groove, MelodicBar, MelodicGroove, Note, Step,
};
pub use sequencer::playback::{Clock, PlaybackEngine, PlaybackEvent};
pub use sequencer::timing::{Subdivision, Tempo};
pub use sequencer::Sequencer;
