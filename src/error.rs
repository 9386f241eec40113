//! Error types for groovegrid

use thiserror::Error;

/// Result type alias for groovegrid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in groovegrid
#[derive(Debug, Error)]
pub enum Error {
    /// Tempo outside the supported range
    #[error("Invalid tempo: {0} bpm (expected 40-240)")]
    InvalidTempo(f64),

    /// Grid resolution other than 16, 24 or 32 steps per bar
    #[error("Invalid subdivision: {0} (expected 16, 24 or 32)")]
    InvalidSubdivision(u32),

    /// Note frequency that is zero, negative or not finite
    #[error("Invalid frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// Note duration outside 1..=4 step units
    #[error("Invalid note duration: {0} (expected 1-4 steps)")]
    InvalidDuration(u8),

    /// Chord label that cannot be parsed
    #[error("Invalid chord label: {0:?}")]
    InvalidChord(String),

    /// Step index past the end of a bar
    #[error("Step {step} out of range for a bar of {len} steps")]
    StepOutOfRange { step: usize, len: usize },

    /// Bar index past the end of the groove
    #[error("Bar {bar} out of range for a groove of {len} bars")]
    BarOutOfRange { bar: usize, len: usize },

    /// Audio clock, audio device or MIDI port could not be obtained
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Groove cannot be written as a MIDI file
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// MIDI backend error
    #[error("MIDI error: {0}")]
    Midi(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
