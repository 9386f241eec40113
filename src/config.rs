//! Configuration file support for groovegrid
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/groovegrid/config.toml`
//! - macOS: `~/Library/Application Support/groovegrid/config.toml`
//! - Windows: `%APPDATA%\groovegrid\config.toml`

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sequencer::dispatch::{Dispatcher, Mix, BASE_NOTE_SECONDS};
use crate::sequencer::timing::{Subdivision, Tempo};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tempo, grid and metronome defaults
    pub playback: PlaybackSettings,
    /// Volume per sound category, in percent
    pub mix: Mix,
    /// Live MIDI output
    pub midi: MidiSettings,
    /// MIDI file export
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub bpm: Tempo,
    pub subdivision: Subdivision,
    /// Click on every beat while a bass groove plays
    pub metronome: bool,
    /// Seconds a note sounds per step of duration
    pub base_note_seconds: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            bpm: Tempo::default(),
            subdivision: Subdivision::default(),
            metronome: true,
            base_note_seconds: BASE_NOTE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Connect on startup to the first output port containing this name
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub directory: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "groovegrid") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Write the defaults to the config path unless a file already exists
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if !path.exists() {
            Config::default().save_to(&path)?;
        }
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.playback.base_note_seconds;
        if !base.is_finite() || base <= 0.0 {
            return Err(Error::Config(format!(
                "base_note_seconds must be positive, got {}",
                base
            )));
        }
        let mix = &self.mix;
        for (name, value) in [
            ("bass", mix.bass),
            ("drums", mix.drums),
            ("chords", mix.chords),
            ("click", mix.click),
        ] {
            if value > 100 {
                return Err(Error::Config(format!(
                    "mix.{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Dispatcher settings for a bass groove
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            mix: self.mix,
            base_note_seconds: self.playback.base_note_seconds,
            metronome: self.playback.metronome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.playback.bpm = Tempo::new(96).unwrap();
        config.playback.subdivision = Subdivision::Triplet;
        config.mix.chords = 10;
        config.midi.port = Some("IAC".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[playback]\nbpm = 90\n").unwrap();
        assert_eq!(config.playback.bpm.bpm(), 90);
        assert_eq!(config.playback.subdivision, Subdivision::Sixteenth);
        assert_eq!(config.mix, Mix::default());
        assert!(config.playback.metronome);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(toml::from_str::<Config>("[playback]\nbpm = 300\n").is_err());
        assert!(toml::from_str::<Config>("[playback]\nsubdivision = 12\n").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[mix]\nbass = 150\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
