//! Audio output using cpal
//!
//! Renders triggers with a handful of simple voices and doubles as the audio
//! clock: the number of frames written to the device, divided by the sample
//! rate, is the time base the scheduler plans against.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::sequencer::dispatch::{Trigger, TriggerKind, TriggerSink};
use crate::sequencer::groove::DrumChannel;
use crate::sequencer::playback::Clock;

/// Level at which exponential decays end
const DECAY_FLOOR: f32 = 0.01;
const MASTER_GAIN: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Waveform {
    Sine,
    Saw,
    Noise,
}

#[derive(Debug, Clone)]
struct Voice {
    start_frame: u64,
    length: u64,
    waveform: Waveform,
    start_freq: f32,
    end_freq: f32,
    volume: f32,
    phase: f32,
}

impl Voice {
    fn is_finished(&self, frame: u64) -> bool {
        frame >= self.start_frame + self.length
    }

    fn sample(&mut self, frame: u64, sample_rate: f32) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let progress = (frame - self.start_frame) as f32 / self.length as f32;
        let freq = self.start_freq * (self.end_freq / self.start_freq).powf(progress);
        let gain = self.volume * DECAY_FLOOR.powf(progress);

        let value = match self.waveform {
            Waveform::Sine => (self.phase * 2.0 * std::f32::consts::PI).sin(),
            Waveform::Saw => 2.0 * self.phase - 1.0,
            Waveform::Noise => rand::random::<f32>() * 2.0 - 1.0,
        };
        self.phase = (self.phase + freq / sample_rate).fract();
        value * gain
    }
}

/// Drum voicing: (waveform, start Hz, end Hz, level)
fn drum_voice(channel: DrumChannel) -> (Waveform, f32, f32, f32) {
    match channel {
        DrumChannel::Kick => (Waveform::Sine, 150.0, 40.0, 1.5),
        DrumChannel::Snare => (Waveform::Noise, 1.0, 1.0, 1.0),
        DrumChannel::HiHat => (Waveform::Noise, 1.0, 1.0, 0.6),
        DrumChannel::Crash => (Waveform::Noise, 1.0, 1.0, 0.7),
        DrumChannel::Ride => (Waveform::Noise, 1.0, 1.0, 0.5),
        DrumChannel::Tom1 => (Waveform::Sine, 250.0, 100.0, 1.0),
        DrumChannel::Tom2 => (Waveform::Sine, 200.0, 80.0, 1.0),
        DrumChannel::Tom3 => (Waveform::Sine, 150.0, 60.0, 1.0),
    }
}

fn voices_for(trigger: &Trigger, sample_rate: f64) -> Vec<Voice> {
    let start_frame = (trigger.time.max(0.0) * sample_rate) as u64;
    let length = ((trigger.duration * sample_rate) as u64).max(1);
    let voice = |waveform, start_freq: f32, end_freq: f32, volume: f32| Voice {
        start_frame,
        length,
        waveform,
        start_freq,
        end_freq,
        volume,
        phase: 0.0,
    };

    match trigger.kind {
        TriggerKind::Note => trigger
            .pitches
            .iter()
            .map(|&f| voice(Waveform::Saw, f, f, trigger.volume))
            .collect(),
        TriggerKind::Mute => trigger
            .pitches
            .iter()
            .map(|&f| voice(Waveform::Saw, f, f, trigger.volume * 0.4))
            .collect(),
        TriggerKind::Chord | TriggerKind::Click => trigger
            .pitches
            .iter()
            .map(|&f| voice(Waveform::Sine, f, f, trigger.volume))
            .collect(),
        TriggerKind::Drum(channel) => {
            let (waveform, start, end, level) = drum_voice(channel);
            vec![voice(waveform, start, end, trigger.volume * level)]
        }
    }
}

/// Clock driven by the frames the audio device has consumed
#[derive(Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl Clock for AudioClock {
    fn now(&self) -> Result<f64> {
        Ok(self.frames.load(Ordering::Acquire) as f64 / self.sample_rate)
    }
}

pub struct AudioOutput {
    _stream: cpal::Stream,
    frames: Arc<AtomicU64>,
    voices: Arc<Mutex<Vec<Voice>>>,
    sample_rate: f64,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let frames = Arc::new(AtomicU64::new(0));
        let voices = Arc::new(Mutex::new(Vec::new()));

        let (stream, sample_rate) =
            Self::setup_audio_stream(Arc::clone(&frames), Arc::clone(&voices))?;

        Ok(Self {
            _stream: stream,
            frames,
            voices,
            sample_rate,
        })
    }

    fn setup_audio_stream(
        frames: Arc<AtomicU64>,
        voices: Arc<Mutex<Vec<Voice>>>,
    ) -> Result<(cpal::Stream, f64)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::ResourceUnavailable("no default audio output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::ResourceUnavailable(format!("audio output config: {}", e)))?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut voices = match voices.lock() {
                        Ok(voices) => voices,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let mut frame = frames.load(Ordering::Acquire);

                    for out in data.chunks_mut(channels) {
                        let mut mix = 0.0;
                        for voice in voices.iter_mut() {
                            mix += voice.sample(frame, sample_rate);
                        }
                        let value = (mix * MASTER_GAIN).clamp(-1.0, 1.0);
                        out.fill(value);
                        frame += 1;
                    }

                    voices.retain(|voice| !voice.is_finished(frame));
                    frames.store(frame, Ordering::Release);
                },
                |err| error!("audio stream error: {}", err),
                None,
            ),
            other => {
                return Err(Error::ResourceUnavailable(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| Error::ResourceUnavailable(format!("failed to open audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::ResourceUnavailable(format!("failed to start audio stream: {}", e)))?;

        info!(
            "audio output running at {} Hz, {} channels",
            sample_rate, channels
        );
        Ok((stream, sample_rate as f64))
    }

    pub fn clock(&self) -> AudioClock {
        AudioClock {
            frames: Arc::clone(&self.frames),
            sample_rate: self.sample_rate,
        }
    }

    /// Cut every sounding and scheduled voice
    pub fn silence(&self) {
        if let Ok(mut voices) = self.voices.lock() {
            voices.clear();
        }
    }
}

impl TriggerSink for AudioOutput {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()> {
        let new_voices = voices_for(trigger, self.sample_rate);
        let mut voices = self
            .voices
            .lock()
            .map_err(|_| Error::ResourceUnavailable("audio voice list poisoned".to_string()))?;
        voices.extend(new_voices);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(kind: TriggerKind, pitches: Vec<f32>) -> Trigger {
        Trigger {
            time: 0.5,
            kind,
            pitches,
            duration: 0.25,
            volume: 0.8,
        }
    }

    #[test]
    fn test_voices_start_at_trigger_time() {
        let voices = voices_for(&trigger(TriggerKind::Note, vec![110.0]), 48_000.0);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].start_frame, 24_000);
        assert_eq!(voices[0].length, 12_000);
        assert_eq!(voices[0].waveform, Waveform::Saw);
    }

    #[test]
    fn test_chord_gets_one_voice_per_pitch() {
        let voices = voices_for(
            &trigger(TriggerKind::Chord, vec![261.63, 329.63, 392.0]),
            44_100.0,
        );
        assert_eq!(voices.len(), 3);
        assert!(voices.iter().all(|v| v.waveform == Waveform::Sine));
    }

    #[test]
    fn test_voice_is_silent_before_start_and_decays() {
        let mut voice = voices_for(
            &trigger(TriggerKind::Drum(DrumChannel::Kick), vec![]),
            1_000.0,
        )
        .remove(0);
        assert_eq!(voice.sample(100, 1_000.0), 0.0);
        assert!(!voice.is_finished(600));
        assert!(voice.is_finished(750));
    }
}
