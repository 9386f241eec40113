//! MIDI output using midir, plus the pitch helpers shared with the file encoder

use log::{debug, info, warn};
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{Error, Result};
use crate::sequencer::dispatch::{Trigger, TriggerKind, TriggerSink};
use crate::sequencer::groove::DrumChannel;

pub mod smf;

const CLIENT_NAME: &str = "groovegrid MIDI Output";

const NOTE_CHANNEL: u8 = 0;
const CHORD_CHANNEL: u8 = 1;
/// General MIDI percussion channel (channel 10)
const DRUM_CHANNEL: u8 = 9;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// GM percussion key used for the metronome (high wood block)
const CLICK_KEY: u8 = 76;

/// Nearest MIDI note number for a frequency in Hz
pub fn frequency_to_midi_note(frequency: f32) -> Result<u8> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(Error::InvalidFrequency(frequency));
    }
    let note = (12.0 * (frequency as f64 / 440.0).log2() + 69.0).round();
    if !(0.0..=127.0).contains(&note) {
        return Err(Error::InvalidFrequency(frequency));
    }
    Ok(note as u8)
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

/// General MIDI percussion key for a drum channel
pub fn gm_drum_key(channel: DrumChannel) -> u8 {
    match channel {
        DrumChannel::Kick => 36,
        DrumChannel::Snare => 38,
        DrumChannel::HiHat => 42,
        DrumChannel::Crash => 49,
        DrumChannel::Ride => 51,
        DrumChannel::Tom1 => 48,
        DrumChannel::Tom2 => 45,
        DrumChannel::Tom3 => 41,
    }
}

fn velocity(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 127.0).round().max(1.0) as u8
}

/// MIDI messages waiting for the audio clock to reach their time
#[derive(Debug, Default)]
pub struct MidiQueue {
    // (clock time, message), kept sorted by time
    pending: Vec<(f64, [u8; 3])>,
}

impl MidiQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Insert after every message at the same time, so equal times keep
    /// their scheduling order
    pub fn schedule(&mut self, time: f64, message: [u8; 3]) {
        let index = self.pending.partition_point(|(t, _)| *t <= time);
        self.pending.insert(index, (time, message));
    }

    pub fn schedule_note(&mut self, time: f64, duration: f64, channel: u8, key: u8, velocity: u8) {
        self.schedule(time, [NOTE_ON | channel, key, velocity]);
        self.schedule(time + duration, [NOTE_OFF | channel, key, 0]);
    }

    /// Queue the Note-On/Note-Off pairs for one trigger
    pub fn schedule_trigger(&mut self, trigger: &Trigger) -> Result<()> {
        let vel = velocity(trigger.volume);
        match trigger.kind {
            TriggerKind::Note | TriggerKind::Mute => {
                for &pitch in &trigger.pitches {
                    let key = frequency_to_midi_note(pitch)?;
                    self.schedule_note(trigger.time, trigger.duration, NOTE_CHANNEL, key, vel);
                }
            }
            TriggerKind::Chord => {
                for &pitch in &trigger.pitches {
                    let key = frequency_to_midi_note(pitch)?;
                    self.schedule_note(trigger.time, trigger.duration, CHORD_CHANNEL, key, vel);
                }
            }
            TriggerKind::Drum(channel) => {
                let key = gm_drum_key(channel);
                self.schedule_note(trigger.time, trigger.duration, DRUM_CHANNEL, key, vel);
            }
            TriggerKind::Click => {
                self.schedule_note(trigger.time, trigger.duration, DRUM_CHANNEL, CLICK_KEY, vel);
            }
        }
        Ok(())
    }

    /// Pass every message due at or before `now` to `send`, oldest first.
    /// A failed send is logged and the remaining messages still go out; the
    /// first error is returned.
    pub fn flush<F>(&mut self, now: f64, mut send: F) -> Result<()>
    where
        F: FnMut(&[u8; 3]) -> Result<()>,
    {
        let due = self.pending.partition_point(|(time, _)| *time <= now);
        let mut first_error = None;
        for (_, message) in self.pending.drain(..due) {
            if let Err(e) = send(&message) {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Empty the queue, keeping only the Note-Offs still owed
    pub fn take_note_offs(&mut self) -> Vec<[u8; 3]> {
        self.pending
            .drain(..)
            .map(|(_, message)| message)
            .filter(|message| message[0] & 0xF0 == NOTE_OFF)
            .collect()
    }
}

/// Live MIDI output. Triggers arrive ahead of time, so messages wait in a
/// [`MidiQueue`] until [`MidiOutputDevice::flush`] sees their clock time pass.
pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    queue: MidiQueue,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            queue: MidiQueue::new(),
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| Error::ResourceUnavailable(format!("MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| Error::ResourceUnavailable(format!("no MIDI port {}", port_index)))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "groovegrid")
            .map_err(|e| Error::ResourceUnavailable(format!("failed to connect: {}", e)))?;

        info!("connected MIDI output to {:?}", name);
        self.connection = Some(connection);
        Ok(())
    }

    /// Connect to the first port whose name contains `name`
    pub fn connect_by_name(&mut self, name: &str) -> Result<()> {
        let index = Self::available_ports()
            .iter()
            .position(|port| port.contains(name))
            .ok_or_else(|| Error::ResourceUnavailable(format!("no MIDI port matching {:?}", name)))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn disconnect(&mut self) {
        self.silence();
        self.connection = None;
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Send every queued message due at or before `now`
    pub fn flush(&mut self, now: f64) -> Result<()> {
        let connection = &mut self.connection;
        self.queue.flush(now, |message| send(connection, message))
    }

    /// Drop queued note-ons and release everything still sounding
    pub fn silence(&mut self) {
        let offs = self.queue.take_note_offs();
        debug!("releasing {} pending MIDI notes", offs.len());
        for message in offs {
            if let Err(e) = send(&mut self.connection, &message) {
                warn!("{}", e);
            }
        }
    }
}

fn send(connection: &mut Option<MidiOutputConnection>, message: &[u8; 3]) -> Result<()> {
    if let Some(conn) = connection {
        conn.send(message)
            .map_err(|e| Error::Midi(format!("failed to send {:02X?}: {}", message, e)))?;
    }
    Ok(())
}

impl TriggerSink for MidiOutputDevice {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.queue.schedule_trigger(trigger)
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_to_midi_note() {
        assert_eq!(frequency_to_midi_note(440.0).unwrap(), 69);
        assert_eq!(frequency_to_midi_note(220.0).unwrap(), 57);
        assert_eq!(frequency_to_midi_note(110.0).unwrap(), 45);
        assert_eq!(frequency_to_midi_note(82.41).unwrap(), 40);
        assert_eq!(frequency_to_midi_note(41.2).unwrap(), 28);
    }

    #[test]
    fn test_frequency_to_midi_note_rejects_bad_input() {
        assert!(matches!(
            frequency_to_midi_note(0.0),
            Err(Error::InvalidFrequency(_))
        ));
        assert!(frequency_to_midi_note(-55.0).is_err());
        assert!(frequency_to_midi_note(f32::INFINITY).is_err());
        assert!(frequency_to_midi_note(f32::NAN).is_err());
        assert!(frequency_to_midi_note(20_000.0).is_err());
    }

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(28), "E1");
        assert_eq!(midi_note_name(45), "A2");
    }

    #[test]
    fn test_unconnected_device_ignores_triggers() {
        let mut device = MidiOutputDevice::new();
        let trigger = Trigger {
            time: 0.0,
            kind: TriggerKind::Note,
            pitches: vec![110.0],
            duration: 0.3,
            volume: 0.7,
        };
        device.trigger(&trigger).unwrap();
        assert_eq!(device.pending_len(), 0);
        device.flush(1.0).unwrap();
    }

    fn note_trigger(time: f64, kind: TriggerKind, pitches: Vec<f32>, duration: f64) -> Trigger {
        Trigger {
            time,
            kind,
            pitches,
            duration,
            volume: 1.0,
        }
    }

    fn flush_all(queue: &mut MidiQueue, now: f64) -> Vec<[u8; 3]> {
        let mut sent = Vec::new();
        queue
            .flush(now, |message| {
                sent.push(*message);
                Ok(())
            })
            .unwrap();
        sent
    }

    #[test]
    fn test_queue_sends_in_time_order() {
        let mut queue = MidiQueue::new();
        queue
            .schedule_trigger(&note_trigger(1.0, TriggerKind::Note, vec![110.0], 0.5))
            .unwrap();
        queue
            .schedule_trigger(&note_trigger(
                0.2,
                TriggerKind::Drum(DrumChannel::Kick),
                vec![],
                0.1,
            ))
            .unwrap();

        assert_eq!(
            flush_all(&mut queue, 10.0),
            vec![
                [0x99, 36, 127],
                [0x89, 36, 0],
                [0x90, 45, 127],
                [0x80, 45, 0],
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_flushes_only_due_messages() {
        let mut queue = MidiQueue::new();
        queue
            .schedule_trigger(&note_trigger(0.0, TriggerKind::Note, vec![220.0], 0.3))
            .unwrap();

        assert_eq!(flush_all(&mut queue, 0.1), vec![[0x90, 57, 127]]);
        assert_eq!(queue.len(), 1);
        assert_eq!(flush_all(&mut queue, 0.3), vec![[0x80, 57, 0]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_chords_and_click_use_their_channels() {
        let mut queue = MidiQueue::new();
        queue
            .schedule_trigger(&note_trigger(
                0.0,
                TriggerKind::Chord,
                vec![261.63, 329.63, 392.0],
                4.0,
            ))
            .unwrap();
        queue
            .schedule_trigger(&note_trigger(0.0, TriggerKind::Click, vec![880.0], 0.1))
            .unwrap();

        let ons = flush_all(&mut queue, 0.0);
        assert_eq!(
            ons,
            vec![[0x91, 60, 127], [0x91, 64, 127], [0x91, 67, 127], [0x99, 76, 127]]
        );
    }

    #[test]
    fn test_take_note_offs_drops_pending_note_ons() {
        let mut queue = MidiQueue::new();
        queue.schedule_note(1.0, 0.5, NOTE_CHANNEL, 40, 100);
        queue.schedule_note(2.0, 0.5, NOTE_CHANNEL, 43, 100);
        assert_eq!(flush_all(&mut queue, 1.0), vec![[0x90, 40, 100]]);

        let offs = queue.take_note_offs();
        assert_eq!(offs, vec![[0x80, 40, 0], [0x80, 43, 0]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_send_does_not_lose_later_messages() {
        let mut queue = MidiQueue::new();
        queue.schedule(0.0, [0x90, 45, 100]);
        queue.schedule(0.0, [0x80, 40, 0]);

        let mut sent = Vec::new();
        let result = queue.flush(0.0, |message| {
            if message[0] == 0x90 {
                return Err(Error::Midi("port went away".to_string()));
            }
            sent.push(*message);
            Ok(())
        });

        assert!(matches!(result, Err(Error::Midi(_))));
        assert_eq!(sent, vec![[0x80, 40, 0]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_velocity_scaling() {
        assert_eq!(velocity(1.0), 127);
        assert_eq!(velocity(0.5), 64);
        assert_eq!(velocity(0.0), 1);
    }
}
