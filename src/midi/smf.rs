//! Standard MIDI File export
//!
//! A melodic groove becomes a format 0 file: one track holding a tempo meta
//! event, a 4/4 time signature and one Note-On/Note-Off pair per sounding
//! note. The whole file is built in memory and only returned once every note
//! has been validated, so a failing export never leaves a partial file.

use std::fs;
use std::path::Path;

use log::info;

use super::frequency_to_midi_note;
use crate::error::{Error, Result};
use crate::sequencer::groove::{Bar, MelodicGroove, Step};
use crate::sequencer::timing::{Tempo, TICKS_PER_QUARTER_NOTE};

const HEADER_CHUNK: &[u8; 4] = b"MThd";
const TRACK_CHUNK: &[u8; 4] = b"MTrk";
const HEADER_LENGTH: u32 = 6;
const FORMAT_SINGLE_TRACK: u16 = 0;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const VELOCITY: u8 = 100;

const META: u8 = 0xFF;
const META_TEMPO: u8 = 0x51;
const META_TIME_SIGNATURE: u8 = 0x58;
const META_END_OF_TRACK: u8 = 0x2F;

/// Largest delta time a variable-length quantity can hold
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Append `value` as a MIDI variable-length quantity
pub fn write_vlq(value: u32, out: &mut Vec<u8>) {
    debug_assert!(value <= MAX_VLQ);
    let mut buffer = [0u8; 5];
    let mut start = buffer.len() - 1;
    let mut rest = value;

    buffer[start] = (rest & 0x7F) as u8;
    rest >>= 7;
    while rest > 0 {
        start -= 1;
        buffer[start] = (rest & 0x7F) as u8 | 0x80;
        rest >>= 7;
    }
    out.extend_from_slice(&buffer[start..]);
}

/// Encode a groove at the given tempo as SMF format 0 bytes
pub fn encode(groove: &MelodicGroove, tempo: Tempo) -> Result<Vec<u8>> {
    groove.validate()?;
    let events = track_events(groove, tempo)?;

    let mut bytes = Vec::with_capacity(22 + events.len());
    bytes.extend_from_slice(HEADER_CHUNK);
    bytes.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
    bytes.extend_from_slice(&FORMAT_SINGLE_TRACK.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&(TICKS_PER_QUARTER_NOTE as u16).to_be_bytes());

    bytes.extend_from_slice(TRACK_CHUNK);
    bytes.extend_from_slice(&(events.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&events);
    Ok(bytes)
}

/// Encode and write to `path`
pub fn write_midi_file<P: AsRef<Path>>(path: P, groove: &MelodicGroove, tempo: Tempo) -> Result<()> {
    let bytes = encode(groove, tempo)?;
    fs::write(path.as_ref(), &bytes)?;
    info!("exported {} bytes of MIDI to {}", bytes.len(), path.as_ref().display());
    Ok(())
}

fn track_events(groove: &MelodicGroove, tempo: Tempo) -> Result<Vec<u8>> {
    let ticks_per_step = groove.subdivision().ticks_per_step();
    let mut events = Vec::new();

    // tempo is a 24-bit value
    let micros = tempo.microseconds_per_quarter_note().to_be_bytes();
    events.extend_from_slice(&[0x00, META, META_TEMPO, 0x03]);
    events.extend_from_slice(&micros[1..]);
    // 4/4, 24 MIDI clocks per click, 8 32nds per quarter
    events.extend_from_slice(&[0x00, META, META_TIME_SIGNATURE, 0x04, 0x04, 0x02, 0x18, 0x08]);

    let mut delta: u32 = 0;
    for (bar_index, bar) in groove.bars().iter().enumerate() {
        let mut step = 0;
        while step < bar.step_count() {
            let Step::Note(note) = bar.step(step) else {
                // rests and muted notes only move time forward
                delta += ticks_per_step;
                step += 1;
                continue;
            };

            let invalid = |e: Error| {
                Error::Encoding(format!("bar {}, step {}: {}", bar_index + 1, step + 1, e))
            };
            note.validate().map_err(invalid)?;
            let key = frequency_to_midi_note(note.frequency).map_err(invalid)?;

            let units = bar.clipped_duration(step, &note);
            let note_ticks = (ticks_per_step as f64 * units as f64).round() as u32;

            write_vlq(delta, &mut events);
            events.extend_from_slice(&[NOTE_ON, key, VELOCITY]);
            write_vlq(note_ticks, &mut events);
            events.extend_from_slice(&[NOTE_OFF, key, 0x00]);

            delta = ticks_per_step.saturating_sub(note_ticks);
            // the note's length already accounts for the slots it covers
            step += units as usize;
        }
    }

    write_vlq(delta, &mut events);
    events.extend_from_slice(&[META, META_END_OF_TRACK, 0x00]);
    Ok(events)
}
