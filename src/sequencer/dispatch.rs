//! Trigger dispatch - turns a grid position into sound triggers
//!
//! The dispatcher never makes sound itself. It shapes [`Trigger`] descriptors
//! and hands them to a [`TriggerSink`] (the audio output, a MIDI port, or a
//! plain `Vec` in tests).

use log::warn;
use serde::{Deserialize, Serialize};

use super::groove::{Bar, DrumBar, DrumChannel, Groove, MelodicBar, Step};
use crate::error::Result;

/// Seconds of sound per note duration unit
pub const BASE_NOTE_SECONDS: f64 = 0.3;
pub const MUTE_CLICK_SECONDS: f64 = 0.1;
/// Nominal pitch of a muted (dead) note
pub const MUTE_CLICK_PITCH: f32 = 100.0;
pub const CHORD_SECONDS: f64 = 4.0;
pub const CLICK_SECONDS: f64 = 0.1;
pub const CLICK_PITCH: f32 = 880.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Note,
    Mute,
    Drum(DrumChannel),
    Chord,
    /// Metronome tick on a beat boundary
    Click,
}

/// One sound event for the synthesis side
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Audio clock time in seconds
    pub time: f64,
    pub kind: TriggerKind,
    /// Frequencies in Hz; empty for unpitched drums
    pub pitches: Vec<f32>,
    pub duration: f64,
    /// Fraction in [0, 1]
    pub volume: f32,
}

/// Receiver of triggers. Fire-and-forget: errors are logged by the caller
/// and never stop playback.
pub trait TriggerSink {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()>;
}

impl TriggerSink for Vec<Trigger> {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()> {
        self.push(trigger.clone());
        Ok(())
    }
}

impl<T: TriggerSink + ?Sized> TriggerSink for &mut T {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()> {
        (**self).trigger(trigger)
    }
}

impl<A: TriggerSink, B: TriggerSink> TriggerSink for (A, B) {
    fn trigger(&mut self, trigger: &Trigger) -> Result<()> {
        let first = self.0.trigger(trigger);
        let second = self.1.trigger(trigger);
        first.and(second)
    }
}

/// Per-category volume in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mix {
    pub bass: u8,
    pub drums: u8,
    pub chords: u8,
    pub click: u8,
}

impl Default for Mix {
    fn default() -> Self {
        Self {
            bass: 70,
            drums: 50,
            chords: 30,
            click: 50,
        }
    }
}

fn fraction(percent: u8) -> f32 {
    percent.min(100) as f32 / 100.0
}

/// Bars that know which triggers each of their steps produces
pub trait StepTriggers: Bar {
    fn step_triggers(&self, step: usize, time: f64, dispatcher: &Dispatcher, out: &mut Vec<Trigger>);
}

impl StepTriggers for MelodicBar {
    fn step_triggers(&self, step: usize, time: f64, dispatcher: &Dispatcher, out: &mut Vec<Trigger>) {
        if step == 0 {
            if let Some(chord) = self.chord() {
                out.push(Trigger {
                    time,
                    kind: TriggerKind::Chord,
                    pitches: chord.frequencies(),
                    duration: CHORD_SECONDS,
                    volume: fraction(dispatcher.mix.chords),
                });
            }
        }

        // a covered slot is still sounding from an earlier note
        if self.is_covered(step) {
            return;
        }

        match self.step(step) {
            Step::Empty => {}
            Step::Note(note) => out.push(Trigger {
                time,
                kind: TriggerKind::Note,
                pitches: vec![note.frequency],
                duration: self.clipped_duration(step, &note) as f64 * dispatcher.base_note_seconds,
                volume: fraction(dispatcher.mix.bass),
            }),
            Step::Muted => out.push(Trigger {
                time,
                kind: TriggerKind::Mute,
                pitches: vec![MUTE_CLICK_PITCH],
                duration: MUTE_CLICK_SECONDS,
                volume: fraction(dispatcher.mix.bass),
            }),
        }
    }
}

impl StepTriggers for DrumBar {
    fn step_triggers(&self, step: usize, time: f64, dispatcher: &Dispatcher, out: &mut Vec<Trigger>) {
        out.extend(self.hits_at(step).map(|channel| Trigger {
            time,
            kind: TriggerKind::Drum(channel),
            pitches: Vec::new(),
            duration: channel.decay_seconds(),
            volume: fraction(dispatcher.mix.drums),
        }));
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    pub mix: Mix,
    pub base_note_seconds: f64,
    pub metronome: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            mix: Mix::default(),
            base_note_seconds: BASE_NOTE_SECONDS,
            metronome: false,
        }
    }
}

impl Dispatcher {
    /// All triggers for one grid position, in emission order
    pub fn resolve<B: StepTriggers>(
        &self,
        groove: &Groove<B>,
        bar: usize,
        step: usize,
        time: f64,
    ) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        if let Some(bar) = groove.bar(bar) {
            bar.step_triggers(step, time, self, &mut triggers);
        }
        if self.metronome && groove.subdivision().is_beat_boundary(step) {
            triggers.push(Trigger {
                time,
                kind: TriggerKind::Click,
                pitches: vec![CLICK_PITCH],
                duration: CLICK_SECONDS,
                volume: fraction(self.mix.click),
            });
        }
        triggers
    }

    /// Resolve a position and forward it to `sink`; returns how many
    /// triggers the sink accepted
    pub fn dispatch<B: StepTriggers, S: TriggerSink + ?Sized>(
        &self,
        groove: &Groove<B>,
        bar: usize,
        step: usize,
        time: f64,
        sink: &mut S,
    ) -> usize {
        let mut delivered = 0;
        for trigger in self.resolve(groove, bar, step, time) {
            match sink.trigger(&trigger) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("dropped {:?} trigger at {:.3}s: {}", trigger.kind, time, e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sequencer::groove::{DrumGroove, MelodicGroove, Note};
    use crate::sequencer::timing::Subdivision;

    struct FailingSink;

    impl TriggerSink for FailingSink {
        fn trigger(&mut self, _trigger: &Trigger) -> Result<()> {
            Err(Error::Midi("port closed".to_string()))
        }
    }

    fn bass_groove() -> MelodicGroove {
        let mut groove = MelodicGroove::new(Subdivision::Sixteenth);
        groove
            .set_step(0, 0, Step::Note(Note::new(110.0, 2).unwrap()))
            .unwrap();
        groove.set_step(0, 1, Step::Muted).unwrap();
        groove.set_step(0, 4, Step::Muted).unwrap();
        groove
            .set_step(0, 14, Step::Note(Note::new(55.0, 4).unwrap()))
            .unwrap();
        groove
    }

    #[test]
    fn test_note_trigger() {
        let dispatcher = Dispatcher::default();
        let triggers = dispatcher.resolve(&bass_groove(), 0, 0, 1.5);
        assert_eq!(triggers.len(), 1);
        let trigger = &triggers[0];
        assert_eq!(trigger.kind, TriggerKind::Note);
        assert_eq!(trigger.pitches, vec![110.0]);
        assert!((trigger.duration - 0.6).abs() < 1e-9);
        assert!((trigger.volume - 0.7).abs() < 1e-6);
        assert_eq!(trigger.time, 1.5);
    }

    #[test]
    fn test_covered_step_is_silent() {
        let dispatcher = Dispatcher::default();
        // step 1 holds a muted marker but is covered by the note at step 0
        assert!(dispatcher.resolve(&bass_groove(), 0, 1, 0.0).is_empty());
        assert!(dispatcher.resolve(&bass_groove(), 0, 2, 0.0).is_empty());
    }

    #[test]
    fn test_mute_trigger() {
        let dispatcher = Dispatcher::default();
        let triggers = dispatcher.resolve(&bass_groove(), 0, 4, 0.0);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind, TriggerKind::Mute);
        assert_eq!(triggers[0].duration, MUTE_CLICK_SECONDS);
    }

    #[test]
    fn test_note_duration_clipped_at_bar_end() {
        let dispatcher = Dispatcher::default();
        let triggers = dispatcher.resolve(&bass_groove(), 0, 14, 0.0);
        assert!((triggers[0].duration - 2.0 * BASE_NOTE_SECONDS).abs() < 1e-9);
    }

    #[test]
    fn test_chord_overlay_on_bar_start() {
        let mut groove = bass_groove();
        groove.set_chord(0, Some("C".parse().unwrap())).unwrap();
        let dispatcher = Dispatcher::default();

        let triggers = dispatcher.resolve(&groove, 0, 0, 0.0);
        let kinds: Vec<_> = triggers.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TriggerKind::Chord, TriggerKind::Note]);
        assert_eq!(triggers[0].pitches.len(), 3);
        assert!((triggers[0].volume - 0.3).abs() < 1e-6);

        assert!(dispatcher
            .resolve(&groove, 0, 4, 0.0)
            .iter()
            .all(|t| t.kind != TriggerKind::Chord));
    }

    #[test]
    fn test_drum_hits() {
        let mut groove = DrumGroove::new(Subdivision::Sixteenth);
        groove.toggle_hit(0, DrumChannel::Kick, 0).unwrap();
        groove.toggle_hit(0, DrumChannel::HiHat, 0).unwrap();
        let dispatcher = Dispatcher::default();

        let triggers = dispatcher.resolve(&groove, 0, 0, 2.0);
        let kinds: Vec<_> = triggers.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TriggerKind::Drum(DrumChannel::Kick),
                TriggerKind::Drum(DrumChannel::HiHat)
            ]
        );
        assert!(triggers.iter().all(|t| (t.volume - 0.5).abs() < 1e-6));
        assert!(dispatcher.resolve(&groove, 0, 1, 2.0).is_empty());
    }

    #[test]
    fn test_metronome_clicks_on_beats() {
        let groove = MelodicGroove::new(Subdivision::Triplet);
        let dispatcher = Dispatcher {
            metronome: true,
            ..Dispatcher::default()
        };
        let clicks: Vec<usize> = (0..24)
            .filter(|&step| !dispatcher.resolve(&groove, 0, step, 0.0).is_empty())
            .collect();
        assert_eq!(clicks, vec![0, 6, 12, 18]);
    }

    #[test]
    fn test_sink_errors_do_not_abort_dispatch() {
        let mut groove = DrumGroove::new(Subdivision::Sixteenth);
        groove.toggle_hit(0, DrumChannel::Kick, 0).unwrap();
        groove.toggle_hit(0, DrumChannel::Snare, 0).unwrap();
        let dispatcher = Dispatcher::default();

        let mut recorded = Vec::new();
        let mut sink = (FailingSink, &mut recorded);
        assert_eq!(dispatcher.dispatch(&groove, 0, 0, 0.0, &mut sink), 0);
        assert_eq!(recorded.len(), 2);
    }
}
