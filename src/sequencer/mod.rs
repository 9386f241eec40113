//! Core sequencer logic - a groove, its tempo and the engine that plays it
//!
//! `Sequencer` is the surface an editor talks to. Plain edits (notes, hits,
//! chords, extra bars) take effect on the next tick; edits that change the
//! step geometry under a running cursor stop and rewind playback first.

use std::path::Path;

use log::debug;

pub mod chord;
pub mod dispatch;
pub mod groove;
pub mod playback;
pub mod timing;

use chord::Chord;
use dispatch::{Dispatcher, StepTriggers, TriggerSink};
use groove::{DrumBar, DrumChannel, Groove, MelodicBar, Step};
use playback::{Clock, PlaybackEngine, PlaybackEvent};
use timing::{Subdivision, Tempo};

use crate::error::Result;
use crate::midi::smf;

pub struct Sequencer<B> {
    groove: Groove<B>,
    tempo: Tempo,
    dispatcher: Dispatcher,
    engine: PlaybackEngine,
}

impl<B: StepTriggers> Sequencer<B> {
    pub fn new(subdivision: Subdivision, tempo: Tempo, dispatcher: Dispatcher) -> Self {
        Self {
            groove: Groove::new(subdivision),
            tempo,
            dispatcher,
            engine: PlaybackEngine::new(),
        }
    }

    pub fn groove(&self) -> &Groove<B> {
        &self.groove
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Takes effect on the next tick, also while playing
    pub fn set_bpm(&mut self, bpm: u32) -> Result<()> {
        self.tempo = Tempo::new(bpm)?;
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Mix and metronome settings; read on every dispatch
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_running()
    }

    pub fn play(&mut self, clock: &dyn Clock) -> Result<()> {
        self.engine.start(clock, self.groove.total_steps())
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn toggle_play(&mut self, clock: &dyn Clock) -> Result<()> {
        if self.is_playing() {
            self.stop();
            Ok(())
        } else {
            self.play(clock)
        }
    }

    /// Run one scheduling pass; call this from the host loop
    pub fn tick<S: TriggerSink + ?Sized>(
        &mut self,
        clock: &dyn Clock,
        sink: &mut S,
    ) -> Result<Option<usize>> {
        self.engine
            .tick(clock, &self.groove, self.tempo, &self.dispatcher, sink)
    }

    /// Loop position to highlight: the playing step, else the resume point
    pub fn current_position(&self) -> usize {
        self.engine
            .display_step()
            .unwrap_or_else(|| self.engine.paused_at_step())
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.engine.poll_events()
    }

    pub fn add_bar(&mut self) {
        self.groove.add_bar();
    }

    /// Remove a bar; a removal during playback stops and rewinds
    pub fn remove_bar(&mut self, index: usize) -> Result<bool> {
        let removed = self.groove.remove_bar(index)?;
        if removed && self.is_playing() {
            debug!("bar {} removed during playback, rewinding", index);
            self.engine.reset();
        } else if removed {
            self.engine.clamp_position(self.groove.total_steps());
        }
        Ok(removed)
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        self.engine.reset();
        self.groove.set_subdivision(subdivision);
    }

    /// Clear back to a single empty bar
    pub fn reset(&mut self) {
        self.engine.reset();
        self.groove.clear();
    }
}

impl Sequencer<MelodicBar> {
    pub fn set_step(&mut self, bar: usize, step: usize, value: Step) -> Result<()> {
        self.groove.set_step(bar, step, value)
    }

    pub fn set_chord(&mut self, bar: usize, chord: Option<Chord>) -> Result<()> {
        self.groove.set_chord(bar, chord)
    }

    pub fn export_midi(&self) -> Result<Vec<u8>> {
        smf::encode(&self.groove, self.tempo)
    }

    pub fn write_midi_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        smf::write_midi_file(path, &self.groove, self.tempo)
    }
}

impl Sequencer<DrumBar> {
    pub fn toggle_hit(&mut self, bar: usize, channel: DrumChannel, step: usize) -> Result<()> {
        self.groove.toggle_hit(bar, channel, step)
    }
}

/// Bass lines play along with the metronome unless told otherwise
impl Default for Sequencer<MelodicBar> {
    fn default() -> Self {
        let dispatcher = Dispatcher {
            metronome: true,
            ..Dispatcher::default()
        };
        Self::new(Subdivision::default(), Tempo::default(), dispatcher)
    }
}

impl Default for Sequencer<DrumBar> {
    fn default() -> Self {
        Self::new(Subdivision::default(), Tempo::default(), Dispatcher::default())
    }
}
