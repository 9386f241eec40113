//! Playback engine - lookahead scheduling against an audio clock
//!
//! The engine never sleeps and owns no thread. The host calls [`PlaybackEngine::tick`]
//! repeatedly (once per UI frame is enough); each call dispatches every step
//! whose start time falls inside the next [`LOOKAHEAD_WINDOW`] seconds, so a
//! late callback costs nothing as long as it arrives within the window.

use std::sync::mpsc::{channel, Receiver, Sender};

use log::debug;

use super::dispatch::{Dispatcher, StepTriggers, TriggerSink};
use super::groove::Groove;
use super::timing::Tempo;
use crate::error::Result;

/// How far ahead of the clock steps are dispatched, in seconds
pub const LOOKAHEAD_WINDOW: f64 = 0.1;

/// Monotonic time source in seconds
pub trait Clock {
    fn now(&self) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Playback began at this loop position
    Started(usize),
    /// The displayed position moved
    StepAdvanced(usize),
    /// Playback stopped; playback will resume at this position
    Stopped(usize),
}

/// Scheduler state while running
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    scheduled_step: usize,
    next_trigger_time: f64,
    start_clock_time: f64,
    // loop position (possibly fractional) at start_clock_time
    anchor_step: f64,
    step_interval: Option<f64>,
}

impl PlaybackCursor {
    /// Next loop position to dispatch
    pub fn scheduled_step(&self) -> usize {
        self.scheduled_step
    }

    /// Clock time at which `scheduled_step` will sound
    pub fn next_trigger_time(&self) -> f64 {
        self.next_trigger_time
    }

    pub fn start_clock_time(&self) -> f64 {
        self.start_clock_time
    }
}

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    cursor: Option<PlaybackCursor>,
    paused_at_step: usize,
    display_step: Option<usize>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            cursor: None,
            paused_at_step: 0,
            display_step: None,
        }
    }

    /// Begin playback from the paused position, wrapped into a loop of
    /// `total_steps`. Starting a running engine does nothing; a failing clock
    /// leaves the engine stopped.
    pub fn start(&mut self, clock: &dyn Clock, total_steps: usize) -> Result<()> {
        if self.cursor.is_some() {
            return Ok(());
        }

        let now = clock.now()?;
        self.clamp_position(total_steps);
        self.cursor = Some(PlaybackCursor {
            scheduled_step: self.paused_at_step,
            next_trigger_time: now,
            start_clock_time: now,
            anchor_step: self.paused_at_step as f64,
            step_interval: None,
        });
        self.display_step = None;

        debug!("playback started at step {} (clock {:.3}s)", self.paused_at_step, now);
        let _ = self.sender.send(PlaybackEvent::Started(self.paused_at_step));
        Ok(())
    }

    /// One scheduling pass. Returns the display position, or `None` when stopped.
    pub fn tick<B, S>(
        &mut self,
        clock: &dyn Clock,
        groove: &Groove<B>,
        tempo: Tempo,
        dispatcher: &Dispatcher,
        sink: &mut S,
    ) -> Result<Option<usize>>
    where
        B: StepTriggers,
        S: TriggerSink + ?Sized,
    {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let now = clock.now()?;
        let total_steps = groove.total_steps();
        debug_assert!(total_steps > 0, "groove invariant: at least one step");
        let interval = tempo.step_interval(groove.subdivision())?;

        // keep the display continuous when the tempo changes mid-run
        if let Some(previous) = cursor.step_interval {
            if previous != interval {
                cursor.anchor_step += (now - cursor.start_clock_time).max(0.0) / previous;
                cursor.start_clock_time = now;
            }
        }
        cursor.step_interval = Some(interval);

        // bars may have been removed since the last pass
        cursor.scheduled_step %= total_steps;

        while cursor.next_trigger_time < now + LOOKAHEAD_WINDOW {
            let (bar, step) = groove.locate(cursor.scheduled_step);
            dispatcher.dispatch(groove, bar, step, cursor.next_trigger_time, sink);
            cursor.next_trigger_time += interval;
            cursor.scheduled_step = (cursor.scheduled_step + 1) % total_steps;
        }

        let elapsed = (now - cursor.start_clock_time).max(0.0);
        let display = (cursor.anchor_step + elapsed / interval).floor() as usize % total_steps;

        if self.display_step != Some(display) {
            let _ = self.sender.send(PlaybackEvent::StepAdvanced(display));
        }
        self.display_step = Some(display);
        Ok(Some(display))
    }

    /// Stop playback, remembering the last displayed position. Idempotent.
    pub fn stop(&mut self) {
        if self.cursor.take().is_none() {
            return;
        }
        if let Some(display) = self.display_step.take() {
            self.paused_at_step = display;
        }

        debug!("playback stopped, resume at step {}", self.paused_at_step);
        let _ = self.sender.send(PlaybackEvent::Stopped(self.paused_at_step));
    }

    /// Wrap the resume position into a loop that may have shrunk
    pub fn clamp_position(&mut self, total_steps: usize) {
        if total_steps > 0 {
            self.paused_at_step %= total_steps;
        }
    }

    /// Stop and rewind to the first step
    pub fn reset(&mut self) {
        self.stop();
        self.paused_at_step = 0;
        self.display_step = None;
    }

    pub fn is_running(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn cursor(&self) -> Option<&PlaybackCursor> {
        self.cursor.as_ref()
    }

    pub fn paused_at_step(&self) -> usize {
        self.paused_at_step
    }

    /// Step to highlight in the UI; `None` while stopped
    pub fn display_step(&self) -> Option<usize> {
        self.display_step
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}
