use std::cell::Cell;

use groovegrid::{
    Chord, Clock, Dispatcher, DrumBar, DrumChannel, Error, MelodicBar, Note, PlaybackEvent,
    Result, Sequencer, Step, Subdivision, Tempo, Trigger, TriggerKind,
};

struct FakeClock(Cell<f64>);

impl FakeClock {
    fn new() -> Self {
        Self(Cell::new(0.0))
    }

    fn set(&self, seconds: f64) {
        self.0.set(seconds);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Result<f64> {
        Ok(self.0.get())
    }
}

struct NoAudio;

impl Clock for NoAudio {
    fn now(&self) -> Result<f64> {
        Err(Error::ResourceUnavailable("no output device".to_string()))
    }
}

#[test]
fn test_bass_step_dispatches_chord_then_note() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<MelodicBar> = Sequencer::default();
    seq.set_step(0, 0, Step::Note(Note::new(110.0, 2).unwrap()))
        .unwrap();
    seq.set_chord(0, Some("Am".parse::<Chord>().unwrap()))
        .unwrap();

    let mut sink: Vec<Trigger> = Vec::new();
    seq.play(&clock).unwrap();
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(0));

    // chord, note, then the metronome bass lines start with
    assert_eq!(sink.len(), 3);
    assert_eq!(sink[0].kind, TriggerKind::Chord);
    assert_eq!(sink[0].pitches.len(), 3);
    assert_eq!(sink[1].kind, TriggerKind::Note);
    assert_eq!(sink[1].pitches, vec![110.0]);
    assert!((sink[1].duration - 0.6).abs() < 1e-9);
    assert!((sink[1].volume - 0.7).abs() < 1e-6);
    assert_eq!(sink[2].kind, TriggerKind::Click);

    // step 1 is still covered by the note; nothing new sounds
    sink.clear();
    clock.set(0.05);
    seq.tick(&clock, &mut sink).unwrap();
    assert!(sink.is_empty());
}

#[test]
fn test_drum_hits_fan_out_per_channel() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<DrumBar> = Sequencer::default();
    seq.toggle_hit(0, DrumChannel::Kick, 0).unwrap();
    seq.toggle_hit(0, DrumChannel::HiHat, 0).unwrap();

    let mut sink: Vec<Trigger> = Vec::new();
    seq.play(&clock).unwrap();
    seq.tick(&clock, &mut sink).unwrap();

    let kinds: Vec<TriggerKind> = sink.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TriggerKind::Drum(DrumChannel::Kick),
            TriggerKind::Drum(DrumChannel::HiHat)
        ]
    );
    assert_eq!(sink[0].duration, 0.5);
    assert_eq!(sink[1].duration, 0.05);
}

#[test]
fn test_lookahead_schedules_ahead_of_the_clock() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<DrumBar> = Sequencer::default();
    for step in 0..16 {
        seq.toggle_hit(0, DrumChannel::Ride, step).unwrap();
    }

    let mut sink: Vec<Trigger> = Vec::new();
    seq.play(&clock).unwrap();
    clock.set(0.3);
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(2));

    // 120 bpm sixteenths: every step before 0.4s is already dispatched
    let times: Vec<f64> = sink.iter().map(|t| t.time).collect();
    assert_eq!(times, vec![0.0, 0.125, 0.25, 0.375]);
}

#[test]
fn test_stop_resumes_at_displayed_step() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<DrumBar> = Sequencer::default();
    let mut sink: Vec<Trigger> = Vec::new();

    seq.play(&clock).unwrap();
    clock.set(0.3);
    seq.tick(&clock, &mut sink).unwrap();
    seq.stop();
    seq.stop();

    assert!(!seq.is_playing());
    assert_eq!(seq.engine().display_step(), None);
    assert_eq!(seq.current_position(), 2);

    clock.set(10.0);
    seq.play(&clock).unwrap();
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(2));

    let events = seq.poll_events();
    assert_eq!(events.first(), Some(&PlaybackEvent::Started(0)));
    assert!(events.contains(&PlaybackEvent::Stopped(2)));
    assert_eq!(events.last(), Some(&PlaybackEvent::StepAdvanced(2)));
}

#[test]
fn test_position_stays_within_the_groove() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<MelodicBar> = Sequencer::new(
        Subdivision::Triplet,
        Tempo::new(240).unwrap(),
        Dispatcher::default(),
    );
    seq.add_bar();
    let total = seq.groove().total_steps();
    assert_eq!(total, 48);

    let mut sink: Vec<Trigger> = Vec::new();
    seq.play(&clock).unwrap();
    for frame in 0..600 {
        clock.set(frame as f64 / 60.0);
        let position = seq.tick(&clock, &mut sink).unwrap().unwrap();
        assert!(position < total);
    }
}

#[test]
fn test_tempo_change_keeps_position_continuous() {
    let clock = FakeClock::new();
    let mut seq: Sequencer<DrumBar> = Sequencer::default();
    let mut sink: Vec<Trigger> = Vec::new();

    seq.play(&clock).unwrap();
    clock.set(0.5);
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(4));

    seq.set_bpm(60).unwrap();
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(4));
    clock.set(1.0);
    assert_eq!(seq.tick(&clock, &mut sink).unwrap(), Some(6));
}

#[test]
fn test_metronome_clicks_on_beats() {
    let dispatcher = Dispatcher {
        metronome: true,
        ..Dispatcher::default()
    };
    let groove = groovegrid::MelodicGroove::new(Subdivision::Sixteenth);

    let on_beat = dispatcher.resolve(&groove, 0, 4, 1.0);
    assert_eq!(on_beat.len(), 1);
    assert_eq!(on_beat[0].kind, TriggerKind::Click);
    assert_eq!(on_beat[0].pitches, vec![880.0]);

    assert!(dispatcher.resolve(&groove, 0, 5, 1.0).is_empty());
}

#[test]
fn test_missing_audio_does_not_start() {
    let mut seq: Sequencer<MelodicBar> = Sequencer::default();
    let err = seq.play(&NoAudio).unwrap_err();

    assert!(matches!(err, Error::ResourceUnavailable(_)));
    assert!(!seq.is_playing());
    assert!(seq.poll_events().is_empty());
}
