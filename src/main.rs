use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use groovegrid::Config;

#[cfg(feature = "gui")]
use eframe::egui;
#[cfg(feature = "gui")]
use groovegrid::{
    frequency_to_midi_note, midi_note_name, AudioOutput, Chord, Clock, DrumBar, DrumChannel,
    MelodicBar, MidiOutputDevice, Note, PlaybackEvent, Sequencer, Step, Subdivision,
};
#[cfg(feature = "gui")]
use log::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "groovegrid")]
#[command(about = "Grid groove sequencer for bass lines and drum beats")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/groovegrid/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Open the drum grid instead of the bass grid
    #[arg(long)]
    drums: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Print the configuration file path
    ConfigPath,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => {
            let path = Config::create_default_config_file()?;
            println!("Config file: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            println!("{}", Config::config_path()?.display());
            return Ok(());
        }
        None => {}
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(),
    };

    run_gui(config, cli.drums)
}

#[cfg(not(feature = "gui"))]
fn run_gui(_config: Config, _drums: bool) -> Result<()> {
    anyhow::bail!("This binary requires the 'gui' feature to be enabled")
}

#[cfg(feature = "gui")]
fn run_gui(config: Config, drums: bool) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 800.0])
            .with_title("groovegrid"),
        ..Default::default()
    };

    let view = if drums { View::Drums } else { View::Bass };
    eframe::run_native(
        "groovegrid",
        options,
        Box::new(move |_cc| Ok(Box::new(GrooveApp::new(config, view)))),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))
}

/// Pen range: E1 to E3
#[cfg(feature = "gui")]
const BASS_NOTES: std::ops::RangeInclusive<u8> = 28..=52;

#[cfg(feature = "gui")]
const STEP_CELL: [f32; 2] = [26.0, 30.0];

#[cfg(feature = "gui")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Bass,
    Drums,
}

#[cfg(feature = "gui")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pen {
    Note,
    Muted,
    Erase,
}

/// Edits collected while drawing, applied once the frame's UI is built
#[cfg(feature = "gui")]
enum Action {
    TogglePlay,
    SwitchView(View),
    SetBpm(u32),
    SetSubdivision(Subdivision),
    ConnectPort(usize),
    Paint { bar: usize, step: usize },
    ToggleHit { bar: usize, channel: DrumChannel, step: usize },
    SetChord { bar: usize, chord: Option<Chord> },
    AddBar,
    RemoveBar(usize),
    Reset,
    Export,
}

#[cfg(feature = "gui")]
struct GrooveApp {
    config: Config,
    bass: Sequencer<MelodicBar>,
    drums: Sequencer<DrumBar>,
    view: View,
    // opened on first Play
    audio: Option<AudioOutput>,
    midi_output: MidiOutputDevice,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    pen: Pen,
    pen_note: u8,
    pen_duration: u8,
    status: Option<String>,
}

#[cfg(feature = "gui")]
impl GrooveApp {
    fn new(config: Config, view: View) -> Self {
        let available_midi_ports = MidiOutputDevice::available_ports();
        let mut midi_output = MidiOutputDevice::new();
        let mut selected_port = None;
        if let Some(name) = &config.midi.port {
            match midi_output.connect_by_name(name) {
                Ok(()) => {
                    selected_port = available_midi_ports
                        .iter()
                        .position(|port| port.contains(name.as_str()));
                }
                Err(e) => warn!("{}", e),
            }
        }

        let playback = &config.playback;
        let bass = Sequencer::new(playback.subdivision, playback.bpm, config.dispatcher());
        let mut drum_dispatcher = config.dispatcher();
        drum_dispatcher.metronome = false;
        let drums = Sequencer::new(playback.subdivision, playback.bpm, drum_dispatcher);

        Self {
            config,
            bass,
            drums,
            view,
            audio: None,
            midi_output,
            available_midi_ports,
            selected_port,
            pen: Pen::Note,
            pen_note: 40,
            pen_duration: 1,
            status: None,
        }
    }

    fn is_playing(&self) -> bool {
        self.bass.is_playing() || self.drums.is_playing()
    }

    fn audio(&mut self) -> groovegrid::Result<&mut AudioOutput> {
        if self.audio.is_none() {
            self.audio = Some(AudioOutput::new()?);
        }
        self.audio
            .as_mut()
            .ok_or_else(|| groovegrid::Error::ResourceUnavailable("audio output".to_string()))
    }

    fn start_playback(&mut self) {
        let clock = match self.audio() {
            Ok(audio) => audio.clock(),
            Err(e) => {
                error!("cannot start playback: {}", e);
                self.status = Some(e.to_string());
                return;
            }
        };

        let result = match self.view {
            View::Bass => self.bass.play(&clock),
            View::Drums => self.drums.play(&clock),
        };
        if let Err(e) = result {
            error!("cannot start playback: {}", e);
            self.status = Some(e.to_string());
        }
    }

    fn stop_playback(&mut self) {
        self.bass.stop();
        self.drums.stop();
        if let Some(audio) = &self.audio {
            audio.silence();
        }
        self.midi_output.silence();
    }

    fn run_scheduler(&mut self) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let clock = audio.clock();
        let mut sink = (&mut *audio, &mut self.midi_output);

        let result = if self.bass.is_playing() {
            self.bass.tick(&clock, &mut sink)
        } else if self.drums.is_playing() {
            self.drums.tick(&clock, &mut sink)
        } else {
            Ok(None)
        };

        if let Err(e) = result {
            error!("playback failed: {}", e);
            self.status = Some(e.to_string());
            self.stop_playback();
            return;
        }

        if let Ok(now) = clock.now() {
            // failures are already logged per message
            if let Err(e) = self.midi_output.flush(now) {
                self.status = Some(e.to_string());
            }
        }
    }

    fn handle_playback_events(&mut self) {
        let events = self
            .bass
            .poll_events()
            .into_iter()
            .chain(self.drums.poll_events());

        for event in events {
            match event {
                PlaybackEvent::Started(step) => debug!("playing from step {}", step),
                PlaybackEvent::Stopped(step) => debug!("stopped at step {}", step),
                PlaybackEvent::StepAdvanced(_) => {}
            }
        }
    }

    fn paint(&mut self, bar: usize, step: usize) -> groovegrid::Result<()> {
        let value = match self.pen {
            Pen::Note => {
                let frequency = groovegrid::midi::midi_note_to_frequency(self.pen_note);
                Step::Note(Note::new(frequency, self.pen_duration)?)
            }
            Pen::Muted => Step::Muted,
            Pen::Erase => Step::Empty,
        };

        // painting the same value again clears the cell
        let current = self
            .bass
            .groove()
            .bar(bar)
            .map(|b| b.step(step))
            .unwrap_or_default();
        let value = if current == value { Step::Empty } else { value };
        self.bass.set_step(bar, step, value)
    }

    fn export(&mut self) -> groovegrid::Result<PathBuf> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self
            .config
            .export
            .directory
            .join(format!("bass-groove-{}.mid", secs));
        self.bass.write_midi_file(&path)?;
        Ok(path)
    }

    fn set_mix(&mut self, mix: groovegrid::Mix) {
        self.config.mix = mix;
        self.bass.dispatcher_mut().mix = mix;
        self.drums.dispatcher_mut().mix = mix;
    }

    fn apply(&mut self, action: Action) -> groovegrid::Result<()> {
        match action {
            Action::TogglePlay => {
                if self.is_playing() {
                    self.stop_playback();
                } else {
                    self.start_playback();
                }
            }
            Action::SwitchView(view) => {
                if view != self.view {
                    self.stop_playback();
                    self.view = view;
                }
            }
            Action::SetBpm(bpm) => {
                self.bass.set_bpm(bpm)?;
                self.drums.set_bpm(bpm)?;
            }
            Action::SetSubdivision(subdivision) => {
                let playing = self.is_playing();
                match self.view {
                    View::Bass => self.bass.set_subdivision(subdivision),
                    View::Drums => self.drums.set_subdivision(subdivision),
                }
                if playing {
                    self.stop_playback();
                }
            }
            Action::ConnectPort(index) => {
                self.midi_output.connect(index)?;
                self.selected_port = Some(index);
            }
            Action::Paint { bar, step } => self.paint(bar, step)?,
            Action::ToggleHit { bar, channel, step } => self.drums.toggle_hit(bar, channel, step)?,
            Action::SetChord { bar, chord } => self.bass.set_chord(bar, chord)?,
            Action::AddBar => match self.view {
                View::Bass => self.bass.add_bar(),
                View::Drums => self.drums.add_bar(),
            },
            Action::RemoveBar(bar) => {
                let was_playing = self.is_playing();
                match self.view {
                    View::Bass => self.bass.remove_bar(bar)?,
                    View::Drums => self.drums.remove_bar(bar)?,
                };
                if was_playing && !self.is_playing() {
                    self.stop_playback();
                }
            }
            Action::Reset => {
                self.stop_playback();
                match self.view {
                    View::Bass => self.bass.reset(),
                    View::Drums => self.drums.reset(),
                }
            }
            Action::Export => {
                let path = self.export()?;
                info!("exported {}", path.display());
                self.status = Some(format!("Exported {}", path.display()));
            }
        }
        Ok(())
    }

    fn transport_ui(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        ui.horizontal(|ui| {
            let label = if self.is_playing() { "⏸ Stop" } else { "▶ Play" };
            if ui.button(label).clicked() {
                actions.push(Action::TogglePlay);
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = self.bass.tempo().bpm();
            if ui
                .add(egui::Slider::new(
                    &mut bpm,
                    groovegrid::sequencer::timing::MIN_BPM..=groovegrid::sequencer::timing::MAX_BPM,
                ))
                .changed()
            {
                actions.push(Action::SetBpm(bpm));
            }

            ui.add_space(20.0);

            let current = match self.view {
                View::Bass => self.bass.groove().subdivision(),
                View::Drums => self.drums.groove().subdivision(),
            };
            for subdivision in Subdivision::ALL {
                if ui
                    .selectable_label(current == subdivision, subdivision.label())
                    .clicked()
                    && current != subdivision
                {
                    actions.push(Action::SetSubdivision(subdivision));
                }
            }
        });

        ui.horizontal(|ui| {
            let mut mix = self.config.mix;
            let mut changed = false;
            for (label, value) in [
                ("Bass", &mut mix.bass),
                ("Drums", &mut mix.drums),
                ("Chords", &mut mix.chords),
                ("Click", &mut mix.click),
            ] {
                changed |= ui.add(egui::Slider::new(value, 0..=100).text(label)).changed();
            }
            if changed {
                self.set_mix(mix);
            }

            let mut metronome = self.bass.dispatcher().metronome;
            if ui.checkbox(&mut metronome, "Metronome").changed() {
                self.bass.dispatcher_mut().metronome = metronome;
            }
        });
    }

    fn midi_port_ui(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        ui.horizontal(|ui| {
            ui.label("MIDI Output:");
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_id_source("midi_port")
                    .selected_text(
                        self.selected_port
                            .and_then(|i| self.available_midi_ports.get(i))
                            .map(String::as_str)
                            .unwrap_or("Select port..."),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                actions.push(Action::ConnectPort(i));
                            }
                        }
                    });
            }
        });
    }

    fn pen_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Pen:");
            ui.selectable_value(&mut self.pen, Pen::Note, "Note");
            ui.selectable_value(&mut self.pen, Pen::Muted, "Muted");
            ui.selectable_value(&mut self.pen, Pen::Erase, "Erase");

            ui.add_space(20.0);

            egui::ComboBox::from_id_source("pen_note")
                .selected_text(midi_note_name(self.pen_note))
                .show_ui(ui, |ui| {
                    for note in BASS_NOTES {
                        ui.selectable_value(&mut self.pen_note, note, midi_note_name(note));
                    }
                });

            ui.add(egui::Slider::new(&mut self.pen_duration, 1..=4).text("Length"));
        });
    }

    fn bass_grid_ui(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let groove = self.bass.groove();
        let playing_at = self.bass.engine().display_step();
        let steps_per_bar = groove.subdivision().steps_per_bar();

        for (bar_index, bar) in groove.bars().iter().enumerate() {
            ui.horizontal(|ui| {
                ui.label(format!("Bar {}", bar_index + 1));

                let chord = bar.chord();
                egui::ComboBox::from_id_source(("chord", bar_index))
                    .width(70.0)
                    .selected_text(chord.map(|c| c.to_string()).unwrap_or_else(|| "-".into()))
                    .show_ui(ui, |ui| {
                        if ui.selectable_label(chord.is_none(), "-").clicked() {
                            actions.push(Action::SetChord {
                                bar: bar_index,
                                chord: None,
                            });
                        }
                        for option in Chord::all() {
                            if ui
                                .selectable_label(chord == Some(option), option.to_string())
                                .clicked()
                            {
                                actions.push(Action::SetChord {
                                    bar: bar_index,
                                    chord: Some(option),
                                });
                            }
                        }
                    });

                if groove.bar_count() > 1 && ui.small_button("✕").clicked() {
                    actions.push(Action::RemoveBar(bar_index));
                }
            });

            ui.horizontal(|ui| {
                for (step_index, step) in bar.steps().iter().enumerate() {
                    let position = bar_index * steps_per_bar + step_index;
                    let is_current = playing_at == Some(position);
                    let beat = groove.subdivision().is_beat_boundary(step_index);

                    let (text, fill) = match step {
                        Step::Note(note) => {
                            let name = frequency_to_midi_note(note.frequency)
                                .map(midi_note_name)
                                .unwrap_or_else(|_| "?".into());
                            (name, egui::Color32::from_rgb(60, 60, 200))
                        }
                        Step::Muted => ("x".to_string(), egui::Color32::from_rgb(120, 60, 60)),
                        Step::Empty if bar.is_covered(step_index) => {
                            ("-".to_string(), egui::Color32::from_rgb(40, 40, 120))
                        }
                        Step::Empty if beat => (String::new(), egui::Color32::from_rgb(55, 55, 55)),
                        Step::Empty => (String::new(), egui::Color32::from_rgb(40, 40, 40)),
                    };
                    let fill = if is_current {
                        egui::Color32::from_rgb(100, 200, 100)
                    } else {
                        fill
                    };

                    let button = egui::Button::new(egui::RichText::new(text).small())
                        .min_size(egui::vec2(STEP_CELL[0], STEP_CELL[1]))
                        .fill(fill);
                    if ui.add(button).clicked() {
                        actions.push(Action::Paint {
                            bar: bar_index,
                            step: step_index,
                        });
                    }
                }
            });
            ui.add_space(6.0);
        }
    }

    fn drum_grid_ui(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let groove = self.drums.groove();
        let playing_at = self.drums.engine().display_step();
        let steps_per_bar = groove.subdivision().steps_per_bar();

        for (bar_index, bar) in groove.bars().iter().enumerate() {
            ui.horizontal(|ui| {
                ui.label(format!("Bar {}", bar_index + 1));
                if groove.bar_count() > 1 && ui.small_button("✕").clicked() {
                    actions.push(Action::RemoveBar(bar_index));
                }
            });

            for channel in DrumChannel::ALL {
                ui.horizontal(|ui| {
                    ui.add_sized([50.0, STEP_CELL[1]], egui::Label::new(channel.name()));
                    for step_index in 0..steps_per_bar {
                        let position = bar_index * steps_per_bar + step_index;
                        let fill = if playing_at == Some(position) {
                            egui::Color32::from_rgb(100, 200, 100)
                        } else if bar.hit(channel, step_index) {
                            egui::Color32::from_rgb(200, 120, 40)
                        } else if groove.subdivision().is_beat_boundary(step_index) {
                            egui::Color32::from_rgb(55, 55, 55)
                        } else {
                            egui::Color32::from_rgb(40, 40, 40)
                        };

                        let button = egui::Button::new("")
                            .min_size(egui::vec2(STEP_CELL[0], STEP_CELL[1] * 0.7))
                            .fill(fill);
                        if ui.add(button).clicked() {
                            actions.push(Action::ToggleHit {
                                bar: bar_index,
                                channel,
                                step: step_index,
                            });
                        }
                    }
                });
            }
            ui.add_space(6.0);
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for GrooveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.run_scheduler();
        self.handle_playback_events();

        let mut actions = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("groovegrid");
            ui.add_space(10.0);

            ui.horizontal(|ui| {
                for (view, label) in [(View::Bass, "Bass"), (View::Drums, "Drums")] {
                    if ui.selectable_label(self.view == view, label).clicked() {
                        actions.push(Action::SwitchView(view));
                    }
                }
            });

            self.midi_port_ui(ui, &mut actions);
            ui.add_space(10.0);
            self.transport_ui(ui, &mut actions);
            ui.separator();

            if self.view == View::Bass {
                self.pen_ui(ui);
                ui.add_space(10.0);
            }

            egui::ScrollArea::vertical()
                .max_height((ui.available_height() - 60.0).max(120.0))
                .show(ui, |ui| match self.view {
                    View::Bass => self.bass_grid_ui(ui, &mut actions),
                    View::Drums => self.drum_grid_ui(ui, &mut actions),
                });

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("+ Add Bar").clicked() {
                    actions.push(Action::AddBar);
                }
                if ui.button("Reset").clicked() {
                    actions.push(Action::Reset);
                }
                if self.view == View::Bass && ui.button("Export MIDI").clicked() {
                    actions.push(Action::Export);
                }
            });

            if let Some(status) = &self.status {
                ui.label(status);
            }
            if !self.midi_output.is_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
        });

        for action in actions {
            if let Err(e) = self.apply(action) {
                warn!("{}", e);
                self.status = Some(e.to_string());
            }
        }
    }
}
