#[cfg(feature = "gui")]
use std::path::PathBuf;
#[cfg(feature = "gui")]
use std::time::{Duration, Instant};

#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use stepgrid::{
    midi_note_name, Config, Controller, KeyEvent, LampOutput, MidiClockInput, MidiOutputDevice,
    Rgb, Sequencer,
};

/// Computer keys standing in for the button matrix, one row of keys per matrix row.
#[cfg(feature = "gui")]
const KEY_ROWS: [[egui::Key; 8]; 4] = {
    use egui::Key::*;
    [
        [Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8],
        [Q, W, E, R, T, Y, U, I],
        [A, S, D, F, G, H, J, K],
        [Z, X, C, V, B, N, M, Comma],
    ]
};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = config_arg();
    let app = match SequencerApp::new(config_path.as_deref()) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([760.0, 520.0])
            .with_title("stepgrid"),
        ..Default::default()
    };

    eframe::run_native("stepgrid", options, Box::new(|_cc| Ok(Box::new(app))))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

/// `--config <path>` from the command line.
#[cfg(feature = "gui")]
fn config_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Lamp colors as last written by the controller.
#[cfg(feature = "gui")]
struct LampBank {
    colors: Vec<Rgb>,
}

#[cfg(feature = "gui")]
impl LampOutput for LampBank {
    fn set_lamp(&mut self, index: u8, color: Rgb) {
        if let Some(slot) = self.colors.get_mut(usize::from(index)) {
            *slot = color;
        }
    }
}

#[cfg(feature = "gui")]
struct SequencerApp {
    controller: Controller,
    midi_output: MidiOutputDevice,
    clock_input: MidiClockInput,
    lamps: LampBank,
    started: Instant,

    // UI state
    available_output_ports: Vec<String>,
    available_clock_ports: Vec<String>,
    current_step: Option<usize>,
    send_failures: usize,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config_path: Option<&std::path::Path>) -> Result<Self, stepgrid::ConfigError> {
        let config = Config::load(config_path)?;
        let sequencer = Sequencer::new(config.sequencer_config()?)?;
        let settings = config.midi()?;
        let key_count = sequencer.layout().key_count();

        let mut midi_output = MidiOutputDevice::new(settings.channel);
        if let Some(name) = &settings.output_port {
            if let Err(e) = midi_output.connect_named(name) {
                log::warn!("MIDI output not connected: {}", e);
            }
        }
        let mut clock_input = MidiClockInput::new();
        if let Some(name) = &settings.clock_port {
            if let Err(e) = clock_input.connect_named(name) {
                log::warn!("MIDI clock input not connected: {}", e);
            }
        }

        let controller = Controller::new(sequencer);
        let mut lamps = LampBank {
            colors: vec![Rgb::default(); key_count],
        };
        // show the grid before the first clock tick arrives
        controller.repaint(&mut lamps);

        Ok(Self {
            controller,
            midi_output,
            clock_input,
            lamps,
            started: Instant::now(),
            available_output_ports: MidiOutputDevice::available_ports(),
            available_clock_ports: MidiClockInput::available_ports(),
            current_step: None,
            send_failures: 0,
        })
    }

    /// Press and release events for the mapped computer keys, in arrival order.
    fn collect_key_events(&self, ctx: &egui::Context) -> Vec<KeyEvent> {
        let layout = *self.controller.sequencer().layout();
        let at = self.started.elapsed();

        ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed,
                        repeat: false,
                        ..
                    } => {
                        let (row, col) = KEY_ROWS.iter().enumerate().find_map(|(row, keys)| {
                            keys.iter().position(|k| k == key).map(|col| (row, col))
                        })?;
                        if row >= layout.window_height || col >= layout.window_width {
                            return None;
                        }
                        let id = layout.key_at(col, row).0;
                        Some(if *pressed {
                            KeyEvent::pressed(id, at)
                        } else {
                            KeyEvent::released(id, at)
                        })
                    }
                    _ => None,
                })
                .collect()
        })
    }

    fn run_cycles(&mut self, keys: Vec<KeyEvent>) {
        let first = self.clock_input.poll_event();
        let summary = self
            .controller
            .cycle(first, keys, &mut self.midi_output, &mut self.lamps);
        self.record(summary);

        while let Some(event) = self.clock_input.poll_event() {
            let summary = self
                .controller
                .cycle(Some(event), [], &mut self.midi_output, &mut self.lamps);
            self.record(summary);
        }
    }

    fn record(&mut self, summary: stepgrid::CycleSummary) {
        if summary.step_advanced.is_some() {
            self.current_step = summary.step_advanced;
        }
        self.send_failures += summary.midi_failed;
    }

    fn port_selector(
        ui: &mut egui::Ui,
        id: &str,
        ports: &[String],
        current: Option<&str>,
    ) -> Option<usize> {
        let mut chosen = None;
        if ports.is_empty() {
            ui.label("No MIDI ports available");
            return None;
        }
        egui::ComboBox::from_id_source(id)
            .selected_text(current.unwrap_or("Select port..."))
            .show_ui(ui, |ui| {
                for (i, port_name) in ports.iter().enumerate() {
                    if ui
                        .selectable_label(current == Some(port_name.as_str()), port_name)
                        .clicked()
                    {
                        chosen = Some(i);
                    }
                }
            });
        chosen
    }

    /// Draws the lamps as buttons; a click is a press and release of that key.
    fn lamp_matrix(
        ui: &mut egui::Ui,
        sequencer: &Sequencer,
        lamps: &LampBank,
        at: Duration,
    ) -> Vec<KeyEvent> {
        let layout = *sequencer.layout();
        let pitch_offset = sequencer.pitch_offset();
        let mut clicks = Vec::new();

        egui::Grid::new("lamps").spacing([6.0, 6.0]).show(ui, |ui| {
            for visible_row in 0..layout.window_height {
                let pitch = layout.pitch_for_row(visible_row + pitch_offset);
                ui.label(midi_note_name(pitch));
                for visible_col in 0..layout.window_width {
                    let key = layout.key_at(visible_col, visible_row);
                    let Rgb(r, g, b) = lamps.colors[usize::from(key.0)];
                    let button = egui::Button::new("")
                        .min_size(egui::vec2(64.0, 48.0))
                        .fill(egui::Color32::from_rgb(r, g, b));
                    if ui.add(button).clicked() {
                        clicks.push(KeyEvent::pressed(key.0, at));
                        clicks.push(KeyEvent::released(key.0, at));
                    }
                }
                ui.end_row();
            }
        });

        clicks
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        let keys = self.collect_key_events(ctx);
        self.run_cycles(keys);

        let mut clicks = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("stepgrid");
            ui.add_space(10.0);

            // MIDI port selection
            let mut output_changed = None;
            let mut clock_changed = None;
            ui.horizontal(|ui| {
                ui.label("MIDI Output:");
                output_changed = Self::port_selector(
                    ui,
                    "midi_output",
                    &self.available_output_ports,
                    self.midi_output.port_name(),
                );
                ui.add_space(20.0);
                ui.label("Clock Input:");
                clock_changed = Self::port_selector(
                    ui,
                    "clock_input",
                    &self.available_clock_ports,
                    self.clock_input.port_name(),
                );
            });

            if let Some(port_idx) = output_changed {
                if let Err(e) = self.midi_output.connect(port_idx) {
                    log::warn!("MIDI output not connected: {}", e);
                }
            }
            if let Some(port_idx) = clock_changed {
                if let Err(e) = self.clock_input.connect(port_idx) {
                    log::warn!("MIDI clock input not connected: {}", e);
                }
            }

            ui.add_space(20.0);
            clicks = Self::lamp_matrix(
                ui,
                self.controller.sequencer(),
                &self.lamps,
                self.started.elapsed(),
            );

            ui.separator();
            let sequencer = self.controller.sequencer();
            ui.horizontal(|ui| {
                ui.label(format!("Track: {}", sequencer.active_track().name()));
                ui.label(format!("Swing: {}", sequencer.swing()));
                ui.label(format!("Last step: {}", sequencer.last_step()));
                ui.label(format!("Pitch offset: {}", sequencer.pitch_offset()));
                ui.label(format!("Mode: {:?}", sequencer.manual_mode()));
            });
            ui.horizontal(|ui| {
                ui.label(format!("Tick: {}", sequencer.tick()));
                match self.current_step {
                    Some(step) => ui.label(format!("Step: {}", step + 1)),
                    None => ui.label("Step: -"),
                };
                if self.send_failures > 0 {
                    ui.colored_label(
                        egui::Color32::YELLOW,
                        format!("{} MIDI messages dropped", self.send_failures),
                    );
                }
            });

            ui.add_space(10.0);
            ui.label("Keys 1-8 / Q-I / A-K / Z-, act as the button matrix; hold several for chords");
            if !self.clock_input.is_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No clock input connected - the sequencer waits for MIDI clock",
                );
            }
        });

        if !clicks.is_empty() {
            self.run_cycles(clicks);
        }
    }
}
