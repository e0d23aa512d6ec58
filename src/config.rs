use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::sequencer::chords::{ChordAction, ChordTable};
use crate::sequencer::view::Layout;
use crate::sequencer::{Palette, Rgb, SequencerConfig};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    grid: GridConfig,
    #[serde(default)]
    timing: TimingConfig,
    #[serde(default)]
    swing: SwingConfig,
    #[serde(default)]
    midi: MidiConfig,
    #[serde(default)]
    palette: PaletteConfig,
    #[serde(default)]
    chords: BTreeMap<String, Vec<u8>>,
}

#[derive(Deserialize, Default)]
struct GridConfig {
    columns: Option<usize>,
    rows: Option<usize>,
    window_width: Option<usize>,
    window_height: Option<usize>,
    base_note: Option<u8>,
    last_step: Option<usize>,
}

#[derive(Deserialize, Default)]
struct TimingConfig {
    hold_threshold_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct SwingConfig {
    default: Option<u32>,
    presets: Option<[u32; 4]>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    channel: Option<u8>,
    cc_controller: Option<u8>,
    output_port: Option<String>,
    clock_port: Option<String>,
}

#[derive(Deserialize, Default)]
struct PaletteConfig {
    off: Option<String>,
    main_on: Option<String>,
    shift_on: Option<String>,
    accent: Option<String>,
    playhead: Option<String>,
    keyboard: Option<String>,
    keyboard_root: Option<String>,
    reference: Option<String>,
}

/// Port selection and channel for the MIDI adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiSettings {
    pub channel: u8,
    pub output_port: Option<String>,
    pub clock_port: Option<String>,
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults, overridden by `path` if given (it must exist), else
    /// by the user config file when one exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::embedded()?;

        let user_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => user_config_path().filter(|p| p.exists()),
        };
        if let Some(path) = user_path {
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            config.merge(parse(&contents, &path.display().to_string())?);
            log::info!("loaded config from {}", path.display());
        }

        Ok(config)
    }

    /// Embedded defaults overridden by a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::embedded()?;
        config.merge(parse(contents, "<inline>")?);
        Ok(config)
    }

    fn embedded() -> Result<Self, ConfigError> {
        Ok(Self {
            file: parse(DEFAULT_CONFIG, "<embedded>")?,
        })
    }

    fn merge(&mut self, user: ConfigFile) {
        let base = &mut self.file;

        set(&mut base.grid.columns, user.grid.columns);
        set(&mut base.grid.rows, user.grid.rows);
        set(&mut base.grid.window_width, user.grid.window_width);
        set(&mut base.grid.window_height, user.grid.window_height);
        set(&mut base.grid.base_note, user.grid.base_note);
        set(&mut base.grid.last_step, user.grid.last_step);

        set(&mut base.timing.hold_threshold_ms, user.timing.hold_threshold_ms);

        set(&mut base.swing.default, user.swing.default);
        set(&mut base.swing.presets, user.swing.presets);

        set(&mut base.midi.channel, user.midi.channel);
        set(&mut base.midi.cc_controller, user.midi.cc_controller);
        set(&mut base.midi.output_port, user.midi.output_port);
        set(&mut base.midi.clock_port, user.midi.clock_port);

        set(&mut base.palette.off, user.palette.off);
        set(&mut base.palette.main_on, user.palette.main_on);
        set(&mut base.palette.shift_on, user.palette.shift_on);
        set(&mut base.palette.accent, user.palette.accent);
        set(&mut base.palette.playhead, user.palette.playhead);
        set(&mut base.palette.keyboard, user.palette.keyboard);
        set(&mut base.palette.keyboard_root, user.palette.keyboard_root);
        set(&mut base.palette.reference, user.palette.reference);

        base.chords.extend(user.chords);
    }

    pub fn sequencer_config(&self) -> Result<SequencerConfig, ConfigError> {
        let fallback = SequencerConfig::default();
        let grid = &self.file.grid;

        let layout = Layout {
            columns: grid.columns.unwrap_or(fallback.layout.columns),
            rows: grid.rows.unwrap_or(fallback.layout.rows),
            window_width: grid.window_width.unwrap_or(fallback.layout.window_width),
            window_height: grid.window_height.unwrap_or(fallback.layout.window_height),
            base_note: grid.base_note.unwrap_or(fallback.layout.base_note),
        };

        let config = SequencerConfig {
            layout,
            last_step: grid.last_step.unwrap_or(fallback.last_step),
            swing: self.file.swing.default.unwrap_or(fallback.swing),
            swing_presets: self.file.swing.presets.unwrap_or(fallback.swing_presets),
            hold_threshold: self
                .file
                .timing
                .hold_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.hold_threshold),
            cc_controller: self.file.midi.cc_controller.unwrap_or(fallback.cc_controller),
            palette: self.palette(fallback.palette)?,
            chords: self.chord_table()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn midi(&self) -> Result<MidiSettings, ConfigError> {
        let channel = self.file.midi.channel.unwrap_or(0);
        if channel > 15 {
            return Err(ConfigError::Invalid(format!("MIDI channel {} must be within 0..=15", channel)));
        }
        Ok(MidiSettings {
            channel,
            output_port: self.file.midi.output_port.clone(),
            clock_port: self.file.midi.clock_port.clone(),
        })
    }

    fn palette(&self, fallback: Palette) -> Result<Palette, ConfigError> {
        let p = &self.file.palette;
        Ok(Palette {
            off: color(&p.off, "off", fallback.off)?,
            main_on: color(&p.main_on, "main_on", fallback.main_on)?,
            shift_on: color(&p.shift_on, "shift_on", fallback.shift_on)?,
            accent: color(&p.accent, "accent", fallback.accent)?,
            playhead: color(&p.playhead, "playhead", fallback.playhead)?,
            keyboard: color(&p.keyboard, "keyboard", fallback.keyboard)?,
            keyboard_root: color(&p.keyboard_root, "keyboard_root", fallback.keyboard_root)?,
            reference: color(&p.reference, "reference", fallback.reference)?,
        })
    }

    /// Chords in the fixed priority order, with configured keys where given.
    fn chord_table(&self) -> Result<ChordTable, ConfigError> {
        if let Some(name) = self
            .file
            .chords
            .keys()
            .find(|name| !ChordAction::ALL.iter().any(|a| a.name() == name.as_str()))
        {
            return Err(ConfigError::Invalid(format!("unknown chord {:?}", name)));
        }

        let mut table = ChordTable::new();
        for action in ChordAction::ALL {
            match self.file.chords.get(action.name()) {
                Some(keys) => table.register(keys.iter().copied(), action),
                None => table.register(action.default_keys().iter().copied(), action),
            }
        }
        Ok(table)
    }
}

fn parse(contents: &str, origin: &str) -> Result<ConfigFile, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

fn set<T>(base: &mut Option<T>, user: Option<T>) {
    if user.is_some() {
        *base = user;
    }
}

fn color(value: &Option<String>, name: &str, fallback: Rgb) -> Result<Rgb, ConfigError> {
    match value {
        Some(text) => Rgb::parse(text)
            .ok_or_else(|| ConfigError::Invalid(format!("palette.{} {:?} is not #rrggbb", name, text))),
        None => Ok(fallback),
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepgrid").join("config.toml"))
}
