/// Core sequencer logic - grid state, parameters and lamp painting
///
/// The scheduler lives in `playback`, the chord interpreter in `chords` and
/// the addressing math in `view`. All of them operate on the one
/// [`Sequencer`] owned by the control loop.
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::error::ConfigError;

pub mod chords;
pub mod playback;
pub mod view;

use chords::{ChordAction, ChordTable, KeyId};
use playback::PlaybackEvent;
use view::{column_scroll, Half, Layout};

pub const VELOCITY_ACCENT: u8 = 127;
pub const VELOCITY_NORMAL: u8 = 96;
pub const VELOCITY_RELEASE: u8 = 0;

pub const DEFAULT_HOLD_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub is_on: bool,
    pub is_accented: bool,
    pub pitch: u8,
    pub lamp_index: u8,
}

impl Step {
    pub fn new(pitch: u8, lamp_index: u8) -> Self {
        Self {
            is_on: false,
            is_accented: false,
            pitch,
            lamp_index,
        }
    }

    pub fn toggle(&mut self) {
        self.is_on = !self.is_on;
    }

    pub fn on(&mut self) {
        self.is_on = true;
    }

    pub fn off(&mut self) {
        self.is_on = false;
    }

    pub fn toggle_accent(&mut self) {
        self.is_accented = !self.is_accented;
    }

    pub fn velocity(&self) -> u8 {
        if self.is_accented {
            VELOCITY_ACCENT
        } else {
            VELOCITY_NORMAL
        }
    }
}

/// `columns × rows` bank of steps addressed by `[column][row]`.
#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<Vec<Step>>,
    columns: usize,
    rows: usize,
}

impl Grid {
    pub fn new(layout: &Layout) -> Self {
        let cells = (0..layout.columns)
            .map(|column| {
                (0..layout.rows)
                    .map(|row| Step::new(layout.pitch_for_row(row), layout.lamp_index(column, row)))
                    .collect()
            })
            .collect();

        Self {
            cells,
            columns: layout.columns,
            rows: layout.rows,
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn step(&self, column: usize, row: usize) -> Option<&Step> {
        self.cells.get(column).and_then(|c| c.get(row))
    }

    pub fn step_mut(&mut self, column: usize, row: usize) -> Option<&mut Step> {
        self.cells.get_mut(column).and_then(|c| c.get_mut(row))
    }

    pub fn is_on(&self, column: usize, row: usize) -> bool {
        self.step(column, row).map(|s| s.is_on).unwrap_or(false)
    }

    pub fn set(&mut self, column: usize, row: usize, value: bool) {
        if let Some(step) = self.step_mut(column, row) {
            step.is_on = value;
        }
    }

    pub fn toggle(&mut self, column: usize, row: usize) {
        if let Some(step) = self.step_mut(column, row) {
            step.toggle();
        }
    }

    pub fn toggle_accent(&mut self, column: usize, row: usize) {
        if let Some(step) = self.step_mut(column, row) {
            step.toggle_accent();
        }
    }

    /// Turns every step off. Accents and pitches are kept.
    pub fn clear(&mut self) {
        for step in self.cells.iter_mut().flatten() {
            step.off();
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.cells.iter().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Main,
    Shift,
}

impl Track {
    fn index(self) -> usize {
        match self {
            Track::Main => 0,
            Track::Shift => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Track::Main => "main",
            Track::Shift => "shift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualMode {
    Off,
    Play,
    Record,
    ControlChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// Parses `#rrggbb` or `rrggbb`.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_hex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub off: Rgb,
    pub main_on: Rgb,
    pub shift_on: Rgb,
    pub accent: Rgb,
    pub playhead: Rgb,
    pub keyboard: Rgb,
    pub keyboard_root: Rgb,
    pub reference: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            off: Rgb::from_hex(0x000000),
            main_on: Rgb::from_hex(0x0040ff),
            shift_on: Rgb::from_hex(0x00ff40),
            accent: Rgb::from_hex(0xff2000),
            playhead: Rgb::from_hex(0xffffff),
            keyboard: Rgb::from_hex(0x402000),
            keyboard_root: Rgb::from_hex(0xff8000),
            reference: Rgb::from_hex(0x8000ff),
        }
    }
}

/// Everything fixed at process start.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub layout: Layout,
    pub last_step: usize,
    pub swing: u32,
    pub swing_presets: [u32; 4],
    pub hold_threshold: Duration,
    pub cc_controller: u8,
    pub palette: Palette,
    pub chords: ChordTable,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            last_step: 16,
            swing: 6,
            swing_presets: [6, 7, 8, 9],
            hold_threshold: DEFAULT_HOLD_THRESHOLD,
            cc_controller: 1,
            palette: Palette::default(),
            chords: ChordTable::default(),
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if layout.window_width < 2 || layout.window_width % 2 != 0 {
            return invalid(format!("window_width {} must be even and at least 2", layout.window_width));
        }
        if layout.window_height == 0 {
            return invalid("window_height must be at least 1".to_string());
        }
        if layout.key_count() > 256 {
            return invalid(format!("{} keys do not fit a key index", layout.key_count()));
        }
        if layout.columns < layout.window_width || layout.columns % layout.window_width != 0 {
            return invalid(format!(
                "columns {} must be a positive multiple of window_width {}",
                layout.columns, layout.window_width
            ));
        }
        if layout.rows < layout.window_height || layout.rows % layout.window_height != 0 {
            return invalid(format!(
                "rows {} must be a positive multiple of window_height {}",
                layout.rows, layout.window_height
            ));
        }
        if usize::from(layout.base_note) + layout.rows > 128 {
            return invalid(format!(
                "base_note {} + rows {} runs past MIDI note 127",
                layout.base_note, layout.rows
            ));
        }
        if self.last_step < layout.window_width
            || self.last_step > layout.columns
            || self.last_step % layout.window_width != 0
        {
            return invalid(format!(
                "last_step {} must be a multiple of window_width within the grid",
                self.last_step
            ));
        }
        for swing in std::iter::once(&self.swing).chain(self.swing_presets.iter()) {
            if !(1..view::TICKS_PER_STEP).contains(swing) {
                return invalid(format!("swing {} must be within 1..={}", swing, view::TICKS_PER_STEP - 1));
            }
        }
        if self.cc_controller > 127 {
            return invalid(format!("cc_controller {} is not a MIDI controller", self.cc_controller));
        }
        for chord in self.chords.iter() {
            if chord.keys().len() < 2 {
                return invalid(format!("chord {} needs at least two keys", chord.action().name()));
            }
            if let Some(key) = chord.keys().iter().find(|k| usize::from(k.0) >= layout.key_count()) {
                return invalid(format!("chord {} uses key {} outside the matrix", chord.action().name(), key.0));
            }
        }
        Ok(())
    }
}

/// The notes a track started at its last boundary.
#[derive(Debug, Clone, Default)]
struct Voice {
    column: usize,
    rows: Vec<usize>,
}

/// A manual mode in progress: the anchor keys that opened it and the half of
/// the matrix turned into a keyboard.
#[derive(Debug, Clone)]
struct Keyboard {
    anchors: BTreeSet<KeyId>,
    half: Half,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualNote {
    Note(u8),
    Control,
}

pub struct Sequencer {
    layout: Layout,
    main: Grid,
    shift: Grid,
    tick: u32,
    last_step: usize,
    swing: u32,
    swing_presets: [u32; 4],
    pitch_offset: usize,
    active_track: Track,
    manual_mode: ManualMode,
    keyboard: Option<Keyboard>,
    manual_notes: HashMap<KeyId, ManualNote>,
    held_keys: HashMap<KeyId, Duration>,
    chord_latched: bool,
    fired_chords: Vec<ChordAction>,
    overlay_active: bool,
    voices: [Voice; 2],
    hold_threshold: Duration,
    cc_controller: u8,
    palette: Palette,
    chords: ChordTable,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = config.layout;

        Ok(Self {
            main: Grid::new(&layout),
            shift: Grid::new(&layout),
            layout,
            tick: 0,
            last_step: config.last_step,
            swing: config.swing,
            swing_presets: config.swing_presets,
            pitch_offset: 0,
            active_track: Track::Main,
            manual_mode: ManualMode::Off,
            keyboard: None,
            manual_notes: HashMap::new(),
            held_keys: HashMap::new(),
            chord_latched: false,
            fired_chords: Vec::new(),
            overlay_active: false,
            voices: Default::default(),
            hold_threshold: config.hold_threshold,
            cc_controller: config.cc_controller,
            palette: config.palette,
            chords: config.chords,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn grid(&self, track: Track) -> &Grid {
        match track {
            Track::Main => &self.main,
            Track::Shift => &self.shift,
        }
    }

    pub fn grid_mut(&mut self, track: Track) -> &mut Grid {
        match track {
            Track::Main => &mut self.main,
            Track::Shift => &mut self.shift,
        }
    }

    /// The next clock tick to be played.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn last_step(&self) -> usize {
        self.last_step
    }

    /// Sets the pattern length, rounded down to a whole window and clamped to the grid.
    pub fn set_last_step(&mut self, last_step: usize) {
        let width = self.layout.window_width;
        self.last_step = (last_step / width * width).clamp(width, self.layout.columns);
    }

    pub fn swing(&self) -> u32 {
        self.swing
    }

    pub fn set_swing(&mut self, swing: u32) {
        self.swing = swing.clamp(1, view::TICKS_PER_STEP - 1);
    }

    pub fn pitch_offset(&self) -> usize {
        self.pitch_offset
    }

    pub fn active_track(&self) -> Track {
        self.active_track
    }

    pub fn manual_mode(&self) -> ManualMode {
        self.manual_mode
    }

    pub fn chord_latched(&self) -> bool {
        self.chord_latched
    }

    pub fn held_count(&self) -> usize {
        self.held_keys.len()
    }

    pub fn chords(&self) -> &ChordTable {
        &self.chords
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The last tick that was played, which is what the lamps currently show.
    fn view_tick(&self) -> u32 {
        self.tick.saturating_sub(1)
    }

    /// First grid column currently in the window.
    pub fn visible_scroll(&self) -> usize {
        column_scroll(self.view_tick(), self.last_step, self.layout.window_width)
    }

    fn is_visible(&self, column: usize, row: usize) -> bool {
        let scroll = self.visible_scroll();
        let in_window = (scroll..scroll + self.layout.window_width).contains(&column);
        in_window && self.layout.pitch_in_visible_band(self.layout.pitch_for_row(row), self.pitch_offset)
    }

    /// Whether grid painting may touch this lamp right now.
    fn lamp_free(&self, lamp: u8) -> bool {
        if self.overlay_active {
            return false;
        }
        match (&self.keyboard, self.layout.key_position(KeyId(lamp))) {
            (Some(keyboard), Some((col, _))) => self.layout.half_of(col) != keyboard.half,
            _ => true,
        }
    }

    fn step_color(&self, track: Track, step: &Step) -> Rgb {
        if step.is_on && step.is_accented {
            self.palette.accent
        } else if step.is_on {
            match track {
                Track::Main => self.palette.main_on,
                Track::Shift => self.palette.shift_on,
            }
        } else {
            self.palette.off
        }
    }

    /// Lamp writes that bring the whole window up to date, e.g. for a freshly
    /// attached display.
    pub fn repaint(&self) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        self.paint_window(&mut out);
        out
    }

    /// Repaints the whole window from the active track.
    fn paint_window(&self, out: &mut Vec<PlaybackEvent>) {
        let track = self.active_track;
        let grid = self.grid(track);
        let scroll = self.visible_scroll();
        for visible_row in 0..self.layout.window_height {
            for visible_col in 0..self.layout.window_width {
                let column = view::grid_column(visible_col, scroll);
                let row = view::grid_row(visible_row, self.pitch_offset);
                if let Some(step) = grid.step(column, row) {
                    if self.lamp_free(step.lamp_index) {
                        out.push(PlaybackEvent::SetLamp(step.lamp_index, self.step_color(track, step)));
                    }
                }
            }
        }
    }

    /// Repaints one step from its state, if it belongs to the shown track and is on screen.
    fn paint_step(&self, track: Track, column: usize, row: usize, out: &mut Vec<PlaybackEvent>) {
        if track != self.active_track || !self.is_visible(column, row) {
            return;
        }
        if let Some(step) = self.grid(track).step(column, row) {
            if self.lamp_free(step.lamp_index) {
                out.push(PlaybackEvent::SetLamp(step.lamp_index, self.step_color(track, step)));
            }
        }
    }

    fn paint_playhead(&self, track: Track, column: usize, row: usize, out: &mut Vec<PlaybackEvent>) {
        if track != self.active_track || !self.is_visible(column, row) {
            return;
        }
        let lamp = self.layout.lamp_index(column, row);
        if self.lamp_free(lamp) {
            out.push(PlaybackEvent::SetLamp(lamp, self.palette.playhead));
        }
    }
}
