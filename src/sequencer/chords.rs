/// Chord input interpreter
///
/// Keys are tracked while held. On each press the first chord in priority
/// order whose keys are all held wins. It fires once and latches until every
/// key is up again, shadowing any later chord it overlaps; while latched
/// releases do nothing. Without a latch, a release toggles the step under the
/// key (or its accent, for a long hold).
use std::collections::BTreeSet;
use std::time::Duration;

use super::playback::PlaybackEvent;
use super::view::{self, step_index, TICKS_PER_STEP};
use super::{Keyboard, ManualMode, ManualNote, Sequencer, Track, VELOCITY_NORMAL, VELOCITY_RELEASE};

/// Index of a physical button, `row * window_width + col`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Pressed,
    Released,
}

/// A button transition stamped with a monotonic time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyId,
    pub action: KeyAction,
    pub at: Duration,
}

impl KeyEvent {
    pub fn pressed(key: u8, at: Duration) -> Self {
        Self { key: KeyId(key), action: KeyAction::Pressed, at }
    }

    pub fn released(key: u8, at: Duration) -> Self {
        Self { key: KeyId(key), action: KeyAction::Released, at }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwingPreset {
    A,
    B,
    C,
    D,
}

impl SwingPreset {
    fn index(self) -> usize {
        match self {
            SwingPreset::A => 0,
            SwingPreset::B => 1,
            SwingPreset::C => 2,
            SwingPreset::D => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChordAction {
    ClearAllSteps,
    EnterManualRecordMode,
    EnterManualPlayMode,
    EnterManualCcMode,
    ShowReferenceLamps,
    SwitchToMainTrack,
    SwitchToShiftTrack,
    ScrollPitchUp,
    ScrollPitchDown,
    DecreaseLastStep,
    IncreaseLastStep,
    SetSwing(SwingPreset),
}

impl ChordAction {
    /// Every action in default priority order.
    pub const ALL: [ChordAction; 15] = [
        ChordAction::ClearAllSteps,
        ChordAction::EnterManualRecordMode,
        ChordAction::EnterManualPlayMode,
        ChordAction::EnterManualCcMode,
        ChordAction::ShowReferenceLamps,
        ChordAction::SwitchToMainTrack,
        ChordAction::SwitchToShiftTrack,
        ChordAction::ScrollPitchUp,
        ChordAction::ScrollPitchDown,
        ChordAction::DecreaseLastStep,
        ChordAction::IncreaseLastStep,
        ChordAction::SetSwing(SwingPreset::A),
        ChordAction::SetSwing(SwingPreset::B),
        ChordAction::SetSwing(SwingPreset::C),
        ChordAction::SetSwing(SwingPreset::D),
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChordAction::ClearAllSteps => "clear-all-steps",
            ChordAction::EnterManualRecordMode => "enter-manual-record-mode",
            ChordAction::EnterManualPlayMode => "enter-manual-play-mode",
            ChordAction::EnterManualCcMode => "enter-manual-cc-mode",
            ChordAction::ShowReferenceLamps => "show-reference-lamps",
            ChordAction::SwitchToMainTrack => "switch-to-main-track",
            ChordAction::SwitchToShiftTrack => "switch-to-shift-track",
            ChordAction::ScrollPitchUp => "scroll-pitch-up",
            ChordAction::ScrollPitchDown => "scroll-pitch-down",
            ChordAction::DecreaseLastStep => "decrease-last-step",
            ChordAction::IncreaseLastStep => "increase-last-step",
            ChordAction::SetSwing(SwingPreset::A) => "set-swing-a",
            ChordAction::SetSwing(SwingPreset::B) => "set-swing-b",
            ChordAction::SetSwing(SwingPreset::C) => "set-swing-c",
            ChordAction::SetSwing(SwingPreset::D) => "set-swing-d",
        }
    }

    /// Keys for the 8×4 matrix.
    pub fn default_keys(self) -> &'static [u8] {
        match self {
            ChordAction::ClearAllSteps => &[3, 4, 28],
            ChordAction::EnterManualRecordMode => &[17, 25],
            ChordAction::EnterManualPlayMode => &[16, 24],
            ChordAction::EnterManualCcMode => &[22, 30],
            ChordAction::ShowReferenceLamps => &[27, 28],
            ChordAction::SwitchToMainTrack => &[0, 1],
            ChordAction::SwitchToShiftTrack => &[6, 7],
            ChordAction::ScrollPitchUp => &[0, 7],
            ChordAction::ScrollPitchDown => &[24, 31],
            ChordAction::DecreaseLastStep => &[0, 24],
            ChordAction::IncreaseLastStep => &[7, 31],
            ChordAction::SetSwing(SwingPreset::A) => &[8, 9],
            ChordAction::SetSwing(SwingPreset::B) => &[8, 10],
            ChordAction::SetSwing(SwingPreset::C) => &[8, 11],
            ChordAction::SetSwing(SwingPreset::D) => &[8, 12],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chord {
    keys: BTreeSet<KeyId>,
    action: ChordAction,
}

impl Chord {
    pub fn keys(&self) -> &BTreeSet<KeyId> {
        &self.keys
    }

    pub fn action(&self) -> ChordAction {
        self.action
    }
}

/// Chords in priority order; earlier entries shadow later ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChordTable {
    chords: Vec<Chord>,
}

impl Default for ChordTable {
    fn default() -> Self {
        Self::default_layout()
    }
}

impl ChordTable {
    pub fn new() -> Self {
        Self { chords: Vec::new() }
    }

    pub fn register(&mut self, keys: impl IntoIterator<Item = u8>, action: ChordAction) {
        self.chords.push(Chord {
            keys: keys.into_iter().map(KeyId).collect(),
            action,
        });
    }

    /// The standard table for the 8×4 matrix.
    pub fn default_layout() -> Self {
        let mut table = Self::new();
        for action in ChordAction::ALL {
            table.register(action.default_keys().iter().copied(), action);
        }
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chord> {
        self.chords.iter()
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// First chord, in priority order, with all of its keys among `held`.
    pub fn find(&self, held: &BTreeSet<KeyId>) -> Option<&Chord> {
        if held.len() < 2 {
            return None;
        }
        self.chords.iter().find(|chord| chord.keys.is_subset(held))
    }
}

impl Sequencer {
    pub fn apply_input(&mut self, event: KeyEvent) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();

        match event.action {
            KeyAction::Pressed => self.press(event.key, event.at, &mut out),
            KeyAction::Released => self.release(event.key, event.at, &mut out),
        }

        out
    }

    fn press(&mut self, key: KeyId, at: Duration, out: &mut Vec<PlaybackEvent>) {
        let Some((col, row)) = self.layout.key_position(key) else {
            log::debug!("ignoring press of unknown key {}", key.0);
            return;
        };
        if self.held_keys.contains_key(&key) {
            return;
        }
        self.held_keys.insert(key, at);

        if let Some(keyboard) = &self.keyboard {
            let anchors_held = keyboard.anchors.iter().all(|k| self.held_keys.contains_key(k));
            if anchors_held && self.layout.half_of(col) == keyboard.half {
                let half = keyboard.half;
                self.manual_press(key, col - self.layout.half_start(half), row, out);
                return;
            }
        }

        let held: BTreeSet<KeyId> = self.held_keys.keys().copied().collect();
        let Some(chord) = self.chords.find(&held) else {
            return;
        };
        let action = chord.action();
        // the winning chord shadows everything below it until the latch clears
        if self.fired_chords.contains(&action) {
            return;
        }
        let keys = chord.keys().clone();
        log::debug!("chord {}", action.name());
        self.chord_latched = true;
        self.fired_chords.push(action);
        self.run_chord(action, keys, out);
    }

    fn release(&mut self, key: KeyId, at: Duration, out: &mut Vec<PlaybackEvent>) {
        let Some(pressed_at) = self.held_keys.remove(&key) else {
            log::debug!("ignoring release of key {} that was not held", key.0);
            return;
        };

        if let Some(note) = self.manual_notes.remove(&key) {
            if let ManualNote::Note(pitch) = note {
                out.push(PlaybackEvent::NoteOff(pitch, VELOCITY_RELEASE));
            }
            self.paint_keyboard_key(key, out);
        }

        if self.chord_latched {
            if self.held_keys.is_empty() {
                self.chord_latched = false;
                self.fired_chords.clear();
                let repaint = self.manual_mode != ManualMode::Off || self.overlay_active;
                if self.manual_mode != ManualMode::Off {
                    log::info!("leaving manual mode");
                }
                self.manual_mode = ManualMode::Off;
                self.keyboard = None;
                self.overlay_active = false;
                if repaint {
                    self.paint_window(out);
                }
            }
            return;
        }

        let Some((visible_col, visible_row)) = self.layout.key_position(key) else {
            return;
        };
        let column = view::grid_column(visible_col, self.visible_scroll());
        let row = view::grid_row(visible_row, self.pitch_offset);
        let track = self.active_track;
        let held_for = at.saturating_sub(pressed_at);

        if held_for < self.hold_threshold {
            self.grid_mut(track).toggle(column, row);
            log::debug!("toggled {} step ({}, {})", track.name(), column, row);
        } else {
            self.grid_mut(track).toggle_accent(column, row);
            log::debug!("toggled {} accent ({}, {})", track.name(), column, row);
        }
        self.paint_step(track, column, row, out);
    }

    fn run_chord(&mut self, action: ChordAction, keys: BTreeSet<KeyId>, out: &mut Vec<PlaybackEvent>) {
        let layout = self.layout;

        match action {
            ChordAction::ClearAllSteps => {
                self.main.clear();
                self.shift.clear();
                log::info!("cleared all steps");
            }
            ChordAction::EnterManualRecordMode => return self.enter_manual(ManualMode::Record, keys, out),
            ChordAction::EnterManualPlayMode => return self.enter_manual(ManualMode::Play, keys, out),
            ChordAction::EnterManualCcMode => return self.enter_manual(ManualMode::ControlChange, keys, out),
            ChordAction::ShowReferenceLamps => {
                self.overlay_active = true;
                let keys: BTreeSet<KeyId> = self.chords.iter().flat_map(|c| c.keys().iter().copied()).collect();
                for key in keys {
                    out.push(PlaybackEvent::SetLamp(key.0, self.palette.reference));
                }
                return;
            }
            ChordAction::SwitchToMainTrack => self.active_track = Track::Main,
            ChordAction::SwitchToShiftTrack => self.active_track = Track::Shift,
            ChordAction::ScrollPitchUp => {
                self.pitch_offset = self.pitch_offset.saturating_sub(layout.window_height);
            }
            ChordAction::ScrollPitchDown => {
                self.pitch_offset = (self.pitch_offset + layout.window_height).min(layout.max_pitch_offset());
            }
            ChordAction::DecreaseLastStep => {
                self.last_step = self.last_step.saturating_sub(layout.window_width).max(layout.window_width);
            }
            ChordAction::IncreaseLastStep => {
                self.last_step = (self.last_step + layout.window_width).min(layout.columns);
            }
            ChordAction::SetSwing(preset) => self.swing = self.swing_presets[preset.index()],
        }

        log::info!(
            "{}: track {}, pitch offset {}, last step {}, swing {}",
            action.name(),
            self.active_track.name(),
            self.pitch_offset,
            self.last_step,
            self.swing
        );
        self.paint_window(out);
    }

    fn enter_manual(&mut self, mode: ManualMode, anchors: BTreeSet<KeyId>, out: &mut Vec<PlaybackEvent>) {
        let layout = self.layout;
        let anchors_left = anchors
            .iter()
            .filter_map(|k| layout.key_position(*k))
            .all(|(col, _)| layout.half_of(col) == view::Half::Left);
        let half = if anchors_left { view::Half::Right } else { view::Half::Left };

        log::info!("entering manual {:?} mode on the {:?} half", mode, half);
        self.manual_mode = mode;
        self.keyboard = Some(Keyboard { anchors, half });

        for offset in 0..layout.keyboard_size() {
            if let Some((sub_col, sub_row)) = layout.keyboard_sub_key(offset) {
                let key = layout.key_at(layout.half_start(half) + sub_col, sub_row);
                out.push(PlaybackEvent::SetLamp(key.0, self.keyboard_color(offset)));
            }
        }
    }

    fn keyboard_color(&self, offset: usize) -> super::Rgb {
        if offset % 12 == 0 {
            self.palette.keyboard_root
        } else {
            self.palette.keyboard
        }
    }

    fn paint_keyboard_key(&self, key: KeyId, out: &mut Vec<PlaybackEvent>) {
        let Some(keyboard) = &self.keyboard else {
            return;
        };
        if let Some((col, row)) = self.layout.key_position(key) {
            if self.layout.half_of(col) == keyboard.half {
                let offset = self.layout.keyboard_offset(col - self.layout.half_start(keyboard.half), row);
                out.push(PlaybackEvent::SetLamp(key.0, self.keyboard_color(offset)));
            }
        }
    }

    fn manual_press(&mut self, key: KeyId, sub_col: usize, sub_row: usize, out: &mut Vec<PlaybackEvent>) {
        let offset = self.layout.keyboard_offset(sub_col, sub_row);

        match self.manual_mode {
            ManualMode::Play | ManualMode::Record => {
                let pitch = self.layout.lowest_visible_pitch(self.pitch_offset) + offset as i32;
                let Ok(note) = u8::try_from(pitch) else {
                    return;
                };
                if note > 127 {
                    return;
                }
                out.push(PlaybackEvent::NoteOn(note, VELOCITY_NORMAL));
                self.manual_notes.insert(key, ManualNote::Note(note));
                if self.manual_mode == ManualMode::Record {
                    self.record_note(pitch);
                }
            }
            ManualMode::ControlChange => {
                let span = self.layout.keyboard_size().saturating_sub(1).max(1);
                let value = (offset * 127 / span) as u8;
                out.push(PlaybackEvent::ControlChange(self.cc_controller, value));
                self.manual_notes.insert(key, ManualNote::Control);
            }
            ManualMode::Off => return,
        }

        out.push(PlaybackEvent::SetLamp(key.0, self.palette.playhead));
    }

    /// Writes a live note into the step nearest to the current tick.
    fn record_note(&mut self, pitch: i32) {
        let Some(row) = self.layout.row_for_pitch(pitch) else {
            return;
        };
        let (track, column) = self.record_position();
        if let Some(step) = self.grid_mut(track).step_mut(column, row) {
            step.on();
            log::debug!("recorded {} step ({}, {})", track.name(), column, row);
        }
    }

    /// Quantizes the current tick to main-this-step, shift or main-next-step,
    /// whichever is nearest; ties go to the earlier one.
    fn record_position(&self) -> (Track, usize) {
        let tick = self.view_tick();
        let phase = tick % TICKS_PER_STEP;
        let step = step_index(tick) as usize;
        let to_shift = phase.abs_diff(self.swing);
        let to_next = TICKS_PER_STEP - phase;

        let (track, step) = if phase <= to_shift && phase <= to_next {
            (Track::Main, step)
        } else if to_shift <= to_next {
            (Track::Shift, step)
        } else {
            (Track::Main, step + 1)
        };
        (track, step % self.last_step)
    }
}
