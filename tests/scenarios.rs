use std::time::Duration;

use stepgrid::{
    ClockEvent, Controller, KeyEvent, LampOutput, Layout, MidiError, NoteOutput, Rgb, Sequencer,
    SequencerConfig, Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sent {
    On(u8, u8),
    Off(u8, u8),
    Cc(u8, u8),
}

/// Controller wired to in-memory outputs, with a fake millisecond clock for key timing.
struct Rig {
    controller: Controller,
    notes: Vec<(u32, Sent)>,
    lamps: Vec<(u8, Rgb)>,
    now_ms: u64,
}

struct NoteLog<'a> {
    tick: u32,
    log: &'a mut Vec<(u32, Sent)>,
}

impl NoteOutput for NoteLog<'_> {
    fn note_on(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
        self.log.push((self.tick, Sent::On(pitch, velocity)));
        Ok(())
    }

    fn note_off(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
        self.log.push((self.tick, Sent::Off(pitch, velocity)));
        Ok(())
    }

    fn control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError> {
        self.log.push((self.tick, Sent::Cc(controller, value)));
        Ok(())
    }
}

struct LampLog<'a>(&'a mut Vec<(u8, Rgb)>);

impl LampOutput for LampLog<'_> {
    fn set_lamp(&mut self, index: u8, color: Rgb) {
        self.0.push((index, color));
    }
}

impl Rig {
    fn new(config: SequencerConfig) -> Self {
        Self {
            controller: Controller::new(Sequencer::new(config).unwrap()),
            notes: Vec::new(),
            lamps: Vec::new(),
            now_ms: 0,
        }
    }

    fn sequencer(&self) -> &Sequencer {
        self.controller.sequencer()
    }

    fn cycle(&mut self, clock: Option<ClockEvent>, keys: Vec<KeyEvent>) -> stepgrid::CycleSummary {
        let tick = self.controller.sequencer().tick();
        let mut notes = NoteLog {
            tick,
            log: &mut self.notes,
        };
        let mut lamps = LampLog(&mut self.lamps);
        self.controller.cycle(clock, keys, &mut notes, &mut lamps)
    }

    fn ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.cycle(Some(ClockEvent::Tick), vec![]);
        }
    }

    fn press(&mut self, key: u8) {
        let at = Duration::from_millis(self.now_ms);
        self.cycle(None, vec![KeyEvent::pressed(key, at)]);
    }

    fn release_after(&mut self, key: u8, held_ms: u64) {
        self.now_ms += held_ms;
        let at = Duration::from_millis(self.now_ms);
        self.cycle(None, vec![KeyEvent::released(key, at)]);
    }

    fn tap(&mut self, key: u8) {
        self.press(key);
        self.release_after(key, 40);
    }

    /// Presses every key in order, then releases them all.
    fn chord(&mut self, keys: &[u8]) {
        for &key in keys {
            self.press(key);
        }
        for &key in keys {
            self.release_after(key, 10);
        }
    }

    fn note_ons(&self) -> Vec<(u32, u8)> {
        self.notes
            .iter()
            .filter_map(|(tick, sent)| match sent {
                Sent::On(pitch, _) => Some((*tick, *pitch)),
                _ => None,
            })
            .collect()
    }
}

fn narrow_config() -> SequencerConfig {
    SequencerConfig {
        layout: Layout {
            columns: 8,
            rows: 16,
            window_width: 8,
            window_height: 4,
            base_note: 36,
        },
        last_step: 8,
        ..SequencerConfig::default()
    }
}

#[test]
fn test_tap_toggles_one_step_and_one_lamp() {
    let mut rig = Rig::new(narrow_config());
    let main_on = rig.sequencer().palette().main_on;

    // visible (2, 1) is key 1 * 8 + 2
    rig.tap(10);

    let grid = rig.sequencer().grid(Track::Main);
    assert!(grid.is_on(2, 1));
    assert_eq!(grid.steps().filter(|s| s.is_on).count(), 1);
    assert_eq!(rig.lamps, vec![(10, main_on)]);
    assert!(rig.notes.is_empty());
}

#[test]
fn test_tap_follows_pitch_offset() {
    let mut rig = Rig::new(narrow_config());
    rig.chord(&[24, 31]);
    assert_eq!(rig.sequencer().pitch_offset(), 4);

    rig.lamps.clear();
    rig.tap(10);

    assert!(rig.sequencer().grid(Track::Main).is_on(2, 5));
    assert!(!rig.sequencer().grid(Track::Main).is_on(2, 1));
    assert_eq!(rig.lamps.len(), 1);
    assert_eq!(rig.lamps[0].0, 10);
}

#[test]
fn test_swing_timing_of_both_tracks() {
    let mut rig = Rig::new(SequencerConfig::default());
    assert_eq!(rig.sequencer().swing(), 6);
    {
        let seq = rig.controller.sequencer_mut();
        seq.grid_mut(Track::Main).set(0, 0, true);
        seq.grid_mut(Track::Main).set(1, 1, true);
        seq.grid_mut(Track::Shift).set(0, 2, true);
    }

    rig.ticks(13);

    assert_eq!(
        rig.notes,
        vec![
            (0, Sent::On(59, 96)),
            (6, Sent::On(57, 96)),
            (12, Sent::Off(59, 0)),
            (12, Sent::On(58, 96)),
        ]
    );
}

#[test]
fn test_window_pages_per_measure() {
    let mut rig = Rig::new(SequencerConfig::default());
    assert_eq!(rig.sequencer().last_step(), 16);

    rig.ticks(1);
    assert_eq!(rig.sequencer().visible_scroll(), 0);
    rig.ticks(95);
    assert_eq!(rig.sequencer().visible_scroll(), 0);

    // first tick of measure 1
    rig.ticks(1);
    assert_eq!(rig.sequencer().visible_scroll(), 8);

    rig.ticks(96);
    assert_eq!(rig.sequencer().visible_scroll(), 0);
}

#[test]
fn test_tap_lands_in_current_page() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.ticks(97);
    rig.tap(3);
    assert!(rig.sequencer().grid(Track::Main).is_on(11, 0));
}

#[test]
fn test_clear_all_keeps_accents_and_pitches() {
    let mut rig = Rig::new(SequencerConfig::default());
    {
        let seq = rig.controller.sequencer_mut();
        seq.grid_mut(Track::Main).set(5, 3, true);
        seq.grid_mut(Track::Main).toggle_accent(5, 3);
        seq.grid_mut(Track::Shift).set(20, 17, true);
    }
    let pitches: Vec<u8> = rig.sequencer().grid(Track::Main).steps().map(|s| s.pitch).collect();

    rig.chord(&[3, 4, 28]);

    for track in [Track::Main, Track::Shift] {
        assert!(rig.sequencer().grid(track).steps().all(|s| !s.is_on));
    }
    let main = rig.sequencer().grid(Track::Main);
    assert_eq!(main.step(5, 3).map(|s| s.is_accented), Some(true));
    assert_eq!(main.steps().map(|s| s.pitch).collect::<Vec<_>>(), pitches);
}

#[test]
fn test_transport_start_resyncs() {
    for phase in [0u16, 3, 4, 17] {
        let mut rig = Rig::new(SequencerConfig::default());
        rig.ticks(50);
        rig.cycle(Some(ClockEvent::TransportStart { phase }), vec![]);
        assert_eq!(rig.sequencer().tick(), u32::from(phase) * 6);

        let summary = rig.cycle(Some(ClockEvent::Tick), vec![]);
        let expected = (u32::from(phase) * 6 % 12 == 0).then(|| (usize::from(phase) * 6 / 12) % 16);
        assert_eq!(summary.step_advanced, expected);
    }
}

#[test]
fn test_tracks_only_sound_on_their_phase() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.chord(&[8, 11]);
    assert_eq!(rig.sequencer().swing(), 8);
    {
        let seq = rig.controller.sequencer_mut();
        for column in 0..32 {
            seq.grid_mut(Track::Main).set(column, 0, true);
            seq.grid_mut(Track::Shift).set(column, 1, true);
        }
    }

    rig.ticks(300);

    let ons = rig.note_ons();
    assert!(!ons.is_empty());
    for (tick, pitch) in ons {
        match pitch {
            59 => assert_eq!(tick % 12, 0, "main note at tick {}", tick),
            58 => assert_eq!(tick % 12, 8, "shift note at tick {}", tick),
            other => panic!("unexpected pitch {}", other),
        }
    }
}

#[test]
fn test_held_chord_shadows_lower_priority_overlap() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.press(24);
    rig.press(31);
    rig.press(0);
    assert_eq!(rig.sequencer().pitch_offset(), 4);
    assert_eq!(rig.sequencer().last_step(), 16);

    for key in [0, 24, 31] {
        rig.release_after(key, 10);
    }
    assert!(rig.sequencer().grid(Track::Main).steps().all(|s| !s.is_on));
}

#[test]
fn test_transport_start_keeps_lamps_and_taps_aligned() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.ticks(100);
    rig.lamps.clear();
    rig.cycle(Some(ClockEvent::TransportStart { phase: 4 }), vec![]);
    assert_eq!(rig.lamps.len(), 32);

    rig.tap(3);
    assert!(rig.sequencer().grid(Track::Main).is_on(3, 0));
    let main_on = rig.sequencer().palette().main_on;
    assert_eq!(rig.lamps.last(), Some(&(3, main_on)));
}

#[test]
fn test_double_tap_restores_step() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.tap(13);
    assert!(rig.sequencer().grid(Track::Main).is_on(5, 1));
    rig.tap(13);
    assert!(rig.sequencer().grid(Track::Main).steps().all(|s| !s.is_on && !s.is_accented));
}

#[test]
fn test_chord_keys_never_toggle_steps() {
    let mut rig = Rig::new(SequencerConfig::default());
    rig.chord(&[6, 7]);
    assert_eq!(rig.sequencer().active_track(), Track::Shift);
    rig.chord(&[0, 1]);
    assert_eq!(rig.sequencer().active_track(), Track::Main);

    for track in [Track::Main, Track::Shift] {
        assert!(rig.sequencer().grid(track).steps().all(|s| !s.is_on && !s.is_accented));
    }
    assert!(!rig.sequencer().chord_latched());
    assert_eq!(rig.sequencer().held_count(), 0);
}

#[test]
fn test_scroll_and_length_clamp() {
    let mut rig = Rig::new(SequencerConfig::default());
    for _ in 0..10 {
        rig.chord(&[24, 31]);
        assert!(rig.sequencer().pitch_offset() <= 20);
    }
    assert_eq!(rig.sequencer().pitch_offset(), 20);

    for _ in 0..10 {
        rig.chord(&[0, 24]);
        assert!(rig.sequencer().last_step() >= 8);
    }
    assert_eq!(rig.sequencer().last_step(), 8);

    for _ in 0..10 {
        rig.chord(&[7, 31]);
    }
    assert_eq!(rig.sequencer().last_step(), 32);
}

#[test]
fn test_manual_play_sounds_lowest_visible_pitch() {
    let mut rig = Rig::new(SequencerConfig::default());
    // anchors on the left half, keyboard on the right
    rig.press(16);
    rig.press(24);
    rig.notes.clear();

    // bottom-left key of the right half is the keyboard root
    rig.press(28);
    rig.release_after(28, 100);
    assert_eq!(rig.notes, vec![(0, Sent::On(56, 96)), (0, Sent::Off(56, 0))]);

    rig.release_after(16, 10);
    rig.release_after(24, 10);
    assert!(rig.sequencer().grid(Track::Main).steps().all(|s| !s.is_on));
    assert_eq!(rig.sequencer().manual_mode(), stepgrid::ManualMode::Off);
}
